//! 可观测性与消息头解析的集成测试

use std::collections::HashMap;

mod metrics_tests {
    use ledger_shared::observability::metrics::{
        record_http_request, record_ledger_event, record_ledger_upsert,
    };

    #[test]
    fn test_record_http_request() {
        record_http_request("GET", "/build-service-gin/api-main/v1/profile/user-transaction-history", 200, 0.05);
        record_http_request("POST", "/build-service-gin/api-main/v1/profile/user-transaction-history", 404, 0.12);
        record_http_request("DELETE", "/build-service-gin/api-main/v1/profile/user-transaction-history", 200, 0.03);
    }

    #[test]
    fn test_record_ledger_metrics() {
        record_ledger_event("order_success", "success", 0.01);
        record_ledger_event("earn_point", "failed", 0.2);
        record_ledger_event("earn_point", "skipped", 0.0);
        record_ledger_upsert("postgres", "earn_point");
        record_ledger_upsert("memory", "order_success");
    }
}

mod tracing_tests {
    use super::*;
    use ledger_shared::observability::tracing::{extract_from_headers, upstream_trace_id};
    use opentelemetry::trace::TraceContextExt;

    #[test]
    fn test_extract_with_tracestate() {
        let headers = HashMap::from([
            (
                "traceparent".to_string(),
                "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01".to_string(),
            ),
            ("tracestate".to_string(), "congo=t61rcWkgMzE".to_string()),
        ]);

        let context = extract_from_headers(&headers);
        let span_context = context.span().span_context().clone();

        assert!(span_context.is_valid());
        assert_eq!(span_context.span_id().to_string(), "00f067aa0ba902b7");
    }

    #[test]
    fn test_malformed_traceparent_yields_no_trace_id() {
        let cases = [
            "",
            "00",
            "00-0af7651916cd43dd8448eb211c80319c",
            "00-invalid-b7ad6b7169203331-01",
            "00-0af7651916cd43dd8448eb211c80319c-invalid-01",
        ];

        for invalid in cases {
            let headers = HashMap::from([("traceparent".to_string(), invalid.to_string())]);
            assert!(upstream_trace_id(&headers).is_none(), "case {invalid:?}");
        }
    }
}

mod kafka_header_tests {
    use super::*;
    use ledger_shared::kafka::{ConsumerMessage, TRACE_INFO_HEADER};

    #[test]
    fn test_trace_info_with_empty_request_id_is_ignored() {
        let msg = ConsumerMessage {
            topic: "core.transaction.point.success".to_string(),
            partition: 2,
            offset: 10,
            key: None,
            payload: Vec::new(),
            timestamp: Some(1_700_000_000_000),
            headers: HashMap::from([(
                TRACE_INFO_HEADER.to_string(),
                r#"{"request_id":""}"#.to_string(),
            )]),
        };

        assert!(msg.request_id().is_none());
    }
}

mod guard_tests {
    use ledger_shared::observability::ObservabilityGuard;

    #[test]
    fn test_empty_guard() {
        let guard = ObservabilityGuard::empty();
        drop(guard);
    }
}
