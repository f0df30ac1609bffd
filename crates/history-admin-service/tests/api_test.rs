//! 管理端 API 测试
//!
//! 使用内存仓储与桩客户端组装完整路由，通过 tower oneshot 发送请求。

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use history_admin_service::{routes, state::AppState};
use http_body_util::BodyExt;
use ledger_shared::error::{LedgerError, Result as LedgerResult};
use serde_json::{Value, json};
use tower::ServiceExt;
use transaction_history::{
    LedgerRepository, MemoryLedgerRepository, client::ReceiverClient, service::OrderMessage,
};

const BASE: &str = "/build-service-gin/api-main/v1";

/// 记录收到的订单消息，可配置为失败
#[derive(Default)]
struct StubReceiver {
    fail: bool,
    sent: Mutex<Vec<(String, OrderMessage)>>,
}

#[async_trait]
impl ReceiverClient for StubReceiver {
    async fn post_order(&self, region: &str, message: &OrderMessage) -> LedgerResult<()> {
        if self.fail {
            return Err(LedgerError::ExternalService {
                service: "rewards-receiver".to_string(),
                message: "HTTP 503".to_string(),
            });
        }
        self.sent
            .lock()
            .unwrap()
            .push((region.to_string(), message.clone()));
        Ok(())
    }
}

struct TestApp {
    router: Router,
    document: MemoryLedgerRepository,
    relational: MemoryLedgerRepository,
    receiver: Arc<StubReceiver>,
}

fn test_app_with(receiver: StubReceiver) -> TestApp {
    let document = MemoryLedgerRepository::new();
    let relational = MemoryLedgerRepository::new();
    let receiver = Arc::new(receiver);

    let state = AppState::from_parts(
        Arc::new(document.clone()) as Arc<dyn LedgerRepository>,
        Arc::new(relational.clone()) as Arc<dyn LedgerRepository>,
        receiver.clone() as Arc<dyn ReceiverClient>,
    );

    TestApp {
        router: routes::app(state),
        document,
        relational,
        receiver,
    }
}

fn test_app() -> TestApp {
    test_app_with(StubReceiver::default())
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn record_body(profile_id: &str, reference_code: &str, tx_type: &str) -> Value {
    json!({
        "profileID": profile_id,
        "referenceCode": reference_code,
        "transactionType": tx_type,
        "status": "SUCCESS",
        "pointAmount": 100,
        "totalAmount": 9.99,
        "currency": "USD"
    })
}

#[tokio::test]
async fn test_create_then_query_with_paging() {
    let app = test_app();

    for (reference, tx_type) in [("ORD-1", "EARN"), ("ORD-2", "BURN"), ("ORD-3", "EARN")] {
        let (status, body) = send(
            &app.router,
            json_request(
                "POST",
                &format!("{BASE}/profile/user-transaction-history"),
                record_body("P1", reference, tx_type),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["errorCode"], 1);
        assert_eq!(body["data"]["referenceCode"], reference);
        assert!(body["data"]["createdAt"].is_string());
    }

    let (status, body) = send(
        &app.router,
        get(&format!(
            "{BASE}/profile/user-transaction-history?profileID=P1&offset=0&limit=1&txType=earn"
        )),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Success");
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"][0]["referenceCode"], "ORD-3");
    assert_eq!(body["paging"], json!({"offset": 0, "limit": 1, "total": 2}));
}

#[tokio::test]
async fn test_query_requires_profile_id() {
    let app = test_app();

    let (status, body) = send(
        &app.router,
        get(&format!("{BASE}/profile/user-transaction-history?limit=10")),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errorCode"], 1002);
    assert_eq!(body["message"], "Data invalid");
    assert!(body["data"].is_null());
}

#[tokio::test]
async fn test_query_with_malformed_number_is_rejected() {
    let app = test_app();

    let (status, body) = send(
        &app.router,
        get(&format!(
            "{BASE}/profile/user-transaction-history?profileID=P1&offset=abc"
        )),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errorCode"], 1002);
}

#[tokio::test]
async fn test_create_with_null_body_is_not_found() {
    let app = test_app();

    let (status, body) = send(
        &app.router,
        json_request("POST", &format!("{BASE}/profile/user-transaction-history"), Value::Null),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["errorCode"], 1001);
    assert_eq!(body["description"], "order cannot be nil");
}

#[tokio::test]
async fn test_create_with_malformed_body_is_invalid() {
    let app = test_app();

    let request = Request::builder()
        .method("POST")
        .uri(format!("{BASE}/profile/user-transaction-history"))
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = send(&app.router, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errorCode"], 1002);
}

#[tokio::test]
async fn test_duplicate_create_reports_not_found_code() {
    let app = test_app();
    let uri = format!("{BASE}/profile/user-transaction-history");
    let mut body = record_body("P1", "ORD-1", "EARN");
    body["transactionID"] = json!("T1");

    let (status, _) = send(&app.router, json_request("POST", &uri, body.clone())).await;
    assert_eq!(status, StatusCode::OK);

    body["referenceCode"] = json!("ORD-2");
    let (status, response) = send(&app.router, json_request("POST", &uri, body)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(response["errorCode"], 1001);
    assert!(!response["description"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn test_update_overwrites_latest_record() {
    let app = test_app();
    let uri = format!("{BASE}/profile/user-transaction-history");

    send(&app.router, json_request("POST", &uri, record_body("P1", "ORD-1", "EARN"))).await;

    let mut update = record_body("P1", "ORD-1", "EARN");
    update["status"] = json!("REVERSED");
    let (status, body) = send(&app.router, json_request("PUT", &uri, update)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "REVERSED");

    let stored = app.document.snapshot().await;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].status, "REVERSED");
}

#[tokio::test]
async fn test_update_failure_is_swallowed() {
    let app = test_app();

    let (status, body) = send(
        &app.router,
        json_request(
            "PUT",
            &format!("{BASE}/profile/user-transaction-history"),
            record_body("NOBODY", "ORD-1", "EARN"),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["errorCode"], 1);
    assert_eq!(body["data"]["profileID"], "NOBODY");
    assert!(app.document.snapshot().await.is_empty());
}

#[tokio::test]
async fn test_update_requires_profile_id() {
    let app = test_app();

    let (status, body) = send(
        &app.router,
        json_request(
            "PUT",
            &format!("{BASE}/profile/user-transaction-history"),
            record_body("", "ORD-1", "EARN"),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errorCode"], 1002);
}

#[tokio::test]
async fn test_delete_removes_profile_records() {
    let app = test_app();
    let uri = format!("{BASE}/profile/user-transaction-history");

    send(&app.router, json_request("POST", &uri, record_body("P1", "ORD-1", "EARN"))).await;
    send(&app.router, json_request("POST", &uri, record_body("P2", "ORD-2", "EARN"))).await;

    let request = Request::builder()
        .method("DELETE")
        .uri(format!("{uri}?profileID=P1"))
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app.router, request).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"].is_null());

    let remaining = app.document.snapshot().await;
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].profile_id, "P2");

    // 没有记录可删时同样返回成功
    let request = Request::builder()
        .method("DELETE")
        .uri(format!("{uri}?profileID=P1"))
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app.router, request).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_relational_endpoints_use_their_own_store() {
    let app = test_app();
    let uri = format!("{BASE}/profile/user-transaction-history-postgresql");

    let (status, _) = send(&app.router, json_request("POST", &uri, record_body("P1", "ORD-1", "EARN"))).await;
    assert_eq!(status, StatusCode::OK);

    assert_eq!(app.relational.snapshot().await.len(), 1);
    assert!(app.document.snapshot().await.is_empty());

    let (status, body) = send(&app.router, get(&format!("{uri}?profileID=P1"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["paging"]["total"], 1);

    let (_, body) = send(
        &app.router,
        get(&format!("{BASE}/profile/user-transaction-history?profileID=P1")),
    )
    .await;
    assert_eq!(body["paging"]["total"], 0);
}

#[tokio::test]
async fn test_point_transaction_is_forwarded() {
    let app = test_app();

    let request = Request::builder()
        .method("POST")
        .uri(format!("{BASE}/point/create-point-transaction"))
        .header("content-type", "application/json")
        .header("X-Client-Region", "VN")
        .body(Body::from(
            json!({
                "orderNumber": "ignored",
                "amount": 12.5,
                "currency": "VND",
                "vgaUserId": "U1",
                "sourceType": "ORDER"
            })
            .to_string(),
        ))
        .unwrap();
    let (status, body) = send(&app.router, request).await;

    assert_eq!(status, StatusCode::OK);
    let order_number = body["data"]["orderNumber"].as_str().unwrap().to_string();
    assert_ne!(order_number, "ignored");

    let sent = app.receiver.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "VN");
    assert_eq!(sent[0].1.source_type, "ORDER");

    let point: Value = serde_json::from_str(&sent[0].1.value).unwrap();
    assert_eq!(point["orderNumber"], order_number.as_str());
    assert_eq!(point["region"], "VN");
}

#[tokio::test]
async fn test_point_transaction_requires_region() {
    let app = test_app();

    let (status, body) = send(
        &app.router,
        json_request(
            "POST",
            &format!("{BASE}/point/create-point-transaction"),
            json!({"amount": 1, "currency": "VND", "vgaUserId": "U1"}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errorCode"], 1002);
    assert!(app.receiver.sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_point_transaction_failure_maps_to_system() {
    let app = test_app_with(StubReceiver {
        fail: true,
        ..Default::default()
    });

    let request = Request::builder()
        .method("POST")
        .uri(format!("{BASE}/point/create-point-transaction"))
        .header("content-type", "application/json")
        .header("X-Client-Region", "VN")
        .body(Body::from(json!({"amount": 1}).to_string()))
        .unwrap();
    let (status, body) = send(&app.router, request).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["errorCode"], 1000);
    assert_eq!(body["description"], "error create order point");
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = test_app();

    let (status, body) = send(&app.router, get(&format!("{BASE}/health"))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "ok");
}
