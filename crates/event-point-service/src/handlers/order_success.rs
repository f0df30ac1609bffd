//! 订单成功事件处理器（`rewards.point`）

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use ledger_shared::kafka::ConsumerMessage;
use transaction_history::events::{CallbackMessage, OrderEventData};

use super::{LedgerEvents, MessageHandler, process, skip_undecodable};
use crate::error::EventError;

const EVENT: &str = "order_success";

pub struct OrderSuccessHandler<S: ?Sized> {
    ledger: Arc<S>,
}

impl<S: ?Sized> OrderSuccessHandler<S> {
    pub fn new(ledger: Arc<S>) -> Self {
        Self { ledger }
    }
}

#[async_trait]
impl<S: LedgerEvents + ?Sized> MessageHandler for OrderSuccessHandler<S> {
    fn event_name(&self) -> &'static str {
        EVENT
    }

    async fn handle(&self, msg: &ConsumerMessage) -> Result<(), EventError> {
        let start = Instant::now();

        let envelope: CallbackMessage<OrderEventData> = match msg.deserialize_payload() {
            Ok(envelope) => envelope,
            Err(e) => {
                skip_undecodable(EVENT, msg, &e, start);
                return Ok(());
            }
        };

        let event = envelope.data.into_event();
        process(EVENT, msg, start, self.ledger.order_success(&event)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::MockLedgerEvents;
    use crate::handlers::test_support::message;
    use rust_decimal_macros::dec;
    use transaction_history::ServiceError;

    const PAYLOAD: &str = r#"{
        "eventType": "ORDER_SUCCESS",
        "data": {
            "orderNumber": "ORD-1",
            "createTime": 1700000000000,
            "profileID": "P1",
            "amount": 9.99,
            "currency": "USD",
            "source": "APP",
            "sourceType": "ORDER",
            "rawData": "{\"paymentTransID\":\"PAY1\"}",
            "status": "SUCCESS"
        }
    }"#;

    #[tokio::test]
    async fn test_maps_envelope_to_event() {
        let mut ledger = MockLedgerEvents::new();
        ledger
            .expect_order_success()
            .withf(|e| {
                e.profile_id == "P1"
                    && e.reference_code == "ORD-1"
                    && e.total_amount == dec!(9.99)
                    && e.payment_transaction_id == "PAY1"
                    && e.source_time.is_some()
            })
            .times(1)
            .returning(|_| Ok(()));

        let handler = OrderSuccessHandler::new(Arc::new(ledger));
        let result = handler.handle(&message("rewards.point", PAYLOAD)).await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_undecodable_message_is_skipped() {
        let mut ledger = MockLedgerEvents::new();
        ledger.expect_order_success().never();

        let handler = OrderSuccessHandler::new(Arc::new(ledger));
        let result = handler.handle(&message("rewards.point", "not json")).await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_service_error_is_propagated() {
        let mut ledger = MockLedgerEvents::new();
        ledger
            .expect_order_success()
            .returning(|_| Err(ServiceError::system("MongoDB 错误: timeout")));

        let handler = OrderSuccessHandler::new(Arc::new(ledger));
        let result = handler.handle(&message("rewards.point", PAYLOAD)).await;

        assert!(matches!(result, Err(EventError::Service(e)) if e.description.contains("timeout")));
    }
}
