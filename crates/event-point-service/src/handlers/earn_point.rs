//! 积分发放完成事件处理器（`core.transaction.point.success`）

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use ledger_shared::kafka::ConsumerMessage;
use transaction_history::events::{CallbackMessage, EarnPointCompleteEvent, EarnPointOrderEvent};

use super::{LedgerEvents, MessageHandler, process, skip_undecodable};
use crate::error::EventError;

const EVENT: &str = "earn_point";

pub struct EarnPointHandler<S: ?Sized> {
    ledger: Arc<S>,
}

impl<S: ?Sized> EarnPointHandler<S> {
    pub fn new(ledger: Arc<S>) -> Self {
        Self { ledger }
    }
}

#[async_trait]
impl<S: LedgerEvents + ?Sized> MessageHandler for EarnPointHandler<S> {
    fn event_name(&self) -> &'static str {
        EVENT
    }

    async fn handle(&self, msg: &ConsumerMessage) -> Result<(), EventError> {
        let start = Instant::now();

        let envelope: CallbackMessage<EarnPointOrderEvent> = match msg.deserialize_payload() {
            Ok(envelope) => envelope,
            Err(e) => {
                skip_undecodable(EVENT, msg, &e, start);
                return Ok(());
            }
        };

        let event = EarnPointCompleteEvent::from(envelope.data);
        process(EVENT, msg, start, self.ledger.earn_point_complete(&event)).await
    }
}
