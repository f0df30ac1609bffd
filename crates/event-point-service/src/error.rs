//! 事件消费服务专用错误类型

use ledger_shared::error::LedgerError;
use transaction_history::ServiceError;

/// 事件处理错误
#[derive(Debug, thiserror::Error)]
pub enum EventError {
    /// 账本服务返回的业务错误
    #[error(transparent)]
    Service(#[from] ServiceError),

    /// 透传共享库错误（Kafka 订阅等）
    #[error(transparent)]
    Shared(#[from] LedgerError),
}

impl From<EventError> for LedgerError {
    fn from(err: EventError) -> Self {
        match err {
            EventError::Shared(e) => e,
            EventError::Service(e) => LedgerError::Internal(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_event_is_not_swallowed() {
        let err: LedgerError =
            EventError::from(ServiceError::data_invalid("profile id is required")).into();
        assert!(matches!(err, LedgerError::Internal(msg) if msg.contains("profile id is required")));
    }

    #[test]
    fn test_shared_error_passes_through() {
        let err: LedgerError = EventError::from(LedgerError::Kafka("broker down".to_string())).into();
        assert!(matches!(err, LedgerError::Kafka(msg) if msg == "broker down"));
    }

    #[test]
    fn test_into_ledger_error() {
        let err: LedgerError = EventError::from(ServiceError::system("boom")).into();
        assert!(matches!(err, LedgerError::Internal(msg) if msg == "System error: boom"));
    }
}
