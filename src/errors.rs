// ============================================================================
// Engine Errors
// Caller contract violations reported by the reconciliation engine
// ============================================================================

use crate::domain::{CurrencyCode, OrderId};
use crate::numeric::AmountError;
use thiserror::Error;

/// Errors returned to callers of the engine.
///
/// Validation rejections, stale gateway responses and edit races are not
/// errors: they resolve to state transitions and never surface here.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("unknown currency {0}")]
    UnknownCurrency(CurrencyCode),

    #[error("unknown order {0}")]
    UnknownOrder(OrderId),

    #[error("invalid {field}: {source}")]
    InvalidAmount {
        field: &'static str,
        #[source]
        source: AmountError,
    },

    /// The order set already holds `MAX_ORDERS` orders
    #[error("order set is full ({limit} orders)")]
    TooManyOrders { limit: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("engine must be built inside a tokio runtime")]
    NoRuntime,
}

/// Result type alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
