// ============================================================================
// FX Reconcile Library
// Optimistic per-key exchange rate reconciliation with derived order pricing
// ============================================================================

//! # FX Reconcile
//!
//! Optimistic reconciliation of user-edited exchange rates against an
//! asynchronous validator, feeding a dynamic set of orders priced in a base
//! currency.
//!
//! ## Features
//!
//! - **Optimistic edits**: a typed rate shows immediately as `Dirty`
//! - **Debounced validation**: one gateway call per 500 ms quiet period
//! - **Single flight per currency**: a newer edit cancels the pending cycle
//! - **Rollback**: refused candidates restore the last accepted rate
//! - **Incremental totals**: accepted rates reprice only subscribed orders
//! - **Event sourcing** for audit trail via the `EventHandler` seam
//!
//! ## Example
//!
//! ```rust
//! use fx_reconcile::prelude::*;
//! use rust_decimal::Decimal;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let engine = ReconciliationEngine::new(
//!     EngineConfig::demo(),
//!     Arc::new(BoundsGateway::new(Decimal::new(1, 2), Decimal::new(10, 0))),
//!     Arc::new(NoOpEventHandler),
//! )
//! .unwrap();
//!
//! // Typed value shows up at once, orders keep the accepted rate
//! engine.edit_rate("usd", Decimal::new(80, 2)).unwrap();
//! assert_eq!(engine.rate_state("usd").unwrap().phase, RatePhase::Dirty);
//!
//! // After the debounce and a successful validation the total follows
//! tokio::time::sleep(Duration::from_millis(600)).await;
//! assert_eq!(engine.accepted_rate("usd").unwrap(), Decimal::new(80, 2));
//! println!("Total: {}", engine.total());
//! # }
//! ```

pub mod domain;
pub mod engine;
pub mod errors;
pub mod interfaces;
pub mod numeric;

#[cfg(feature = "logging")]
pub mod logging;

// Re-exports for convenience
pub mod prelude {
    pub use crate::domain::{
        AcceptedValue, CurrencyCode, CurrencyRateState, EngineConfig, Order, OrderId,
        OrderTemplate, RatePhase,
    };
    pub use crate::engine::{
        create_from_config, AcceptedValueLedger, DynamicKeyedAggregator, EngineBuilder,
        RateBinding, ReconciliationEngine,
    };
    pub use crate::errors::{EngineError, EngineResult};
    pub use crate::interfaces::{
        AcceptAllGateway, BoundsGateway, DelayedGateway, EngineEvent, EventHandler,
        GatewayError, LoggingEventHandler, NoOpEventHandler, RecordingEventHandler,
        ValidationGateway, Verdict,
    };
}
