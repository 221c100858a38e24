// ============================================================================
// Engine Module
// Contains the reconciliation state machines and derived aggregation
// ============================================================================

mod aggregator;
mod ledger;
mod reconciler;
mod reconciliation_engine;
mod registry;

pub mod factory;

pub use aggregator::DynamicKeyedAggregator;
pub use factory::{create_from_config, EngineBuilder};
pub use ledger::{AcceptedRateListener, AcceptedValueLedger};
pub use reconciler::RateReconciler;
pub use reconciliation_engine::ReconciliationEngine;
pub use registry::{KeyRegistry, RateBinding};
