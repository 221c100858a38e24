// ============================================================================
// Engine Factory
// Creates reconciliation engines with proper configuration
// ============================================================================

use crate::domain::config::EngineConfig;
use crate::engine::ReconciliationEngine;
use crate::errors::EngineResult;
use crate::interfaces::{EventHandler, ValidationGateway};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Factory Functions
// ============================================================================

/// Creates a reconciliation engine from configuration
///
/// # Arguments
/// * `config` - Currencies, seed orders and debounce period
/// * `gateway` - Asynchronous validator for candidate rates
/// * `event_handler` - Event handler for rate and order events
///
/// # Example
/// ```
/// use fx_reconcile::prelude::*;
/// use fx_reconcile::engine::factory::create_from_config;
/// use std::sync::Arc;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let engine = create_from_config(
///     EngineConfig::demo(),
///     Arc::new(BoundsGateway::positive()),
///     Arc::new(NoOpEventHandler),
/// )
/// .unwrap();
/// assert_eq!(engine.order_ids().len(), 4);
/// # }
/// ```
pub fn create_from_config(
    config: EngineConfig,
    gateway: Arc<dyn ValidationGateway>,
    event_handler: Arc<dyn EventHandler>,
) -> EngineResult<ReconciliationEngine> {
    ReconciliationEngine::new(config, gateway, event_handler)
}

// ============================================================================
// Builder Pattern for Advanced Configuration
// ============================================================================

/// Builder for creating reconciliation engines with fluent API
///
/// # Example
/// ```
/// use fx_reconcile::prelude::*;
/// use fx_reconcile::engine::factory::EngineBuilder;
/// use rust_decimal::Decimal;
/// use std::sync::Arc;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let engine = EngineBuilder::new("gbp")
///     .currency("eur", Decimal::new(86, 2))
///     .order("1", "Monitor", Decimal::new(320, 0), "eur")
///     .build(Arc::new(AcceptAllGateway), Arc::new(NoOpEventHandler))
///     .unwrap();
///
/// assert_eq!(engine.total(), Decimal::new(2752, 1));
/// # }
/// ```
pub struct EngineBuilder {
    config: EngineConfig,
}

impl EngineBuilder {
    /// Create a new builder around the base currency
    pub fn new(base_currency: &str) -> Self {
        Self {
            config: EngineConfig::new(base_currency),
        }
    }

    /// Start from the demo preset
    pub fn demo() -> Self {
        Self {
            config: EngineConfig::demo(),
        }
    }

    // ========================================================================
    // Currencies and Orders
    // ========================================================================

    /// Add a currency with its seed rate
    pub fn currency(mut self, code: &str, rate: Decimal) -> Self {
        self.config = self.config.with_currency(code, rate);
        self
    }

    /// Add a seed order
    pub fn order(mut self, id: &str, title: &str, price: Decimal, currency: &str) -> Self {
        self.config = self.config.with_order(id, title, price, currency);
        self
    }

    /// Set the template used by `add_order`
    pub fn default_order(mut self, title: &str, price: Decimal, currency: &str) -> Self {
        self.config = self.config.with_default_order(title, price, currency);
        self
    }

    // ========================================================================
    // Timing
    // ========================================================================

    pub fn debounce(mut self, debounce: Duration) -> Self {
        self.config = self.config.with_debounce(debounce);
        self
    }

    // ========================================================================
    // Build
    // ========================================================================

    /// Build the reconciliation engine
    pub fn build(
        self,
        gateway: Arc<dyn ValidationGateway>,
        event_handler: Arc<dyn EventHandler>,
    ) -> EngineResult<ReconciliationEngine> {
        create_from_config(self.config, gateway, event_handler)
    }

    /// Get the configuration without building (for inspection)
    pub fn get_config(&self) -> &EngineConfig {
        &self.config
    }
}
