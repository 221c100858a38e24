// ============================================================================
// Reconciliation Engine
// Facade wiring reconcilers, the accepted value ledger and order aggregation
// ============================================================================

use crate::domain::{AcceptedValue, CurrencyCode, CurrencyRateState, EngineConfig, Order, OrderId};
use crate::engine::aggregator::DynamicKeyedAggregator;
use crate::engine::ledger::{AcceptedRateListener, AcceptedValueLedger};
use crate::engine::reconciler::ReconcilerContext;
use crate::engine::registry::{KeyRegistry, RateBinding};
use crate::errors::{EngineError, EngineResult};
use crate::interfaces::{EventHandler, ValidationGateway};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tokio::runtime::Handle;
use tokio::sync::watch;

/// Optimistic exchange rate reconciliation with derived order pricing.
///
/// Must be created inside a tokio runtime; debounce timers and validation
/// calls are spawned on that runtime.
///
/// The engine holds one binding per configured currency, so every currency
/// stays editable whether or not an order uses it.
pub struct ReconciliationEngine {
    config: EngineConfig,
    ledger: Arc<AcceptedValueLedger>,
    registry: Arc<KeyRegistry>,
    aggregator: Arc<DynamicKeyedAggregator>,
    rate_bindings: HashMap<CurrencyCode, RateBinding>,
}

impl ReconciliationEngine {
    /// Create an engine from a validated configuration
    pub fn new(
        config: EngineConfig,
        gateway: Arc<dyn ValidationGateway>,
        event_handler: Arc<dyn EventHandler>,
    ) -> EngineResult<Self> {
        config.validate().map_err(EngineError::InvalidConfig)?;
        let runtime = Handle::try_current().map_err(|_| EngineError::NoRuntime)?;

        let ledger = Arc::new(AcceptedValueLedger::new(
            config
                .currencies
                .iter()
                .map(|c| (c.code.clone(), c.rate.normalize())),
        ));
        let registry = Arc::new(KeyRegistry::new(ReconcilerContext {
            debounce: config.debounce(),
            gateway,
            ledger: Arc::clone(&ledger),
            event_handler: Arc::clone(&event_handler),
            runtime,
        }));
        let aggregator = Arc::new(DynamicKeyedAggregator::new(
            Arc::clone(&ledger),
            Arc::clone(&registry),
            event_handler,
            config.default_order.clone(),
        ));
        let rate_bindings = ledger
            .keys()
            .iter()
            .map(|key| registry.bind(key.as_str()).map(|binding| (key.clone(), binding)))
            .collect::<EngineResult<HashMap<_, _>>>()?;
        let listener: Weak<dyn AcceptedRateListener> = Arc::downgrade(&aggregator) as _;
        ledger.register(listener);

        for seed in &config.orders {
            aggregator.seed(seed)?;
        }

        tracing::info!(
            base = %config.base_currency,
            currencies = config.currencies.len(),
            orders = config.orders.len(),
            debounce_ms = config.debounce_ms,
            "reconciliation engine started"
        );

        Ok(Self {
            config,
            ledger,
            registry,
            aggregator,
            rate_bindings,
        })
    }

    // ========================================================================
    // Currencies
    // ========================================================================

    /// Configured currencies in display order
    pub fn currencies(&self) -> &[CurrencyCode] {
        self.ledger.keys()
    }

    pub fn base_currency(&self) -> &CurrencyCode {
        &self.config.base_currency
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Take a reference on a currency (e.g. for a rendered rate input).
    /// The key's reconciler lives while any binding exists.
    pub fn bind_rate(&self, key: &str) -> EngineResult<RateBinding> {
        self.registry.bind(key)
    }

    /// Submit a raw edit to a currency's reconciler
    pub fn edit_rate(&self, key: &str, value: Decimal) -> EngineResult<()> {
        self.rate_binding(key)?.edit(value)
    }

    /// Current `(value, phase)` of a currency
    pub fn rate_state(&self, key: &str) -> EngineResult<CurrencyRateState> {
        Ok(self.rate_binding(key)?.state())
    }

    /// Watch the `(value, phase)` of a currency
    pub fn subscribe_rate(&self, key: &str) -> EngineResult<watch::Receiver<CurrencyRateState>> {
        Ok(self.rate_binding(key)?.subscribe())
    }

    pub fn accepted_rate(&self, key: &str) -> EngineResult<Decimal> {
        self.ledger.current(key)
    }

    /// All accepted rates in display order
    pub fn accepted_rates(&self) -> Vec<AcceptedValue> {
        self.ledger.snapshot()
    }

    pub fn subscribe_accepted(&self, key: &str) -> EngineResult<watch::Receiver<Decimal>> {
        self.ledger.subscribe(key)
    }

    /// Currencies that currently have a live reconciler
    pub fn live_currencies(&self) -> Vec<CurrencyCode> {
        self.registry.live_keys()
    }

    // ========================================================================
    // Orders
    // ========================================================================

    /// Append an order built from the configured template
    pub fn add_order(&self) -> EngineResult<OrderId> {
        self.aggregator.add_order()
    }

    pub fn add_order_with(
        &self,
        title: impl Into<String>,
        price: Decimal,
        currency: &str,
    ) -> EngineResult<OrderId> {
        self.aggregator.add_order_with(title, price, currency)
    }

    pub fn edit_price(&self, order_id: &str, price: Decimal) -> EngineResult<()> {
        self.aggregator.edit_price(order_id, price)
    }

    pub fn select_currency(&self, order_id: &str, currency: &str) -> EngineResult<()> {
        self.aggregator.select_currency(order_id, currency)
    }

    pub fn order(&self, order_id: &str) -> EngineResult<Order> {
        self.aggregator.order(order_id)
    }

    pub fn orders(&self) -> Vec<Order> {
        self.aggregator.orders()
    }

    pub fn order_ids(&self) -> Vec<OrderId> {
        self.aggregator.order_ids()
    }

    /// Sum of all base currency prices, maintained incrementally
    pub fn total(&self) -> Decimal {
        self.aggregator.total()
    }

    pub fn subscribe_total(&self) -> watch::Receiver<Decimal> {
        self.aggregator.subscribe_total()
    }

    /// Total recomputed from scratch; equal to `total()` at all times
    pub fn rescan_total(&self) -> Decimal {
        self.aggregator.rescan_total()
    }

    // ========================================================================
    // Private methods
    // ========================================================================

    fn rate_binding(&self, key: &str) -> EngineResult<&RateBinding> {
        self.rate_bindings
            .get(key)
            .ok_or_else(|| EngineError::UnknownCurrency(CurrencyCode::new(key)))
    }
}
