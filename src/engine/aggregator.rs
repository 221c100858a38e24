// ============================================================================
// Dynamic Keyed Aggregator
// Growing order set, per-order base currency derivation and running total
// ============================================================================

use crate::domain::{CurrencyCode, Order, OrderId, OrderSeed, OrderTemplate};
use crate::engine::ledger::{AcceptedRateListener, AcceptedValueLedger};
use crate::engine::registry::{KeyRegistry, RateBinding};
use crate::errors::{EngineError, EngineResult};
use crate::interfaces::{EngineEvent, EventHandler};
use crate::numeric::{base_currency_price, check_amount, sum_base_prices, MAX_ORDERS};
use chrono::Utc;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::watch;

/// Per-order derivation. Holds a binding on its selected currency so the
/// reconciler of that key stays alive while the order uses it.
struct Derivation {
    title: String,
    price: Decimal,
    currency: CurrencyCode,
    /// Accepted rate of `currency` as of the last recomputation
    rate: Decimal,
    base_currency_price: Decimal,
    binding: RateBinding,
}

impl Derivation {
    /// Recompute the derived price, returning the delta to apply to the total
    fn rederive(&mut self) -> Decimal {
        let next = base_currency_price(self.price, self.rate);
        let delta = next - self.base_currency_price;
        self.base_currency_price = next;
        delta
    }

    fn snapshot(&self, id: &OrderId) -> Order {
        Order {
            id: id.clone(),
            title: self.title.clone(),
            price: self.price,
            currency: self.currency.clone(),
            base_currency_price: self.base_currency_price,
        }
    }
}

#[derive(Default)]
struct AggregateState {
    /// Append-only, insertion order
    order_ids: Vec<OrderId>,
    derivations: HashMap<OrderId, Derivation>,
    /// Subscriptions: which orders currently price off which currency
    by_currency: HashMap<CurrencyCode, HashSet<OrderId>>,
    total: Decimal,
}

impl AggregateState {
    fn apply_delta(&mut self, delta: Decimal) {
        self.total += delta;
    }

    fn subscribe(&mut self, currency: &CurrencyCode, id: &OrderId) {
        self.by_currency
            .entry(currency.clone())
            .or_default()
            .insert(id.clone());
    }

    fn unsubscribe(&mut self, currency: &CurrencyCode, id: &OrderId) {
        if let Some(ids) = self.by_currency.get_mut(currency) {
            ids.remove(id);
            if ids.is_empty() {
                self.by_currency.remove(currency);
            }
        }
    }
}

/// Maintains the order set, each order's base currency price, and the total.
///
/// The total is only ever adjusted by deltas. Amounts and the order count
/// are bounded (see `numeric`), so every delta is exact and the running total
/// equals a full rescan at every observation point.
pub struct DynamicKeyedAggregator {
    ledger: Arc<AcceptedValueLedger>,
    registry: Arc<KeyRegistry>,
    event_handler: Arc<dyn EventHandler>,
    template: OrderTemplate,
    state: Mutex<AggregateState>,
    total_tx: watch::Sender<Decimal>,
}

impl DynamicKeyedAggregator {
    pub(crate) fn new(
        ledger: Arc<AcceptedValueLedger>,
        registry: Arc<KeyRegistry>,
        event_handler: Arc<dyn EventHandler>,
        template: OrderTemplate,
    ) -> Self {
        let (total_tx, _) = watch::channel(Decimal::ZERO);
        Self {
            ledger,
            registry,
            event_handler,
            template,
            state: Mutex::new(AggregateState::default()),
            total_tx,
        }
    }

    /// Append an order built from the default template
    pub fn add_order(&self) -> EngineResult<OrderId> {
        let template = self.template.clone();
        self.insert(
            OrderId::new(),
            template.title,
            template.price,
            template.currency.as_str(),
        )
    }

    /// Append an order with explicit fields
    pub fn add_order_with(
        &self,
        title: impl Into<String>,
        price: Decimal,
        currency: &str,
    ) -> EngineResult<OrderId> {
        self.insert(OrderId::new(), title.into(), price, currency)
    }

    /// Install a seed order under its configured id
    pub(crate) fn seed(&self, seed: &OrderSeed) -> EngineResult<OrderId> {
        self.insert(
            seed.id.clone(),
            seed.title.clone(),
            seed.price,
            seed.currency.as_str(),
        )
    }

    /// Replace the price of an order
    pub fn edit_price(&self, id: &str, price: Decimal) -> EngineResult<()> {
        let price = check_amount(price).map_err(|source| EngineError::InvalidAmount {
            field: "price",
            source,
        })?;

        let order_id = OrderId::from(id);
        let mut state = self.state.lock();
        let delta = {
            let derivation = state
                .derivations
                .get_mut(&order_id)
                .ok_or_else(|| EngineError::UnknownOrder(order_id.clone()))?;
            derivation.price = price;
            derivation.rederive()
        };
        state.apply_delta(delta);
        self.after_change(&state, &[order_id]);
        Ok(())
    }

    /// Switch an order to another currency and re-base it on that
    /// currency's current accepted rate at once.
    pub fn select_currency(&self, id: &str, currency: &str) -> EngineResult<()> {
        // Bind before locking: binding may create a reconciler
        let binding = self.registry.bind(currency)?;

        let order_id = OrderId::from(id);
        let key = binding.key().clone();

        let previous = {
            let mut state = self.state.lock();
            let rate = self.ledger.current(key.as_str())?;

            let (old_currency, previous, delta) = {
                let derivation = state
                    .derivations
                    .get_mut(&order_id)
                    .ok_or_else(|| EngineError::UnknownOrder(order_id.clone()))?;
                let old_currency = std::mem::replace(&mut derivation.currency, key.clone());
                let previous = std::mem::replace(&mut derivation.binding, binding);
                derivation.rate = rate;
                (old_currency, previous, derivation.rederive())
            };

            state.unsubscribe(&old_currency, &order_id);
            state.subscribe(&key, &order_id);
            state.apply_delta(delta);
            tracing::debug!(
                order_id = %order_id,
                from = %old_currency,
                to = %key,
                %rate,
                "order currency switched"
            );
            self.after_change(&state, &[order_id]);
            previous
        };

        // Outside the aggregate lock: may release the old reconciler
        drop(previous);
        Ok(())
    }

    pub fn order(&self, id: &str) -> EngineResult<Order> {
        let state = self.state.lock();
        state
            .derivations
            .get_key_value(id)
            .map(|(id, d)| d.snapshot(id))
            .ok_or_else(|| EngineError::UnknownOrder(OrderId::from(id)))
    }

    /// All orders in insertion order
    pub fn orders(&self) -> Vec<Order> {
        let state = self.state.lock();
        state
            .order_ids
            .iter()
            .filter_map(|id| state.derivations.get(id).map(|d| d.snapshot(id)))
            .collect()
    }

    pub fn order_ids(&self) -> Vec<OrderId> {
        self.state.lock().order_ids.clone()
    }

    pub fn len(&self) -> usize {
        self.state.lock().order_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Incrementally maintained total
    pub fn total(&self) -> Decimal {
        self.state.lock().total
    }

    pub fn subscribe_total(&self) -> watch::Receiver<Decimal> {
        self.total_tx.subscribe()
    }

    /// Total recomputed from scratch against the ledger, for verification
    pub fn rescan_total(&self) -> Decimal {
        let state = self.state.lock();
        sum_base_prices(state.derivations.values().map(|d| {
            let rate = self.ledger.current(d.currency.as_str()).unwrap_or(d.rate);
            base_currency_price(d.price, rate)
        }))
    }

    // ========================================================================
    // Private methods
    // ========================================================================

    fn insert(
        &self,
        id: OrderId,
        title: String,
        price: Decimal,
        currency: &str,
    ) -> EngineResult<OrderId> {
        let price = check_amount(price).map_err(|source| EngineError::InvalidAmount {
            field: "price",
            source,
        })?;
        let binding = self.registry.bind(currency)?;

        let mut state = self.state.lock();
        if state.order_ids.len() >= MAX_ORDERS {
            return Err(EngineError::TooManyOrders { limit: MAX_ORDERS });
        }
        if state.derivations.contains_key(&id) {
            return Err(EngineError::InvalidConfig(format!(
                "duplicate order id {}",
                id
            )));
        }
        let rate = self.ledger.current(currency)?;

        let mut derivation = Derivation {
            title,
            price,
            currency: binding.key().clone(),
            rate,
            base_currency_price: Decimal::ZERO,
            binding,
        };
        let delta = derivation.rederive();

        state.subscribe(&derivation.currency, &id);
        state.order_ids.push(id.clone());
        state.derivations.insert(id.clone(), derivation);
        state.apply_delta(delta);

        tracing::info!(order_id = %id, total = %state.total, "order added");
        self.event_handler.on_event(EngineEvent::OrderAdded {
            order_id: id.clone(),
            timestamp: Utc::now(),
        });
        self.after_change(&state, &[id.clone()]);
        Ok(id)
    }

    /// Publish the total and one repricing event per touched order
    fn after_change(&self, state: &AggregateState, touched: &[OrderId]) {
        self.total_tx.send_replace(state.total);
        for id in touched {
            if let Some(derivation) = state.derivations.get(id) {
                self.event_handler.on_event(EngineEvent::OrderRepriced {
                    order_id: id.clone(),
                    base_currency_price: derivation.base_currency_price,
                    total: state.total,
                    timestamp: Utc::now(),
                });
            }
        }
    }
}

impl AcceptedRateListener for DynamicKeyedAggregator {
    fn on_accepted(&self, key: &CurrencyCode, value: Decimal) {
        let mut state = self.state.lock();
        let Some(ids) = state.by_currency.get(key) else {
            return;
        };
        let ids: Vec<OrderId> = ids.iter().cloned().collect();

        let mut delta = Decimal::ZERO;
        for id in &ids {
            if let Some(derivation) = state.derivations.get_mut(id) {
                derivation.rate = value;
                delta += derivation.rederive();
            }
        }
        state.apply_delta(delta);

        tracing::debug!(
            key = %key,
            rate = %value,
            orders = ids.len(),
            total = %state.total,
            "orders re-based on accepted rate"
        );
        self.after_change(&state, &ids);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::CurrencyRateState;
    use crate::engine::reconciler::ReconcilerContext;
    use crate::interfaces::{AcceptAllGateway, NoOpEventHandler, RecordingEventHandler};
    use proptest::prelude::*;
    use std::sync::Weak;
    use std::time::Duration;
    use tokio::runtime::Handle;

    struct Fixture {
        ledger: Arc<AcceptedValueLedger>,
        registry: Arc<KeyRegistry>,
        aggregator: Arc<DynamicKeyedAggregator>,
    }

    fn fixture_with(handler: Arc<dyn EventHandler>) -> Fixture {
        let ledger = Arc::new(AcceptedValueLedger::new(vec![
            (CurrencyCode::new("gbp"), Decimal::ONE),
            (CurrencyCode::new("eur"), Decimal::new(86, 2)),
            (CurrencyCode::new("usd"), Decimal::new(79, 2)),
        ]));
        let registry = Arc::new(KeyRegistry::new(ReconcilerContext {
            debounce: Duration::from_millis(500),
            gateway: Arc::new(AcceptAllGateway),
            ledger: Arc::clone(&ledger),
            event_handler: Arc::clone(&handler),
            runtime: Handle::current(),
        }));
        let aggregator = Arc::new(DynamicKeyedAggregator::new(
            Arc::clone(&ledger),
            Arc::clone(&registry),
            handler,
            OrderTemplate {
                title: "New article".to_string(),
                price: Decimal::new(100, 0),
                currency: CurrencyCode::new("gbp"),
            },
        ));
        ledger.register(Arc::downgrade(&aggregator) as Weak<dyn AcceptedRateListener>);
        Fixture {
            ledger,
            registry,
            aggregator,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(Arc::new(NoOpEventHandler))
    }

    fn accept(ledger: &AcceptedValueLedger, key: &str, value: Decimal) {
        ledger.observe(
            &CurrencyCode::new(key),
            &CurrencyRateState::accepted(value),
        );
    }

    #[tokio::test]
    async fn test_add_order_uses_template() {
        let f = fixture();

        let id = f.aggregator.add_order().unwrap();
        let order = f.aggregator.order(id.as_str()).unwrap();

        assert_eq!(order.title, "New article");
        assert_eq!(order.currency, CurrencyCode::new("gbp"));
        assert_eq!(order.base_currency_price, Decimal::new(100, 0));
        assert_eq!(f.aggregator.total(), Decimal::new(100, 0));
        assert_eq!(f.aggregator.order_ids(), vec![id]);
    }

    #[tokio::test]
    async fn test_order_set_grows_in_insertion_order() {
        let f = fixture();

        let a = f.aggregator.add_order().unwrap();
        let b = f
            .aggregator
            .add_order_with("Monitor", Decimal::new(320, 0), "eur")
            .unwrap();
        let c = f.aggregator.add_order().unwrap();

        assert_eq!(f.aggregator.order_ids(), vec![a, b.clone(), c]);
        assert_eq!(f.aggregator.len(), 3);
        // 100 + 320 * 0.86 + 100
        assert_eq!(f.aggregator.total(), Decimal::new(4752, 1));
        assert_eq!(f.aggregator.orders()[1].id, b);
    }

    #[tokio::test]
    async fn test_edit_price_applies_delta() {
        let f = fixture();
        let id = f
            .aggregator
            .add_order_with("Keyboard", Decimal::new(80, 0), "usd")
            .unwrap();
        let mut total_rx = f.aggregator.subscribe_total();

        f.aggregator.edit_price(id.as_str(), Decimal::new(100, 0)).unwrap();

        assert_eq!(
            f.aggregator.order(id.as_str()).unwrap().base_currency_price,
            Decimal::new(79, 0)
        );
        assert!(total_rx.has_changed().unwrap());
        assert_eq!(*total_rx.borrow_and_update(), Decimal::new(79, 0));
        assert_eq!(f.aggregator.total(), f.aggregator.rescan_total());
    }

    #[tokio::test]
    async fn test_accepted_rate_rebases_only_subscribed_orders() {
        let handler = Arc::new(RecordingEventHandler::new());
        let f = fixture_with(handler.clone());
        let eur = f
            .aggregator
            .add_order_with("Monitor", Decimal::new(320, 0), "eur")
            .unwrap();
        let usd = f
            .aggregator
            .add_order_with("Keyboard", Decimal::new(80, 0), "usd")
            .unwrap();
        handler.clear();

        accept(&f.ledger, "eur", Decimal::new(9, 1));

        assert_eq!(
            f.aggregator.order(eur.as_str()).unwrap().base_currency_price,
            Decimal::new(288, 0)
        );
        assert_eq!(
            f.aggregator.order(usd.as_str()).unwrap().base_currency_price,
            Decimal::new(632, 1)
        );
        assert_eq!(f.aggregator.total(), Decimal::new(3512, 1));

        let repriced: Vec<OrderId> = handler
            .events()
            .into_iter()
            .filter_map(|e| match e {
                EngineEvent::OrderRepriced { order_id, .. } => Some(order_id),
                _ => None,
            })
            .collect();
        assert_eq!(repriced, vec![eur]);
    }

    #[tokio::test]
    async fn test_currency_switch_rebases_immediately() {
        let f = fixture();
        let id = f
            .aggregator
            .add_order_with("Monitor", Decimal::new(100, 0), "eur")
            .unwrap();

        // A dirty edit on usd must not leak into the derivation
        let usd = f.registry.bind("usd").unwrap();
        usd.edit(Decimal::new(5, 0)).unwrap();

        f.aggregator.select_currency(id.as_str(), "usd").unwrap();

        let order = f.aggregator.order(id.as_str()).unwrap();
        assert_eq!(order.currency, CurrencyCode::new("usd"));
        assert_eq!(order.base_currency_price, Decimal::new(79, 0));
        assert_eq!(f.aggregator.total(), Decimal::new(79, 0));

        // Old subscription dropped: eur updates no longer reach the order
        accept(&f.ledger, "eur", Decimal::new(2, 0));
        assert_eq!(f.aggregator.total(), Decimal::new(79, 0));

        accept(&f.ledger, "usd", Decimal::new(8, 1));
        assert_eq!(f.aggregator.total(), Decimal::new(80, 0));
    }

    #[tokio::test]
    async fn test_orders_hold_currency_bindings() {
        let f = fixture();
        let id = f
            .aggregator
            .add_order_with("Monitor", Decimal::new(100, 0), "eur")
            .unwrap();
        assert_eq!(f.registry.binding_count("eur"), 1);

        f.aggregator.select_currency(id.as_str(), "usd").unwrap();

        assert_eq!(f.registry.binding_count("eur"), 0);
        assert!(f.registry.live("eur").is_none());
        assert_eq!(f.registry.binding_count("usd"), 1);
    }

    #[tokio::test]
    async fn test_unknown_keys_fail_fast() {
        let f = fixture();
        let id = f.aggregator.add_order().unwrap();

        assert_eq!(
            f.aggregator.edit_price("missing", Decimal::ONE),
            Err(EngineError::UnknownOrder(OrderId::from("missing")))
        );
        assert_eq!(
            f.aggregator.select_currency("missing", "eur"),
            Err(EngineError::UnknownOrder(OrderId::from("missing")))
        );
        assert_eq!(
            f.aggregator.select_currency(id.as_str(), "chf"),
            Err(EngineError::UnknownCurrency(CurrencyCode::new("chf")))
        );
        assert!(f.aggregator.order("missing").is_err());
        // Failed switch left no stray binding behind
        assert_eq!(f.registry.binding_count("eur"), 0);
        assert_eq!(f.aggregator.total(), Decimal::new(100, 0));
    }

    #[tokio::test]
    async fn test_duplicate_seed_id_rejected() {
        let f = fixture();
        let seed = OrderSeed {
            id: OrderId::from("1"),
            title: "Desk".to_string(),
            price: Decimal::ONE,
            currency: CurrencyCode::new("gbp"),
        };

        f.aggregator.seed(&seed).unwrap();
        assert!(matches!(
            f.aggregator.seed(&seed),
            Err(EngineError::InvalidConfig(_))
        ));
        assert_eq!(f.aggregator.len(), 1);
    }

    #[tokio::test]
    async fn test_extreme_amounts_keep_total_exact() {
        let f = fixture();
        let big = Decimal::new(999_999_999_999, 6);
        let tiny = Decimal::new(1, 6);
        accept(&f.ledger, "eur", big);
        accept(&f.ledger, "usd", tiny);

        let large = f.aggregator.add_order_with("Large", big, "eur").unwrap();
        f.aggregator.add_order_with("Small", tiny, "usd").unwrap();
        assert_eq!(f.aggregator.total(), f.aggregator.rescan_total());

        f.aggregator.edit_price(large.as_str(), Decimal::ZERO).unwrap();
        assert_eq!(f.aggregator.total(), Decimal::new(1, 12));
        assert_eq!(f.aggregator.total(), f.aggregator.rescan_total());

        // Re-basing the large order back and forth is exact as well
        f.aggregator.edit_price(large.as_str(), big).unwrap();
        accept(&f.ledger, "eur", tiny);
        accept(&f.ledger, "eur", big);
        assert_eq!(f.aggregator.total(), f.aggregator.rescan_total());
    }

    #[tokio::test]
    async fn test_order_set_is_bounded() {
        let f = fixture();
        for _ in 0..MAX_ORDERS {
            f.aggregator.add_order().unwrap();
        }

        assert_eq!(
            f.aggregator.add_order(),
            Err(EngineError::TooManyOrders { limit: MAX_ORDERS })
        );
        assert_eq!(f.aggregator.len(), MAX_ORDERS);
        assert_eq!(f.registry.binding_count("gbp"), MAX_ORDERS);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Add(usize, Decimal),
        EditPrice(usize, Decimal),
        Select(usize, usize),
        Accept(usize, Decimal),
    }

    const KEYS: [&str; 3] = ["gbp", "eur", "usd"];

    /// Everyday cents, arbitrary micro-units, and values crowding either end
    /// of the accepted range
    fn amount() -> impl Strategy<Value = Decimal> {
        prop_oneof![
            (0..1_000_000i64).prop_map(|cents| Decimal::new(cents, 2)),
            (0..=999_999_999_999i64).prop_map(|micros| Decimal::new(micros, 6)),
            (999_000_000_000..=999_999_999_999i64).prop_map(|micros| Decimal::new(micros, 6)),
            (1..1_000i64).prop_map(|micros| Decimal::new(micros, 6)),
        ]
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0..3usize, amount()).prop_map(|(k, p)| Op::Add(k, p)),
            (0..16usize, amount()).prop_map(|(i, p)| Op::EditPrice(i, p)),
            (0..16usize, 0..3usize).prop_map(|(i, k)| Op::Select(i, k)),
            (0..3usize, amount()).prop_map(|(k, r)| Op::Accept(k, r)),
        ]
    }

    proptest! {
        #[test]
        fn prop_incremental_total_matches_rescan(ops in prop::collection::vec(op(), 1..60)) {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()
                .unwrap();
            let _guard = rt.enter();
            let f = fixture();
            let mut ids: Vec<OrderId> = Vec::new();

            for op in ops {
                match op {
                    Op::Add(k, price) => {
                        let id = f
                            .aggregator
                            .add_order_with("Item", price, KEYS[k])
                            .unwrap();
                        ids.push(id);
                    }
                    Op::EditPrice(i, price) if !ids.is_empty() => {
                        let id = &ids[i % ids.len()];
                        f.aggregator.edit_price(id.as_str(), price).unwrap();
                    }
                    Op::Select(i, k) if !ids.is_empty() => {
                        let id = &ids[i % ids.len()];
                        f.aggregator.select_currency(id.as_str(), KEYS[k]).unwrap();
                    }
                    Op::Accept(k, rate) => accept(&f.ledger, KEYS[k], rate),
                    _ => {}
                }

                let from_scratch = sum_base_prices(f.aggregator.orders().iter().map(|o| {
                    base_currency_price(o.price, f.ledger.current(o.currency.as_str()).unwrap())
                }));
                prop_assert_eq!(f.aggregator.total(), from_scratch);
                prop_assert_eq!(f.aggregator.total(), f.aggregator.rescan_total());
                prop_assert_eq!(*f.aggregator.subscribe_total().borrow(), f.aggregator.total());
            }
        }
    }
}
