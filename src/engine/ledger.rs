// ============================================================================
// Accepted Value Ledger
// Projection of every reconciler's output onto its last accepted value
// ============================================================================

use crate::domain::{AcceptedValue, CurrencyCode, CurrencyRateState};
use crate::errors::{EngineError, EngineResult};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tokio::sync::watch;

/// Notified synchronously whenever a key's accepted value changes.
///
/// Called from inside the reconciler that produced the value, with its cycle
/// lock held; implementations must not edit rates from this callback.
pub trait AcceptedRateListener: Send + Sync {
    fn on_accepted(&self, key: &CurrencyCode, value: Decimal);
}

/// Per-key last confirmed value. The key set is fixed at construction;
/// entries are never removed.
pub struct AcceptedValueLedger {
    /// Currencies in configuration order
    keys: Vec<CurrencyCode>,

    entries: HashMap<CurrencyCode, watch::Sender<Decimal>>,

    /// Weak so that derivations never outlive their owner through the ledger
    listeners: RwLock<Vec<Weak<dyn AcceptedRateListener>>>,
}

impl AcceptedValueLedger {
    /// Build a ledger from seed values. A repeated key keeps its last value.
    pub fn new<I>(seeds: I) -> Self
    where
        I: IntoIterator<Item = (CurrencyCode, Decimal)>,
    {
        let mut keys = Vec::new();
        let mut entries: HashMap<CurrencyCode, watch::Sender<Decimal>> = HashMap::new();
        for (key, value) in seeds {
            match entries.get(&key) {
                Some(sender) => {
                    sender.send_replace(value);
                }
                None => {
                    let (sender, _) = watch::channel(value);
                    keys.push(key.clone());
                    entries.insert(key, sender);
                }
            }
        }

        Self {
            keys,
            entries,
            listeners: RwLock::new(Vec::new()),
        }
    }

    pub fn keys(&self) -> &[CurrencyCode] {
        &self.keys
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Current accepted value of `key`
    pub fn current(&self, key: &str) -> EngineResult<Decimal> {
        Ok(*self.entry(key)?.borrow())
    }

    /// Watch subsequent changes of `key`. The receiver starts out seeing the
    /// current value as already observed.
    pub fn subscribe(&self, key: &str) -> EngineResult<watch::Receiver<Decimal>> {
        Ok(self.entry(key)?.subscribe())
    }

    /// All accepted values, in configuration order
    pub fn snapshot(&self) -> Vec<AcceptedValue> {
        self.keys
            .iter()
            .filter_map(|key| {
                self.entries.get(key).map(|sender| AcceptedValue {
                    key: key.clone(),
                    value: *sender.borrow(),
                })
            })
            .collect()
    }

    /// Register a change listener. Dropped listeners are pruned lazily.
    pub fn register(&self, listener: Weak<dyn AcceptedRateListener>) {
        self.listeners.write().push(listener);
    }

    /// Feed one reconciler emission into the projection.
    ///
    /// Only Accepted states count, and a value equal to the current one is
    /// swallowed. Returns whether the accepted value changed.
    pub(crate) fn observe(&self, key: &CurrencyCode, state: &CurrencyRateState) -> bool {
        if !state.is_accepted() {
            return false;
        }
        let Some(sender) = self.entries.get(key) else {
            return false;
        };

        let changed = sender.send_if_modified(|current| {
            if *current == state.value {
                false
            } else {
                *current = state.value;
                true
            }
        });

        if changed {
            tracing::debug!(key = %key, value = %state.value, "accepted value updated");
            self.notify(key, state.value);
        }
        changed
    }

    fn notify(&self, key: &CurrencyCode, value: Decimal) {
        let (live, any_dead) = {
            let listeners = self.listeners.read();
            let live: Vec<Arc<dyn AcceptedRateListener>> =
                listeners.iter().filter_map(Weak::upgrade).collect();
            let any_dead = live.len() != listeners.len();
            (live, any_dead)
        };

        if any_dead {
            self.listeners.write().retain(|l| l.strong_count() > 0);
        }

        for listener in live {
            listener.on_accepted(key, value);
        }
    }

    fn entry(&self, key: &str) -> EngineResult<&watch::Sender<Decimal>> {
        self.entries
            .get(key)
            .ok_or_else(|| EngineError::UnknownCurrency(CurrencyCode::new(key)))
    }
}
