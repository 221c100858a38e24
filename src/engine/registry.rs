// ============================================================================
// Key Registry
// Reference-counted lifecycle of rate reconcilers
// ============================================================================

use crate::domain::{CurrencyCode, CurrencyRateState};
use crate::engine::reconciler::{RateReconciler, ReconcilerContext};
use crate::errors::{EngineError, EngineResult};
use crate::numeric::check_amount;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

struct Slot {
    reconciler: Arc<RateReconciler>,
    bindings: usize,
}

/// Creates a reconciler on the first binding to a key and releases it when
/// the last binding drops.
///
/// Lock order: the registry lock is taken before a reconciler's cycle lock,
/// never after it.
pub struct KeyRegistry {
    ctx: ReconcilerContext,
    slots: Mutex<HashMap<CurrencyCode, Slot>>,
}

impl KeyRegistry {
    pub(crate) fn new(ctx: ReconcilerContext) -> Self {
        Self {
            ctx,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Take a reference on `key`, creating its reconciler if none is live.
    pub fn bind(self: &Arc<Self>, key: &str) -> EngineResult<RateBinding> {
        if !self.ctx.ledger.contains(key) {
            return Err(EngineError::UnknownCurrency(CurrencyCode::new(key)));
        }

        let mut slots = self.slots.lock();
        let reconciler = match slots.get_mut(key) {
            Some(slot) => {
                slot.bindings += 1;
                Arc::clone(&slot.reconciler)
            }
            None => {
                let key = CurrencyCode::new(key);
                let reconciler = RateReconciler::new(key.clone(), self.ctx.clone())?;
                slots.insert(
                    key,
                    Slot {
                        reconciler: Arc::clone(&reconciler),
                        bindings: 1,
                    },
                );
                reconciler
            }
        };

        Ok(RateBinding {
            reconciler,
            registry: Arc::clone(self),
        })
    }

    /// Live reconciler of `key`, if any binding holds it
    pub fn live(&self, key: &str) -> Option<Arc<RateReconciler>> {
        self.slots
            .lock()
            .get(key)
            .map(|slot| Arc::clone(&slot.reconciler))
    }

    pub fn binding_count(&self, key: &str) -> usize {
        self.slots.lock().get(key).map_or(0, |slot| slot.bindings)
    }

    /// Keys with a live reconciler, sorted
    pub fn live_keys(&self) -> Vec<CurrencyCode> {
        let mut keys: Vec<CurrencyCode> = self.slots.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    fn retain(&self, key: &CurrencyCode) {
        if let Some(slot) = self.slots.lock().get_mut(key) {
            slot.bindings += 1;
        }
    }

    fn unbind(&self, reconciler: &Arc<RateReconciler>) {
        let mut slots = self.slots.lock();
        let Some(slot) = slots.get_mut(reconciler.key()) else {
            return;
        };
        if !Arc::ptr_eq(&slot.reconciler, reconciler) {
            return;
        }

        slot.bindings -= 1;
        if slot.bindings == 0 {
            // Released before the slot frees up: a later bind never overlaps
            // a predecessor that could still commit
            reconciler.release();
            slots.remove(reconciler.key());
        }
    }
}

/// A consumer's reference on one currency key.
///
/// While any binding for a key exists its reconciler stays alive; dropping
/// the last one cancels the pending debounce or validation of that key.
pub struct RateBinding {
    reconciler: Arc<RateReconciler>,
    registry: Arc<KeyRegistry>,
}

impl RateBinding {
    pub fn key(&self) -> &CurrencyCode {
        self.reconciler.key()
    }

    /// Current `(value, phase)` for rendering
    pub fn state(&self) -> CurrencyRateState {
        self.reconciler.state()
    }

    pub fn subscribe(&self) -> watch::Receiver<CurrencyRateState> {
        self.reconciler.subscribe()
    }

    /// Submit a raw edit for this key
    pub fn edit(&self, value: Decimal) -> EngineResult<()> {
        let value = check_amount(value).map_err(|source| EngineError::InvalidAmount {
            field: "rate",
            source,
        })?;
        self.reconciler.edit(value);
        Ok(())
    }

    pub fn is_pending(&self) -> bool {
        self.reconciler.is_pending()
    }
}

impl Clone for RateBinding {
    fn clone(&self) -> Self {
        self.registry.retain(self.reconciler.key());
        Self {
            reconciler: Arc::clone(&self.reconciler),
            registry: Arc::clone(&self.registry),
        }
    }
}

impl Drop for RateBinding {
    fn drop(&mut self) {
        self.registry.unbind(&self.reconciler);
    }
}

impl fmt::Debug for RateBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateBinding")
            .field("key", self.key())
            .field("state", &self.state())
            .finish()
    }
}
