// ============================================================================
// Rate Reconciler
// Per-currency optimistic edit state machine: debounce, validate, commit or
// roll back, and never apply a superseded outcome
// ============================================================================

use crate::domain::{CurrencyCode, CurrencyRateState};
use crate::engine::ledger::AcceptedValueLedger;
use crate::errors::EngineResult;
use crate::interfaces::{EngineEvent, EventHandler, GatewayError, ValidationGateway, Verdict};
use chrono::Utc;
use futures::FutureExt;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Everything a reconciler needs besides its key. Shared by all keys.
#[derive(Clone)]
pub(crate) struct ReconcilerContext {
    pub debounce: Duration,
    pub gateway: Arc<dyn ValidationGateway>,
    pub ledger: Arc<AcceptedValueLedger>,
    pub event_handler: Arc<dyn EventHandler>,
    pub runtime: Handle,
}

/// Cancellation token and task handle of the current settle cycle.
///
/// `generation` is bumped by every edit and by release. A spawned cycle
/// captures the generation it was started with and applies an effect only
/// while holding this lock and only if the generation is unchanged.
struct Cycle {
    generation: u64,
    task: Option<JoinHandle<()>>,
    released: bool,
}

/// State machine for one currency key.
///
/// `Accepted(v)` → edit `c`:
/// - `c` equal to the accepted value: `Accepted(c)` at once, no validation
/// - otherwise `Dirty(c)`, then after the debounce quiet period
///   `InProgress(c)` and exactly one gateway call
/// - accept: `Accepted(c)`; reject or gateway failure: `Accepted(previous)`
///
/// Every edit cancels the pending debounce and any in-flight validation.
pub struct RateReconciler {
    key: CurrencyCode,
    ctx: ReconcilerContext,
    accepted_rx: watch::Receiver<Decimal>,
    state_tx: watch::Sender<CurrencyRateState>,
    cycle: Mutex<Cycle>,
}

impl RateReconciler {
    /// Create a reconciler starting at `Accepted(ledger value)`. The key
    /// must exist in the ledger.
    pub(crate) fn new(
        key: CurrencyCode,
        ctx: ReconcilerContext,
    ) -> EngineResult<Arc<Self>> {
        let accepted_rx = ctx.ledger.subscribe(key.as_str())?;
        let initial = CurrencyRateState::accepted(*accepted_rx.borrow());
        let (state_tx, _) = watch::channel(initial);

        tracing::debug!(key = %key, value = %initial.value, "rate reconciler created");

        Ok(Arc::new(Self {
            key,
            ctx,
            accepted_rx,
            state_tx,
            cycle: Mutex::new(Cycle {
                generation: 0,
                task: None,
                released: false,
            }),
        }))
    }

    pub fn key(&self) -> &CurrencyCode {
        &self.key
    }

    /// Latest published `(value, phase)`
    pub fn state(&self) -> CurrencyRateState {
        *self.state_tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<CurrencyRateState> {
        self.state_tx.subscribe()
    }

    /// Generation of the current cycle; increases with every edit
    pub fn generation(&self) -> u64 {
        self.cycle.lock().generation
    }

    /// Whether the last binding has dropped; a released reconciler ignores
    /// edits
    pub fn is_released(&self) -> bool {
        self.cycle.lock().released
    }

    /// Whether a debounce or validation is still pending
    pub fn is_pending(&self) -> bool {
        self.cycle
            .lock()
            .task
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Apply a raw edit. Amount bounds are checked by the caller.
    pub fn edit(self: &Arc<Self>, candidate: Decimal) {
        let mut cycle = self.cycle.lock();
        if cycle.released {
            tracing::debug!(
                key = %self.key,
                %candidate,
                "edit on released reconciler ignored"
            );
            return;
        }

        cycle.generation += 1;
        if let Some(task) = cycle.task.take() {
            task.abort();
        }

        self.ctx.event_handler.on_event(EngineEvent::RateEdited {
            key: self.key.clone(),
            candidate,
            timestamp: Utc::now(),
        });

        let accepted = *self.accepted_rx.borrow();
        if candidate == accepted {
            self.publish(CurrencyRateState::accepted(candidate));
            return;
        }

        self.publish(CurrencyRateState::dirty(candidate));

        let generation = cycle.generation;
        let this = Arc::clone(self);
        cycle.task = Some(
            self.ctx
                .runtime
                .spawn(async move { this.settle(generation, candidate).await }),
        );
    }

    /// Cancel pending work and refuse further edits. Called when the last
    /// binding to this key is dropped.
    pub(crate) fn release(&self) {
        let mut cycle = self.cycle.lock();
        if cycle.released {
            return;
        }
        cycle.released = true;
        cycle.generation += 1;
        if let Some(task) = cycle.task.take() {
            task.abort();
        }

        tracing::debug!(key = %self.key, "rate reconciler released");
        self.ctx.event_handler.on_event(EngineEvent::ReconcilerReleased {
            key: self.key.clone(),
            timestamp: Utc::now(),
        });
    }

    // ========================================================================
    // Private methods
    // ========================================================================

    /// One settle cycle: quiet period, then a single validation call.
    async fn settle(self: Arc<Self>, generation: u64, candidate: Decimal) {
        tokio::time::sleep(self.ctx.debounce).await;

        {
            let cycle = self.cycle.lock();
            if cycle.generation != generation {
                return;
            }
            self.publish(CurrencyRateState::in_progress(candidate));
            self.ctx.event_handler.on_event(EngineEvent::ValidationIssued {
                key: self.key.clone(),
                candidate,
                generation,
                timestamp: Utc::now(),
            });
        }

        // A panicking gateway resolves like a failed one
        let outcome = AssertUnwindSafe(self.ctx.gateway.validate(&self.key, candidate))
            .catch_unwind()
            .await
            .unwrap_or(Err(GatewayError::Panicked));

        let mut cycle = self.cycle.lock();
        if cycle.generation != generation {
            tracing::debug!(
                key = %self.key,
                %candidate,
                generation,
                current = cycle.generation,
                "stale validation response discarded"
            );
            self.ctx
                .event_handler
                .on_event(EngineEvent::StaleResponseDiscarded {
                    key: self.key.clone(),
                    candidate,
                    generation,
                    timestamp: Utc::now(),
                });
            return;
        }
        // Finished; detach our own handle so `is_pending` reports idle
        cycle.task = None;

        match outcome {
            Ok(Verdict::Accepted) => {
                self.publish(CurrencyRateState::accepted(candidate));
                tracing::info!(key = %self.key, value = %candidate, "rate committed");
                self.ctx.event_handler.on_event(EngineEvent::RateCommitted {
                    key: self.key.clone(),
                    value: candidate,
                    timestamp: Utc::now(),
                });
            }
            Ok(Verdict::Rejected) => self.roll_back(candidate),
            Err(err) => {
                tracing::warn!(
                    key = %self.key,
                    %candidate,
                    gateway = self.ctx.gateway.name(),
                    error = %err,
                    "validation failed, rolling back"
                );
                self.roll_back(candidate);
            }
        }
    }

    /// Restore the value accepted before this cycle began. Caller holds the
    /// cycle lock.
    fn roll_back(&self, rejected: Decimal) {
        let restored = *self.accepted_rx.borrow();
        self.publish(CurrencyRateState::accepted(restored));
        tracing::info!(key = %self.key, %rejected, %restored, "rate rolled back");
        self.ctx.event_handler.on_event(EngineEvent::RateRolledBack {
            key: self.key.clone(),
            rejected,
            restored,
            timestamp: Utc::now(),
        });
    }

    /// Emit a state. Caller holds the cycle lock, so emissions of one key
    /// are totally ordered and never interleave with a superseding edit.
    fn publish(&self, state: CurrencyRateState) {
        self.state_tx.send_replace(state);
        tracing::debug!(
            key = %self.key,
            value = %state.value,
            phase = %state.phase,
            "rate state"
        );
        self.ctx.event_handler.on_event(EngineEvent::RateStateChanged {
            key: self.key.clone(),
            state,
            timestamp: Utc::now(),
        });
        self.ctx.ledger.observe(&self.key, &state);
    }
}
