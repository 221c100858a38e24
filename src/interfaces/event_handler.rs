// ============================================================================
// Event Handler Interface
// Defines the contract for observing reconciliation and order events
// ============================================================================

use crate::domain::{CurrencyCode, CurrencyRateState, OrderId};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Events emitted by the reconciliation engine
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum EngineEvent {
    /// Raw edit received for a currency
    RateEdited {
        key: CurrencyCode,
        candidate: Decimal,
        timestamp: DateTime<Utc>,
    },

    /// Reconciler published a new `(value, phase)` pair
    RateStateChanged {
        key: CurrencyCode,
        state: CurrencyRateState,
        timestamp: DateTime<Utc>,
    },

    /// Debounce elapsed, candidate handed to the gateway
    ValidationIssued {
        key: CurrencyCode,
        candidate: Decimal,
        generation: u64,
        timestamp: DateTime<Utc>,
    },

    /// Gateway accepted the current candidate
    RateCommitted {
        key: CurrencyCode,
        value: Decimal,
        timestamp: DateTime<Utc>,
    },

    /// Gateway refused (or failed on) the current candidate
    RateRolledBack {
        key: CurrencyCode,
        rejected: Decimal,
        restored: Decimal,
        timestamp: DateTime<Utc>,
    },

    /// Gateway answered for a candidate that a newer edit had superseded
    StaleResponseDiscarded {
        key: CurrencyCode,
        candidate: Decimal,
        generation: u64,
        timestamp: DateTime<Utc>,
    },

    /// Last binding dropped; pending work cancelled
    ReconcilerReleased {
        key: CurrencyCode,
        timestamp: DateTime<Utc>,
    },

    /// Order appended to the order set
    OrderAdded {
        order_id: OrderId,
        timestamp: DateTime<Utc>,
    },

    /// Base currency price of an order changed
    OrderRepriced {
        order_id: OrderId,
        base_currency_price: Decimal,
        total: Decimal,
        timestamp: DateTime<Utc>,
    },
}

/// Event handler trait for processing engine events
/// Implementations can handle logging, metrics, auditing, etc.
///
/// Handlers are invoked while engine locks are held and must not call back
/// into the engine.
pub trait EventHandler: Send + Sync {
    /// Handle an engine event
    fn on_event(&self, event: EngineEvent);

    /// Batch event handler (optional optimization)
    fn on_events(&self, events: Vec<EngineEvent>) {
        for event in events {
            self.on_event(event);
        }
    }
}

/// No-op event handler for testing
pub struct NoOpEventHandler;

impl EventHandler for NoOpEventHandler {
    fn on_event(&self, _event: EngineEvent) {
        // Do nothing
    }
}

/// Logging event handler
pub struct LoggingEventHandler;

impl EventHandler for LoggingEventHandler {
    fn on_event(&self, event: EngineEvent) {
        tracing::debug!("Reconciliation engine event: {:?}", event);
    }
}

/// Keeps every event in memory, in emission order
#[derive(Default)]
pub struct RecordingEventHandler {
    events: Mutex<Vec<EngineEvent>>,
}

impl RecordingEventHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything recorded so far
    pub fn events(&self) -> Vec<EngineEvent> {
        self.events.lock().clone()
    }

    /// Recorded state transitions of one currency
    pub fn states_for(&self, key: &str) -> Vec<CurrencyRateState> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                EngineEvent::RateStateChanged { key: k, state, .. } if k.as_str() == key => {
                    Some(*state)
                }
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl EventHandler for RecordingEventHandler {
    fn on_event(&self, event: EngineEvent) {
        self.events.lock().push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noop_handler() {
        let handler = NoOpEventHandler;
        handler.on_event(EngineEvent::OrderAdded {
            order_id: OrderId::new(),
            timestamp: Utc::now(),
        });
        // Should not panic
    }

    #[test]
    fn test_recording_handler_filters_by_key() {
        let handler = RecordingEventHandler::new();
        handler.on_events(vec![
            EngineEvent::RateStateChanged {
                key: CurrencyCode::new("eur"),
                state: CurrencyRateState::dirty(Decimal::new(9, 1)),
                timestamp: Utc::now(),
            },
            EngineEvent::RateStateChanged {
                key: CurrencyCode::new("usd"),
                state: CurrencyRateState::dirty(Decimal::ONE),
                timestamp: Utc::now(),
            },
        ]);

        assert_eq!(handler.events().len(), 2);
        assert_eq!(
            handler.states_for("eur"),
            vec![CurrencyRateState::dirty(Decimal::new(9, 1))]
        );

        handler.clear();
        assert!(handler.events().is_empty());
    }
}
