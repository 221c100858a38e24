// ============================================================================
// Currency Domain Model
// ============================================================================

use rust_decimal::Decimal;
use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

// ============================================================================
// Value Objects
// ============================================================================

/// Currency key, e.g. `"EUR"`. Cheap to clone.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct CurrencyCode(Arc<str>);

impl CurrencyCode {
    pub fn new(code: impl AsRef<str>) -> Self {
        Self(Arc::from(code.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CurrencyCode {
    fn from(code: &str) -> Self {
        Self::new(code)
    }
}

impl From<String> for CurrencyCode {
    fn from(code: String) -> Self {
        Self(Arc::from(code))
    }
}

impl Borrow<str> for CurrencyCode {
    fn borrow(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// Rate State Machine
// ============================================================================

/// Externally observable status of a currency key's pending edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum RatePhase {
    /// Value is confirmed; stable until the next edit
    Accepted,
    /// Candidate shown optimistically, waiting for the quiet period
    Dirty,
    /// Candidate handed to the validation gateway
    InProgress,
}

impl RatePhase {
    pub fn is_settled(&self) -> bool {
        matches!(self, RatePhase::Accepted)
    }
}

impl fmt::Display for RatePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RatePhase::Accepted => write!(f, "accepted"),
            RatePhase::Dirty => write!(f, "dirty"),
            RatePhase::InProgress => write!(f, "in-progress"),
        }
    }
}

/// `(value, phase)` pair emitted by a rate reconciler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CurrencyRateState {
    pub value: Decimal,
    pub phase: RatePhase,
}

impl CurrencyRateState {
    pub fn accepted(value: Decimal) -> Self {
        Self {
            value,
            phase: RatePhase::Accepted,
        }
    }

    pub fn dirty(value: Decimal) -> Self {
        Self {
            value,
            phase: RatePhase::Dirty,
        }
    }

    pub fn in_progress(value: Decimal) -> Self {
        Self {
            value,
            phase: RatePhase::InProgress,
        }
    }

    pub fn is_accepted(&self) -> bool {
        self.phase.is_settled()
    }
}

/// Last confirmed value for a key.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AcceptedValue {
    pub key: CurrencyCode,
    pub value: Decimal,
}
