// ============================================================================
// Order Domain Model
// ============================================================================

use crate::domain::currency::CurrencyCode;
use rust_decimal::Decimal;
use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

// ============================================================================
// Value Objects
// ============================================================================

/// Order identifier. Seed orders keep their configured ids, orders added at
/// runtime get a random UUID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct OrderId(Arc<str>);

impl OrderId {
    pub fn new() -> Self {
        Self(Arc::from(Uuid::new_v4().to_string()))
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(Arc::from(uuid.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for OrderId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OrderId {
    fn from(id: &str) -> Self {
        Self(Arc::from(id))
    }
}

impl From<String> for OrderId {
    fn from(id: String) -> Self {
        Self(Arc::from(id))
    }
}

impl Borrow<str> for OrderId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// Order Snapshot
// ============================================================================

/// Point-in-time view of an order line.
///
/// `base_currency_price` is derived from `price`, `currency` and the accepted
/// rate of that currency; it is never stored independently.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Order {
    pub id: OrderId,
    pub title: String,
    pub price: Decimal,
    pub currency: CurrencyCode,
    pub base_currency_price: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_unique() {
        let a = OrderId::new();
        let b = OrderId::new();
        assert_ne!(a, b);
        assert!(Uuid::parse_str(a.as_str()).is_ok());
    }

    #[test]
    fn test_seed_id_round_trips_as_str() {
        let id = OrderId::from("order-1");
        assert_eq!(id.as_str(), "order-1");
        assert_eq!(id.to_string(), "order-1");
    }
}
