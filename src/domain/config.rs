// ============================================================================
// Engine Configuration
// Seed data and timing for the reconciliation engine
// ============================================================================

use crate::domain::currency::CurrencyCode;
use crate::domain::order::OrderId;
use crate::numeric::{check_amount, MAX_ORDERS};
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Quiet period before a dirty rate is sent for validation
pub const DEFAULT_DEBOUNCE_MS: u64 = 500;

// ============================================================================
// Seed Records
// ============================================================================

/// Initial accepted rate of a currency, expressed in the base currency
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CurrencySeed {
    pub code: CurrencyCode,
    pub rate: Decimal,
}

/// Order line present when the engine starts
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct OrderSeed {
    pub id: OrderId,
    pub title: String,
    pub price: Decimal,
    pub currency: CurrencyCode,
}

/// Record used for orders added at runtime
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct OrderTemplate {
    pub title: String,
    pub price: Decimal,
    pub currency: CurrencyCode,
}

// ============================================================================
// Complete Engine Configuration
// ============================================================================

/// Everything the engine needs at start-up. Supplied once; nothing else is
/// read from process-wide state.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EngineConfig {
    /// Currency all order prices are converted into
    pub base_currency: CurrencyCode,

    /// Known currencies with their seed rates, in display order
    pub currencies: Vec<CurrencySeed>,

    /// Orders present at start-up, in display order
    #[cfg_attr(feature = "serde", serde(default))]
    pub orders: Vec<OrderSeed>,

    /// Template for orders created by `add_order`
    pub default_order: OrderTemplate,

    /// Debounce quiet period in milliseconds
    #[cfg_attr(feature = "serde", serde(default = "default_debounce_ms"))]
    pub debounce_ms: u64,
}

#[cfg(feature = "serde")]
fn default_debounce_ms() -> u64 {
    DEFAULT_DEBOUNCE_MS
}

impl EngineConfig {
    /// Create a configuration holding only the base currency at rate 1
    pub fn new(base_currency: impl Into<CurrencyCode>) -> Self {
        let base_currency = base_currency.into();
        Self {
            currencies: vec![CurrencySeed {
                code: base_currency.clone(),
                rate: Decimal::ONE,
            }],
            orders: Vec::new(),
            default_order: OrderTemplate {
                title: "New article".to_string(),
                price: Decimal::ZERO,
                currency: base_currency.clone(),
            },
            base_currency,
            debounce_ms: DEFAULT_DEBOUNCE_MS,
        }
    }

    /// Builder method: add a currency, or replace the seed rate of a known one
    pub fn with_currency(mut self, code: impl Into<CurrencyCode>, rate: Decimal) -> Self {
        let code = code.into();
        match self.currencies.iter_mut().find(|c| c.code == code) {
            Some(existing) => existing.rate = rate,
            None => self.currencies.push(CurrencySeed { code, rate }),
        }
        self
    }

    /// Builder method: add a seed order
    pub fn with_order(
        mut self,
        id: impl Into<OrderId>,
        title: impl Into<String>,
        price: Decimal,
        currency: impl Into<CurrencyCode>,
    ) -> Self {
        self.orders.push(OrderSeed {
            id: id.into(),
            title: title.into(),
            price,
            currency: currency.into(),
        });
        self
    }

    /// Builder method: set the template for runtime-added orders
    pub fn with_default_order(
        mut self,
        title: impl Into<String>,
        price: Decimal,
        currency: impl Into<CurrencyCode>,
    ) -> Self {
        self.default_order = OrderTemplate {
            title: title.into(),
            price,
            currency: currency.into(),
        };
        self
    }

    /// Builder method: set the debounce quiet period
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce_ms = u64::try_from(debounce.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn currency_codes(&self) -> impl Iterator<Item = &CurrencyCode> {
        self.currencies.iter().map(|c| &c.code)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.currencies.is_empty() {
            return Err("At least one currency must be configured".to_string());
        }

        let mut codes = HashSet::new();
        for seed in &self.currencies {
            if seed.code.as_str().trim().is_empty() {
                return Err("Currency code cannot be empty".to_string());
            }
            if !codes.insert(seed.code.clone()) {
                return Err(format!("Duplicate currency {}", seed.code));
            }
            check_amount(seed.rate).map_err(|e| format!("Rate of {}: {}", seed.code, e))?;
        }

        if !codes.contains(&self.base_currency) {
            return Err(format!(
                "Base currency {} is not a configured currency",
                self.base_currency
            ));
        }

        if self.orders.len() > MAX_ORDERS {
            return Err(format!(
                "At most {} seed orders are supported, got {}",
                MAX_ORDERS,
                self.orders.len()
            ));
        }

        let mut ids = HashSet::new();
        for order in &self.orders {
            if order.id.as_str().is_empty() {
                return Err("Order id cannot be empty".to_string());
            }
            if !ids.insert(order.id.clone()) {
                return Err(format!("Duplicate order id {}", order.id));
            }
            if !codes.contains(&order.currency) {
                return Err(format!(
                    "Order {} references unknown currency {}",
                    order.id, order.currency
                ));
            }
            check_amount(order.price).map_err(|e| format!("Price of order {}: {}", order.id, e))?;
        }

        if !codes.contains(&self.default_order.currency) {
            return Err(format!(
                "Default order references unknown currency {}",
                self.default_order.currency
            ));
        }
        check_amount(self.default_order.price)
            .map_err(|e| format!("Default order price: {}", e))?;

        if self.debounce_ms == 0 {
            return Err("Debounce period must be positive".to_string());
        }

        Ok(())
    }

    /// Parse and validate a JSON configuration
    #[cfg(feature = "serde")]
    pub fn from_json(json: &str) -> Result<Self, String> {
        let config: Self = serde_json::from_str(json).map_err(|e| e.to_string())?;
        config.validate()?;
        Ok(config)
    }
}

// ============================================================================
// Preset Configurations (Factory Methods)
// ============================================================================

impl EngineConfig {
    /// Order-entry demo: pound sterling base, four foreign currencies and a
    /// handful of orders
    pub fn demo() -> Self {
        Self::new("gbp")
            .with_currency("eur", Decimal::new(86, 2))
            .with_currency("usd", Decimal::new(79, 2))
            .with_currency("cny", Decimal::new(11, 2))
            .with_currency("jpy", Decimal::new(55, 4))
            .with_order("1", "Keyboard", Decimal::new(80, 0), "usd")
            .with_order("2", "Monitor", Decimal::new(320, 0), "eur")
            .with_order("3", "Desk lamp", Decimal::new(25, 0), "gbp")
            .with_order("4", "Headphones", Decimal::new(15000, 0), "jpy")
            .with_default_order("New article", Decimal::new(100, 0), "gbp")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_creation() {
        let config = EngineConfig::new("gbp");

        assert_eq!(config.base_currency, CurrencyCode::new("gbp"));
        assert_eq!(config.currencies.len(), 1);
        assert_eq!(config.debounce(), Duration::from_millis(500));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_pattern() {
        let config = EngineConfig::new("gbp")
            .with_currency("eur", Decimal::new(86, 2))
            .with_currency("eur", Decimal::new(87, 2))
            .with_order("a", "Chair", Decimal::new(40, 0), "eur")
            .with_debounce(Duration::from_millis(250));

        assert_eq!(config.currencies.len(), 2);
        assert_eq!(config.currencies[1].rate, Decimal::new(87, 2));
        assert_eq!(config.orders.len(), 1);
        assert_eq!(config.debounce_ms, 250);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation() {
        let unknown_base = EngineConfig {
            base_currency: CurrencyCode::new("chf"),
            ..EngineConfig::new("gbp")
        };
        assert!(unknown_base.validate().is_err());

        let unknown_currency =
            EngineConfig::new("gbp").with_order("a", "Chair", Decimal::ONE, "eur");
        assert!(unknown_currency.validate().is_err());

        let duplicate_order = EngineConfig::new("gbp")
            .with_order("a", "Chair", Decimal::ONE, "gbp")
            .with_order("a", "Table", Decimal::ONE, "gbp");
        assert!(duplicate_order.validate().is_err());

        let negative_rate = EngineConfig::new("gbp").with_currency("eur", Decimal::new(-1, 0));
        assert!(negative_rate.validate().is_err());

        let zero_debounce = EngineConfig::new("gbp").with_debounce(Duration::ZERO);
        assert!(zero_debounce.validate().is_err());
    }

    #[test]
    fn test_amount_and_order_count_bounds() {
        let huge_price =
            EngineConfig::new("gbp").with_order("a", "Yacht", Decimal::new(2_000_000, 0), "gbp");
        assert!(huge_price.validate().is_err());

        let too_precise = EngineConfig::new("gbp").with_currency("eur", Decimal::new(1, 7));
        assert!(too_precise.validate().is_err());

        let crowded = (0..=MAX_ORDERS).fold(EngineConfig::new("gbp"), |config, i| {
            config.with_order(i.to_string(), "Item", Decimal::ONE, "gbp")
        });
        let err = crowded.validate().unwrap_err();
        assert!(err.contains("seed orders"));
    }

    #[test]
    fn test_preset_configs() {
        let demo = EngineConfig::demo();
        assert!(demo.validate().is_ok());
        assert_eq!(demo.currency_codes().count(), 5);
        assert_eq!(demo.orders.len(), 4);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_from_json() {
        let json = r#"{
            "base_currency": "gbp",
            "currencies": [
                { "code": "gbp", "rate": "1" },
                { "code": "eur", "rate": "0.86" }
            ],
            "orders": [
                { "id": "1", "title": "Monitor", "price": "320", "currency": "eur" }
            ],
            "default_order": { "title": "New article", "price": "100", "currency": "gbp" }
        }"#;

        let config = EngineConfig::from_json(json).unwrap();
        assert_eq!(config.debounce_ms, DEFAULT_DEBOUNCE_MS);
        assert_eq!(config.currencies[1].rate, Decimal::new(86, 2));

        assert!(EngineConfig::from_json("{}").is_err());
    }
}
