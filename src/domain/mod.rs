// ============================================================================
// Domain Models Module
// Contains all core domain entities and value objects
// ============================================================================

pub mod config;
pub mod currency;
pub mod order;

pub use config::{CurrencySeed, EngineConfig, OrderSeed, OrderTemplate, DEFAULT_DEBOUNCE_MS};
pub use currency::{AcceptedValue, CurrencyCode, CurrencyRateState, RatePhase};
pub use order::{Order, OrderId};
