// ============================================================================
// Numeric Errors
// Error types for amount validation
// ============================================================================

use rust_decimal::Decimal;
use thiserror::Error;

/// Reasons an amount is refused before it reaches the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum AmountError {
    /// Amount below zero
    #[error("amount {0} is negative")]
    Negative(Decimal),
    /// Amount above `MAX_AMOUNT`
    #[error("amount {0} exceeds the maximum of 1000000")]
    TooLarge(Decimal),
    /// More than `MAX_SCALE` fractional digits
    #[error("amount {0} has more than 6 fractional digits")]
    TooPrecise(Decimal),
}

/// Result type alias for amount checks
pub type AmountResult<T> = Result<T, AmountError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            AmountError::Negative(Decimal::new(-5, 0)).to_string(),
            "amount -5 is negative"
        );
        assert_eq!(
            AmountError::TooLarge(Decimal::new(2_000_000, 0)).to_string(),
            "amount 2000000 exceeds the maximum of 1000000"
        );
    }

    #[test]
    fn test_error_equality() {
        assert_eq!(
            AmountError::Negative(Decimal::ONE),
            AmountError::Negative(Decimal::ONE)
        );
        assert_ne!(
            AmountError::Negative(Decimal::ONE),
            AmountError::TooLarge(Decimal::ONE)
        );
    }
}
