// ============================================================================
// Numeric Module
// Bounded decimal amounts for rates, prices and base currency totals
// ============================================================================
//
// This module provides:
// - MAX_AMOUNT / MAX_SCALE: bounds for every rate and price accepted
// - MAX_ORDERS: bound on the size of an order set
// - AmountError: why an amount was refused
// - base_currency_price / sum_base_prices: the only arithmetic the engine does
//
// Decimal keeps a 96-bit mantissa (about 7.9e28) and silently rounds when a
// result needs more. An accepted amount is at most 1e6 with 6 fractional
// digits, so its mantissa is at most 1e12. A product `price * rate` then has
// at most 12 fractional digits and a mantissa of at most 1e24. A total, or a
// sum of repricing deltas, over MAX_ORDERS such products stays below 4e28.
// Every product, delta and running total is therefore exact, and an
// incremental total always equals a full rescan.

mod errors;

pub use errors::{AmountError, AmountResult};

use rust_decimal::Decimal;

/// Largest price or exchange rate the engine accepts.
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(1_000_000, 0, 0, false, 0);

/// Most fractional digits a price or rate may carry after normalization.
pub const MAX_SCALE: u32 = 6;

/// Most orders a single order set may hold.
pub const MAX_ORDERS: usize = 20_000;

/// Check that an amount lies in `[0, MAX_AMOUNT]` with at most `MAX_SCALE`
/// significant fractional digits. Returns the normalized amount.
pub fn check_amount(value: Decimal) -> AmountResult<Decimal> {
    if value.is_zero() {
        return Ok(Decimal::ZERO);
    }
    if value.is_sign_negative() {
        return Err(AmountError::Negative(value));
    }
    if value > MAX_AMOUNT {
        return Err(AmountError::TooLarge(value));
    }
    let value = value.normalize();
    if value.scale() > MAX_SCALE {
        return Err(AmountError::TooPrecise(value));
    }
    Ok(value)
}

/// Price of an order expressed in the base currency.
#[inline]
pub fn base_currency_price(price: Decimal, rate: Decimal) -> Decimal {
    price * rate
}

/// Full rescan of a set of base currency prices.
pub fn sum_base_prices<I>(prices: I) -> Decimal
where
    I: IntoIterator<Item = Decimal>,
{
    prices.into_iter().fold(Decimal::ZERO, |acc, p| acc + p)
}
