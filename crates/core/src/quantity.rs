//! Quantity and cost validation helpers shared by every module.
//!
//! Every persisted quantity, cost and amount is a `NUMERIC(20, 6)`: at most
//! 14 integer digits and [`COST_SCALE`] decimal places. Values are checked
//! against that shape before any arithmetic or IO happens.

use rust_decimal::Decimal;

use crate::error::{InventoryError, InventoryResult};

/// Decimal places kept on quantities and unit costs.
pub const COST_SCALE: u32 = 6;

/// Exclusive upper bound on the magnitude of any stored amount.
pub fn max_amount() -> Decimal {
    Decimal::from(100_000_000_000_000_i64)
}

fn fits_storage(value: Decimal) -> bool {
    value.abs() < max_amount() && value.normalize().scale() <= COST_SCALE
}

/// Reject zero, negative and unstorable quantities.
pub fn ensure_positive(quantity: Decimal) -> InventoryResult<Decimal> {
    if quantity <= Decimal::ZERO || !fits_storage(quantity) {
        return Err(InventoryError::InvalidQuantity(quantity));
    }
    Ok(quantity)
}

/// Reject negative unit costs (zero is allowed, e.g. donated stock).
pub fn ensure_cost(cost: Decimal) -> InventoryResult<Decimal> {
    if cost < Decimal::ZERO {
        return Err(InventoryError::validation(format!(
            "unit cost cannot be negative (got {cost})"
        )));
    }
    ensure_storable(cost, "unit cost")
}

/// Reject values with more than 14 integer digits or [`COST_SCALE`] decimals.
pub fn ensure_storable(value: Decimal, what: &str) -> InventoryResult<Decimal> {
    if !fits_storage(value) {
        return Err(InventoryError::validation(format!(
            "{what} {value} exceeds 14 integer digits or {COST_SCALE} decimal places"
        )));
    }
    Ok(value)
}

/// Result of a `checked_*` operation, bounded to the storable range.
pub fn ensure_checked(value: Option<Decimal>, what: &str) -> InventoryResult<Decimal> {
    match value {
        Some(value) => ensure_storable(value, what),
        None => Err(InventoryError::validation(format!(
            "{what} overflows the decimal range"
        ))),
    }
}

/// Quantity-weighted blend of an existing average cost with an inbound cost.
///
/// `new_avg = (old_qty * old_avg + in_qty * in_cost) / (old_qty + in_qty)`,
/// rounded to [`COST_SCALE`]. When the combined quantity is not positive the
/// inbound cost wins.
pub fn weighted_average(
    old_qty: Decimal,
    old_avg: Decimal,
    in_qty: Decimal,
    in_cost: Decimal,
) -> InventoryResult<Decimal> {
    let total_qty = ensure_checked(old_qty.checked_add(in_qty), "stock quantity")?;
    if total_qty <= Decimal::ZERO {
        return ensure_storable(in_cost.round_dp(COST_SCALE).normalize(), "average cost");
    }
    let blended = old_qty
        .max(Decimal::ZERO)
        .checked_mul(old_avg)
        .zip(in_qty.checked_mul(in_cost))
        .and_then(|(old_value, in_value)| old_value.checked_add(in_value))
        .and_then(|value| value.checked_div(total_qty))
        .map(|avg| avg.round_dp(COST_SCALE).normalize());
    ensure_checked(blended, "average cost")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn rejects_non_positive_quantities() {
        assert_eq!(
            ensure_positive(Decimal::ZERO),
            Err(InventoryError::InvalidQuantity(Decimal::ZERO))
        );
        assert!(ensure_positive(d("-1")).is_err());
        assert_eq!(ensure_positive(d("0.5")), Ok(d("0.5")));
    }

    #[test]
    fn rejects_quantities_the_ledger_cannot_store() {
        let huge = d("100000000000000000000");
        assert_eq!(ensure_positive(huge), Err(InventoryError::InvalidQuantity(huge)));
        assert!(ensure_positive(max_amount()).is_err());
        assert!(ensure_positive(d("99999999999999.999999")).is_ok());

        let fine = d("1.0000004");
        assert_eq!(ensure_positive(fine), Err(InventoryError::InvalidQuantity(fine)));
        // Trailing zeros do not count as precision.
        assert!(ensure_positive(d("1.50000000")).is_ok());
    }

    #[test]
    fn rejects_negative_cost() {
        assert!(ensure_cost(d("-0.01")).is_err());
        assert!(ensure_cost(Decimal::ZERO).is_ok());
    }

    #[test]
    fn rejects_unstorable_cost() {
        let err = ensure_cost(d("1.0000004")).unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
        assert!(ensure_cost(d("1000000000000000")).is_err());
        assert!(ensure_checked(None, "subtotal").is_err());
        assert_eq!(ensure_checked(Some(d("2.5")), "subtotal"), Ok(d("2.5")));
    }

    #[test]
    fn blends_two_purchases() {
        let first = weighted_average(Decimal::ZERO, Decimal::ZERO, d("10"), d("5")).unwrap();
        assert_eq!(first, d("5"));
        let second = weighted_average(d("10"), first, d("10"), d("7")).unwrap();
        assert_eq!(second, d("6"));
    }

    #[test]
    fn many_small_purchases_do_not_drift() {
        let mut qty = Decimal::ZERO;
        let mut avg = Decimal::ZERO;
        for _ in 0..1000 {
            avg = weighted_average(qty, avg, d("0.1"), d("0.3")).unwrap();
            qty += d("0.1");
        }
        assert_eq!(avg, d("0.3"));
        assert_eq!(qty, d("100"));
    }

    #[test]
    fn rounds_to_cost_scale() {
        let avg = weighted_average(d("3"), d("1"), d("3"), d("2")).unwrap();
        assert_eq!(avg, d("1.5"));
        let avg = weighted_average(d("2"), d("1"), d("1"), d("2")).unwrap();
        assert_eq!(avg, d("1.333333"));
    }

    #[test]
    fn empty_stock_takes_inbound_cost_in_canonical_form() {
        let avg = weighted_average(d("-3"), d("4"), d("3"), d("5.00")).unwrap();
        assert_eq!(avg.to_string(), "5");
        let avg = weighted_average(d("10"), d("5"), d("10"), d("7.00")).unwrap();
        assert_eq!(avg.to_string(), "6");
    }

    #[test]
    fn overflowing_blend_is_an_error() {
        let big = Decimal::MAX;
        assert!(weighted_average(big, big, big, big).is_err());
        assert!(weighted_average(d("1"), d("1"), big, d("2")).is_err());
    }
}
