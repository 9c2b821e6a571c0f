use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::{
    Decimal, InventoryError, InventoryResult, LocationId, ProductId, WarehouseId, ensure_checked,
    ensure_storable, weighted_average,
};

/// Identity of a stock line: product × warehouse (× optional location).
///
/// `Ord` is used to lock several lines in a deterministic order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StockKey {
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
    pub location_id: Option<LocationId>,
}

impl StockKey {
    pub fn new(product_id: ProductId, warehouse_id: WarehouseId) -> Self {
        Self {
            product_id,
            warehouse_id,
            location_id: None,
        }
    }

    pub fn at_location(mut self, location_id: Option<LocationId>) -> Self {
        self.location_id = location_id;
        self
    }
}

impl core::fmt::Display for StockKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self.location_id {
            Some(location) => write!(f, "{}@{}/{}", self.product_id, self.warehouse_id, location),
            None => write!(f, "{}@{}", self.product_id, self.warehouse_id),
        }
    }
}

/// Signed change to a stock line.
///
/// Built through the named constructors so each caller states what kind of
/// change it makes; the raw fields stay public for the store layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockDelta {
    pub available: Decimal,
    pub committed: Decimal,
    /// Unit cost of incoming stock; blended into the average when present.
    pub incoming_cost: Option<Decimal>,
}

impl StockDelta {
    /// Stock arriving (purchase, transfer receipt, positive adjustment).
    pub fn inbound(quantity: Decimal, unit_cost: Option<Decimal>) -> Self {
        Self {
            available: quantity,
            committed: Decimal::ZERO,
            incoming_cost: unit_cost,
        }
    }

    /// Free stock leaving (outflow, negative adjustment, transfer dispatch).
    pub fn outbound(quantity: Decimal) -> Self {
        Self {
            available: -quantity,
            committed: Decimal::ZERO,
            incoming_cost: None,
        }
    }

    /// Move free stock into the committed bucket.
    pub fn reserve(quantity: Decimal) -> Self {
        Self {
            available: -quantity,
            committed: quantity,
            incoming_cost: None,
        }
    }

    /// Return committed stock to the free bucket.
    pub fn unreserve(quantity: Decimal) -> Self {
        Self {
            available: quantity,
            committed: -quantity,
            incoming_cost: None,
        }
    }

    /// Committed stock physically leaves.
    pub fn consume_reserved(quantity: Decimal) -> Self {
        Self {
            available: Decimal::ZERO,
            committed: -quantity,
            incoming_cost: None,
        }
    }
}

/// Current quantity/cost aggregate for one stock key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLine {
    pub key: StockKey,
    pub available: Decimal,
    pub committed: Decimal,
    pub average_cost: Decimal,
    /// Low-stock threshold; zero disables alerting for the line.
    pub minimum_stock: Decimal,
    pub updated_at: DateTime<Utc>,
}

impl StockLine {
    /// Zero baseline for a key that has never been stocked.
    pub fn empty(key: StockKey) -> Self {
        Self {
            key,
            available: Decimal::ZERO,
            committed: Decimal::ZERO,
            average_cost: Decimal::ZERO,
            minimum_stock: Decimal::ZERO,
            updated_at: DateTime::<Utc>::UNIX_EPOCH,
        }
    }

    /// Physical quantity in the warehouse (free plus promised).
    pub fn on_hand(&self) -> Decimal {
        self.available + self.committed
    }

    pub fn is_below_minimum(&self) -> bool {
        self.minimum_stock > Decimal::ZERO && self.available <= self.minimum_stock
    }

    /// Apply a delta, keeping both buckets non-negative.
    ///
    /// On error the line is left untouched. Inbound deltas carrying a cost
    /// re-weight `average_cost` against the pre-delta `available`. A bucket
    /// that would leave the storable range is a validation error.
    pub fn apply(&mut self, delta: StockDelta, now: DateTime<Utc>) -> InventoryResult<()> {
        let available = ensure_checked(
            self.available.checked_add(delta.available),
            "available stock",
        )?;
        if available < Decimal::ZERO {
            return Err(InventoryError::InsufficientStock {
                product_id: self.key.product_id,
                requested: -delta.available,
                available: self.available,
            });
        }

        let committed = ensure_checked(
            self.committed.checked_add(delta.committed),
            "committed stock",
        )?;
        if committed < Decimal::ZERO {
            return Err(InventoryError::invariant(format!(
                "committed stock for {} would become {committed}",
                self.key
            )));
        }

        if let Some(cost) = delta.incoming_cost {
            if delta.available > Decimal::ZERO {
                self.average_cost =
                    weighted_average(self.available, self.average_cost, delta.available, cost)?;
            }
        }
        self.available = available;
        self.committed = committed;
        self.updated_at = now;
        Ok(())
    }

    pub fn set_minimum(&mut self, minimum: Decimal, now: DateTime<Utc>) -> InventoryResult<()> {
        if minimum < Decimal::ZERO {
            return Err(InventoryError::validation(format!(
                "minimum stock cannot be negative (got {minimum})"
            )));
        }
        self.minimum_stock = ensure_storable(minimum, "minimum stock")?;
        self.updated_at = now;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn d(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn test_line() -> StockLine {
        StockLine::empty(StockKey::new(ProductId::new(), WarehouseId::new()))
    }

    #[test]
    fn empty_line_is_zero_at_epoch() {
        let line = test_line();
        assert_eq!(line.available, Decimal::ZERO);
        assert_eq!(line.updated_at.timestamp(), 0);

        let json = serde_json::to_value(&line).unwrap();
        assert_eq!(json["available"], "0");
        assert_eq!(json["average_cost"], "0");
    }

    #[test]
    fn two_purchases_average_to_six() {
        let mut line = test_line();
        line.apply(StockDelta::inbound(d("10"), Some(d("5"))), Utc::now()).unwrap();
        line.apply(StockDelta::inbound(d("10"), Some(d("7"))), Utc::now()).unwrap();
        assert_eq!(line.available, d("20"));
        assert_eq!(line.average_cost, d("6"));
    }

    #[test]
    fn outbound_keeps_average_and_rejects_overdraw() {
        let mut line = test_line();
        line.apply(StockDelta::inbound(d("4"), Some(d("2.5"))), Utc::now()).unwrap();
        line.apply(StockDelta::outbound(d("3")), Utc::now()).unwrap();
        assert_eq!(line.average_cost, d("2.5"));

        let before = line.clone();
        let err = line.apply(StockDelta::outbound(d("2")), Utc::now()).unwrap_err();
        assert_eq!(
            err,
            InventoryError::InsufficientStock {
                product_id: line.key.product_id,
                requested: d("2"),
                available: d("1"),
            }
        );
        assert_eq!(line, before);
    }

    #[test]
    fn reserve_then_consume() {
        let mut line = test_line();
        line.apply(StockDelta::inbound(d("20"), None), Utc::now()).unwrap();
        line.apply(StockDelta::reserve(d("5")), Utc::now()).unwrap();
        assert_eq!((line.available, line.committed), (d("15"), d("5")));
        line.apply(StockDelta::consume_reserved(d("5")), Utc::now()).unwrap();
        assert_eq!((line.available, line.committed), (d("15"), d("0")));
        assert!(line.apply(StockDelta::consume_reserved(d("1")), Utc::now()).is_err());
    }

    #[test]
    fn below_minimum_needs_a_threshold() {
        let mut line = test_line();
        assert!(!line.is_below_minimum());
        line.set_minimum(d("3"), Utc::now()).unwrap();
        assert!(line.is_below_minimum());
        line.apply(StockDelta::inbound(d("4"), None), Utc::now()).unwrap();
        assert!(!line.is_below_minimum());
        assert!(line.set_minimum(d("-1"), Utc::now()).is_err());
        assert!(line.set_minimum(d("0.0000001"), Utc::now()).is_err());
        assert_eq!(line.minimum_stock, d("3"));
    }

    #[test]
    fn inbound_past_storable_range_is_rejected_untouched() {
        let mut line = test_line();
        line.apply(StockDelta::inbound(d("99999999999999"), Some(d("1"))), Utc::now())
            .unwrap();
        let before = line.clone();

        let err = line
            .apply(StockDelta::inbound(d("1"), Some(d("1"))), Utc::now())
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
        assert_eq!(line, before);

        let err = line
            .apply(StockDelta::unreserve(Decimal::MAX), Utc::now())
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
        assert_eq!(line, before);
    }

    #[derive(Debug, Clone)]
    enum Op {
        In(u32, u32),
        Out(u32),
        Reserve(u32),
        Unreserve(u32),
        Consume(u32),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (1u32..50, 0u32..1000).prop_map(|(q, c)| Op::In(q, c)),
            (1u32..50).prop_map(Op::Out),
            (1u32..50).prop_map(Op::Reserve),
            (1u32..50).prop_map(Op::Unreserve),
            (1u32..50).prop_map(Op::Consume),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 256, .. ProptestConfig::default() })]

        /// Property: whatever sequence is attempted, both buckets stay non-negative
        /// and rejected deltas leave the line untouched.
        #[test]
        fn buckets_never_go_negative(ops in prop::collection::vec(op(), 1..60)) {
            let mut line = test_line();
            for op in ops {
                let delta = match op {
                    Op::In(q, c) => StockDelta::inbound(Decimal::from(q), Some(Decimal::new(i64::from(c), 2))),
                    Op::Out(q) => StockDelta::outbound(Decimal::from(q)),
                    Op::Reserve(q) => StockDelta::reserve(Decimal::from(q)),
                    Op::Unreserve(q) => StockDelta::unreserve(Decimal::from(q)),
                    Op::Consume(q) => StockDelta::consume_reserved(Decimal::from(q)),
                };
                let before = line.clone();
                if line.apply(delta, Utc::now()).is_err() {
                    prop_assert_eq!(&line, &before);
                }
                prop_assert!(line.available >= Decimal::ZERO);
                prop_assert!(line.committed >= Decimal::ZERO);
                prop_assert!(line.average_cost >= Decimal::ZERO);
            }
        }

        /// Property: reserve followed by unreserve restores both buckets exactly.
        #[test]
        fn reserve_release_is_conservative(stock in 1u32..1000, pct in 1u32..=100) {
            let mut line = test_line();
            line.apply(StockDelta::inbound(Decimal::from(stock), None), Utc::now()).unwrap();
            let qty = (Decimal::from(stock) * Decimal::from(pct) / Decimal::from(100)).max(Decimal::ONE);
            let before = (line.available, line.committed);
            line.apply(StockDelta::reserve(qty), Utc::now()).unwrap();
            line.apply(StockDelta::unreserve(qty), Utc::now()).unwrap();
            prop_assert_eq!((line.available, line.committed), before);
        }

        /// Property: the blended average stays between the old and incoming cost.
        #[test]
        fn average_is_bounded(q1 in 1u32..500, c1 in 0u32..10_000, q2 in 1u32..500, c2 in 0u32..10_000) {
            let mut line = test_line();
            let (c1, c2) = (Decimal::new(i64::from(c1), 2), Decimal::new(i64::from(c2), 2));
            line.apply(StockDelta::inbound(Decimal::from(q1), Some(c1)), Utc::now()).unwrap();
            line.apply(StockDelta::inbound(Decimal::from(q2), Some(c2)), Utc::now()).unwrap();
            prop_assert!(line.average_cost >= c1.min(c2));
            prop_assert!(line.average_cost <= c1.max(c2));
        }
    }
}
