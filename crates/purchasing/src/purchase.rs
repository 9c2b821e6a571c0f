use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::{
    Decimal, InventoryError, InventoryResult, ProductId, PurchaseId, SupplierId, UserId,
    COST_SCALE, ensure_checked, ensure_cost, ensure_positive,
};

/// One requested purchase line, as received from the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseLineInput {
    pub product_id: ProductId,
    pub quantity: Decimal,
    pub unit_cost: Decimal,
}

/// Validated purchase line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseLine {
    pub line_no: u32,
    pub product_id: ProductId,
    pub quantity: Decimal,
    pub unit_cost: Decimal,
    pub subtotal: Decimal,
}

/// Command: RegisterPurchase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterPurchase {
    pub supplier_id: SupplierId,
    /// Supplier document number (invoice, delivery note). Free text.
    pub reference: Option<String>,
    pub lines: Vec<PurchaseLineInput>,
    pub actor: UserId,
}

/// Direct purchase record. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Purchase {
    pub id: PurchaseId,
    pub supplier_id: SupplierId,
    pub reference: Option<String>,
    pub lines: Vec<PurchaseLine>,
    pub total: Decimal,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
}

impl Purchase {
    /// Validate a purchase command and build the record to persist.
    ///
    /// Rejects empty purchases, non-positive quantities, negative costs,
    /// amounts that do not fit the ledger's numeric columns and any product
    /// that appears on more than one line. Product and supplier
    /// existence are checked by the caller, which owns the lookups.
    pub fn draft(cmd: &RegisterPurchase, now: DateTime<Utc>) -> InventoryResult<Self> {
        if cmd.lines.is_empty() {
            return Err(InventoryError::validation(
                "a purchase needs at least one line",
            ));
        }

        let mut seen = HashSet::with_capacity(cmd.lines.len());
        let mut lines = Vec::with_capacity(cmd.lines.len());
        for (idx, input) in cmd.lines.iter().enumerate() {
            if !seen.insert(input.product_id) {
                return Err(InventoryError::DuplicateProductInPurchase(input.product_id));
            }
            let quantity = ensure_positive(input.quantity)?;
            let unit_cost = ensure_cost(input.unit_cost)?;
            let subtotal = ensure_checked(
                quantity
                    .checked_mul(unit_cost)
                    .map(|value| value.round_dp(COST_SCALE)),
                "line subtotal",
            )?;
            lines.push(PurchaseLine {
                line_no: idx as u32 + 1,
                product_id: input.product_id,
                quantity,
                unit_cost,
                subtotal,
            });
        }

        let total = ensure_checked(
            lines
                .iter()
                .try_fold(Decimal::ZERO, |acc, l| acc.checked_add(l.subtotal)),
            "purchase total",
        )?;
        let reference = cmd
            .reference
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_string);

        Ok(Self {
            id: PurchaseId::new(),
            supplier_id: cmd.supplier_id,
            reference,
            lines,
            total,
            created_by: cmd.actor,
            created_at: now,
        })
    }

    /// Ledger reference written on each inbound movement of this purchase.
    pub fn movement_reference(&self) -> String {
        match &self.reference {
            Some(doc) => format!("PURCHASE:{}:{doc}", self.id),
            None => format!("PURCHASE:{}", self.id),
        }
    }

    pub fn receipt(&self) -> PurchaseReceipt {
        PurchaseReceipt {
            purchase_id: self.id,
            total: self.total,
            line_count: self.lines.len(),
        }
    }
}

/// Result of `registerPurchase`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseReceipt {
    pub purchase_id: PurchaseId,
    pub total: Decimal,
    pub line_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn d(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn line(product_id: ProductId, qty: &str, cost: &str) -> PurchaseLineInput {
        PurchaseLineInput {
            product_id,
            quantity: d(qty),
            unit_cost: d(cost),
        }
    }

    fn cmd(lines: Vec<PurchaseLineInput>) -> RegisterPurchase {
        RegisterPurchase {
            supplier_id: SupplierId::new(),
            reference: Some(" FAC-001 ".to_string()),
            lines,
            actor: UserId::new(),
        }
    }

    #[test]
    fn totals_and_numbers_lines() {
        let (a, b) = (ProductId::new(), ProductId::new());
        let purchase =
            Purchase::draft(&cmd(vec![line(a, "10", "5"), line(b, "2.5", "1.10")]), Utc::now())
                .unwrap();

        assert_eq!(purchase.lines[0].line_no, 1);
        assert_eq!(purchase.lines[1].line_no, 2);
        assert_eq!(purchase.lines[1].subtotal, d("2.75"));
        assert_eq!(purchase.total, d("52.75"));
        assert_eq!(purchase.reference.as_deref(), Some("FAC-001"));

        let receipt = purchase.receipt();
        assert_eq!(receipt.line_count, 2);
        assert_eq!(receipt.total, d("52.75"));
        assert!(purchase.movement_reference().ends_with(":FAC-001"));
    }

    #[test]
    fn duplicate_product_is_rejected() {
        let a = ProductId::new();
        let err = Purchase::draft(
            &cmd(vec![line(a, "1", "1"), line(ProductId::new(), "1", "1"), line(a, "3", "2")]),
            Utc::now(),
        )
        .unwrap_err();
        assert_eq!(err, InventoryError::DuplicateProductInPurchase(a));
    }

    #[test]
    fn rejects_empty_and_invalid_lines() {
        assert!(Purchase::draft(&cmd(vec![]), Utc::now()).is_err());

        let err = Purchase::draft(&cmd(vec![line(ProductId::new(), "0", "1")]), Utc::now())
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_QUANTITY");

        let err = Purchase::draft(&cmd(vec![line(ProductId::new(), "1", "-1")]), Utc::now())
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[test]
    fn amounts_beyond_numeric_range_are_rejected() {
        let huge = d("100000000000000000000");
        let oversized = PurchaseLineInput {
            product_id: ProductId::new(),
            quantity: huge,
            unit_cost: d("1"),
        };
        let err = Purchase::draft(&cmd(vec![line(ProductId::new(), "1", "1"), oversized]), Utc::now())
            .unwrap_err();
        assert_eq!(err, InventoryError::InvalidQuantity(huge));

        let err = Purchase::draft(
            &cmd(vec![line(ProductId::new(), "90000000000000", "90000000000000")]),
            Utc::now(),
        )
        .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");

        let err = Purchase::draft(
            &cmd(vec![
                line(ProductId::new(), "60000000000000", "1"),
                line(ProductId::new(), "60000000000000", "1"),
            ]),
            Utc::now(),
        )
        .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[test]
    fn subtotal_keeps_six_decimals() {
        let purchase = Purchase::draft(
            &cmd(vec![line(ProductId::new(), "0.333333", "0.333333")]),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(purchase.lines[0].subtotal, d("0.111111"));
        assert!(
            Purchase::draft(&cmd(vec![line(ProductId::new(), "1.0000001", "1")]), Utc::now())
                .is_err()
        );
    }

    #[test]
    fn blank_reference_is_dropped() {
        let mut c = cmd(vec![line(ProductId::new(), "1", "1")]);
        c.reference = Some("   ".to_string());
        let purchase = Purchase::draft(&c, Utc::now()).unwrap();
        assert_eq!(purchase.reference, None);
        assert_eq!(purchase.movement_reference(), format!("PURCHASE:{}", purchase.id));
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 256, .. ProptestConfig::default() })]

        /// Property: the total always equals the sum of line subtotals.
        #[test]
        fn total_is_sum_of_subtotals(
            lines in prop::collection::vec((1u32..1000, 0u32..10_000), 1..8)
        ) {
            let inputs: Vec<_> = lines
                .iter()
                .map(|(q, c)| PurchaseLineInput {
                    product_id: ProductId::new(),
                    quantity: Decimal::from(*q),
                    unit_cost: Decimal::new(i64::from(*c), 2),
                })
                .collect();
            let purchase = Purchase::draft(&cmd(inputs.clone()), Utc::now()).unwrap();
            let expected: Decimal = inputs.iter().map(|l| l.quantity * l.unit_cost).sum();
            prop_assert_eq!(purchase.total, expected);
            prop_assert_eq!(purchase.lines.len(), inputs.len());
        }
    }
}
