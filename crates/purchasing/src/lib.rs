//! Purchasing module: direct purchases that bring stock in.
//!
//! Pure domain logic (no IO). The infra engine turns each validated line into
//! an inbound ledger movement and a weighted-average cost update.

pub mod purchase;

pub use purchase::{Purchase, PurchaseLine, PurchaseLineInput, PurchaseReceipt, RegisterPurchase};
