//! Parties module: suppliers that feed stock through purchases.
//!
//! Pure domain logic (no IO). Suppliers are deduplicated by normalised tax id.

pub mod supplier;

pub use supplier::{
    ContactInfo, RegisterSupplier, Supplier, SupplierStatus, SupplierUpsert, TaxId,
    resolve_registration,
};
