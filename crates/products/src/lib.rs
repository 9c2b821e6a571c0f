//! Products catalog reference.
//!
//! The catalog itself is owned elsewhere; inventory only needs to know whether a
//! product exists and may currently hold or move stock.

pub mod product;

pub use product::{Product, ProductStatus, require_stockable};
