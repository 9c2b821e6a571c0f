use serde::{Deserialize, Serialize};

use stockledger_core::{InventoryError, InventoryResult, ProductId};

/// Product status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductStatus {
    Draft,
    Active,
    Archived,
}

impl ProductStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductStatus::Draft => "draft",
            ProductStatus::Active => "active",
            ProductStatus::Archived => "archived",
        }
    }
}

impl core::str::FromStr for ProductStatus {
    type Err = InventoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(ProductStatus::Draft),
            "active" => Ok(ProductStatus::Active),
            "archived" => Ok(ProductStatus::Archived),
            other => Err(InventoryError::validation(format!(
                "unknown product status '{other}'"
            ))),
        }
    }
}

/// Catalog product as seen by the inventory engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub sku: String,
    pub name: String,
    pub status: ProductStatus,
}

impl Product {
    /// Register a new catalog entry in `Draft`.
    pub fn new(id: ProductId, sku: impl Into<String>, name: impl Into<String>) -> InventoryResult<Self> {
        let sku = sku.into();
        let name = name.into();

        if name.trim().is_empty() {
            return Err(InventoryError::validation("name cannot be empty"));
        }
        if sku.trim().is_empty() {
            return Err(InventoryError::validation("SKU cannot be empty"));
        }

        Ok(Self {
            id,
            sku: sku.trim().to_string(),
            name: name.trim().to_string(),
            status: ProductStatus::Draft,
        })
    }

    /// Convenience for fixtures and seed data: an already active product.
    pub fn active(id: ProductId, sku: impl Into<String>, name: impl Into<String>) -> InventoryResult<Self> {
        let mut product = Self::new(id, sku, name)?;
        product.activate()?;
        Ok(product)
    }

    pub fn activate(&mut self) -> InventoryResult<()> {
        if self.status == ProductStatus::Archived {
            return Err(InventoryError::invariant("archived products cannot be activated"));
        }
        self.status = ProductStatus::Active;
        Ok(())
    }

    pub fn archive(&mut self) {
        self.status = ProductStatus::Archived;
    }

    /// Only active products may be reserved, moved or purchased.
    pub fn can_be_stocked(&self) -> bool {
        self.status == ProductStatus::Active
    }
}

/// Resolve a catalog lookup into a stockable product or `ProductNotFound`.
pub fn require_stockable(product: Option<Product>, id: ProductId) -> InventoryResult<Product> {
    match product {
        Some(p) if p.can_be_stocked() => Ok(p),
        _ => Err(InventoryError::ProductNotFound(id)),
    }
}
