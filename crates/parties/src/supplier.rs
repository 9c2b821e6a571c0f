use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::{InventoryError, InventoryResult, SupplierId, UserId};

/// Normalised tax identifier (uppercase, separators removed).
///
/// Two spellings of the same tax id ("1234567-8", "12345678 ") compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaxId(String);

impl TaxId {
    pub fn parse(raw: &str) -> InventoryResult<Self> {
        let normalised: String = raw
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '-' && *c != '.')
            .flat_map(char::to_uppercase)
            .collect();

        if normalised.is_empty() {
            return Err(InventoryError::validation("tax id cannot be empty"));
        }
        if !normalised.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(InventoryError::validation(format!(
                "tax id '{raw}' contains invalid characters"
            )));
        }
        Ok(Self(normalised))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for TaxId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Supplier status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SupplierStatus {
    Active,
    Suspended,
}

impl SupplierStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SupplierStatus::Active => "active",
            SupplierStatus::Suspended => "suspended",
        }
    }
}

impl core::str::FromStr for SupplierStatus {
    type Err = InventoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(SupplierStatus::Active),
            "suspended" => Ok(SupplierStatus::Suspended),
            other => Err(InventoryError::validation(format!(
                "unknown supplier status '{other}'"
            ))),
        }
    }
}

/// Contact information for a supplier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfo {
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub contact_name: Option<String>,
}

/// Supplier party record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Supplier {
    pub id: SupplierId,
    pub name: String,
    pub tax_id: TaxId,
    pub contact: ContactInfo,
    pub status: SupplierStatus,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Supplier {
    /// Invariant helper: suspended suppliers cannot take part in new purchases.
    pub fn can_transact(&self) -> bool {
        self.status == SupplierStatus::Active
    }
}

/// Command: register (or update) a supplier keyed by tax id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterSupplier {
    /// Set when the caller edits a known supplier; `None` upserts by tax id.
    pub supplier_id: Option<SupplierId>,
    pub name: String,
    pub tax_id: String,
    pub contact: Option<ContactInfo>,
    pub actor: UserId,
}

/// Outcome of a supplier registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupplierUpsert {
    Created(Supplier),
    Updated(Supplier),
}

impl SupplierUpsert {
    pub fn supplier(&self) -> &Supplier {
        match self {
            SupplierUpsert::Created(s) | SupplierUpsert::Updated(s) => s,
        }
    }

    pub fn into_supplier(self) -> Supplier {
        match self {
            SupplierUpsert::Created(s) | SupplierUpsert::Updated(s) => s,
        }
    }
}

/// Decide how a registration applies given the current records.
///
/// - `by_tax_id`: the supplier currently bound to the command's tax id.
/// - `by_id`: the supplier named by `cmd.supplier_id`, if any.
///
/// A tax id bound to a different supplier than the one being edited is a
/// `DuplicateSupplier`; otherwise the record is created or updated in place.
pub fn resolve_registration(
    cmd: &RegisterSupplier,
    by_tax_id: Option<Supplier>,
    by_id: Option<Supplier>,
    now: DateTime<Utc>,
) -> InventoryResult<SupplierUpsert> {
    let name = cmd.name.trim();
    if name.is_empty() {
        return Err(InventoryError::validation("name cannot be empty"));
    }
    let tax_id = TaxId::parse(&cmd.tax_id)?;

    let target = match (cmd.supplier_id, by_tax_id) {
        (Some(id), Some(existing)) if existing.id != id => {
            return Err(InventoryError::DuplicateSupplier {
                tax_id: tax_id.to_string(),
                existing: existing.id,
            });
        }
        (Some(_), Some(existing)) => Some(existing),
        (Some(id), None) => Some(by_id.ok_or(InventoryError::SupplierNotFound(id))?),
        (None, existing) => existing,
    };

    let contact = cmd.contact.clone();

    Ok(match target {
        Some(mut supplier) => {
            supplier.name = name.to_string();
            supplier.tax_id = tax_id;
            if let Some(contact) = contact {
                supplier.contact = contact;
            }
            supplier.updated_at = now;
            SupplierUpsert::Updated(supplier)
        }
        None => SupplierUpsert::Created(Supplier {
            id: SupplierId::new(),
            name: name.to_string(),
            tax_id,
            contact: contact.unwrap_or_default(),
            status: SupplierStatus::Active,
            created_by: cmd.actor,
            created_at: now,
            updated_at: now,
        }),
    })
}
