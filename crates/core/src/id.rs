//! Strongly-typed identifiers used across the inventory domain.

use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::InventoryError;

macro_rules! uuid_newtype {
    ($(#[$meta:meta])* $t:ident, $name:literal) => {
        $(#[$meta])*
        #[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $t(Uuid);

        impl $t {
            /// Create a new identifier.
            ///
            /// Uses UUIDv7 (time-ordered). Prefer passing IDs explicitly in tests
            /// for determinism.
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $t {
            fn default() -> Self {
                Self::new()
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<Uuid> for $t {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }

        impl From<$t> for Uuid {
            fn from(value: $t) -> Self {
                value.0
            }
        }

        impl FromStr for $t {
            type Err = InventoryError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let uuid = Uuid::from_str(s)
                    .map_err(|e| InventoryError::validation(format!("{}: {}", $name, e)))?;
                Ok(Self(uuid))
            }
        }
    };
}

uuid_newtype!(
    /// Identifier of a user (actor identity, already authorized by the caller).
    UserId,
    "UserId"
);
uuid_newtype!(
    /// Identifier of a catalog product.
    ProductId,
    "ProductId"
);
uuid_newtype!(WarehouseId, "WarehouseId");
uuid_newtype!(
    /// Identifier of a bin/shelf location inside a warehouse.
    LocationId,
    "LocationId"
);
uuid_newtype!(SupplierId, "SupplierId");
uuid_newtype!(PurchaseId, "PurchaseId");
uuid_newtype!(MovementId, "MovementId");
uuid_newtype!(ReservationId, "ReservationId");
uuid_newtype!(TransferId, "TransferId");

impl UserId {
    /// Actor recorded for scheduler-triggered transitions (nil UUID).
    pub const SYSTEM: UserId = UserId::from_uuid(Uuid::nil());

    pub fn is_system(&self) -> bool {
        self.0.is_nil()
    }
}
