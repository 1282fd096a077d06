//! Strongly-typed identifiers and the replication stream key.
//!
//! Following `TigerStyle`: explicit types prevent bugs from mixing up IDs.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Macro to generate strongly-typed ID wrappers.
///
/// Each ID type wraps a u64 and provides type safety, Debug/Display
/// formatting and ordering by the raw value.
macro_rules! define_id {
    ($name:ident, $prefix:expr, $doc:expr) => {
        #[doc = $doc]
        #[derive(
            Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
        )]
        #[repr(transparent)]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            /// Creates a new ID from a raw u64 value.
            #[inline]
            #[must_use]
            pub const fn new(value: u64) -> Self {
                Self(value)
            }

            /// Returns the raw u64 value.
            #[inline]
            #[must_use]
            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", $prefix, self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}{}", $prefix, self.0)
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self::new(value)
            }
        }

        impl From<$name> for u64 {
            fn from(id: $name) -> Self {
                id.get()
            }
        }
    };
}

define_id!(StoreId, "s", "Identifier of a store, the destination of a replication stream.");
define_id!(TenantId, "t", "Identifier of the tenant whose traffic a stream carries.");
define_id!(RangeId, "r", "Identifier of the range whose leader owns a flow handle.");

/// A replication stream: traffic from one tenant towards one store.
///
/// Streams are the unit against which flow tokens are deducted and returned.
/// The store ID is the stable sort key used when iterating connected streams.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Stream {
    /// Tenant the replicated traffic belongs to.
    pub tenant_id: TenantId,
    /// Store receiving the replicated traffic.
    pub store_id: StoreId,
}

impl Stream {
    /// Creates a stream for the given tenant and store.
    #[must_use]
    pub const fn new(tenant_id: TenantId, store_id: StoreId) -> Self {
        Self {
            tenant_id,
            store_id,
        }
    }

    /// Creates a stream for the system tenant.
    #[must_use]
    pub const fn for_store(store_id: StoreId) -> Self {
        Self::new(TenantId::SYSTEM, store_id)
    }
}

impl TenantId {
    /// The system tenant.
    pub const SYSTEM: Self = Self(1);
}

impl fmt::Debug for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.tenant_id, self.store_id)
    }
}
