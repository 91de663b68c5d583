//! Identifiers for stores, regions and peers
//!
//! All three are allocated by the metadata service and are plain `u64`
//! values on the wire. The newtypes keep them from being mixed up.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(
            Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            /// Create a new identifier from its raw value
            pub const fn new(id: u64) -> Self {
                Self(id)
            }

            /// Get the raw value
            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl From<u64> for $name {
            fn from(id: u64) -> Self {
                Self(id)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "({})"), self.0)
            }
        }
    };
}

define_id!(
    /// Storage process identifier
    StoreId,
    "StoreId"
);

define_id!(
    /// Region (key range shard) identifier
    RegionId,
    "RegionId"
);

define_id!(
    /// Replica identifier, unique across the cluster
    PeerId,
    "PeerId"
);
