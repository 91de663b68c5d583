//! CyxCloud Core Library
//!
//! Core abstractions shared by the CyxCloud placement crates.
//! This crate provides:
//! - Store, region and peer identifiers
//! - A TTL cache with bounded extension (store cooldowns)
//! - Common error handling

pub mod cache;
pub mod error;
pub mod ids;

pub use cache::{TtlCache, DEFAULT_MAX_TTL_MULTIPLIER, MAX_CACHE_TTL};
pub use error::{CyxCloudError, Result};
pub use ids::{PeerId, RegionId, StoreId};

/// Default base cooldown for stores that failed to give up a replica
pub const DEFAULT_STORE_CACHE_TTL_SECS: u64 = 30;
