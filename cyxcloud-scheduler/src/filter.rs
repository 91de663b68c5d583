//! Store eligibility filters
//!
//! A filter looks at one store and decides whether it may act as the source
//! or the target of a replica move. Filters are independent; a chain is their
//! conjunction and stops at the first rejection. New kinds of checks are new
//! [`Filter`] implementors.

use cyxcloud_core::{StoreId, TtlCache};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::trace;

use crate::info::StoreInfo;
use crate::options::ScheduleOptions;

/// Base of the per-level diversity weight
const REPLICA_BASE_SCORE: f64 = 100.0;

/// Store predicate. `true` means the store is rejected.
pub trait Filter: Send + Sync {
    fn name(&self) -> &str;

    /// Whether `store` must not give up a replica
    fn filter_source(&self, opt: &ScheduleOptions, store: &StoreInfo) -> bool;

    /// Whether `store` must not receive a replica
    fn filter_target(&self, opt: &ScheduleOptions, store: &StoreInfo) -> bool;
}

/// Run `filters` for a source store, stopping at the first rejection
pub fn filter_source(opt: &ScheduleOptions, store: &StoreInfo, filters: &[&dyn Filter]) -> bool {
    filters.iter().any(|f| {
        let rejected = f.filter_source(opt, store);
        if rejected {
            trace!(store_id = %store.id, filter = f.name(), "Source store filtered");
        }
        rejected
    })
}

/// Run `filters` for a target store, stopping at the first rejection
pub fn filter_target(opt: &ScheduleOptions, store: &StoreInfo, filters: &[&dyn Filter]) -> bool {
    filters.iter().any(|f| {
        let rejected = f.filter_target(opt, store);
        if rejected {
            trace!(store_id = %store.id, filter = f.name(), "Target store filtered");
        }
        rejected
    })
}

/// Borrow a boxed filter list as trait object references
pub fn as_refs(filters: &[Box<dyn Filter>]) -> Vec<&dyn Filter> {
    filters.iter().map(|f| f.as_ref()).collect()
}

// =============================================================================
// FILTERS
// =============================================================================

/// Rejects sources that are cooling down after a failed move
pub struct CacheFilter {
    cache: Arc<TtlCache<StoreId>>,
}

impl CacheFilter {
    pub fn new(cache: Arc<TtlCache<StoreId>>) -> Self {
        Self { cache }
    }
}

impl Filter for CacheFilter {
    fn name(&self) -> &str {
        "cache-filter"
    }

    fn filter_source(&self, _opt: &ScheduleOptions, store: &StoreInfo) -> bool {
        self.cache.exists(store.id)
    }

    fn filter_target(&self, _opt: &ScheduleOptions, _store: &StoreInfo) -> bool {
        false
    }
}

/// Rejects stores that are offline or removed
pub struct StateFilter;

impl Filter for StateFilter {
    fn name(&self) -> &str {
        "state-filter"
    }

    fn filter_source(&self, _opt: &ScheduleOptions, store: &StoreInfo) -> bool {
        !store.is_up()
    }

    fn filter_target(&self, _opt: &ScheduleOptions, store: &StoreInfo) -> bool {
        !store.is_up()
    }
}

/// Rejects busy stores and stores that stopped heartbeating
pub struct HealthFilter;

impl HealthFilter {
    fn unhealthy(opt: &ScheduleOptions, store: &StoreInfo) -> bool {
        store.busy || store.down_time() > opt.max_store_down_time()
    }
}

impl Filter for HealthFilter {
    fn name(&self) -> &str {
        "health-filter"
    }

    fn filter_source(&self, opt: &ScheduleOptions, store: &StoreInfo) -> bool {
        Self::unhealthy(opt, store)
    }

    fn filter_target(&self, opt: &ScheduleOptions, store: &StoreInfo) -> bool {
        Self::unhealthy(opt, store)
    }
}

/// Rejects stores with too many snapshots in flight
pub struct SnapshotCountFilter;

impl SnapshotCountFilter {
    fn too_many(opt: &ScheduleOptions, store: &StoreInfo) -> bool {
        store.sending_snap_count > opt.max_snapshot_count
            || store.receiving_snap_count > opt.max_snapshot_count
            || store.applying_snap_count > opt.max_snapshot_count
    }
}

impl Filter for SnapshotCountFilter {
    fn name(&self) -> &str {
        "snapshot-count-filter"
    }

    fn filter_source(&self, opt: &ScheduleOptions, store: &StoreInfo) -> bool {
        Self::too_many(opt, store)
    }

    fn filter_target(&self, opt: &ScheduleOptions, store: &StoreInfo) -> bool {
        Self::too_many(opt, store)
    }
}

/// Rejects stores that are running out of disk
pub struct StorageThresholdFilter;

impl Filter for StorageThresholdFilter {
    fn name(&self) -> &str {
        "storage-threshold-filter"
    }

    fn filter_source(&self, opt: &ScheduleOptions, store: &StoreInfo) -> bool {
        store.is_low_space(opt.low_space_ratio)
    }

    fn filter_target(&self, opt: &ScheduleOptions, store: &StoreInfo) -> bool {
        store.is_low_space(opt.low_space_ratio)
    }
}

/// Rejects stores with too many peers still catching up
pub struct PendingPeerCountFilter;

impl Filter for PendingPeerCountFilter {
    fn name(&self) -> &str {
        "pending-peer-filter"
    }

    fn filter_source(&self, opt: &ScheduleOptions, store: &StoreInfo) -> bool {
        store.pending_peer_count > opt.max_pending_peer_count
    }

    fn filter_target(&self, opt: &ScheduleOptions, store: &StoreInfo) -> bool {
        store.pending_peer_count > opt.max_pending_peer_count
    }
}

/// Rejects explicitly listed stores
#[derive(Debug, Default)]
pub struct ExcludedFilter {
    sources: HashSet<StoreId>,
    targets: HashSet<StoreId>,
}

impl ExcludedFilter {
    pub fn new(
        sources: impl IntoIterator<Item = StoreId>,
        targets: impl IntoIterator<Item = StoreId>,
    ) -> Self {
        Self {
            sources: sources.into_iter().collect(),
            targets: targets.into_iter().collect(),
        }
    }
}

impl Filter for ExcludedFilter {
    fn name(&self) -> &str {
        "exclude-filter"
    }

    fn filter_source(&self, _opt: &ScheduleOptions, store: &StoreInfo) -> bool {
        self.sources.contains(&store.id)
    }

    fn filter_target(&self, _opt: &ScheduleOptions, store: &StoreInfo) -> bool {
        self.targets.contains(&store.id)
    }
}

/// Diversity of `candidate` against the other replica stores
///
/// Every store that differs from `candidate` at label level `i` contributes
/// `100^(levels - i - 1)`, so a different zone outweighs any number of
/// different hosts. Stores sharing a location, and `candidate` itself,
/// contribute nothing.
pub fn distinct_score<'a>(
    labels: &[String],
    stores: impl IntoIterator<Item = &'a StoreInfo>,
    candidate: &StoreInfo,
) -> f64 {
    stores
        .into_iter()
        .filter(|s| s.id != candidate.id)
        .filter_map(|s| s.compare_location(candidate, labels))
        .map(|index| REPLICA_BASE_SCORE.powi((labels.len() - index - 1) as i32))
        .sum()
}

/// Rejects targets that would make a region's replicas less spread out
///
/// Built from the region's current stores and the store being vacated. The
/// replacement must score at least as well as the vacated store did against
/// the replicas that stay.
pub struct DistinctScoreFilter {
    labels: Vec<String>,
    stores: Vec<StoreInfo>,
    safe_score: f64,
}

impl DistinctScoreFilter {
    pub fn new(labels: &[String], region_stores: &[&StoreInfo], source: &StoreInfo) -> Self {
        let stores: Vec<StoreInfo> = region_stores
            .iter()
            .filter(|s| s.id != source.id)
            .map(|s| (*s).clone())
            .collect();
        let safe_score = distinct_score(labels, &stores, source);
        Self {
            labels: labels.to_vec(),
            stores,
            safe_score,
        }
    }

    /// Score the vacated store achieved; targets must not fall below it
    pub fn safe_score(&self) -> f64 {
        self.safe_score
    }

    pub fn score(&self, candidate: &StoreInfo) -> f64 {
        distinct_score(&self.labels, &self.stores, candidate)
    }
}

impl Filter for DistinctScoreFilter {
    fn name(&self) -> &str {
        "distinct-filter"
    }

    fn filter_source(&self, _opt: &ScheduleOptions, _store: &StoreInfo) -> bool {
        false
    }

    fn filter_target(&self, _opt: &ScheduleOptions, store: &StoreInfo) -> bool {
        self.score(store) < self.safe_score
    }
}
