//! Replacement store selection for a single peer
//!
//! Only the piece of replica repair the balancer needs: given a region and
//! the peer about to leave, find where its replacement should live.

use cyxcloud_core::StoreId;
use tracing::{debug, warn};

use crate::cluster::Cluster;
use crate::filter::{
    self, ExcludedFilter, Filter, HealthFilter, PendingPeerCountFilter, SnapshotCountFilter,
    StateFilter, StorageThresholdFilter,
};
use crate::info::{Peer, RegionInfo};
use crate::selector::ReplicaSelector;

/// Picks replacement stores for region peers
pub struct ReplicaChecker<'a> {
    cluster: &'a dyn Cluster,
    filters: Vec<Box<dyn Filter>>,
}

impl<'a> ReplicaChecker<'a> {
    /// Create a checker with the default target health filters plus `filters`
    pub fn new(cluster: &'a dyn Cluster, filters: Vec<Box<dyn Filter>>) -> Self {
        let mut all: Vec<Box<dyn Filter>> = vec![
            Box::new(HealthFilter),
            Box::new(SnapshotCountFilter),
            Box::new(PendingPeerCountFilter),
        ];
        all.extend(filters);
        Self {
            cluster,
            filters: all,
        }
    }

    /// Allocate a peer on the best store to replace `old_peer`
    ///
    /// `extra` filters apply to candidate targets on top of the checker's own.
    pub fn select_best_replaced_peer_to_add_replica(
        &self,
        region: &RegionInfo,
        old_peer: &Peer,
        extra: &[&dyn Filter],
    ) -> Option<Peer> {
        let (store_id, _) = self.select_best_replaced_store(region, old_peer, extra)?;
        match self.cluster.alloc_peer(store_id) {
            Ok(peer) => Some(peer),
            Err(e) => {
                warn!(region_id = %region.id, store_id = %store_id, error = %e, "Failed to allocate peer");
                None
            }
        }
    }

    /// Best store to replace `old_peer`, with its diversity score
    ///
    /// Stores already holding any replica of the region, including the one
    /// being vacated, are never returned.
    pub fn select_best_replaced_store(
        &self,
        region: &RegionInfo,
        old_peer: &Peer,
        extra: &[&dyn Filter],
    ) -> Option<(StoreId, f64)> {
        let remaining = region.without_store(old_peer.store_id);
        let excluded = ExcludedFilter::new([], region.store_ids());

        let mut filters = filter::as_refs(&self.filters);
        filters.push(&StateFilter);
        filters.push(&StorageThresholdFilter);
        filters.push(&excluded);

        let labels = &self.cluster.options().location_labels;
        let region_stores = self.cluster.get_region_stores(&remaining);
        let selector = ReplicaSelector::new(region_stores.clone(), labels, filters);

        let target = selector.select_target(self.cluster, self.cluster.get_stores(), extra)?;
        let score = filter::distinct_score(labels, region_stores, target);
        debug!(
            region_id = %region.id,
            old_store = %old_peer.store_id,
            target_store = %target.id,
            distinct_score = score,
            "Selected replacement store"
        );
        Some((target.id, score))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::MemoryCluster;
    use crate::filter::DistinctScoreFilter;
    use crate::info::{StoreInfo, StoreState};
    use crate::options::ScheduleOptions;
    use cyxcloud_core::PeerId;

    fn region_on(stores: &[u64]) -> RegionInfo {
        let peers = stores
            .iter()
            .enumerate()
            .map(|(i, s)| Peer::new(i as u64 + 1, *s))
            .collect();
        RegionInfo::new(1, peers, 10)
    }

    #[test]
    fn test_excludes_current_replica_stores() {
        let mut cluster = MemoryCluster::new(ScheduleOptions::default());
        cluster.put_store(StoreInfo::new(1).with_region_size(100));
        cluster.put_store(StoreInfo::new(2).with_region_size(0));
        cluster.put_store(StoreInfo::new(3).with_region_size(50));
        let region = region_on(&[1, 2]);
        cluster.put_region(region.clone());

        let checker = ReplicaChecker::new(&cluster, vec![]);
        let old = region.store_peer(StoreId(1)).copied().unwrap();
        let peer = checker
            .select_best_replaced_peer_to_add_replica(&region, &old, &[])
            .unwrap();
        assert_eq!(peer.store_id, StoreId(3));
        assert_eq!(peer.id, PeerId(3));
    }

    #[test]
    fn test_no_candidate() {
        let mut cluster = MemoryCluster::new(ScheduleOptions::default());
        for id in 1..=3 {
            cluster.put_store(StoreInfo::new(id));
        }
        let region = region_on(&[1, 2, 3]);
        cluster.put_region(region.clone());

        let checker = ReplicaChecker::new(&cluster, vec![]);
        let old = region.peers[0];
        assert!(checker
            .select_best_replaced_peer_to_add_replica(&region, &old, &[])
            .is_none());
    }

    #[test]
    fn test_skips_offline_and_busy_targets() {
        let mut cluster = MemoryCluster::new(ScheduleOptions::default());
        cluster.put_store(StoreInfo::new(1));
        cluster.put_store(StoreInfo::new(2).with_state(StoreState::Offline));
        let mut busy = StoreInfo::new(3);
        busy.busy = true;
        cluster.put_store(busy);
        cluster.put_store(StoreInfo::new(4).with_region_size(900));
        let region = region_on(&[1]);

        let checker = ReplicaChecker::new(&cluster, vec![]);
        let (store, _) = checker
            .select_best_replaced_store(&region, &region.peers[0], &[])
            .unwrap();
        assert_eq!(store, StoreId(4));
    }

    #[test]
    fn test_distinct_guard_as_extra_filter() {
        let mut opt = ScheduleOptions::default();
        opt.location_labels = vec!["zone".into()];
        let mut cluster = MemoryCluster::new(opt);
        cluster.put_store(StoreInfo::new(1).with_labels(&[("zone", "z1")]));
        cluster.put_store(StoreInfo::new(2).with_labels(&[("zone", "z2")]));
        cluster.put_store(StoreInfo::new(3).with_labels(&[("zone", "z3")]));
        cluster.put_store(StoreInfo::new(4).with_labels(&[("zone", "z2")]));
        let region = region_on(&[1, 2, 3]);
        cluster.put_region(region.clone());

        let source = cluster.get_store(StoreId(1)).unwrap();
        let stores = cluster.get_region_stores(&region);
        let guard = DistinctScoreFilter::new(&cluster.options().location_labels, &stores, source);

        let checker = ReplicaChecker::new(&cluster, vec![]);
        assert!(checker
            .select_best_replaced_store(&region, &region.peers[0], &[&guard])
            .is_none());
    }

    #[test]
    fn test_alloc_failure_yields_none() {
        struct NoAlloc(MemoryCluster);

        impl Cluster for NoAlloc {
            fn get_store(&self, id: StoreId) -> Option<&StoreInfo> {
                self.0.get_store(id)
            }
            fn get_stores(&self) -> Vec<&StoreInfo> {
                self.0.get_stores()
            }
            fn get_store_regions(&self, store_id: StoreId) -> Vec<&RegionInfo> {
                self.0.get_store_regions(store_id)
            }
            fn is_region_hot(&self, id: cyxcloud_core::RegionId) -> bool {
                self.0.is_region_hot(id)
            }
            fn alloc_peer(&self, _store_id: StoreId) -> cyxcloud_core::Result<Peer> {
                Err(cyxcloud_core::CyxCloudError::IdAllocation("allocator down".into()))
            }
            fn options(&self) -> &ScheduleOptions {
                self.0.options()
            }
        }

        let mut inner = MemoryCluster::new(ScheduleOptions::default());
        inner.put_store(StoreInfo::new(1));
        inner.put_store(StoreInfo::new(2));
        let region = region_on(&[1]);
        inner.put_region(region.clone());
        let cluster = NoAlloc(inner);

        let checker = ReplicaChecker::new(&cluster, vec![]);
        assert!(checker
            .select_best_replaced_peer_to_add_replica(&region, &region.peers[0], &[])
            .is_none());
    }
}
