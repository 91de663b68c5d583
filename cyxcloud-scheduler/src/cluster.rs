//! Read-only cluster view consumed by schedulers
//!
//! The metadata service materializes a snapshot per tick; schedulers never
//! observe it changing during a call. [`MemoryCluster`] is the in-process
//! implementation, loadable from a JSON snapshot.

use cyxcloud_core::{CyxCloudError, PeerId, RegionId, Result, StoreId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

use crate::info::{Peer, RegionInfo, StoreInfo};
use crate::options::ScheduleOptions;

/// Cluster view trait for dependency injection
pub trait Cluster: Send + Sync {
    fn get_store(&self, id: StoreId) -> Option<&StoreInfo>;

    /// All known stores, ordered by id
    fn get_stores(&self) -> Vec<&StoreInfo>;

    /// Regions with a replica on `store_id`, ordered by region id
    fn get_store_regions(&self, store_id: StoreId) -> Vec<&RegionInfo>;

    /// Stores holding a replica of `region`
    ///
    /// Peers on unknown stores are skipped.
    fn get_region_stores(&self, region: &RegionInfo) -> Vec<&StoreInfo> {
        region
            .peers
            .iter()
            .filter_map(|p| self.get_store(p.store_id))
            .collect()
    }

    fn is_region_hot(&self, id: RegionId) -> bool;

    /// Allocate a new peer id placed on `store_id`
    fn alloc_peer(&self, store_id: StoreId) -> Result<Peer>;

    fn options(&self) -> &ScheduleOptions;
}

/// Serializable cluster snapshot
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterSnapshot {
    pub options: ScheduleOptions,
    pub stores: Vec<StoreInfo>,
    pub regions: Vec<RegionInfo>,
    pub hot_regions: Vec<RegionId>,
    /// First peer id to hand out; derived from existing peers when absent
    pub next_peer_id: Option<u64>,
}

/// In-memory cluster view
#[derive(Debug, Default)]
pub struct MemoryCluster {
    options: ScheduleOptions,
    stores: BTreeMap<StoreId, StoreInfo>,
    regions: BTreeMap<RegionId, RegionInfo>,
    hot_regions: HashSet<RegionId>,
    next_peer_id: AtomicU64,
}

impl MemoryCluster {
    pub fn new(options: ScheduleOptions) -> Self {
        Self {
            options,
            next_peer_id: AtomicU64::new(1),
            ..Default::default()
        }
    }

    pub fn from_snapshot(snapshot: ClusterSnapshot) -> Self {
        let mut cluster = Self::new(snapshot.options);
        for store in snapshot.stores {
            cluster.put_store(store);
        }
        for region in snapshot.regions {
            cluster.put_region(region);
        }
        for id in snapshot.hot_regions {
            cluster.set_region_hot(id, true);
        }
        if let Some(next) = snapshot.next_peer_id {
            cluster.next_peer_id.fetch_max(next, Ordering::SeqCst);
        }
        cluster
    }

    /// Load a JSON snapshot from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let snapshot: ClusterSnapshot = serde_json::from_str(&raw)?;
        debug!(
            path = %path.display(),
            stores = snapshot.stores.len(),
            regions = snapshot.regions.len(),
            "Loaded cluster snapshot"
        );
        Ok(Self::from_snapshot(snapshot))
    }

    pub fn put_store(&mut self, store: StoreInfo) {
        self.stores.insert(store.id, store);
    }

    /// Insert or replace a region, keeping the peer id allocator ahead of it
    pub fn put_region(&mut self, region: RegionInfo) {
        if let Some(max) = region.peers.iter().map(|p| p.id.get()).max() {
            self.next_peer_id.fetch_max(max + 1, Ordering::SeqCst);
        }
        self.regions.insert(region.id, region);
    }

    pub fn set_region_hot(&mut self, id: RegionId, hot: bool) {
        if hot {
            self.hot_regions.insert(id);
        } else {
            self.hot_regions.remove(&id);
        }
    }

    pub fn options_mut(&mut self) -> &mut ScheduleOptions {
        &mut self.options
    }

    pub fn store_mut(&mut self, id: StoreId) -> Option<&mut StoreInfo> {
        self.stores.get_mut(&id)
    }
}

impl Cluster for MemoryCluster {
    fn get_store(&self, id: StoreId) -> Option<&StoreInfo> {
        self.stores.get(&id)
    }

    fn get_stores(&self) -> Vec<&StoreInfo> {
        self.stores.values().collect()
    }

    fn get_store_regions(&self, store_id: StoreId) -> Vec<&RegionInfo> {
        self.regions
            .values()
            .filter(|r| r.store_peer(store_id).is_some())
            .collect()
    }

    fn is_region_hot(&self, id: RegionId) -> bool {
        self.hot_regions.contains(&id)
    }

    fn alloc_peer(&self, store_id: StoreId) -> Result<Peer> {
        if !self.stores.contains_key(&store_id) {
            return Err(CyxCloudError::StoreNotFound(store_id));
        }
        let id = self.next_peer_id.fetch_add(1, Ordering::SeqCst);
        if id == u64::MAX {
            return Err(CyxCloudError::IdAllocation("peer id space exhausted".into()));
        }
        Ok(Peer {
            id: PeerId(id),
            store_id,
        })
    }

    fn options(&self) -> &ScheduleOptions {
        &self.options
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sample_cluster() -> MemoryCluster {
        let mut cluster = MemoryCluster::new(ScheduleOptions::default());
        for id in 1..=3 {
            cluster.put_store(StoreInfo::new(id));
        }
        cluster.put_region(RegionInfo::new(
            10,
            vec![Peer::new(100, 1), Peer::new(101, 2)],
            8,
        ));
        cluster.put_region(RegionInfo::new(5, vec![Peer::new(102, 2)], 8));
        cluster
    }

    #[test]
    fn test_store_regions_ordered() {
        let cluster = sample_cluster();
        let ids: Vec<_> = cluster
            .get_store_regions(StoreId(2))
            .iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec![RegionId(5), RegionId(10)]);
        assert!(cluster.get_store_regions(StoreId(3)).is_empty());
    }

    #[test]
    fn test_region_stores_skip_unknown() {
        let mut cluster = sample_cluster();
        let region = RegionInfo::new(11, vec![Peer::new(103, 1), Peer::new(104, 99)], 1);
        cluster.put_region(region.clone());
        assert_eq!(cluster.get_region_stores(&region).len(), 1);
    }

    #[test]
    fn test_alloc_peer_after_existing_ids() {
        let cluster = sample_cluster();
        let peer = cluster.alloc_peer(StoreId(3)).unwrap();
        assert_eq!(peer.id, PeerId(103));
        assert_eq!(peer.store_id, StoreId(3));
        assert_eq!(cluster.alloc_peer(StoreId(3)).unwrap().id, PeerId(104));
    }

    #[test]
    fn test_alloc_peer_unknown_store() {
        let cluster = sample_cluster();
        let err = cluster.alloc_peer(StoreId(42)).unwrap_err();
        assert!(matches!(err, CyxCloudError::StoreNotFound(StoreId(42))));
    }

    #[test]
    fn test_hot_regions() {
        let mut cluster = sample_cluster();
        assert!(!cluster.is_region_hot(RegionId(10)));
        cluster.set_region_hot(RegionId(10), true);
        assert!(cluster.is_region_hot(RegionId(10)));
        cluster.set_region_hot(RegionId(10), false);
        assert!(!cluster.is_region_hot(RegionId(10)));
    }

    #[test]
    fn test_load_snapshot_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "options": {{"max_replicas": 2}},
                "stores": [{{"id": 1, "region_size": 10}}, {{"id": 2}}],
                "regions": [{{"id": 7, "peers": [{{"id": 3, "store_id": 1}}], "approximate_size": 10}}],
                "hot_regions": [7],
                "next_peer_id": 50
            }}"#
        )
        .unwrap();

        let cluster = MemoryCluster::load(file.path()).unwrap();
        assert_eq!(cluster.options().max_replicas, 2);
        assert_eq!(cluster.get_stores().len(), 2);
        assert!(cluster.is_region_hot(RegionId(7)));
        assert_eq!(cluster.alloc_peer(StoreId(2)).unwrap().id, PeerId(50));
    }

    #[test]
    fn test_load_missing_file() {
        let err = MemoryCluster::load("/nonexistent/snapshot.json").unwrap_err();
        assert!(matches!(err, CyxCloudError::Io(_)));
    }
}
