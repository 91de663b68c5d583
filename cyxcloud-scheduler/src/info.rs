//! Store and region descriptors as seen by the scheduler
//!
//! These mirror what stores report in heartbeats. The scheduler only reads
//! them; the metadata service owns and refreshes them.

use cyxcloud_core::{PeerId, RegionId, StoreId};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Weights at or below zero are clamped to this value when scoring.
const MIN_WEIGHT: f64 = 1e-6;

/// Administrative state of a store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreState {
    #[default]
    Up,
    /// Being drained before removal
    Offline,
    /// Removed from the cluster
    Tombstone,
}

/// One location label, e.g. `zone=us-east-1a`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreLabel {
    pub key: String,
    pub value: String,
}

impl StoreLabel {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Store descriptor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreInfo {
    pub id: StoreId,
    pub state: StoreState,
    pub labels: Vec<StoreLabel>,
    /// Relative capacity for region placement (1.0 = normal)
    pub region_weight: f64,
    /// Sum of approximate sizes of regions on this store, in MiB
    pub region_size: i64,
    pub region_count: u64,
    pub leader_count: u64,
    /// Disk capacity in bytes
    pub capacity: u64,
    /// Free disk space in bytes
    pub available: u64,
    pub sending_snap_count: u64,
    pub receiving_snap_count: u64,
    pub applying_snap_count: u64,
    pub pending_peer_count: u64,
    /// Store asked the scheduler to back off
    pub busy: bool,
    /// Time since the last heartbeat was received
    #[serde(with = "duration_secs")]
    pub last_heartbeat_age: Duration,
}

impl Default for StoreInfo {
    fn default() -> Self {
        Self {
            id: StoreId::default(),
            state: StoreState::Up,
            labels: Vec::new(),
            region_weight: 1.0,
            region_size: 0,
            region_count: 0,
            leader_count: 0,
            capacity: 0,
            available: 0,
            sending_snap_count: 0,
            receiving_snap_count: 0,
            applying_snap_count: 0,
            pending_peer_count: 0,
            busy: false,
            last_heartbeat_age: Duration::ZERO,
        }
    }
}

impl StoreInfo {
    /// Create an up, unlabeled store with unit weight
    pub fn new(id: u64) -> Self {
        Self {
            id: StoreId(id),
            ..Default::default()
        }
    }

    pub fn is_up(&self) -> bool {
        self.state == StoreState::Up
    }

    pub fn is_offline(&self) -> bool {
        self.state == StoreState::Offline
    }

    pub fn is_tombstone(&self) -> bool {
        self.state == StoreState::Tombstone
    }

    /// How long the store has gone without a heartbeat
    pub fn down_time(&self) -> Duration {
        self.last_heartbeat_age
    }

    /// Whether used space exceeds `low_space_ratio` of capacity
    ///
    /// Stores that have not reported capacity are never considered low.
    pub fn is_low_space(&self, low_space_ratio: f64) -> bool {
        if self.capacity == 0 {
            return false;
        }
        let used = self.capacity.saturating_sub(self.available);
        used as f64 / self.capacity as f64 > low_space_ratio
    }

    /// Weighted region size; higher means more loaded
    pub fn region_score(&self) -> f64 {
        self.region_score_with_delta(0)
    }

    /// Weighted region size after applying `delta` MiB
    pub fn region_score_with_delta(&self, delta: i64) -> f64 {
        (self.region_size + delta) as f64 / self.effective_region_weight()
    }

    /// Weight used for scoring; non-positive or non-finite weights become tiny
    pub fn effective_region_weight(&self) -> f64 {
        if !self.region_weight.is_finite() || self.region_weight <= 0.0 {
            MIN_WEIGHT
        } else {
            self.region_weight
        }
    }

    /// Value of the label `key`, or `""` when unset
    pub fn label_value(&self, key: &str) -> &str {
        self.labels
            .iter()
            .find(|l| l.key.eq_ignore_ascii_case(key))
            .map(|l| l.value.as_str())
            .unwrap_or("")
    }

    /// Index of the first location level at which the two stores differ
    ///
    /// Returns `None` when they share a location. A label missing on either
    /// side matches anything.
    pub fn compare_location(&self, other: &StoreInfo, keys: &[String]) -> Option<usize> {
        keys.iter().position(|key| {
            let (v1, v2) = (self.label_value(key), other.label_value(key));
            !v1.is_empty() && !v2.is_empty() && !v1.eq_ignore_ascii_case(v2)
        })
    }

    pub fn with_labels(mut self, labels: &[(&str, &str)]) -> Self {
        self.labels = labels.iter().map(|(k, v)| StoreLabel::new(*k, *v)).collect();
        self
    }

    pub fn with_region_size(mut self, size: i64) -> Self {
        self.region_size = size;
        self
    }

    pub fn with_region_weight(mut self, weight: f64) -> Self {
        self.region_weight = weight;
        self
    }

    pub fn with_state(mut self, state: StoreState) -> Self {
        self.state = state;
        self
    }
}

/// One replica of a region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Peer {
    pub id: PeerId,
    pub store_id: StoreId,
}

impl Peer {
    pub fn new(id: u64, store_id: u64) -> Self {
        Self {
            id: PeerId(id),
            store_id: StoreId(store_id),
        }
    }
}

/// Region descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionInfo {
    pub id: RegionId,
    pub peers: Vec<Peer>,
    #[serde(default)]
    pub leader: Option<Peer>,
    /// Approximate size in MiB
    #[serde(default)]
    pub approximate_size: i64,
}

impl RegionInfo {
    /// Create a region led by its first peer
    pub fn new(id: u64, peers: Vec<Peer>, approximate_size: i64) -> Self {
        let leader = peers.first().copied();
        Self {
            id: RegionId(id),
            peers,
            leader,
            approximate_size,
        }
    }

    /// The peer placed on `store_id`, if any
    pub fn store_peer(&self, store_id: StoreId) -> Option<&Peer> {
        self.peers.iter().find(|p| p.store_id == store_id)
    }

    pub fn leader_store_id(&self) -> Option<StoreId> {
        self.leader.map(|p| p.store_id)
    }

    /// Non-leader peers
    pub fn followers(&self) -> impl Iterator<Item = &Peer> {
        let leader = self.leader.map(|p| p.id);
        self.peers.iter().filter(move |p| Some(p.id) != leader)
    }

    /// Stores holding a replica, in peer order
    pub fn store_ids(&self) -> Vec<StoreId> {
        self.peers.iter().map(|p| p.store_id).collect()
    }

    /// Copy of this region with the peer on `store_id` removed
    pub fn without_store(&self, store_id: StoreId) -> RegionInfo {
        let mut region = self.clone();
        region.peers.retain(|p| p.store_id != store_id);
        if region.leader_store_id() == Some(store_id) {
            region.leader = None;
        }
        region
    }
}

mod duration_secs {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Duration::try_from_secs_f64(secs)
            .map_err(|e| D::Error::custom(format!("invalid duration {secs}: {e}")))
    }
}
