//! Cluster-wide scheduling options
//!
//! Set by operators through the metadata service and read by every
//! scheduler on each tick.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Scheduling options shared by all schedulers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleOptions {
    /// Replicas every region must have
    pub max_replicas: usize,
    /// Ceiling on concurrent region operators
    pub region_schedule_limit: u64,
    /// Location label keys, most significant first (e.g. zone, rack, host)
    pub location_labels: Vec<String>,
    /// Region size multiplier used as the balance tolerance
    pub tolerant_size_ratio: f64,
    /// Per-direction snapshot limit for a store to take part in scheduling
    pub max_snapshot_count: u64,
    pub max_pending_peer_count: u64,
    /// Stores without a heartbeat for longer than this are treated as down
    pub max_store_down_time_secs: u64,
    /// Used/capacity ratio above which a store will not receive replicas
    pub low_space_ratio: f64,
}

impl Default for ScheduleOptions {
    fn default() -> Self {
        Self {
            max_replicas: 3,
            region_schedule_limit: 4,
            location_labels: Vec::new(),
            tolerant_size_ratio: 2.5,
            max_snapshot_count: 3,
            max_pending_peer_count: 16,
            max_store_down_time_secs: 30 * 60,
            low_space_ratio: 0.8,
        }
    }
}

impl ScheduleOptions {
    pub fn max_store_down_time(&self) -> Duration {
        Duration::from_secs(self.max_store_down_time_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let opt = ScheduleOptions::default();
        assert_eq!(opt.max_replicas, 3);
        assert_eq!(opt.region_schedule_limit, 4);
        assert_eq!(opt.max_store_down_time(), Duration::from_secs(1800));
        assert!(opt.location_labels.is_empty());
    }

    #[test]
    fn test_partial_deserialize() {
        let opt: ScheduleOptions =
            serde_json::from_str(r#"{"max_replicas": 5, "location_labels": ["zone", "host"]}"#)
                .unwrap();
        assert_eq!(opt.max_replicas, 5);
        assert_eq!(opt.location_labels, vec!["zone", "host"]);
        assert_eq!(opt.tolerant_size_ratio, 2.5);
    }
}
