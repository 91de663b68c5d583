//! CyxCloud Scheduler Library
//!
//! Placement schedulers for CyxCloud regions.
//!
//! The balance-region scheduler evens out region data across stores:
//! - Source and target selection through eligibility filters
//! - Cooldown of stores that cannot currently give up a replica
//! - Label-aware replacement so moves never weaken fault isolation
//! - A tolerance check that stops near-balanced stores from flapping
//! - A move quota that tracks how uneven the cluster is

pub mod balance;
pub mod balance_region;
pub mod cluster;
pub mod config;
pub mod filter;
pub mod info;
pub mod limiter;
pub mod metrics;
pub mod operator;
pub mod options;
pub mod registry;
pub mod replica_checker;
pub mod scheduler;
pub mod selector;

// Re-export main types
pub use balance::{adjust_balance_limit, BalancePolicy};
pub use balance_region::{
    BalanceRegionConfig, BalanceRegionScheduler, BALANCE_REGION_NAME, BALANCE_REGION_TYPE,
};
pub use cluster::{Cluster, ClusterSnapshot, MemoryCluster};
pub use config::{ConfigError, SchedulerConfig};
pub use filter::{DistinctScoreFilter, Filter};
pub use info::{Peer, RegionInfo, StoreInfo, StoreLabel, StoreState};
pub use limiter::Limiter;
pub use metrics::{MetricsOutcomeSink, MetricsServer, OutcomeSink, RecordingSink, ScheduleOutcome};
pub use operator::{create_move_peer_operator, OpInfluence, OpKind, OpStep, Operator, StoreInfluence};
pub use options::ScheduleOptions;
pub use registry::{SchedulerCreator, SchedulerRegistry};
pub use replica_checker::ReplicaChecker;
pub use scheduler::{BaseScheduler, Scheduler};
pub use selector::{BalanceSelector, ReplicaSelector};
