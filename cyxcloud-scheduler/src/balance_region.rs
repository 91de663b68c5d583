//! Balance-region scheduler
//!
//! Moves one replica per tick from the most loaded store to a better one.
//!
//! Each call:
//! 1. Pick the source store and one of its replicas, rotating across ticks
//! 2. Refuse regions with an abnormal replica count, and hot regions
//! 3. Find a replacement store that keeps label diversity
//! 4. Ask the balance policy whether the size gap justifies the move
//! 5. Refresh the move quota and emit the operator
//!
//! Sources that yield no acceptable target are cooled down for a while.

use cyxcloud_core::{StoreId, TtlCache, DEFAULT_MAX_TTL_MULTIPLIER, DEFAULT_STORE_CACHE_TTL_SECS};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::balance::{adjust_balance_limit, BalancePolicy};
use crate::cluster::Cluster;
use crate::filter::{
    CacheFilter, DistinctScoreFilter, Filter, HealthFilter, PendingPeerCountFilter,
    SnapshotCountFilter, StateFilter, StorageThresholdFilter,
};
use crate::info::{Peer, RegionInfo, StoreInfo};
use crate::limiter::Limiter;
use crate::metrics::{OutcomeSink, ScheduleOutcome};
use crate::operator::{create_move_peer_operator, OpInfluence, OpKind, Operator};
use crate::replica_checker::ReplicaChecker;
use crate::scheduler::{BaseScheduler, Scheduler};
use crate::selector::{select_region_peer, BalanceSelector};

pub const BALANCE_REGION_NAME: &str = "balance-region-scheduler";
pub const BALANCE_REGION_TYPE: &str = "balance-region";

/// Balance-region scheduler configuration
#[derive(Debug, Clone)]
pub struct BalanceRegionConfig {
    /// How long a source without a usable target is skipped
    pub store_cache_ttl: Duration,
    /// Repeated failures extend the cooldown up to `ttl * multiplier`
    pub store_cache_max_multiplier: u32,
    pub policy: BalancePolicy,
}

impl Default for BalanceRegionConfig {
    fn default() -> Self {
        Self {
            store_cache_ttl: Duration::from_secs(DEFAULT_STORE_CACHE_TTL_SECS),
            store_cache_max_multiplier: DEFAULT_MAX_TTL_MULTIPLIER,
            policy: BalancePolicy::default(),
        }
    }
}

/// Why a transfer attempt produced nothing
enum Transfer {
    Operator(Operator),
    NoPeer,
    Skip,
}

/// Keeps region sizes balanced across stores
pub struct BalanceRegionScheduler {
    base: BaseScheduler,
    cache: Arc<TtlCache<StoreId>>,
    limit: AtomicU64,
    /// Rotates the region picked from the source store across ticks
    region_cursor: AtomicU64,
    selector: BalanceSelector,
    policy: BalancePolicy,
    sink: Arc<dyn OutcomeSink>,
}

impl BalanceRegionScheduler {
    pub fn new(
        limiter: Arc<Limiter>,
        config: &BalanceRegionConfig,
        sink: Arc<dyn OutcomeSink>,
    ) -> Self {
        let cache = Arc::new(TtlCache::with_multiplier(
            config.store_cache_ttl,
            config.store_cache_max_multiplier,
        ));
        let filters: Vec<Box<dyn Filter>> = vec![
            Box::new(CacheFilter::new(cache.clone())),
            Box::new(StateFilter),
            Box::new(HealthFilter),
            Box::new(SnapshotCountFilter),
            Box::new(StorageThresholdFilter),
            Box::new(PendingPeerCountFilter),
        ];

        Self {
            base: BaseScheduler::new(limiter),
            cache,
            limit: AtomicU64::new(1),
            region_cursor: AtomicU64::new(0),
            selector: BalanceSelector::new(filters),
            policy: config.policy,
            sink,
        }
    }

    /// Stores currently cooling down
    pub fn cache(&self) -> &TtlCache<StoreId> {
        &self.cache
    }

    /// Quota computed after the last approved move, before clamping
    pub fn limit(&self) -> u64 {
        self.limit.load(Ordering::Acquire)
    }

    /// Quota clamped to the cluster's region schedule limit
    pub fn effective_limit(&self, cluster: &dyn Cluster) -> u64 {
        self.limit().min(cluster.options().region_schedule_limit)
    }

    fn next_region_offset(&self) -> u64 {
        self.region_cursor.fetch_add(1, Ordering::Relaxed)
    }

    fn record(&self, outcome: ScheduleOutcome) {
        self.sink.record(BALANCE_REGION_NAME, outcome);
    }

    fn transfer_peer(
        &self,
        cluster: &dyn Cluster,
        region: &RegionInfo,
        source: &StoreInfo,
        old_peer: &Peer,
        influence: &OpInfluence,
    ) -> Transfer {
        let opt = cluster.options();
        let stores = cluster.get_region_stores(region);
        let score_guard = DistinctScoreFilter::new(&opt.location_labels, &stores, source);

        let checker = ReplicaChecker::new(cluster, Vec::new());
        let Some(new_peer) =
            checker.select_best_replaced_peer_to_add_replica(region, old_peer, &[&score_guard])
        else {
            debug!(
                region_id = %region.id,
                source = %source.id,
                safe_score = score_guard.safe_score(),
                "No replacement store keeps the region's spread"
            );
            self.record(ScheduleOutcome::NoPeer);
            return Transfer::NoPeer;
        };
        let Some(target) = cluster.get_store(new_peer.store_id) else {
            self.record(ScheduleOutcome::NoPeer);
            return Transfer::NoPeer;
        };

        debug!(
            region_id = %region.id,
            source = %source.id,
            target = %target.id,
            "Selected move candidate"
        );

        let source_size =
            source.region_size + influence.get_store_influence(source.id).region_size;
        let target_size =
            target.region_size + influence.get_store_influence(target.id).region_size;
        let region_size = region.approximate_size as f64 * opt.tolerant_size_ratio;

        if !self.policy.should_balance(
            source_size,
            source.effective_region_weight(),
            target_size,
            target.effective_region_weight(),
            region_size,
        ) {
            debug!(
                scheduler = BALANCE_REGION_NAME,
                region_id = %region.id,
                source_size,
                source_weight = source.region_weight,
                target_size,
                target_weight = target.region_weight,
                region_size = region.approximate_size,
                "Skip balance region"
            );
            self.record(ScheduleOutcome::Skip);
            return Transfer::Skip;
        }

        self.limit
            .store(adjust_balance_limit(cluster), Ordering::Release);

        Transfer::Operator(create_move_peer_operator(
            BALANCE_REGION_TYPE,
            cluster,
            region,
            OpKind::BALANCE,
            old_peer.store_id,
            new_peer.store_id,
            new_peer.id,
        ))
    }
}

impl Scheduler for BalanceRegionScheduler {
    fn get_name(&self) -> &str {
        BALANCE_REGION_NAME
    }

    fn get_type(&self) -> &str {
        BALANCE_REGION_TYPE
    }

    fn is_schedule_allowed(&self, cluster: &dyn Cluster) -> bool {
        self.base.limiter().operator_count(OpKind::REGION) < self.effective_limit(cluster)
    }

    #[instrument(skip_all, fields(scheduler = BALANCE_REGION_NAME))]
    fn schedule(&self, cluster: &dyn Cluster, influence: &OpInfluence) -> Option<Operator> {
        self.record(ScheduleOutcome::Schedule);
        self.cache.gc();

        let Some(source) = self.selector.select_source(cluster, &[]) else {
            debug!("No source store available");
            self.record(ScheduleOutcome::NoStore);
            return None;
        };
        let offset = self.next_region_offset();
        let Some((region, old_peer)) = select_region_peer(cluster, source, offset) else {
            debug!(store_id = %source.id, "Source store has no regions");
            self.record(ScheduleOutcome::NoRegion);
            return None;
        };

        if region.peers.len() != cluster.options().max_replicas {
            debug!(
                region_id = %region.id,
                replicas = region.peers.len(),
                expected = cluster.options().max_replicas,
                "Region has abnormal replica count"
            );
            self.record(ScheduleOutcome::AbnormalReplica);
            return None;
        }

        if cluster.is_region_hot(region.id) {
            debug!(region_id = %region.id, "Skip hot region");
            self.record(ScheduleOutcome::RegionHot);
            return None;
        }

        match self.transfer_peer(cluster, region, source, &old_peer, influence) {
            Transfer::Operator(op) => {
                self.record(ScheduleOutcome::NewOperator);
                Some(op)
            }
            Transfer::NoPeer => {
                debug!(store_id = %old_peer.store_id, ttl = ?self.cache.ttl(), "Cooling down source store");
                self.cache.put(old_peer.store_id);
                None
            }
            Transfer::Skip => None,
        }
    }
}
