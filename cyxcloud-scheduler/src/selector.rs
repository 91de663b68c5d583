//! Store selectors
//!
//! [`BalanceSelector`] picks the most loaded eligible source.
//! [`ReplicaSelector`] picks the best store for a new replica, putting label
//! diversity ahead of load.

use std::cmp::Ordering;

use crate::cluster::Cluster;
use crate::filter::{self, distinct_score, Filter};
use crate::info::{Peer, RegionInfo, StoreInfo};

/// Higher score first, then lower store id
fn cmp_source(a: &StoreInfo, b: &StoreInfo) -> Ordering {
    a.region_score()
        .total_cmp(&b.region_score())
        .then_with(|| b.id.cmp(&a.id))
}

/// Selects balance sources by region score
pub struct BalanceSelector {
    filters: Vec<Box<dyn Filter>>,
}

impl BalanceSelector {
    pub fn new(filters: Vec<Box<dyn Filter>>) -> Self {
        Self { filters }
    }

    fn chain<'a>(&'a self, extra: &[&'a dyn Filter]) -> Vec<&'a dyn Filter> {
        let mut chain = filter::as_refs(&self.filters);
        chain.extend_from_slice(extra);
        chain
    }

    /// The unfiltered store with the highest region score
    ///
    /// Ties go to the lowest store id.
    pub fn select_source<'c>(
        &self,
        cluster: &'c dyn Cluster,
        extra: &[&dyn Filter],
    ) -> Option<&'c StoreInfo> {
        let chain = self.chain(extra);
        let opt = cluster.options();
        cluster
            .get_stores()
            .into_iter()
            .filter(|s| !filter::filter_source(opt, s, &chain))
            .max_by(|a, b| cmp_source(a, b))
    }
}

/// Pick the replica to move off `store`
///
/// Follower replicas come first because moving them needs no leader
/// transfer; leader replicas are used only when the store follows nothing.
/// Within the chosen group regions are ordered by id and `offset` rotates
/// through them, so successive calls do not keep retrying the same region.
pub fn select_region_peer<'c>(
    cluster: &'c dyn Cluster,
    store: &StoreInfo,
    offset: u64,
) -> Option<(&'c RegionInfo, Peer)> {
    let (followers, leaders): (Vec<&RegionInfo>, Vec<&RegionInfo>) = cluster
        .get_store_regions(store.id)
        .into_iter()
        .partition(|r| r.leader_store_id() != Some(store.id));

    let group = if followers.is_empty() {
        leaders
    } else {
        followers
    };
    if group.is_empty() {
        return None;
    }

    let region = group[(offset % group.len() as u64) as usize];
    region.store_peer(store.id).map(|p| (region, *p))
}

/// Selects a store for a new replica of a region
pub struct ReplicaSelector<'a> {
    region_stores: Vec<&'a StoreInfo>,
    labels: &'a [String],
    filters: Vec<&'a dyn Filter>,
}

impl<'a> ReplicaSelector<'a> {
    pub fn new(
        region_stores: Vec<&'a StoreInfo>,
        labels: &'a [String],
        filters: Vec<&'a dyn Filter>,
    ) -> Self {
        Self {
            region_stores,
            labels,
            filters,
        }
    }

    fn score(&self, store: &StoreInfo) -> f64 {
        distinct_score(self.labels, self.region_stores.iter().copied(), store)
    }

    /// The best target: most diverse, then least loaded, then lowest id
    pub fn select_target<'c>(
        &self,
        cluster: &dyn Cluster,
        stores: Vec<&'c StoreInfo>,
        extra: &[&dyn Filter],
    ) -> Option<&'c StoreInfo> {
        let opt = cluster.options();
        stores
            .into_iter()
            .filter(|s| !filter::filter_target(opt, s, &self.filters))
            .filter(|s| !filter::filter_target(opt, s, extra))
            .map(|s| (self.score(s), s))
            .min_by(|(score_a, a), (score_b, b)| {
                score_b
                    .total_cmp(score_a)
                    .then_with(|| a.region_score().total_cmp(&b.region_score()))
                    .then_with(|| a.id.cmp(&b.id))
            })
            .map(|(_, s)| s)
    }
}
