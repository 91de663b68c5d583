//! Balance judgement and adaptive operator limit
//!
//! [`BalancePolicy::should_balance`] decides whether a move is worth it.
//! [`adjust_balance_limit`] sizes the per-tick quota of region moves.

use serde::{Deserialize, Serialize};

use crate::cluster::Cluster;

const MIN_WEIGHT: f64 = 1e-6;

/// Tunable move-acceptance policy
///
/// A move shifts `region_size * shift_factor` from source to target. It is
/// approved only if the source still scores above the target afterwards.
/// With equal weights that means the size gap must exceed twice the shift,
/// which keeps two nearly balanced stores from swapping a region back and
/// forth.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BalancePolicy {
    pub shift_factor: f64,
}

impl Default for BalancePolicy {
    fn default() -> Self {
        Self { shift_factor: 1.0 }
    }
}

impl BalancePolicy {
    pub fn new(shift_factor: f64) -> Self {
        Self {
            shift_factor: shift_factor.max(0.0),
        }
    }

    /// Whether moving a region of (tolerance-scaled) `region_size` pays off
    ///
    /// Sizes should already include pending operator influence.
    pub fn should_balance(
        &self,
        source_size: i64,
        source_weight: f64,
        target_size: i64,
        target_weight: f64,
        region_size: f64,
    ) -> bool {
        let shift = region_size * self.shift_factor;
        let source_score = (source_size as f64 - shift) / source_weight.max(MIN_WEIGHT);
        let target_score = (target_size as f64 + shift) / target_weight.max(MIN_WEIGHT);
        source_score > target_score
    }
}

/// Quota of concurrent region moves for the current cluster shape
///
/// The population standard deviation of region counts over up stores,
/// truncated, and never below 1. The more uneven the cluster, the more
/// moves may run at once.
pub fn adjust_balance_limit(cluster: &dyn Cluster) -> u64 {
    let counts: Vec<f64> = cluster
        .get_stores()
        .into_iter()
        .filter(|s| s.is_up())
        .map(|s| s.region_count as f64)
        .collect();

    standard_deviation(&counts).max(1.0) as u64
}

fn standard_deviation(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    variance.sqrt()
}
