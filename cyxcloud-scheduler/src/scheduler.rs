//! Scheduler trait and shared scheduler plumbing

use std::sync::Arc;
use std::time::Duration;

use crate::cluster::Cluster;
use crate::limiter::Limiter;
use crate::operator::{OpInfluence, Operator};

/// Shortest pause between two ticks of a scheduler
pub const MIN_SCHEDULE_INTERVAL: Duration = Duration::from_millis(10);
/// Longest pause the back-off may reach
pub const MAX_SCHEDULE_INTERVAL: Duration = Duration::from_secs(5);
/// Growth factor applied after an unproductive tick
pub const SCHEDULE_INTERVAL_FACTOR: f64 = 1.3;

/// A placement scheduler driven once per tick
pub trait Scheduler: Send + Sync {
    /// Instance name used in logs and metrics
    fn get_name(&self) -> &str;

    /// Registry type name
    fn get_type(&self) -> &str;

    fn get_min_interval(&self) -> Duration {
        MIN_SCHEDULE_INTERVAL
    }

    /// Interval to wait after an unproductive tick that followed `interval`
    fn get_next_interval(&self, interval: Duration) -> Duration {
        let next = interval.mul_f64(SCHEDULE_INTERVAL_FACTOR);
        next.clamp(self.get_min_interval(), MAX_SCHEDULE_INTERVAL)
    }

    /// Whether another operator of this scheduler's kind may start now
    fn is_schedule_allowed(&self, cluster: &dyn Cluster) -> bool;

    /// Make at most one decision against the current cluster view
    fn schedule(&self, cluster: &dyn Cluster, influence: &OpInfluence) -> Option<Operator>;
}

/// State common to all schedulers
#[derive(Debug, Clone)]
pub struct BaseScheduler {
    limiter: Arc<Limiter>,
}

impl BaseScheduler {
    pub fn new(limiter: Arc<Limiter>) -> Self {
        Self { limiter }
    }

    pub fn limiter(&self) -> &Limiter {
        &self.limiter
    }
}
