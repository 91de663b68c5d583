//! Scheduler registry
//!
//! Maps scheduler type names to constructors so the driver can build the
//! schedulers named in its configuration.

use cyxcloud_core::{CyxCloudError, Result};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::balance_region::{BalanceRegionScheduler, BALANCE_REGION_TYPE};
use crate::config::SchedulerConfig;
use crate::limiter::Limiter;
use crate::metrics::OutcomeSink;
use crate::scheduler::Scheduler;

/// Builds a scheduler from shared state and its arguments
pub type SchedulerCreator = fn(
    Arc<Limiter>,
    &SchedulerConfig,
    Arc<dyn OutcomeSink>,
    &[String],
) -> Result<Box<dyn Scheduler>>;

#[derive(Default)]
pub struct SchedulerRegistry {
    creators: BTreeMap<String, SchedulerCreator>,
}

impl std::fmt::Debug for SchedulerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.creators.keys()).finish()
    }
}

impl SchedulerRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every built-in scheduler
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.creators.insert(
            BALANCE_REGION_TYPE.to_string(),
            create_balance_region as SchedulerCreator,
        );
        registry
    }

    pub fn register(&mut self, name: &str, creator: SchedulerCreator) -> Result<()> {
        if self.creators.contains_key(name) {
            return Err(CyxCloudError::DuplicateScheduler(name.to_string()));
        }
        self.creators.insert(name.to_string(), creator);
        Ok(())
    }

    pub fn create(
        &self,
        name: &str,
        limiter: Arc<Limiter>,
        config: &SchedulerConfig,
        sink: Arc<dyn OutcomeSink>,
        args: &[String],
    ) -> Result<Box<dyn Scheduler>> {
        let creator = self
            .creators
            .get(name)
            .ok_or_else(|| CyxCloudError::UnknownScheduler(name.to_string()))?;
        creator(limiter, config, sink, args)
    }

    /// Registered type names, sorted
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.creators.keys().map(String::as_str)
    }
}

fn create_balance_region(
    limiter: Arc<Limiter>,
    config: &SchedulerConfig,
    sink: Arc<dyn OutcomeSink>,
    args: &[String],
) -> Result<Box<dyn Scheduler>> {
    if !args.is_empty() {
        return Err(CyxCloudError::InvalidSchedulerArgs {
            name: BALANCE_REGION_TYPE.to_string(),
            reason: format!("takes no arguments, got {}", args.len()),
        });
    }
    Ok(Box::new(BalanceRegionScheduler::new(
        limiter,
        &config.balance_region(),
        sink,
    )))
}
