//! CyxCloud Scheduler Service
//!
//! Loads a cluster snapshot and drives the registered placement schedulers
//! against it, logging every operator they produce. Operators are never
//! executed: they stay in flight, so the limiter and pending influence
//! shape later decisions the way they would in a live cluster.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::time::Instant;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use cyxcloud_scheduler::metrics::{init_metrics, record_operator};
use cyxcloud_scheduler::{
    Cluster, Limiter, MemoryCluster, MetricsOutcomeSink, MetricsServer, OpInfluence, Operator,
    OutcomeSink, Scheduler, SchedulerConfig, SchedulerRegistry,
};

#[derive(Parser)]
#[command(name = "cyxcloud-scheduler")]
#[command(about = "CyxCloud region placement scheduler")]
struct Cli {
    /// Cluster snapshot (JSON)
    #[arg(long, env = "SCHEDULER_SNAPSHOT_PATH")]
    snapshot: Option<PathBuf>,

    /// Tick interval in milliseconds
    #[arg(long)]
    tick_interval_ms: Option<u64>,

    /// Schedulers to run, comma separated
    #[arg(long, value_delimiter = ',')]
    schedulers: Vec<String>,

    /// Serve Prometheus metrics on this port
    #[arg(long)]
    metrics_port: Option<u16>,

    /// Emit JSON logs
    #[arg(long, default_value = "false")]
    json_logs: bool,

    /// Run every scheduler once and exit
    #[arg(long, default_value = "false")]
    once: bool,

    /// Enable debug logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,
}

impl Cli {
    /// CLI args override environment configuration
    fn apply(&self, config: &mut SchedulerConfig) {
        if let Some(path) = &self.snapshot {
            config.snapshot_path = Some(path.clone());
        }
        if let Some(ms) = self.tick_interval_ms {
            config.tick_interval_ms = ms;
        }
        if !self.schedulers.is_empty() {
            config.schedulers = self.schedulers.clone();
        }
        if self.metrics_port.is_some() {
            config.metrics_port = self.metrics_port;
        }
        config.json_logs |= self.json_logs;
    }
}

fn init_tracing(json: bool, verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }
}

/// A scheduler with its own back-off state
struct Slot {
    scheduler: Box<dyn Scheduler>,
    interval: Duration,
    next_run: Instant,
}

struct SchedulerService {
    cluster: MemoryCluster,
    limiter: Arc<Limiter>,
    slots: Vec<Slot>,
    in_flight: Vec<Operator>,
    tick_interval: Duration,
}

impl SchedulerService {
    fn new(config: &SchedulerConfig, sink: Arc<dyn OutcomeSink>) -> anyhow::Result<Self> {
        let path = config.require_snapshot_path()?;
        let cluster = MemoryCluster::load(path)
            .with_context(|| format!("Failed to load cluster snapshot {}", path.display()))?;

        info!(
            snapshot = %path.display(),
            stores = cluster.get_stores().len(),
            "Cluster snapshot loaded"
        );

        let registry = SchedulerRegistry::with_defaults();
        let limiter = Arc::new(Limiter::new());
        let now = Instant::now();

        let mut slots = Vec::with_capacity(config.schedulers.len());
        for name in &config.schedulers {
            let scheduler = registry.create(name, limiter.clone(), config, sink.clone(), &[])?;
            info!(scheduler = scheduler.get_name(), "Scheduler registered");
            slots.push(Slot {
                interval: scheduler.get_min_interval(),
                next_run: now,
                scheduler,
            });
        }

        Ok(Self {
            cluster,
            limiter,
            slots,
            in_flight: Vec::new(),
            tick_interval: config.tick_interval(),
        })
    }

    /// Run each due scheduler once; returns the number of new operators
    fn run_due(&mut self, now: Instant, force: bool) -> usize {
        let mut produced = 0;

        for slot in &mut self.slots {
            if !force && slot.next_run > now {
                continue;
            }
            let scheduler = slot.scheduler.as_ref();

            let op = if scheduler.is_schedule_allowed(&self.cluster) {
                let influence = OpInfluence::from_operators(&self.in_flight);
                scheduler.schedule(&self.cluster, &influence)
            } else {
                debug!(scheduler = scheduler.get_name(), "Operator limit reached");
                None
            };

            match op {
                Some(op) => {
                    info!(
                        scheduler = scheduler.get_name(),
                        kind = %op.kind(),
                        operator = %op,
                        "New operator"
                    );
                    record_operator(scheduler.get_name(), &op.kind().to_string());
                    self.limiter.add_operator(&op);
                    self.in_flight.push(op);
                    slot.interval = scheduler.get_min_interval();
                    produced += 1;
                }
                None => {
                    slot.interval = scheduler.get_next_interval(slot.interval);
                }
            }
            slot.next_run = now + slot.interval;
        }

        produced
    }

    async fn run(&mut self) -> anyhow::Result<()> {
        info!(
            tick_interval = ?self.tick_interval,
            schedulers = self.slots.len(),
            "Scheduler service started"
        );

        let mut ticker = tokio::time::interval(self.tick_interval);
        loop {
            tokio::select! {
                now = ticker.tick() => {
                    self.run_due(now, false);
                },
                _ = signal::ctrl_c() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        info!(
            in_flight = self.in_flight.len(),
            "Scheduler service stopped"
        );
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = SchedulerConfig::from_env()?;
    cli.apply(&mut config);
    config.validate()?;

    init_tracing(config.json_logs, cli.verbose);

    info!(
        snapshot = ?config.snapshot_path,
        tick_interval_ms = config.tick_interval_ms,
        schedulers = ?config.schedulers,
        "Starting CyxCloud scheduler"
    );

    if let Some(port) = config.metrics_port {
        let metrics_server = MetricsServer::new(port)
            .map_err(|e| anyhow::anyhow!("Failed to create metrics server: {}", e))?;
        tokio::spawn(async move {
            if let Err(e) = metrics_server.start().await {
                error!(error = %e, "Metrics server failed");
            }
        });
        info!(port, "Metrics server started");
    } else {
        init_metrics();
    }

    let sink: Arc<dyn OutcomeSink> = Arc::new(MetricsOutcomeSink);
    let mut service = SchedulerService::new(&config, sink)?;

    if cli.once {
        let produced = service.run_due(Instant::now(), true);
        info!(operators = produced, "Single pass complete");
        return Ok(());
    }

    service.run().await
}
