//! Scheduler outcome counters and the Prometheus endpoint
//!
//! Schedulers report each decision outcome to an injected [`OutcomeSink`].
//! The production sink forwards to the `metrics` facade; tests use
//! [`RecordingSink`] to assert on exact outcomes.

use metrics::{counter, describe_counter};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use tracing::info;

/// Metric names as constants
pub mod names {
    pub const SCHEDULER_EVENTS: &str = "cyxcloud_scheduler_event_count";
    pub const SCHEDULER_OPERATORS: &str = "cyxcloud_scheduler_operators_total";
}

/// What happened during one `schedule` call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScheduleOutcome {
    /// A schedule call started
    Schedule,
    /// No store passed the source filters
    NoStore,
    /// The chosen source holds no regions
    NoRegion,
    /// The region's replica count differs from the configured factor
    AbnormalReplica,
    RegionHot,
    /// No acceptable replacement store
    NoPeer,
    /// The balance judge rejected the move
    Skip,
    NewOperator,
}

impl ScheduleOutcome {
    pub const ALL: [ScheduleOutcome; 8] = [
        ScheduleOutcome::Schedule,
        ScheduleOutcome::NoStore,
        ScheduleOutcome::NoRegion,
        ScheduleOutcome::AbnormalReplica,
        ScheduleOutcome::RegionHot,
        ScheduleOutcome::NoPeer,
        ScheduleOutcome::Skip,
        ScheduleOutcome::NewOperator,
    ];

    /// Label value used in metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleOutcome::Schedule => "schedule",
            ScheduleOutcome::NoStore => "no_store",
            ScheduleOutcome::NoRegion => "no_region",
            ScheduleOutcome::AbnormalReplica => "abnormal_replica",
            ScheduleOutcome::RegionHot => "region_hot",
            ScheduleOutcome::NoPeer => "no_peer",
            ScheduleOutcome::Skip => "skip",
            ScheduleOutcome::NewOperator => "new_operator",
        }
    }
}

impl fmt::Display for ScheduleOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receives decision outcomes from schedulers
pub trait OutcomeSink: Send + Sync {
    fn record(&self, scheduler: &str, outcome: ScheduleOutcome);
}

/// Initialize metric descriptions
pub fn init_metrics() {
    describe_counter!(
        names::SCHEDULER_EVENTS,
        "Scheduler decision outcomes by scheduler and type"
    );
    describe_counter!(
        names::SCHEDULER_OPERATORS,
        "Operators produced by scheduler and kind"
    );
}

/// Sink that increments `metrics` counters
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsOutcomeSink;

impl OutcomeSink for MetricsOutcomeSink {
    fn record(&self, scheduler: &str, outcome: ScheduleOutcome) {
        counter!(
            names::SCHEDULER_EVENTS,
            "scheduler" => scheduler.to_string(),
            "type" => outcome.as_str()
        )
        .increment(1);
    }
}

/// Record an operator handed to the executor
pub fn record_operator(scheduler: &str, kind: &str) {
    counter!(
        names::SCHEDULER_OPERATORS,
        "scheduler" => scheduler.to_string(),
        "kind" => kind.to_string()
    )
    .increment(1);
}

/// Sink that keeps counts in memory
#[derive(Debug, Default)]
pub struct RecordingSink {
    counts: Mutex<HashMap<(String, ScheduleOutcome), u64>>,
    last: Mutex<Option<ScheduleOutcome>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, scheduler: &str, outcome: ScheduleOutcome) -> u64 {
        self.counts
            .lock()
            .get(&(scheduler.to_string(), outcome))
            .copied()
            .unwrap_or(0)
    }

    /// Total for `outcome` across all schedulers
    pub fn total(&self, outcome: ScheduleOutcome) -> u64 {
        self.counts
            .lock()
            .iter()
            .filter(|((_, o), _)| *o == outcome)
            .map(|(_, c)| *c)
            .sum()
    }

    /// The most recently recorded outcome
    pub fn last(&self) -> Option<ScheduleOutcome> {
        *self.last.lock()
    }

    pub fn reset(&self) {
        self.counts.lock().clear();
        *self.last.lock() = None;
    }
}

impl OutcomeSink for RecordingSink {
    fn record(&self, scheduler: &str, outcome: ScheduleOutcome) {
        *self
            .counts
            .lock()
            .entry((scheduler.to_string(), outcome))
            .or_default() += 1;
        *self.last.lock() = Some(outcome);
    }
}

/// HTTP server for the metrics endpoint
pub struct MetricsServer {
    handle: PrometheusHandle,
    addr: SocketAddr,
}

impl MetricsServer {
    /// Install the Prometheus recorder and prepare a server on `port`
    pub fn new(port: u16) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;
        let handle = PrometheusBuilder::new().install_recorder()?;
        init_metrics();
        Ok(Self { handle, addr })
    }

    /// Serve `/metrics` and `/health` until the task is dropped
    pub async fn start(self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        use axum::{routing::get, Router};

        let handle = self.handle;
        let metrics_handler = move || {
            let handle = handle.clone();
            async move { handle.render() }
        };

        let app = Router::new()
            .route("/metrics", get(metrics_handler))
            .route("/health", get(|| async { "OK" }));

        info!(addr = %self.addr, "Starting metrics server");

        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }
}
