//! Execution metrics.
//!
//! # Metrics
//!
//! All labeled by `container_name` and `success`:
//! - `crony_executed_count` - counter of finished executions
//! - `crony_last_duration_sec` - gauge, duration of the last execution
//! - `crony_last_execution_ts` - gauge, unix start time of the last execution

use std::time::Duration;

use chrono::{DateTime, Utc};
use prometheus::{CounterVec, GaugeVec, Opts, Registry, TextEncoder};

use crate::error::Result;

const LABELS: &[&str] = &["container_name", "success"];

/// Sink for per-execution observations. Called once a return code is known.
pub trait MetricsRecorder: Send + Sync {
    fn record(&self, workload: &str, success: bool, duration: Duration, started_at: DateTime<Utc>);
}

/// Prometheus-backed recorder with its own registry.
#[derive(Clone)]
pub struct PrometheusMetrics {
    registry: Registry,
    executed: CounterVec,
    last_duration: GaugeVec,
    last_execution: GaugeVec,
}

impl PrometheusMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let executed = CounterVec::new(
            Opts::new("crony_executed_count", "Number of finished executions"),
            LABELS,
        )?;
        let last_duration = GaugeVec::new(
            Opts::new(
                "crony_last_duration_sec",
                "Duration of the last execution in seconds",
            ),
            LABELS,
        )?;
        let last_execution = GaugeVec::new(
            Opts::new(
                "crony_last_execution_ts",
                "Unix timestamp of the last execution start",
            ),
            LABELS,
        )?;

        registry.register(Box::new(executed.clone()))?;
        registry.register(Box::new(last_duration.clone()))?;
        registry.register(Box::new(last_execution.clone()))?;

        Ok(Self {
            registry,
            executed,
            last_duration,
            last_execution,
        })
    }

    /// Render every metric in the Prometheus text exposition format.
    pub fn gather(&self) -> Result<String> {
        let families = self.registry.gather();
        Ok(TextEncoder::new().encode_to_string(&families)?)
    }

    pub fn executed_count(&self, workload: &str, success: bool) -> u64 {
        self.executed
            .with_label_values(&[workload, success_label(success)])
            .get() as u64
    }
}

impl MetricsRecorder for PrometheusMetrics {
    fn record(&self, workload: &str, success: bool, duration: Duration, started_at: DateTime<Utc>) {
        let labels = [workload, success_label(success)];
        self.executed.with_label_values(&labels).inc();
        self.last_duration
            .with_label_values(&labels)
            .set(duration.as_secs_f64());
        self.last_execution
            .with_label_values(&labels)
            .set(started_at.timestamp() as f64);
    }
}

fn success_label(success: bool) -> &'static str {
    if success {
        "true"
    } else {
        "false"
    }
}
