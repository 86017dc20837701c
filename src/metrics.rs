use anyhow::{Context, Result};
use lazy_static::lazy_static;
use prometheus::{
    CounterVec, Encoder, Gauge, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry,
    TextEncoder,
};
use std::time::Duration;

use crate::ingestion_queue::{QueueMode, TaskStatus};

/// Metric name prefix for all ingestion metrics
const PREFIX: &str = "repertoire";

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // Task Metrics
    pub static ref TASK_EXECUTIONS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_task_executions_total"), "Executed ingestion tasks"),
        &["kind", "status"]
    ).expect("Failed to create task_executions_total metric");

    pub static ref TASK_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_task_duration_seconds"),
            "Ingestion task duration in seconds"
        )
        .buckets(vec![1.0, 5.0, 15.0, 60.0, 180.0, 600.0, 900.0]),
        &["kind"]
    ).expect("Failed to create task_duration_seconds metric");

    pub static ref TASKS_RUNNING: Gauge = Gauge::new(
        format!("{PREFIX}_tasks_running"),
        "Ingestion tasks currently executing"
    ).expect("Failed to create tasks_running metric");

    pub static ref QUEUE_MODE: GaugeVec = GaugeVec::new(
        Opts::new(format!("{PREFIX}_queue_mode"), "1 for the queue's current dispatch mode"),
        &["mode"]
    ).expect("Failed to create queue_mode metric");

    // Recording Metrics
    pub static ref RECORDING_OUTCOMES_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_recording_outcomes_total"), "Per-recording ingestion outcomes"),
        &["outcome"]
    ).expect("Failed to create recording_outcomes_total metric");

    // Generation Metrics
    pub static ref GENERATION_ATTEMPTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_generation_attempts_total"), "Provider calls by model and outcome"),
        &["model", "outcome"]
    ).expect("Failed to create generation_attempts_total metric");
}

/// Register all metrics. Safe to call more than once.
pub fn init_metrics() {
    let _ = REGISTRY.register(Box::new(TASK_EXECUTIONS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(TASK_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(TASKS_RUNNING.clone()));
    let _ = REGISTRY.register(Box::new(QUEUE_MODE.clone()));
    let _ = REGISTRY.register(Box::new(RECORDING_OUTCOMES_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(GENERATION_ATTEMPTS_TOTAL.clone()));

    tracing::info!("Metrics system initialized successfully");
}

pub fn set_queue_mode(mode: QueueMode) {
    let (active, inactive) = match mode {
        QueueMode::Durable => ("durable", "fallback"),
        QueueMode::Fallback => ("fallback", "durable"),
    };
    QUEUE_MODE.with_label_values(&[active]).set(1.0);
    QUEUE_MODE.with_label_values(&[inactive]).set(0.0);
}

pub fn set_task_running(running: bool) {
    if running {
        TASKS_RUNNING.inc();
    } else {
        TASKS_RUNNING.dec();
    }
}

pub fn record_task_execution(kind: &str, status: TaskStatus, duration: Duration) {
    let status = match status {
        TaskStatus::Completed => "completed",
        TaskStatus::Failed => "failed",
    };
    TASK_EXECUTIONS_TOTAL
        .with_label_values(&[kind, status])
        .inc();
    TASK_DURATION_SECONDS
        .with_label_values(&[kind])
        .observe(duration.as_secs_f64());
}

/// `outcome` is the outcome kind without its reason, e.g. `created` or `failed`.
pub fn record_recording_outcome(outcome: &str) {
    RECORDING_OUTCOMES_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn record_generation_attempt(model: &str, outcome: &str) {
    GENERATION_ATTEMPTS_TOTAL
        .with_label_values(&[model, outcome])
        .inc();
}

/// Text exposition of everything registered.
pub fn encode_metrics() -> Result<String> {
    let mut buffer = Vec::new();
    TextEncoder::new()
        .encode(&REGISTRY.gather(), &mut buffer)
        .context("Failed to encode metrics")?;
    String::from_utf8(buffer).context("Metrics output is not UTF-8")
}
