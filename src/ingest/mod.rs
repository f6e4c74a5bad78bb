// src/ingest/mod.rs
pub mod aggregate;
pub mod error;
pub mod normalize;
pub mod providers;
pub mod types;

pub use normalize::normalize_text;

use crate::ingest::error::FetchError;
use crate::ingest::types::Registry;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram};
use once_cell::sync::OnceCell;

/// One-time metrics registration (so series show up on /metrics).
pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "ingest_records_total",
            "Live trial records returned by registry fetchers."
        );
        describe_counter!(
            "ingest_normalize_failures_total",
            "Upstream records skipped by the normalizer."
        );
        describe_counter!(
            "ingest_fetch_errors_total",
            "Registry fetch failures (network, status, malformed)."
        );
        describe_counter!("ingest_refresh_total", "Aggregation runs.");
        describe_histogram!("ingest_fetch_ms", "Registry fetch time in milliseconds.");
        describe_gauge!(
            "ingest_last_refresh_ts",
            "Unix ts when the aggregator last ran."
        );
    });
}

/// Log a fetch problem with a message specific to its cause, and count real failures.
pub(crate) fn report_fetch_error(registry: Registry, stage: &'static str, err: &FetchError) {
    let registry_key = registry.key();
    match err {
        FetchError::InvalidInput(_) => {
            tracing::warn!(target: "ingest", registry = registry_key, stage, error = %err, "rejected invalid input; no request made")
        }
        FetchError::Network(_) => {
            tracing::warn!(target: "ingest", registry = registry_key, stage, error = %err, "registry unreachable (network/timeout)")
        }
        FetchError::HttpStatus { status, .. } => {
            tracing::warn!(target: "ingest", registry = registry_key, stage, status, error = %err, "registry returned error status")
        }
        FetchError::Malformed(_) => {
            tracing::warn!(target: "ingest", registry = registry_key, stage, error = %err, "registry response malformed")
        }
        FetchError::Empty(_) => {
            tracing::info!(target: "ingest", registry = registry_key, stage, detail = %err, "registry returned no usable records")
        }
    }
    if err.is_failure() {
        counter!("ingest_fetch_errors_total", "registry" => registry_key, "kind" => err.kind())
            .increment(1);
    }
}
