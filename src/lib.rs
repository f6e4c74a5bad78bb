// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod api;
pub mod config;
pub mod dashboard;
pub mod ingest;
pub mod metrics;
pub mod session;
pub mod snapshot;
pub mod telemetry;

pub use crate::api::{router, AppState};
pub use crate::config::AppConfig;
pub use crate::ingest::aggregate::{aggregate, AggregateReport, Diagnostics, RefreshRequest, SampleMode};
pub use crate::ingest::types::{CanonicalTrial, FetchResult, Registry, TrialSource};

use anyhow::Result;
use axum::Router;

/// Full in-process app: dashboard + JSON API + `/metrics`.
pub fn app_with_state(state: AppState) -> Result<Router> {
    let metrics = crate::metrics::Metrics::init()?;
    crate::ingest::ensure_metrics_described();
    Ok(router(state).merge(metrics.router()))
}

/// Build the app against the live registries described by `cfg`.
pub fn app(cfg: AppConfig) -> Result<Router> {
    app_with_state(AppState::from_config(cfg)?)
}
