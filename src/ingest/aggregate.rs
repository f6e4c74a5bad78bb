// src/ingest/aggregate.rs
//! Aggregator: run each registry fetcher in turn, merge the trials (keeping
//! their provenance tags), and summarise what happened per source.
//!
//! A source that errors or comes back empty never costs the other source its
//! results; its failure shows up in the per-source status instead.

use chrono::{DateTime, Utc};
use metrics::{counter, gauge};
use serde::{Deserialize, Serialize};

use crate::ingest::ensure_metrics_described;
use crate::ingest::types::{
    CanonicalTrial, DataOrigin, FetchResult, Provenance, Registry, SourceQuery, TrialSource,
    MAX_RECORDS_LIMIT,
};

/// Which registries should be served from sample data instead of the network.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleMode {
    #[serde(default)]
    pub ctgov: bool,
    #[serde(default)]
    pub euctr: bool,
}

impl SampleMode {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn all() -> Self {
        Self {
            ctgov: true,
            euctr: true,
        }
    }

    pub fn only(registry: Registry) -> Self {
        let mut m = Self::none();
        m.set(registry, true);
        m
    }

    pub fn set(&mut self, registry: Registry, on: bool) {
        match registry {
            Registry::ClinicalTrialsGov => self.ctgov = on,
            Registry::EuCtr => self.euctr = on,
            Registry::Unknown => {}
        }
    }

    pub fn for_registry(&self, registry: Registry) -> bool {
        match registry {
            Registry::ClinicalTrialsGov => self.ctgov,
            Registry::EuCtr => self.euctr,
            Registry::Unknown => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshRequest {
    pub keyword: String,
    pub max_records: usize,
    #[serde(default)]
    pub sample: SampleMode,
}

impl RefreshRequest {
    /// Caller-supplied caps above `MAX_RECORDS_LIMIT` are clamped; zero is left
    /// for the fetchers to reject.
    pub fn new(keyword: impl Into<String>, max_records: usize, sample: SampleMode) -> Self {
        Self {
            keyword: keyword.into(),
            max_records: max_records.min(MAX_RECORDS_LIMIT),
            sample,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceStatus {
    /// Served from sample data on request.
    Sample,
    /// Rejected before any request (e.g. blank keyword).
    Skipped,
    Succeeded,
    /// Request went through but yielded no usable records.
    Empty,
    Failed,
}

impl SourceStatus {
    pub fn of(r: &FetchResult) -> Self {
        match (r.attempted, r.succeeded) {
            (false, _) if r.sample => SourceStatus::Sample,
            (false, _) => SourceStatus::Skipped,
            (true, false) => SourceStatus::Failed,
            (true, true) if r.trials.is_empty() => SourceStatus::Empty,
            (true, true) => SourceStatus::Succeeded,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SourceStatus::Sample => "sample",
            SourceStatus::Skipped => "skipped",
            SourceStatus::Succeeded => "success",
            SourceStatus::Empty => "attempted, empty",
            SourceStatus::Failed => "failure",
        }
    }
}

/// Overall situation, phrased for whoever renders it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataState {
    Live,
    /// Live and sample records side by side.
    Mixed,
    SampleOnly,
    /// Real fetches went through but found nothing.
    NoRealData,
    /// Every real fetch attempt failed.
    FetchFailed,
    /// Nothing was attempted (blank keyword).
    InvalidInput,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSummary {
    pub registry: Registry,
    pub status: SourceStatus,
    pub count: usize,
    pub percentage: f64,
    pub skipped: usize,
    pub attempted: bool,
    pub succeeded: bool,
    pub error_detail: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostics {
    pub total: usize,
    pub real_count: usize,
    pub sample_count: usize,
    pub sources: Vec<SourceSummary>,
    /// Failed sources / all sources.
    pub failure_ratio: f64,
    pub partial_failure: bool,
    pub state: DataState,
}

impl Diagnostics {
    pub fn compute(results: &[(Registry, FetchResult)]) -> Self {
        let total: usize = results.iter().map(|(_, r)| r.trials.len()).sum();
        let sample_count = results
            .iter()
            .flat_map(|(_, r)| r.trials.iter())
            .filter(|t| t.is_sample())
            .count();
        let real_count = total - sample_count;

        let sources: Vec<SourceSummary> = results
            .iter()
            .map(|(registry, r)| SourceSummary {
                registry: *registry,
                status: SourceStatus::of(r),
                count: r.trials.len(),
                percentage: percent(r.trials.len(), total),
                skipped: r.skipped,
                attempted: r.attempted,
                succeeded: r.succeeded,
                error_detail: r.error_detail.clone(),
            })
            .collect();

        let failed = sources
            .iter()
            .filter(|s| s.status == SourceStatus::Failed)
            .count();
        let attempted = sources.iter().filter(|s| s.attempted).count();
        let failure_ratio = if sources.is_empty() {
            0.0
        } else {
            failed as f64 / sources.len() as f64
        };

        let state = if total > 0 {
            match (real_count > 0, sample_count > 0) {
                (true, true) => DataState::Mixed,
                (false, true) => DataState::SampleOnly,
                _ => DataState::Live,
            }
        } else if attempted == 0 {
            DataState::InvalidInput
        } else if failed == attempted {
            DataState::FetchFailed
        } else {
            DataState::NoRealData
        };

        Self {
            total,
            real_count,
            sample_count,
            sources,
            failure_ratio,
            partial_failure: failed > 0,
            state,
        }
    }
}

fn percent(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        (part as f64 * 1000.0 / total as f64).round() / 10.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateReport {
    pub keyword: String,
    pub generated_at: DateTime<Utc>,
    pub trials: Vec<CanonicalTrial>,
    pub diagnostics: Diagnostics,
}

/// Run every source sequentially and merge. Never fails.
pub async fn aggregate(sources: &[Box<dyn TrialSource>], req: &RefreshRequest) -> AggregateReport {
    ensure_metrics_described();

    let mut results: Vec<(Registry, FetchResult)> = Vec::with_capacity(sources.len());
    for src in sources {
        let registry = src.registry();
        let query = SourceQuery {
            keyword: req.keyword.clone(),
            max_records: req.max_records,
            use_sample: req.sample.for_registry(registry),
        };
        let mut r = match src.fetch_result(&query).await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(target: "ingest", registry = registry.key(), error = ?e, "source error");
                counter!("ingest_fetch_errors_total", "registry" => registry.key(), "kind" => "source")
                    .increment(1);
                FetchResult {
                    attempted: !query.use_sample,
                    error_detail: Some(format!("{e:#}")),
                    ..FetchResult::default()
                }
            }
        };
        tag_untagged(&mut r, registry);
        results.push((registry, r));
    }

    let diagnostics = Diagnostics::compute(&results);
    let trials: Vec<CanonicalTrial> = results.into_iter().flat_map(|(_, r)| r.trials).collect();

    let now = Utc::now();
    counter!("ingest_refresh_total").increment(1);
    gauge!("ingest_last_refresh_ts").set(now.timestamp().max(0) as f64);
    tracing::info!(
        target: "ingest",
        keyword = %req.keyword,
        total = diagnostics.total,
        real = diagnostics.real_count,
        sample = diagnostics.sample_count,
        failure_ratio = diagnostics.failure_ratio,
        state = ?diagnostics.state,
        "aggregation finished"
    );

    AggregateReport {
        keyword: req.keyword.trim().to_string(),
        generated_at: now,
        trials,
        diagnostics,
    }
}

/// Every merged record must name its origin; fill in tags a source left blank.
fn tag_untagged(r: &mut FetchResult, registry: Registry) {
    let origin = if r.sample {
        DataOrigin::Sample
    } else {
        DataOrigin::Live
    };
    let tag = Provenance { registry, origin }.tag();
    for t in r.trials.iter_mut().filter(|t| t.source.trim().is_empty()) {
        t.source = tag.clone();
    }
}
