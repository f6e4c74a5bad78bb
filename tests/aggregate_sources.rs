// tests/aggregate_sources.rs
//
// Aggregator over stub sources, plus the snapshot round-trip it feeds.

use anyhow::anyhow;
use async_trait::async_trait;

use wapyrus::ingest::aggregate::{aggregate, DataState, RefreshRequest, SampleMode, SourceStatus};
use wapyrus::ingest::providers::sample;
use wapyrus::ingest::types::{CanonicalTrial, FetchResult, Provenance, Registry, SourceQuery, TrialSource};
use wapyrus::session::{refresh, RefreshOutcome, RefreshSession};
use wapyrus::snapshot::SnapshotStore;

/// Returns `n` live records, or the registry's sample set when asked.
struct Stub {
    registry: Registry,
    n: usize,
}

#[async_trait]
impl TrialSource for Stub {
    async fn fetch_result(&self, q: &SourceQuery) -> anyhow::Result<FetchResult> {
        if q.keyword.trim().is_empty() {
            return Ok(FetchResult::rejected("blank keyword"));
        }
        if q.use_sample {
            let trials = match self.registry {
                Registry::EuCtr => sample::euctr_sample(),
                _ => sample::ctgov_sample(),
            };
            return Ok(FetchResult::sample(trials));
        }
        Ok(FetchResult {
            trials: (0..self.n.min(q.max_records))
                .map(|i| CanonicalTrial {
                    id: format!("{}-{i}", self.registry.key()),
                    title: format!("{} trial {i}", q.keyword),
                    source: Provenance::live(self.registry).tag(),
                    ..Default::default()
                })
                .collect(),
            attempted: true,
            succeeded: true,
            ..Default::default()
        })
    }

    fn registry(&self) -> Registry {
        self.registry
    }
}

struct Broken;

#[async_trait]
impl TrialSource for Broken {
    async fn fetch_result(&self, _q: &SourceQuery) -> anyhow::Result<FetchResult> {
        Err(anyhow!("connection reset by peer"))
    }

    fn registry(&self) -> Registry {
        Registry::ClinicalTrialsGov
    }
}

fn req(keyword: &str, sample: SampleMode) -> RefreshRequest {
    RefreshRequest {
        keyword: keyword.into(),
        max_records: 10,
        sample,
    }
}

#[tokio::test]
async fn live_plus_sample_partitions_by_provenance() {
    let sources: Vec<Box<dyn TrialSource>> = vec![
        Box::new(Stub { registry: Registry::ClinicalTrialsGov, n: 4 }),
        Box::new(Stub { registry: Registry::EuCtr, n: 7 }),
    ];
    let report = aggregate(&sources, &req("stent", SampleMode::only(Registry::EuCtr))).await;

    let n2 = sample::euctr_sample().len();
    assert_eq!(report.trials.len(), 4 + n2);
    let (samples, live): (Vec<_>, Vec<_>) = report.trials.iter().partition(|t| t.is_sample());
    assert_eq!(live.len(), 4);
    assert_eq!(samples.len(), n2);
    assert!(live.iter().all(|t| t.source == "ClinicalTrials.gov"));
    assert!(samples.iter().all(|t| t.source == "EU Clinical Trials Register (sample)"));

    let d = &report.diagnostics;
    assert_eq!(d.state, DataState::Mixed);
    assert_eq!((d.real_count, d.sample_count), (4, n2));
    assert_eq!(d.sources[1].status, SourceStatus::Sample);
}

#[tokio::test]
async fn failing_source_does_not_cost_the_other_its_results() {
    let sources: Vec<Box<dyn TrialSource>> = vec![
        Box::new(Broken),
        Box::new(Stub { registry: Registry::EuCtr, n: 3 }),
    ];
    let report = aggregate(&sources, &req("stent", SampleMode::none())).await;

    assert_eq!(report.trials.len(), 3);
    let d = &report.diagnostics;
    assert_eq!(d.sources[0].status, SourceStatus::Failed);
    assert!(d.sources[0]
        .error_detail
        .as_deref()
        .is_some_and(|e| e.contains("connection reset")));
    assert_eq!(d.sources[1].status, SourceStatus::Succeeded);
    assert_eq!(d.failure_ratio, 0.5);
    assert!(d.partial_failure);
    assert_eq!(d.state, DataState::Live);
}

#[tokio::test]
async fn blank_keyword_is_invalid_input() {
    let sources: Vec<Box<dyn TrialSource>> = vec![
        Box::new(Stub { registry: Registry::ClinicalTrialsGov, n: 4 }),
        Box::new(Stub { registry: Registry::EuCtr, n: 4 }),
    ];
    let report = aggregate(&sources, &req("  ", SampleMode::all())).await;
    assert!(report.trials.is_empty());
    assert_eq!(report.diagnostics.state, DataState::InvalidInput);
}

#[tokio::test]
async fn refreshed_session_round_trips_through_snapshot() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = SnapshotStore::new(dir.path().join("knowledge_base.json"));
    let sources: Vec<Box<dyn TrialSource>> = vec![
        Box::new(Stub { registry: Registry::ClinicalTrialsGov, n: 2 }),
        Box::new(Stub { registry: Registry::EuCtr, n: 0 }),
    ];

    let session = refresh(
        RefreshSession::default(),
        &sources,
        &req("stent", SampleMode::only(Registry::EuCtr)),
    )
    .await;
    assert!(session.was_updated());
    store.save(&session.trials).expect("save");

    let loaded = store.load().expect("load");
    assert_eq!(loaded, session.trials, "ids, fields and order survive");
    assert!(loaded.iter().any(|t| t.is_sample()));

    // An empty refresh keeps what was there.
    let session = refresh(
        RefreshSession::from_snapshot(loaded),
        &sources[1..],
        &req("stent", SampleMode::none()),
    )
    .await;
    assert_eq!(session.last_outcome, Some(RefreshOutcome::NoNewData));
    assert_eq!(session.trials.len(), 2 + sample::euctr_sample().len());
}
