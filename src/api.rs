use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::{Form, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;

use crate::config::AppConfig;
use crate::dashboard::{self, DashboardView};
use crate::ingest::aggregate::{AggregateReport, RefreshRequest, SampleMode};
use crate::ingest::providers::{ctgov::CtGovProvider, euctr::EuCtrProvider};
use crate::ingest::types::{CanonicalTrial, TrialSource};
use crate::session::{self, RefreshSession};
use crate::snapshot::SnapshotStore;

#[derive(Clone)]
pub struct AppState {
    config: Arc<AppConfig>,
    sources: Arc<Vec<Box<dyn TrialSource>>>,
    session: Arc<Mutex<RefreshSession>>,
    refreshing: Arc<AtomicBool>,
    store: SnapshotStore,
}

/// Returned when a refresh is requested while another one is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshBusy;

/// Clears the in-progress flag even if the refresh future is dropped.
struct BusyGuard(Arc<AtomicBool>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl AppState {
    /// Pre-populates the session from the snapshot file when one exists.
    pub fn new(config: AppConfig, sources: Vec<Box<dyn TrialSource>>) -> Self {
        let store = SnapshotStore::new(config.snapshot_path.clone());
        let session = RefreshSession::from_snapshot(store.load_or_empty());
        tracing::info!(
            records = session.trials.len(),
            snapshot = %store.path().display(),
            "dashboard session ready"
        );
        Self {
            config: Arc::new(config),
            sources: Arc::new(sources),
            session: Arc::new(Mutex::new(session)),
            refreshing: Arc::new(AtomicBool::new(false)),
            store,
        }
    }

    /// Wire the two live registries from config.
    pub fn from_config(config: AppConfig) -> Result<Self> {
        let sources: Vec<Box<dyn TrialSource>> = vec![
            Box::new(CtGovProvider::from_config(&config)?),
            Box::new(EuCtrProvider::from_config(&config)?),
        ];
        Ok(Self::new(config, sources))
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn is_refreshing(&self) -> bool {
        self.refreshing.load(Ordering::Acquire)
    }

    pub async fn session(&self) -> RefreshSession {
        self.session.lock().await.clone()
    }

    /// Run one refresh unless another is in flight. The snapshot is rewritten
    /// only when the refresh produced records.
    pub async fn run_refresh(&self, req: RefreshRequest) -> Result<RefreshSession, RefreshBusy> {
        if self
            .refreshing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::info!(keyword = %req.keyword, "refresh rejected: already running");
            return Err(RefreshBusy);
        }
        let _guard = BusyGuard(self.refreshing.clone());

        let current = self.session.lock().await.clone();
        let updated = session::refresh(current, &self.sources, &req).await;

        if updated.was_updated() {
            if let Err(e) = self.store.save(&updated.trials) {
                tracing::warn!(error = ?e, "snapshot save failed");
            }
        }
        *self.session.lock().await = updated.clone();
        Ok(updated)
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/", get(index))
        .route("/refresh", post(refresh_form))
        .route("/api/trials", get(api_trials))
        .route("/api/diagnostics", get(api_diagnostics))
        .route("/api/refresh", post(api_refresh))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(Debug, Default, Deserialize)]
struct FilterQuery {
    #[serde(default)]
    study_type: Option<String>,
}

async fn index(State(state): State<AppState>, Query(q): Query<FilterQuery>) -> Html<String> {
    let session = state.session().await;
    let info = state.store.info_async().await;
    let view = DashboardView {
        session: &session,
        snapshot: &info,
        default_keyword: &state.config.default_keyword,
        max_records: state.config.max_records,
        study_type: q.study_type.as_deref(),
        refreshing: state.is_refreshing(),
    };
    Html(dashboard::render(&view))
}

/// HTML form fields. Checkboxes are absent when unticked.
#[derive(Debug, Deserialize)]
struct RefreshForm {
    #[serde(default)]
    keyword: String,
    #[serde(default)]
    max_records: Option<String>,
    #[serde(default)]
    sample_ctgov: Option<String>,
    #[serde(default)]
    sample_euctr: Option<String>,
}

async fn refresh_form(State(state): State<AppState>, Form(f): Form<RefreshForm>) -> Redirect {
    let max_records = f
        .max_records
        .as_deref()
        .and_then(|s| s.trim().parse::<usize>().ok())
        .unwrap_or(state.config.max_records);
    let sample = SampleMode {
        ctgov: f.sample_ctgov.is_some(),
        euctr: f.sample_euctr.is_some(),
    };
    let req = RefreshRequest::new(f.keyword, max_records, sample);
    // A busy dashboard already shows the in-progress banner.
    let _ = state.run_refresh(req).await;
    Redirect::to("/")
}

#[derive(Debug, Serialize)]
struct TrialsOut {
    count: usize,
    trials: Vec<CanonicalTrial>,
}

async fn api_trials(State(state): State<AppState>, Query(q): Query<FilterQuery>) -> Json<TrialsOut> {
    let session = state.session().await;
    let trials: Vec<CanonicalTrial> =
        dashboard::filter_by_study_type(&session.trials, q.study_type.as_deref())
            .into_iter()
            .cloned()
            .collect();
    Json(TrialsOut {
        count: trials.len(),
        trials,
    })
}

async fn api_diagnostics(State(state): State<AppState>) -> Json<Option<AggregateReport>> {
    Json(state.session().await.last_report)
}

#[derive(Debug, Deserialize)]
struct ApiRefreshReq {
    #[serde(default)]
    keyword: Option<String>,
    #[serde(default)]
    max_records: Option<usize>,
    #[serde(default)]
    sample: SampleMode,
}

async fn api_refresh(State(state): State<AppState>, Json(body): Json<ApiRefreshReq>) -> Response {
    let req = RefreshRequest::new(
        body.keyword
            .unwrap_or_else(|| state.config.default_keyword.clone()),
        body.max_records.unwrap_or(state.config.max_records),
        body.sample,
    );
    match state.run_refresh(req).await {
        Ok(s) => Json(s.last_report).into_response(),
        Err(RefreshBusy) => (
            StatusCode::CONFLICT,
            Json(serde_json::json!({ "error": "refresh already in progress" })),
        )
            .into_response(),
    }
}
