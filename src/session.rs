//! Explicit refresh context carried between interactive refreshes.
//!
//! The session is moved into `refresh` and handed back updated; nothing about
//! the last fetch lives in globals.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::ingest::aggregate::{aggregate, AggregateReport, RefreshRequest};
use crate::ingest::types::{CanonicalTrial, TrialSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RefreshOutcome {
    /// The aggregation produced records; they replaced the session's trials.
    Updated { count: usize },
    /// Nothing came back; the previous trials were kept.
    NoNewData,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RefreshSession {
    pub trials: Vec<CanonicalTrial>,
    pub last_report: Option<AggregateReport>,
    pub last_update: Option<DateTime<Utc>>,
    pub refresh_count: u64,
    pub last_outcome: Option<RefreshOutcome>,
}

impl RefreshSession {
    /// Pre-populate from a snapshot read at startup.
    pub fn from_snapshot(trials: Vec<CanonicalTrial>) -> Self {
        Self {
            trials,
            ..Self::default()
        }
    }

    /// Fold an aggregation into the session.
    pub fn apply(mut self, report: AggregateReport) -> Self {
        self.refresh_count += 1;
        if report.trials.is_empty() {
            tracing::warn!(
                kept = self.trials.len(),
                state = ?report.diagnostics.state,
                "no new trials fetched; keeping previous data"
            );
            self.last_outcome = Some(RefreshOutcome::NoNewData);
        } else {
            self.trials = report.trials.clone();
            self.last_update = Some(report.generated_at);
            self.last_outcome = Some(RefreshOutcome::Updated {
                count: report.trials.len(),
            });
        }
        self.last_report = Some(report);
        self
    }

    pub fn was_updated(&self) -> bool {
        matches!(self.last_outcome, Some(RefreshOutcome::Updated { .. }))
    }
}

/// Run one aggregation and return the updated session.
pub async fn refresh(
    session: RefreshSession,
    sources: &[Box<dyn TrialSource>],
    req: &RefreshRequest,
) -> RefreshSession {
    let report = aggregate(sources, req).await;
    session.apply(report)
}
