// src/ingest/providers/ctgov.rs
//! Registry A: the ClinicalTrials.gov v2 structured query API.
//!
//! The primary query narrows to interventional studies. If it yields no usable
//! records (empty, unreachable, or malformed), broader variants run in order:
//! the keyword without the filter, then each word of a multi-word keyword.
//! Sample data is only returned when the caller asks for it.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use metrics::{counter, histogram};
use serde_json::Value;

use crate::config::AppConfig;
use crate::ingest::error::FetchError;
use crate::ingest::normalize::normalize_batch;
use crate::ingest::providers::sample;
use crate::ingest::report_fetch_error;
use crate::ingest::types::{
    CanonicalTrial, FetchResult, Provenance, RawRecord, Registry, SourceQuery, TrialSource,
    MAX_RECORDS_LIMIT,
};

pub const DEFAULT_BASE_URL: &str = "https://clinicaltrials.gov/api/v2";
pub const INTERVENTIONAL_FILTER: &str = "AREA[StudyType]INTERVENTIONAL";

/// Fields requested from the API (joined with `|`).
pub const FIELDS: &[&str] = &[
    "NCTId",
    "BriefTitle",
    "OfficialTitle",
    "Condition",
    "StudyType",
    "OverallStatus",
    "StartDate",
    "CompletionDate",
    "LeadSponsorName",
];

const MAX_PAGE_SIZE: usize = 100;
const MAX_PAGES: usize = 20;

/// One query strategy: a search term, with or without the study-type filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryPlan {
    pub term: String,
    pub filtered: bool,
}

impl QueryPlan {
    fn filtered(term: &str) -> Self {
        Self {
            term: term.to_string(),
            filtered: true,
        }
    }

    fn broad(term: &str) -> Self {
        Self {
            term: term.to_string(),
            filtered: false,
        }
    }

    fn label(&self) -> String {
        if self.filtered {
            format!("{} [interventional]", self.term)
        } else {
            self.term.clone()
        }
    }
}

/// Primary plan first, then the broader fallback variants, without duplicates.
pub fn query_plans(keyword: &str) -> Vec<QueryPlan> {
    let kw = keyword.trim();
    let mut plans = vec![QueryPlan::filtered(kw), QueryPlan::broad(kw)];

    let words: Vec<&str> = kw
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|w| w.chars().count() >= 3)
        .collect();
    if kw.split_whitespace().count() > 1 {
        for w in words {
            let dup = plans
                .iter()
                .any(|p| !p.filtered && p.term.eq_ignore_ascii_case(w));
            if !dup {
                plans.push(QueryPlan::broad(w));
            }
        }
    }
    plans
}

/// One parsed page of the response envelope.
#[derive(Debug, Default)]
pub struct Page {
    pub total_count: u64,
    pub studies: Vec<Value>,
    pub next_page_token: Option<String>,
}

/// Parse the JSON envelope. Absent `totalCount` / `studies` default to 0 / empty
/// (with a warning); a body that is not a JSON object is malformed.
pub fn parse_envelope(body: &str) -> Result<Page, FetchError> {
    let v: Value = serde_json::from_str(body)?;
    let obj = v
        .as_object()
        .ok_or_else(|| FetchError::Malformed("envelope is not a JSON object".into()))?;

    let total_count = match obj.get("totalCount") {
        Some(n) => n.as_u64().unwrap_or_default(),
        None => {
            tracing::warn!(target: "ingest", registry = "ctgov", "response missing key `totalCount`");
            0
        }
    };

    let studies = match obj.get("studies") {
        Some(Value::Array(items)) => items.clone(),
        Some(Value::Null) | None => {
            tracing::warn!(target: "ingest", registry = "ctgov", "response missing key `studies`");
            Vec::new()
        }
        Some(_) => return Err(FetchError::Malformed("`studies` is not an array".into())),
    };

    let next_page_token = obj
        .get("nextPageToken")
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
        .map(str::to_string);

    Ok(Page {
        total_count,
        studies,
        next_page_token,
    })
}

pub struct CtGovProvider {
    client: reqwest::Client,
    base_url: String,
}

impl CtGovProvider {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("wapyrus/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("building ClinicalTrials.gov http client")?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(cfg: &AppConfig) -> Result<Self> {
        Self::new(cfg.ctgov_base_url.clone(), cfg.timeout())
    }

    /// `fetch(keyword, maxRecords, useSample)`: trials only, possibly empty.
    pub async fn fetch(&self, keyword: &str, max_records: usize, use_sample: bool) -> Vec<CanonicalTrial> {
        self.fetch_detailed(keyword, max_records, use_sample).await.trials
    }

    pub async fn fetch_detailed(&self, keyword: &str, max_records: usize, use_sample: bool) -> FetchResult {
        let keyword = keyword.trim();
        if keyword.is_empty() {
            let err = FetchError::InvalidInput("blank keyword".into());
            report_fetch_error(Registry::ClinicalTrialsGov, "validate", &err);
            return FetchResult::rejected(err.to_string());
        }
        if use_sample {
            tracing::info!(target: "ingest", registry = "ctgov", "sample mode requested; skipping network");
            return FetchResult::sample(sample::ctgov_sample());
        }
        if max_records == 0 {
            let err = FetchError::InvalidInput("max_records must be at least 1".into());
            report_fetch_error(Registry::ClinicalTrialsGov, "validate", &err);
            return FetchResult::rejected(err.to_string());
        }
        if max_records > MAX_RECORDS_LIMIT {
            tracing::debug!(target: "ingest", registry = "ctgov", requested = max_records, limit = MAX_RECORDS_LIMIT, "record cap clamped");
        }
        let max_records = max_records.min(MAX_RECORDS_LIMIT);

        let t0 = Instant::now();
        let mut result = FetchResult {
            attempted: true,
            ..FetchResult::default()
        };

        for (i, plan) in query_plans(keyword).iter().enumerate() {
            if i > 0 {
                tracing::info!(
                    target: "ingest",
                    registry = "ctgov",
                    variant = %plan.label(),
                    "no usable records yet; trying broader query"
                );
            }
            match self.run_plan(plan, max_records).await {
                Ok((trials, skipped)) => {
                    result.succeeded = true;
                    result.skipped += skipped;
                    if !trials.is_empty() {
                        tracing::info!(
                            target: "ingest",
                            registry = "ctgov",
                            query = %plan.label(),
                            count = trials.len(),
                            skipped,
                            "fetched trials"
                        );
                        result.trials = trials;
                        result.error_detail = None;
                        break;
                    }
                    let err = FetchError::Empty(format!("query `{}`", plan.label()));
                    report_fetch_error(Registry::ClinicalTrialsGov, "query", &err);
                    result.error_detail = Some(err.to_string());
                }
                Err(e) => {
                    report_fetch_error(Registry::ClinicalTrialsGov, "query", &e);
                    result.error_detail = Some(e.to_string());
                }
            }
        }

        histogram!("ingest_fetch_ms", "registry" => "ctgov").record(t0.elapsed().as_secs_f64() * 1_000.0);
        result
    }

    /// Run one plan, following page tokens until `max_records` are collected.
    async fn run_plan(&self, plan: &QueryPlan, max_records: usize) -> Result<(Vec<CanonicalTrial>, usize), FetchError> {
        let mut collected: Vec<CanonicalTrial> = Vec::new();
        let mut skipped = 0usize;
        let mut token: Option<String> = None;

        for page_no in 0..MAX_PAGES {
            let remaining = max_records.saturating_sub(collected.len());
            let page = match self
                .get_page(plan, remaining.min(MAX_PAGE_SIZE), token.as_deref())
                .await
            {
                Ok(p) => p,
                // Keep what earlier pages produced.
                Err(e) if !collected.is_empty() => {
                    report_fetch_error(Registry::ClinicalTrialsGov, "page", &e);
                    break;
                }
                Err(e) => return Err(e),
            };
            if page_no == 0 {
                tracing::debug!(
                    target: "ingest",
                    registry = "ctgov",
                    total = page.total_count,
                    query = %plan.label(),
                    "envelope parsed"
                );
            }

            let page_len = page.studies.len();
            let records: Vec<RawRecord> = page.studies.into_iter().map(RawRecord::Nested).collect();
            let (mut trials, s) = normalize_batch(&records, Provenance::live(Registry::ClinicalTrialsGov));
            skipped += s;
            collected.append(&mut trials);

            if collected.len() >= max_records {
                collected.truncate(max_records);
                break;
            }
            match page.next_page_token {
                Some(t) if page_len > 0 => token = Some(t),
                _ => break,
            }
        }

        Ok((collected, skipped))
    }

    async fn get_page(&self, plan: &QueryPlan, page_size: usize, token: Option<&str>) -> Result<Page, FetchError> {
        let url = format!("{}/studies", self.base_url);
        let mut params: Vec<(&str, String)> = vec![
            ("query.term", plan.term.clone()),
            ("fields", FIELDS.join("|")),
            ("pageSize", page_size.max(1).to_string()),
            ("countTotal", "true".to_string()),
            ("format", "json".to_string()),
        ];
        if plan.filtered {
            params.push(("filter.advanced", INTERVENTIONAL_FILTER.to_string()));
        }
        if let Some(t) = token {
            params.push(("pageToken", t.to_string()));
        }

        let resp = self.client.get(&url).query(&params).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(FetchError::HttpStatus {
                status: status.as_u16(),
                message: body.chars().take(200).collect(),
            });
        }
        let body = resp.text().await?;
        parse_envelope(&body)
    }
}

#[async_trait]
impl TrialSource for CtGovProvider {
    async fn fetch_result(&self, query: &SourceQuery) -> Result<FetchResult> {
        let r = self
            .fetch_detailed(&query.keyword, query.max_records, query.use_sample)
            .await;
        if !r.sample {
            counter!("ingest_records_total", "registry" => "ctgov").increment(r.trials.len() as u64);
        }
        Ok(r)
    }

    fn registry(&self) -> Registry {
        Registry::ClinicalTrialsGov
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plans_start_narrow_then_broaden() {
        let plans = query_plans("  wearable cardiac monitor ");
        assert_eq!(plans[0], QueryPlan::filtered("wearable cardiac monitor"));
        assert_eq!(plans[1], QueryPlan::broad("wearable cardiac monitor"));
        let rest: Vec<_> = plans[2..].iter().map(|p| p.term.as_str()).collect();
        assert_eq!(rest, vec!["wearable", "cardiac", "monitor"]);
        assert!(plans[2..].iter().all(|p| !p.filtered));
    }

    #[test]
    fn single_word_has_two_plans() {
        let plans = query_plans("medtech");
        assert_eq!(plans.len(), 2);
    }

    #[test]
    fn short_words_are_not_tried_alone() {
        let plans = query_plans("AI in ECG");
        let terms: Vec<_> = plans.iter().map(|p| p.term.as_str()).collect();
        assert_eq!(terms, vec!["AI in ECG", "AI in ECG", "ECG"]);
    }

    #[test]
    fn envelope_defaults_missing_keys() {
        let p = parse_envelope(r#"{"nextPageToken": ""}"#).unwrap();
        assert_eq!(p.total_count, 0);
        assert!(p.studies.is_empty());
        assert!(p.next_page_token.is_none());
    }

    #[test]
    fn envelope_rejects_wrong_shapes() {
        assert!(matches!(parse_envelope("[1,2]"), Err(FetchError::Malformed(_))));
        assert!(matches!(parse_envelope("<html>"), Err(FetchError::Malformed(_))));
        assert!(matches!(
            parse_envelope(r#"{"studies": {"a": 1}}"#),
            Err(FetchError::Malformed(_))
        ));
    }

    #[test]
    fn envelope_reads_counts_and_token() {
        let p = parse_envelope(r#"{"totalCount": 25, "studies": [{}, {}], "nextPageToken": "abc"}"#).unwrap();
        assert_eq!(p.total_count, 25);
        assert_eq!(p.studies.len(), 2);
        assert_eq!(p.next_page_token.as_deref(), Some("abc"));
    }
}
