// src/ingest/types.rs
use std::fmt;

use serde::{Deserialize, Serialize};

/// Unified trial record every upstream shape is normalized into.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalTrial {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub conditions: Vec<String>,
    #[serde(default)]
    pub study_type: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub start_date: String,
    #[serde(default)]
    pub completion_date: String,
    #[serde(default)]
    pub sponsor: String,
    #[serde(default)]
    pub source: String, // provenance tag, see `Provenance::tag`
}

impl CanonicalTrial {
    pub fn provenance(&self) -> Provenance {
        Provenance::parse(&self.source)
    }

    pub fn is_sample(&self) -> bool {
        self.provenance().origin == DataOrigin::Sample
    }
}

/// Upstream registries the aggregator knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Registry {
    /// Registry A: the structured ClinicalTrials.gov v2 API.
    ClinicalTrialsGov,
    /// Registry B: the scraped EU Clinical Trials Register.
    EuCtr,
    Unknown,
}

impl Registry {
    pub const ALL: [Registry; 2] = [Registry::ClinicalTrialsGov, Registry::EuCtr];

    pub fn display_name(self) -> &'static str {
        match self {
            Registry::ClinicalTrialsGov => "ClinicalTrials.gov",
            Registry::EuCtr => "EU Clinical Trials Register",
            Registry::Unknown => "Unknown registry",
        }
    }

    /// Short key used on the CLI and in metric labels.
    pub fn key(self) -> &'static str {
        match self {
            Registry::ClinicalTrialsGov => "ctgov",
            Registry::EuCtr => "euctr",
            Registry::Unknown => "unknown",
        }
    }

    pub fn from_key(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ctgov" | "clinicaltrials.gov" | "a" => Some(Registry::ClinicalTrialsGov),
            "euctr" | "eu" | "b" => Some(Registry::EuCtr),
            _ => None,
        }
    }
}

impl fmt::Display for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataOrigin {
    Live,
    Sample,
}

/// Origin registry plus live/sample status. Rendered into `CanonicalTrial::source`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Provenance {
    pub registry: Registry,
    pub origin: DataOrigin,
}

const SAMPLE_SUFFIX: &str = " (sample)";

impl Provenance {
    pub fn live(registry: Registry) -> Self {
        Self {
            registry,
            origin: DataOrigin::Live,
        }
    }

    pub fn sample(registry: Registry) -> Self {
        Self {
            registry,
            origin: DataOrigin::Sample,
        }
    }

    pub fn tag(&self) -> String {
        match self.origin {
            DataOrigin::Live => self.registry.display_name().to_string(),
            DataOrigin::Sample => format!("{}{}", self.registry.display_name(), SAMPLE_SUFFIX),
        }
    }

    /// Inverse of `tag`. Unknown names map to a live record from `Registry::Unknown`.
    pub fn parse(tag: &str) -> Self {
        let t = tag.trim();
        let (name, origin) = match t.strip_suffix(SAMPLE_SUFFIX) {
            Some(rest) => (rest, DataOrigin::Sample),
            None => (t, DataOrigin::Live),
        };
        let registry = Registry::ALL
            .into_iter()
            .find(|r| r.display_name().eq_ignore_ascii_case(name))
            .unwrap_or(Registry::Unknown);
        Self { registry, origin }
    }
}

/// Flat record assembled by the scraping fetcher from whatever markup fragments it recovers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScrapedRow {
    pub eudract_id: Option<String>,
    pub public_title: Option<String>,
    pub condition: Option<String>,
    pub study_type: Option<String>,
    pub status: Option<String>,
    pub start_date: Option<String>,
    pub completion_date: Option<String>,
    pub main_sponsor: Option<String>,
}

/// One upstream record, tagged with the shape it arrived in.
#[derive(Debug, Clone, PartialEq)]
pub enum RawRecord {
    /// A study object from the structured API (nested modules).
    Nested(serde_json::Value),
    /// A row assembled from scraped markup.
    Scraped(ScrapedRow),
}

/// Per-source outcome handed to the aggregator.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FetchResult {
    pub trials: Vec<CanonicalTrial>,
    /// A real-data request was made (false when short-circuited to sample or rejected).
    pub attempted: bool,
    /// At least one real request completed and its body parsed.
    pub succeeded: bool,
    pub error_detail: Option<String>,
    /// Records dropped by the normalizer.
    pub skipped: usize,
    pub sample: bool,
}

impl FetchResult {
    pub fn rejected(detail: impl Into<String>) -> Self {
        Self {
            error_detail: Some(detail.into()),
            ..Self::default()
        }
    }

    pub fn sample(trials: Vec<CanonicalTrial>) -> Self {
        Self {
            trials,
            sample: true,
            ..Self::default()
        }
    }
}

/// Upper bound on records requested per registry per invocation.
pub const MAX_RECORDS_LIMIT: usize = 500;

/// What a single fetcher call is asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceQuery {
    pub keyword: String,
    pub max_records: usize,
    pub use_sample: bool,
}

#[async_trait::async_trait]
pub trait TrialSource: Send + Sync {
    /// Fetch and normalize. Expected failure modes are reported inside the
    /// `FetchResult`; `Err` is reserved for faults the source could not classify.
    async fn fetch_result(&self, query: &SourceQuery) -> anyhow::Result<FetchResult>;
    fn registry(&self) -> Registry;
}
