// src/ingest/providers/euctr.rs
//! Registry B: the EU Clinical Trials Register search page, scraped.
//!
//! The register publishes no stable markup schema, so extraction is
//! best-effort: several candidate entry selectors, class-based fields, then
//! `Label: value` cells, then an EudraCT-number pattern over the entry text.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use metrics::{counter, histogram};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use scraper::{ElementRef, Html, Selector};

use crate::config::AppConfig;
use crate::ingest::error::FetchError;
use crate::ingest::normalize::{normalize_batch, normalize_text};
use crate::ingest::providers::sample;
use crate::ingest::report_fetch_error;
use crate::ingest::types::{
    CanonicalTrial, FetchResult, Provenance, RawRecord, Registry, ScrapedRow, SourceQuery,
    TrialSource,
};

pub const DEFAULT_SEARCH_URL: &str = "https://www.clinicaltrialsregister.eu/ctr-search/search";

/// Many registries reject default client identifiers.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

static RE_EUDRACT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\d{4}-\d{6}-\d{2}\b").unwrap());

/// Entry selectors, tried in order; the first one that matches anything wins.
const BLOCK_SELECTORS: &[&str] = &["table.result", "div.result", "tr.result", "table.list tr"];

fn sel(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

fn text_of(el: ElementRef<'_>) -> String {
    normalize_text(&el.text().collect::<Vec<_>>().join(" "))
}

fn first_text(block: ElementRef<'_>, css: &str) -> Option<String> {
    let s = sel(css)?;
    block
        .select(&s)
        .map(text_of)
        .find(|t| !t.is_empty())
}

fn set_if_empty(slot: &mut Option<String>, value: String) {
    if slot.as_deref().map_or(true, str::is_empty) && !value.is_empty() {
        *slot = Some(value);
    }
}

/// Split `"Label: value"` cells. Labels longer than a short phrase are ignored.
fn split_label(text: &str) -> Option<(String, String)> {
    let (label, value) = text.split_once(':')?;
    let label = label.trim();
    if label.is_empty() || label.chars().count() > 60 {
        return None;
    }
    Some((label.to_ascii_lowercase(), value.trim().to_string()))
}

fn apply_label(row: &mut ScrapedRow, label: &str, value: String) {
    let slot = match label {
        "eudract number" | "eudract no" => &mut row.eudract_id,
        "full title" | "title" | "public title" | "title of the trial" => &mut row.public_title,
        "medical condition" | "condition" | "conditions" => &mut row.condition,
        "trial status" | "status" => &mut row.status,
        "sponsor name" | "sponsor" | "main sponsor" => &mut row.main_sponsor,
        "start date" | "date on which this record was first entered in the eudract database" => {
            &mut row.start_date
        }
        "completion date" | "end date" | "date of the global end of the trial" => {
            &mut row.completion_date
        }
        "trial type" | "study type" => &mut row.study_type,
        _ => return,
    };
    set_if_empty(slot, value);
}

/// Recover one row from an entry block. `None` when neither id nor title is found.
fn extract_row(block: ElementRef<'_>) -> Option<ScrapedRow> {
    let mut row = ScrapedRow {
        eudract_id: first_text(block, r#"a[href*="eudractNumber"]"#),
        public_title: first_text(block, ".trialTitle").or_else(|| first_text(block, ".title")),
        condition: first_text(block, ".condition"),
        status: first_text(block, ".status"),
        main_sponsor: first_text(block, ".sponsor"),
        ..ScrapedRow::default()
    };

    if let Some(date_sel) = sel(r#"td[class*="date"]"#) {
        let mut dates = block.select(&date_sel).map(text_of).filter(|t| !t.is_empty());
        row.start_date = dates.next();
        row.completion_date = dates.next();
    }

    if let Some(cell_sel) = sel("td, li, p") {
        for cell in block.select(&cell_sel) {
            if let Some((label, value)) = split_label(&text_of(cell)) {
                apply_label(&mut row, &label, value);
            }
        }
    }

    // The id link text sometimes carries extra words; keep the number itself.
    let block_text = text_of(block);
    let from_link = row
        .eudract_id
        .as_deref()
        .and_then(|s| RE_EUDRACT.find(s))
        .map(|m| m.as_str().to_string());
    match from_link {
        Some(id) => row.eudract_id = Some(id),
        None => {
            row.eudract_id = RE_EUDRACT
                .find(&block_text)
                .map(|m| m.as_str().to_string())
                .or(row.eudract_id.take().filter(|s| !s.is_empty()));
        }
    }

    let has_id = row.eudract_id.as_deref().is_some_and(|s| !s.is_empty());
    let has_title = row.public_title.as_deref().is_some_and(|s| !s.is_empty());
    (has_id || has_title).then_some(row)
}

/// Best-effort parse of a search results page into flat rows.
/// `None` when no entry block selector matches at all (changed markup, captcha,
/// consent wall); `Some` with possibly zero rows when blocks exist.
pub fn parse_search_page(html: &str) -> Option<Vec<ScrapedRow>> {
    let doc = Html::parse_document(html);
    for css in BLOCK_SELECTORS {
        let Some(s) = sel(css) else { continue };
        let blocks: Vec<ElementRef<'_>> = doc
            .select(&s)
            .filter(|b| b.children().filter_map(ElementRef::wrap).next().is_some())
            .collect();
        if blocks.is_empty() {
            continue;
        }
        tracing::debug!(target: "ingest", registry = "euctr", selector = css, blocks = blocks.len(), "entry blocks found");
        return Some(blocks.into_iter().filter_map(extract_row).collect());
    }
    None
}

pub struct EuCtrProvider {
    client: reqwest::Client,
    search_url: String,
}

impl EuCtrProvider {
    pub fn new(search_url: impl Into<String>, timeout: Duration, user_agent: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-GB,en;q=0.9"));

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .default_headers(headers)
            .build()
            .context("building EU CTR http client")?;
        Ok(Self {
            client,
            search_url: search_url.into(),
        })
    }

    pub fn from_config(cfg: &AppConfig) -> Result<Self> {
        Self::new(cfg.euctr_search_url.clone(), cfg.timeout(), &cfg.user_agent)
    }

    /// `fetch(keyword, useSample)`: trials only, possibly empty.
    pub async fn fetch(&self, keyword: &str, use_sample: bool) -> Vec<CanonicalTrial> {
        self.fetch_detailed(keyword, use_sample).await.trials
    }

    pub async fn fetch_detailed(&self, keyword: &str, use_sample: bool) -> FetchResult {
        let keyword = keyword.trim();
        if keyword.is_empty() {
            let err = FetchError::InvalidInput("blank keyword".into());
            report_fetch_error(Registry::EuCtr, "validate", &err);
            return FetchResult::rejected(err.to_string());
        }
        if use_sample {
            tracing::info!(target: "ingest", registry = "euctr", "sample mode requested; skipping network");
            return FetchResult::sample(sample::euctr_sample());
        }

        let t0 = Instant::now();
        let mut result = FetchResult {
            attempted: true,
            ..FetchResult::default()
        };

        match self.scrape(keyword).await {
            Ok(rows) => {
                result.succeeded = true;
                let records: Vec<RawRecord> = rows.into_iter().map(RawRecord::Scraped).collect();
                let (trials, skipped) = normalize_batch(&records, Provenance::live(Registry::EuCtr));
                if trials.is_empty() {
                    let err = FetchError::Empty(format!(
                        "{} entries recognised in markup, none usable",
                        records.len()
                    ));
                    report_fetch_error(Registry::EuCtr, "parse", &err);
                    result.error_detail = Some(err.to_string());
                } else {
                    tracing::info!(
                        target: "ingest",
                        registry = "euctr",
                        count = trials.len(),
                        skipped,
                        "scraped trials"
                    );
                }
                result.trials = trials;
                result.skipped = skipped;
            }
            Err(e) => {
                report_fetch_error(Registry::EuCtr, "fetch", &e);
                result.error_detail = Some(e.to_string());
            }
        }

        histogram!("ingest_fetch_ms", "registry" => "euctr").record(t0.elapsed().as_secs_f64() * 1_000.0);
        result
    }

    async fn scrape(&self, keyword: &str) -> Result<Vec<ScrapedRow>, FetchError> {
        let resp = self
            .client
            .get(&self.search_url)
            .query(&[("query", keyword), ("page", "1")])
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                status: status.as_u16(),
                message: status.canonical_reason().unwrap_or_default().to_string(),
            });
        }
        let body = resp.text().await?;
        if body.trim().is_empty() {
            return Err(FetchError::Malformed("empty page body".into()));
        }
        parse_search_page(&body)
            .ok_or_else(|| FetchError::Malformed("no entry blocks recognised".into()))
    }
}

#[async_trait]
impl TrialSource for EuCtrProvider {
    async fn fetch_result(&self, query: &SourceQuery) -> Result<FetchResult> {
        let r = self.fetch_detailed(&query.keyword, query.use_sample).await;
        if !r.sample {
            counter!("ingest_records_total", "registry" => "euctr").increment(r.trials.len() as u64);
        }
        Ok(r)
    }

    fn registry(&self) -> Registry {
        Registry::EuCtr
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LABELLED: &str = r#"
    <html><body>
      <div class="results">
        <table class="result">
          <tr>
            <td><span class="label">EudraCT Number:</span> 2004-000123-45</td>
            <td><span class="label">Sponsor Protocol Number:</span> ABC-1</td>
            <td><span class="label">Start Date:</span> 2004-06-01</td>
          </tr>
          <tr><td colspan="3"><span class="label">Sponsor Name:</span> Example&nbsp;Pharma</td></tr>
          <tr><td colspan="3"><span class="label">Full Title:</span> A trial of a <b>knee</b> implant</td></tr>
          <tr><td colspan="3"><span class="label">Medical condition:</span> Osteoarthritis; Knee injury</td></tr>
        </table>
        <table class="result">
          <tr><td><span class="label">Full Title:</span> No number here</td></tr>
        </table>
        <table class="result">
          <tr><td>Nothing recognisable</td></tr>
        </table>
      </div>
    </body></html>"#;

    const CLASSED: &str = r#"
    <html><body>
      <div class="result">
        <a href="/ctr-search/trial/?eudractNumber=2019-001111-22">2019-001111-22</a>
        <div class="title">Stent study</div>
        <span class="status">Ongoing</span>
        <div class="sponsor">Heart Co</div>
        <table><tr><td class="startdate">2019-02-01</td><td class="enddate">2021-02-01</td></tr></table>
      </div>
    </body></html>"#;

    #[test]
    fn label_cells_are_extracted() {
        let rows = parse_search_page(LABELLED).expect("entry blocks");
        assert_eq!(rows.len(), 2, "blocks with neither id nor title are dropped");
        let r = &rows[0];
        assert_eq!(r.eudract_id.as_deref(), Some("2004-000123-45"));
        assert_eq!(r.public_title.as_deref(), Some("A trial of a knee implant"));
        assert_eq!(r.main_sponsor.as_deref(), Some("Example Pharma"));
        assert_eq!(r.condition.as_deref(), Some("Osteoarthritis; Knee injury"));
        assert_eq!(r.start_date.as_deref(), Some("2004-06-01"));
        assert!(rows[1].eudract_id.is_none());
    }

    #[test]
    fn class_based_fields_are_extracted() {
        let rows = parse_search_page(CLASSED).expect("entry blocks");
        assert_eq!(rows.len(), 1);
        let r = &rows[0];
        assert_eq!(r.eudract_id.as_deref(), Some("2019-001111-22"));
        assert_eq!(r.public_title.as_deref(), Some("Stent study"));
        assert_eq!(r.status.as_deref(), Some("Ongoing"));
        assert_eq!(r.main_sponsor.as_deref(), Some("Heart Co"));
        assert_eq!(r.start_date.as_deref(), Some("2019-02-01"));
        assert_eq!(r.completion_date.as_deref(), Some("2021-02-01"));
    }

    #[test]
    fn list_table_rows_fall_back_to_id_pattern() {
        let html = r#"<table class="list">
            <tr><th>Header</th></tr>
            <tr><td>2020-000999-01</td><td>Catheter trial</td></tr>
        </table>"#;
        let rows = parse_search_page(html).expect("entry blocks");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].eudract_id.as_deref(), Some("2020-000999-01"));
    }

    #[test]
    fn unrelated_markup_is_not_a_results_page() {
        assert!(parse_search_page("<html><body><p>Service unavailable</p></body></html>").is_none());
        assert!(parse_search_page("").is_none());
    }

    #[test]
    fn blocks_without_usable_fields_are_an_empty_page() {
        let html = r#"<div class="result"><span>Nothing recognisable</span></div>"#;
        assert_eq!(parse_search_page(html), Some(Vec::new()));
    }
}
