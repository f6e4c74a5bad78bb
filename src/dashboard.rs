// src/dashboard.rs
//! Server-side rendering of the dashboard page. Pure: takes a view, returns HTML.

use std::collections::BTreeSet;
use std::fmt::Write as _;

use html_escape::{encode_double_quoted_attribute as attr, encode_text as text};

use crate::ingest::aggregate::{DataState, Diagnostics, SourceStatus};
use crate::ingest::types::CanonicalTrial;
use crate::session::{RefreshOutcome, RefreshSession};
use crate::snapshot::SnapshotInfo;

pub struct DashboardView<'a> {
    pub session: &'a RefreshSession,
    pub snapshot: &'a SnapshotInfo,
    pub default_keyword: &'a str,
    pub max_records: usize,
    pub study_type: Option<&'a str>,
    pub refreshing: bool,
}

/// Banner text per state. Sample data is never described as live, and a
/// registry that failed is named even when the other one delivered.
pub fn state_message(d: &Diagnostics, keyword: &str) -> (&'static str, String) {
    let (class, mut msg) = match d.state {
        DataState::Live => ("live", format!("Live data: {} records from the registries.", d.total)),
        DataState::Mixed => (
            "mixed",
            format!(
                "Live and SAMPLE data: {} live, {} sample records. Sample rows are marked.",
                d.real_count, d.sample_count
            ),
        ),
        DataState::SampleOnly => (
            "sample",
            format!(
                "Sample mode: {} placeholder records, not live data.",
                d.sample_count
            ),
        ),
        DataState::NoRealData => (
            "empty",
            format!("No real data found for \"{keyword}\". The registries responded without matching trials."),
        ),
        DataState::FetchFailed => (
            "failed",
            "Real data fetch failed for every registry. See diagnostics below.".to_string(),
        ),
        DataState::InvalidInput => ("invalid", "Enter a search keyword to refresh.".to_string()),
    };
    if d.partial_failure && !matches!(d.state, DataState::FetchFailed | DataState::InvalidInput) {
        let failed: Vec<&str> = d
            .sources
            .iter()
            .filter(|s| s.status == SourceStatus::Failed)
            .map(|s| s.registry.display_name())
            .collect();
        let _ = write!(msg, " Fetch failed for {}.", failed.join(", "));
    }
    (class, msg)
}

pub fn filter_by_study_type<'a>(
    trials: &'a [CanonicalTrial],
    study_type: Option<&str>,
) -> Vec<&'a CanonicalTrial> {
    match study_type.map(str::trim).filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("all")) {
        Some(st) => trials
            .iter()
            .filter(|t| t.study_type.eq_ignore_ascii_case(st))
            .collect(),
        None => trials.iter().collect(),
    }
}

pub fn render(view: &DashboardView<'_>) -> String {
    let s = view.session;
    let mut html = String::with_capacity(8 * 1024);
    html.push_str(
        "<!doctype html><html><head><meta charset=\"utf-8\"><title>Wapyrus: Clinical Trial Explorer</title>\
         <style>body{font-family:sans-serif;margin:2rem}table{border-collapse:collapse}\
         td,th{border:1px solid #ccc;padding:4px 8px;text-align:left}\
         .banner{padding:8px 12px;margin:1rem 0}.live{background:#e6f4ea}.mixed,.sample{background:#fff4e5}\
         .empty,.invalid{background:#eef}.failed{background:#fde7e9}.badge{background:#f90;color:#fff;padding:0 4px;font-size:80%}</style>\
         </head><body><h1>Wapyrus: Clinical Trial Explorer</h1>",
    );

    // Status banner
    if view.refreshing {
        html.push_str("<div class=\"banner sample\">Refresh in progress…</div>");
    }
    match &s.last_report {
        Some(r) => {
            let (class, msg) = state_message(&r.diagnostics, &r.keyword);
            let _ = write!(html, "<div class=\"banner {class}\">{}</div>", text(&msg));
            if s.last_outcome == Some(RefreshOutcome::NoNewData) && !s.trials.is_empty() {
                let _ = write!(
                    html,
                    "<p>No new trials fetched; showing {} previously stored records.</p>",
                    s.trials.len()
                );
            }
        }
        None if s.trials.is_empty() => {
            html.push_str("<div class=\"banner empty\">No data yet. Run a refresh.</div>")
        }
        None => {
            let sample = s.trials.iter().filter(|t| t.is_sample()).count();
            let _ = write!(
                html,
                "<div class=\"banner {}\">Showing {} records from the last saved snapshot ({} sample).</div>",
                if sample > 0 { "mixed" } else { "live" },
                s.trials.len(),
                sample
            );
        }
    }

    // Refresh controls
    let keyword = s
        .last_report
        .as_ref()
        .map(|r| r.keyword.as_str())
        .filter(|k| !k.is_empty())
        .unwrap_or(view.default_keyword);
    let _ = write!(
        html,
        "<form method=\"post\" action=\"/refresh\">\
         <label>Keyword <input name=\"keyword\" value=\"{}\"></label> \
         <label>Max records <input name=\"max_records\" type=\"number\" min=\"1\" max=\"500\" value=\"{}\"></label> \
         <label><input type=\"checkbox\" name=\"sample_ctgov\" value=\"on\"> Sample ClinicalTrials.gov</label> \
         <label><input type=\"checkbox\" name=\"sample_euctr\" value=\"on\"> Sample EU CTR</label> \
         <button type=\"submit\"{}>Refresh clinical trials</button></form>",
        attr(keyword),
        view.max_records,
        if view.refreshing { " disabled" } else { "" }
    );
    if let Some(ts) = s.last_update {
        let _ = write!(html, "<p><small>Last updated: {}</small></p>", ts.format("%Y-%m-%d %H:%M UTC"));
    }

    // Diagnostics
    if let Some(r) = &s.last_report {
        let d = &r.diagnostics;
        let _ = write!(
            html,
            "<h2>Diagnostics</h2><p>Total {} · real {} · sample {} · failure ratio {:.0}%</p>\
             <table><tr><th>Source</th><th>Status</th><th>Records</th><th>Share</th><th>Skipped</th><th>Detail</th></tr>",
            d.total,
            d.real_count,
            d.sample_count,
            d.failure_ratio * 100.0
        );
        for src in &d.sources {
            let _ = write!(
                html,
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>{:.1}%</td><td>{}</td><td>{}</td></tr>",
                text(src.registry.display_name()),
                text(src.status.label()),
                src.count,
                src.percentage,
                src.skipped,
                text(src.error_detail.as_deref().unwrap_or(""))
            );
        }
        html.push_str("</table>");
    }

    // Study type filter
    let types: BTreeSet<&str> = s
        .trials
        .iter()
        .map(|t| t.study_type.as_str())
        .filter(|t| !t.is_empty())
        .collect();
    let selected = view.study_type.unwrap_or("All");
    html.push_str("<h2>Trials</h2><form method=\"get\" action=\"/\"><select name=\"study_type\" onchange=\"this.form.submit()\">");
    for opt in std::iter::once("All").chain(types.into_iter()) {
        let sel = if opt.eq_ignore_ascii_case(selected) { " selected" } else { "" };
        let _ = write!(html, "<option value=\"{}\"{sel}>{}</option>", attr(opt), text(opt));
    }
    html.push_str("</select></form>");

    // Trials table
    let rows = filter_by_study_type(&s.trials, view.study_type);
    let _ = write!(html, "<p>Showing {} of {} records.</p>", rows.len(), s.trials.len());
    html.push_str(
        "<table><tr><th>ID</th><th>Title</th><th>Conditions</th><th>Type</th><th>Status</th>\
         <th>Start</th><th>Completion</th><th>Sponsor</th><th>Source</th></tr>",
    );
    for t in rows {
        let badge = if t.is_sample() {
            " <span class=\"badge\">SAMPLE</span>"
        } else {
            ""
        };
        let _ = write!(
            html,
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}{badge}</td></tr>",
            text(&t.id),
            text(&t.title),
            text(&t.conditions.join(", ")),
            text(&t.study_type),
            text(&t.status),
            text(&t.start_date),
            text(&t.completion_date),
            text(&t.sponsor),
            text(&t.source)
        );
    }
    html.push_str("</table>");

    // Snapshot sidebar
    let snap = view.snapshot;
    let _ = write!(
        html,
        "<h2>Snapshot</h2><p>{}: {}</p>",
        text(&snap.path),
        if snap.exists {
            match snap.records {
                Some(n) => format!("{} bytes, {} records", snap.bytes, n),
                None => format!("{} bytes, unreadable", snap.bytes),
            }
        } else {
            "not found".to_string()
        }
    );

    html.push_str("</body></html>");
    html
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::aggregate::AggregateReport;
    use crate::ingest::types::{FetchResult, Provenance, Registry};

    fn snap() -> SnapshotInfo {
        SnapshotInfo {
            path: "kb.json".into(),
            exists: false,
            bytes: 0,
            records: None,
        }
    }

    fn view<'a>(s: &'a RefreshSession, info: &'a SnapshotInfo) -> DashboardView<'a> {
        DashboardView {
            session: s,
            snapshot: info,
            default_keyword: "medtech",
            max_records: 50,
            study_type: None,
            refreshing: false,
        }
    }

    #[test]
    fn sample_rows_are_badged_and_banner_says_sample() {
        let trials = crate::ingest::providers::sample::euctr_sample();
        let r = FetchResult::sample(trials.clone());
        let report = AggregateReport {
            keyword: "medtech".into(),
            generated_at: chrono::Utc::now(),
            diagnostics: Diagnostics::compute(&[(Registry::EuCtr, r)]),
            trials,
        };
        let s = RefreshSession::default().apply(report);
        let info = snap();
        let html = render(&view(&s, &info));
        assert!(html.contains("Sample mode"));
        assert_eq!(html.matches("SAMPLE</span>").count(), 2);
        assert!(!html.contains("Live data"));
    }

    #[test]
    fn failed_and_empty_states_are_distinct() {
        let failed = FetchResult {
            attempted: true,
            error_detail: Some("network error: timed out".into()),
            ..Default::default()
        };
        let d = Diagnostics::compute(&[(Registry::ClinicalTrialsGov, failed)]);
        assert_eq!(state_message(&d, "x").0, "failed");

        let empty = FetchResult {
            attempted: true,
            succeeded: true,
            ..Default::default()
        };
        let d = Diagnostics::compute(&[(Registry::ClinicalTrialsGov, empty)]);
        let (class, msg) = state_message(&d, "stent");
        assert_eq!(class, "empty");
        assert!(msg.contains("stent"));
    }

    #[test]
    fn partial_failure_names_the_failed_registry() {
        let failed = FetchResult {
            attempted: true,
            error_detail: Some("HTTP status 503: Service Unavailable".into()),
            ..Default::default()
        };
        let live = FetchResult {
            trials: vec![CanonicalTrial {
                id: "2020-000001-01".into(),
                source: Provenance::live(Registry::EuCtr).tag(),
                ..Default::default()
            }],
            attempted: true,
            succeeded: true,
            ..Default::default()
        };
        let d = Diagnostics::compute(&[
            (Registry::ClinicalTrialsGov, failed.clone()),
            (Registry::EuCtr, live),
        ]);
        let (class, msg) = state_message(&d, "stent");
        assert_eq!(class, "live");
        assert!(msg.ends_with("Fetch failed for ClinicalTrials.gov."), "{msg}");

        let sample = FetchResult::sample(crate::ingest::providers::sample::euctr_sample());
        let d = Diagnostics::compute(&[(Registry::ClinicalTrialsGov, failed), (Registry::EuCtr, sample)]);
        let (class, msg) = state_message(&d, "stent");
        assert_eq!(class, "sample");
        assert!(msg.contains("Fetch failed for ClinicalTrials.gov."), "{msg}");
    }

    #[test]
    fn markup_is_escaped_and_filter_applies() {
        let mk = |id: &str, st: &str| CanonicalTrial {
            id: id.into(),
            title: "<script>x</script>".into(),
            study_type: st.into(),
            source: Provenance::live(Registry::ClinicalTrialsGov).tag(),
            ..Default::default()
        };
        let s = RefreshSession::from_snapshot(vec![mk("N1", "INTERVENTIONAL"), mk("N2", "OBSERVATIONAL")]);
        let info = snap();
        let mut v = view(&s, &info);
        v.study_type = Some("observational");
        let html = render(&v);
        assert!(!html.contains("<script>x"));
        assert!(html.contains("Showing 1 of 2 records."));
        assert!(html.contains("<td>N2</td>"));
        assert!(!html.contains("<td>N1</td>"));
    }
}
