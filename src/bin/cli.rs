//! One-shot aggregation from the command line: fetch, print diagnostics, save the snapshot.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};

use wapyrus::api::AppState;
use wapyrus::ingest::aggregate::{AggregateReport, RefreshRequest, SampleMode};
use wapyrus::{telemetry, AppConfig, Registry};

#[derive(Parser, Debug)]
#[command(name = "wapyrus-cli", about = "Search clinical-trial registries and save a snapshot")]
struct Cli {
    /// Search keyword, e.g. "medtech" or "atrial fibrillation"
    keyword: String,

    /// Per-registry record cap (defaults to config `max_records`)
    #[arg(long)]
    max_records: Option<usize>,

    /// Serve every registry from sample data
    #[arg(long)]
    sample: bool,

    /// Serve one registry from sample data (repeatable)
    #[arg(long, value_enum)]
    sample_source: Vec<SampleSource>,

    /// Snapshot path (defaults to config `snapshot_path`)
    #[arg(long)]
    output: Option<PathBuf>,

    /// Config file (TOML or JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print the full report as JSON instead of a summary
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SampleSource {
    Ctgov,
    Euctr,
}

impl Cli {
    fn sample_mode(&self) -> SampleMode {
        if self.sample {
            return SampleMode::all();
        }
        let mut m = SampleMode::none();
        for s in &self.sample_source {
            let reg = match s {
                SampleSource::Ctgov => Registry::ClinicalTrialsGov,
                SampleSource::Euctr => Registry::EuCtr,
            };
            m.set(reg, true);
        }
        m
    }

    fn request(&self, cfg: &AppConfig) -> RefreshRequest {
        RefreshRequest::new(
            self.keyword.clone(),
            self.max_records.unwrap_or(cfg.max_records),
            self.sample_mode(),
        )
    }
}

fn print_summary(r: &AggregateReport) {
    let d = &r.diagnostics;
    println!("keyword: {:?}", r.keyword);
    println!(
        "state: {:?}  total: {}  real: {}  sample: {}  failure ratio: {:.0}%",
        d.state,
        d.total,
        d.real_count,
        d.sample_count,
        d.failure_ratio * 100.0
    );
    for s in &d.sources {
        println!(
            "  {:<30} {:<17} {:>4} ({:>5.1}%) skipped {}{}",
            s.registry.display_name(),
            s.status.label(),
            s.count,
            s.percentage,
            s.skipped,
            s.error_detail
                .as_deref()
                .map(|e| format!("  [{e}]"))
                .unwrap_or_default()
        );
    }
    for t in &r.trials {
        println!("  - {}  {}  ({})", t.id, t.title, t.source);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    telemetry::init_tracing();

    let cli = Cli::parse();
    let mut cfg = AppConfig::load(cli.config.as_deref()).context("loading config")?;
    if let Some(out) = &cli.output {
        cfg.snapshot_path = out.clone();
    }
    let req = cli.request(&cfg);

    let state = AppState::from_config(cfg)?;
    let session = match state.run_refresh(req).await {
        Ok(s) => s,
        Err(_) => anyhow::bail!("refresh already running"),
    };

    if let Some(report) = &session.last_report {
        if cli.json {
            let out = serde_json::to_string_pretty(report).context("serializing report")?;
            println!("{out}");
        } else {
            print_summary(report);
        }
    }
    if !session.was_updated() {
        tracing::info!("no records found; snapshot left untouched");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_flags_map_to_registries() {
        let cli = Cli::try_parse_from(["wapyrus-cli", "stent", "--sample-source", "euctr"]).unwrap();
        let m = cli.sample_mode();
        assert!(m.euctr && !m.ctgov);

        let cli = Cli::try_parse_from(["wapyrus-cli", "stent", "--sample"]).unwrap();
        assert_eq!(cli.sample_mode(), SampleMode::all());
    }

    #[test]
    fn max_records_falls_back_to_config() {
        let cfg = AppConfig::default();
        let cli = Cli::try_parse_from(["wapyrus-cli", "medtech"]).unwrap();
        assert_eq!(cli.request(&cfg).max_records, cfg.max_records);
        let cli = Cli::try_parse_from(["wapyrus-cli", "medtech", "--max-records", "10"]).unwrap();
        assert_eq!(cli.request(&cfg).max_records, 10);
        let cli = Cli::try_parse_from(["wapyrus-cli", "medtech", "--max-records", "100000"]).unwrap();
        assert_eq!(cli.request(&cfg).max_records, 500);
    }
}
