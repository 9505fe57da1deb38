//! Run controller: discover report files, process them in date order and
//! keep one ingest-run record per invocation.
//!
//! Each file is read, parsed against a fresh registry snapshot and applied
//! in its own transaction, so a failing file never affects its neighbours.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use serde::Serialize;
use walkdir::WalkDir;

use crate::config::Config;
use crate::daily;
use crate::demand;
use crate::error::{IngestError, StoreError};
use crate::grid::{read_pdf_tables, read_report, read_workbook_sheets};
use crate::header::Confidence;
use crate::model::{FileBatch, WriteStats};
use crate::normalize::report_date_from_grid;
use crate::renewable;
use crate::store::ReportStore;

static DAILY_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^dgr2-(\d{4}-\d{2}-\d{2})\.xlsx?$").expect("valid regex")
});

static RENEWABLE_DMY_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(\d{2}-\d{2}-\d{4})\.(xlsx|pdf)$").expect("valid regex")
});

static RENEWABLE_MON_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(\d{1,2})_([a-z]{3,4})_(\d{4})(_.*)?\.(xlsx|pdf)$").expect("valid regex")
});

const DAILY_EXTENSIONS: &[&str] = &["xls", "xlsx"];
const RENEWABLE_EXTENSIONS: &[&str] = &["xlsx", "pdf"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    #[default]
    All,
    Daily,
    Renewable,
    Demand,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::All => "all",
            Stage::Daily => "daily",
            Stage::Renewable => "renewable",
            Stage::Demand => "demand",
        }
    }

    fn runs(self, stage: Stage) -> bool {
        self == Stage::All || self == stage
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub stage: Stage,
    /// Overrides the resume watermark.
    pub since: Option<NaiveDate>,
    /// Ignore the watermark and start from the configured start date.
    pub reprocess: bool,
}

/// A report file found on disk, with the date its name carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportFile {
    pub path: PathBuf,
    pub date: Option<NaiveDate>,
}

impl ReportFile {
    fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub inserted: usize,
    pub updated: usize,
    pub skipped_rows: usize,
    pub unresolved: BTreeSet<String>,
}

impl RunSummary {
    fn status(&self) -> &'static str {
        if self.failed == 0 {
            "ok"
        } else {
            "partial"
        }
    }

    fn record(&mut self, file: &ReportFile, outcome: Result<Ingested, IngestError>) {
        let name = file.name();
        match outcome {
            Ok(Ingested::Applied(report)) => {
                tracing::info!(
                    file = %name,
                    date = %report.date,
                    records = report.records,
                    inserted = report.stats.inserted,
                    updated = report.stats.updated,
                    skipped = report.skipped_rows,
                    confidence = report.confidence.as_str(),
                    "file ingested"
                );
                if report.confidence == Confidence::NumericFallback {
                    tracing::warn!(file = %name, "capacity column located by numeric density");
                }
                self.processed += 1;
                self.inserted += report.stats.inserted;
                self.updated += report.stats.updated;
                self.skipped_rows += report.skipped_rows;
                self.unresolved.extend(report.unresolved);
            }
            Ok(Ingested::NotDue(date)) => {
                tracing::debug!(file = %name, date = %date, "before start date");
            }
            Err(e) if e.is_unreadable() => {
                tracing::warn!(file = %name, error = %e, "unreadable file skipped");
                self.skipped += 1;
            }
            Err(e) => {
                tracing::error!(file = %name, error = %e, "file failed");
                self.failed += 1;
            }
        }
    }
}

struct FileReport {
    date: NaiveDate,
    stats: WriteStats,
    records: usize,
    skipped_rows: usize,
    confidence: Confidence,
    unresolved: Vec<String>,
}

enum Ingested {
    Applied(FileReport),
    NotDue(NaiveDate),
}

async fn apply_batch(store: &dyn ReportStore, batch: FileBatch) -> Result<Ingested, IngestError> {
    let stats = store.apply(&batch).await?;
    Ok(Ingested::Applied(FileReport {
        date: batch.report_date,
        stats,
        records: batch.record_count(),
        skipped_rows: batch.skipped_rows,
        confidence: batch.confidence,
        unresolved: batch.unresolved.into_iter().map(|u| u.name).collect(),
    }))
}

// =============================================================================
// Discovery
// =============================================================================

/// Date carried by a daily report name, `dgr2-YYYY-MM-DD.xls(x)`.
pub fn daily_file_date(name: &str) -> Option<NaiveDate> {
    let caps = DAILY_NAME.captures(name)?;
    NaiveDate::parse_from_str(&caps[1], "%Y-%m-%d").ok()
}

/// Date carried by a renewable report name, `DD-MM-YYYY.xlsx` or
/// `D_Mon_YYYY_*.xlsx` (also `.pdf`).
pub fn renewable_file_date(name: &str) -> Option<NaiveDate> {
    if let Some(caps) = RENEWABLE_DMY_NAME.captures(name) {
        return NaiveDate::parse_from_str(&caps[1], "%d-%m-%Y").ok();
    }
    let caps = RENEWABLE_MON_NAME.captures(name)?;
    let month = match caps[2].to_ascii_lowercase().as_str() {
        "sept" => "sep".to_string(),
        other => other.to_string(),
    };
    NaiveDate::parse_from_str(&format!("{}-{}-{}", &caps[1], month, &caps[3]), "%d-%b-%Y").ok()
}

/// List report files directly under `dir`. Dated files come first in date
/// order; undated ones follow, ordered by path.
pub fn discover(
    dir: &Path,
    extensions: &[&str],
    date_of: fn(&str) -> Option<NaiveDate>,
) -> Vec<ReportFile> {
    let mut files: Vec<ReportFile> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!(dir = %dir.display(), error = %e, "cannot list report directory");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            entry
                .path()
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| extensions.iter().any(|x| x.eq_ignore_ascii_case(e)))
        })
        .map(|entry| {
            let date = entry.file_name().to_str().and_then(date_of);
            ReportFile {
                path: entry.into_path(),
                date,
            }
        })
        .collect();

    files.sort_by(|a, b| match (a.date, b.date) {
        (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.path.cmp(&b.path)),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => a.path.cmp(&b.path),
    });
    files
}

// =============================================================================
// Stages
// =============================================================================

async fn daily_start(
    store: &dyn ReportStore,
    config: &Config,
    options: &RunOptions,
) -> Result<NaiveDate, StoreError> {
    if let Some(since) = options.since {
        return Ok(since);
    }
    if options.reprocess {
        return Ok(config.default_start_date);
    }
    Ok(match store.latest_report_date().await? {
        Some(latest) => latest.succ_opt().unwrap_or(latest),
        None => config.default_start_date,
    })
}

async fn ingest_daily(
    store: &dyn ReportStore,
    file: &ReportFile,
    start: NaiveDate,
) -> Result<Ingested, IngestError> {
    let grid = read_report(&file.path)?;
    let date = file
        .date
        .or_else(|| report_date_from_grid(&grid))
        .ok_or_else(|| IngestError::MissingReportDate(file.path.clone()))?;
    if date < start {
        return Ok(Ingested::NotDue(date));
    }
    let mut registry = store.load_registry().await?;
    tracing::debug!(file = %file.path.display(), known_plants = registry.len(), "registry loaded");
    let batch = daily::build_batch(&grid, date, &mut registry)?;
    apply_batch(store, batch).await
}

async fn run_daily(
    store: &dyn ReportStore,
    config: &Config,
    options: &RunOptions,
    summary: &mut RunSummary,
) -> Result<(), StoreError> {
    let start = daily_start(store, config, options).await?;
    let files: Vec<ReportFile> = discover(&config.reports_dir, DAILY_EXTENSIONS, daily_file_date)
        .into_iter()
        .filter(|f| f.date.map_or(true, |d| d >= start))
        .collect();
    tracing::info!(
        dir = %config.reports_dir.display(),
        start = %start,
        files = files.len(),
        "daily stage"
    );

    for file in &files {
        summary.record(file, ingest_daily(store, file, start).await);
    }
    Ok(())
}

async fn ingest_renewable(
    store: &dyn ReportStore,
    file: &ReportFile,
) -> Result<Ingested, IngestError> {
    let date = file
        .date
        .ok_or_else(|| IngestError::MissingReportDate(file.path.clone()))?;
    let is_pdf = file
        .path
        .extension()
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"));

    let batch = if is_pdf {
        let pages = read_pdf_tables(&file.path)?;
        let mut registry = store.load_registry().await?;
        renewable::pdf_batch(&pages, date, &mut registry)
    } else {
        let sheets = read_workbook_sheets(&file.path)?;
        let mut registry = store.load_registry().await?;
        renewable::workbook_batch(&sheets, date, &mut registry)
    };
    apply_batch(store, batch).await
}

async fn run_renewable(
    store: &dyn ReportStore,
    config: &Config,
    options: &RunOptions,
    summary: &mut RunSummary,
) {
    let files: Vec<ReportFile> =
        discover(&config.renewable_dir, RENEWABLE_EXTENSIONS, renewable_file_date)
            .into_iter()
            .filter(|f| match (options.since, f.date) {
                (Some(since), Some(d)) => d >= since,
                _ => true,
            })
            .collect();
    tracing::info!(dir = %config.renewable_dir.display(), files = files.len(), "renewable stage");

    for file in &files {
        summary.record(file, ingest_renewable(store, file).await);
    }
}

async fn run_demand(
    store: &dyn ReportStore,
    config: &Config,
    summary: &mut RunSummary,
) -> Result<(), StoreError> {
    let dates = store.report_dates().await?;
    let path = &config.demand_csv;
    let plan = match demand::read_demand(path, &dates) {
        Ok(plan) => plan,
        Err(e) => {
            tracing::error!(file = %path.display(), error = %e, "demand backfill failed");
            summary.failed += 1;
            return Ok(());
        }
    };

    match store.apply_regions(&plan.updates).await {
        Ok(stats) => {
            tracing::info!(
                file = %path.display(),
                inserted = stats.inserted,
                updated = stats.updated,
                skipped = plan.skipped,
                "demand backfilled"
            );
            summary.processed += 1;
            summary.inserted += stats.inserted;
            summary.updated += stats.updated;
            summary.skipped_rows += plan.skipped;
        }
        Err(e) => {
            tracing::error!(file = %path.display(), error = %e, "demand backfill failed");
            summary.failed += 1;
        }
    }
    Ok(())
}

async fn run_stages(
    store: &dyn ReportStore,
    config: &Config,
    options: &RunOptions,
    summary: &mut RunSummary,
) -> Result<(), StoreError> {
    if options.stage.runs(Stage::Daily) {
        run_daily(store, config, options, summary).await?;
    }
    if options.stage.runs(Stage::Renewable) {
        run_renewable(store, config, options, summary).await;
    }
    if options.stage.runs(Stage::Demand) {
        run_demand(store, config, summary).await?;
    }
    Ok(())
}

/// Run the selected stages and record the run in `ingest_runs`.
pub async fn run(
    store: &dyn ReportStore,
    config: &Config,
    options: &RunOptions,
) -> Result<RunSummary, StoreError> {
    let run_id = store.start_run(options.stage.as_str()).await?;
    let mut summary = RunSummary::default();

    if let Err(e) = run_stages(store, config, options, &mut summary).await {
        tracing::error!(error = %e, "run aborted");
        let detail = serde_json::json!({ "error": e.to_string() });
        store.finish_run(run_id, "failed", detail).await?;
        return Err(e);
    }

    tracing::info!(
        processed = summary.processed,
        skipped = summary.skipped,
        failed = summary.failed,
        inserted = summary.inserted,
        updated = summary.updated,
        "run finished"
    );
    if !summary.unresolved.is_empty() {
        let names: Vec<&str> = summary.unresolved.iter().map(String::as_str).collect();
        tracing::warn!(unresolved = %names.join(", "), "unresolved state names");
    }

    let detail = serde_json::to_value(&summary).unwrap_or_default();
    store.finish_run(run_id, summary.status(), detail).await?;
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PlantId;
    use crate::store::MemoryStore;

    const HEADER: &str = "NAME OF STATION\tMONITORED CAPACITY (MW)\tTODAY'S PROGRAM\tTODAY'S ACTUAL\tCOAL STOCK IN DAYS\tCAP. UNDER OUTAGE\tREMARKS";

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn write_daily(dir: &Path, name: &str, title: &str, body: &[&str]) {
        let mut lines = vec![title.to_string(), HEADER.to_string()];
        lines.extend(body.iter().map(|l| l.to_string()));
        std::fs::write(dir.join(name), lines.join("\n")).unwrap();
    }

    struct Fixture {
        _root: tempfile::TempDir,
        config: Config,
    }

    fn fixture() -> Fixture {
        let root = tempfile::tempdir().unwrap();
        let reports = root.path().join("dgr");
        let renewable = root.path().join("renewable");
        std::fs::create_dir_all(&reports).unwrap();
        std::fs::create_dir_all(&renewable).unwrap();

        write_daily(
            &reports,
            "dgr2-2025-08-01.xls",
            "DAILY GENERATION REPORT",
            &[
                "RAJASTHAN",
                "ALPHA TPS\t500\t450\t420\t6",
                "RAJASTHAN STATE TOTAL\t500\t450\t420",
            ],
        );
        write_daily(
            &reports,
            "dgr2-2025-08-02.xls",
            "DAILY GENERATION REPORT",
            &[
                "RAJASTHAN",
                "ALPHA TPS\t500\t450\t300\t5\t100\tCoal shortage",
                "RAJASTHAN STATE TOTAL\t500\t450\t300",
            ],
        );

        let config = Config {
            db_url: None,
            reports_dir: reports,
            renewable_dir: renewable,
            demand_csv: root.path().join("state_daily_avg.csv"),
            default_start_date: ymd(2025, 8, 1),
        };
        Fixture { _root: root, config }
    }

    fn options(stage: Stage) -> RunOptions {
        RunOptions {
            stage,
            ..RunOptions::default()
        }
    }

    #[test]
    fn test_daily_file_date() {
        assert_eq!(daily_file_date("dgr2-2025-08-30.xls"), Some(ymd(2025, 8, 30)));
        assert_eq!(daily_file_date("DGR2-2025-08-30.XLSX"), Some(ymd(2025, 8, 30)));
        assert_eq!(daily_file_date("dgr2-2025-13-30.xls"), None);
        assert_eq!(daily_file_date("report.xls"), None);
    }

    #[test]
    fn test_renewable_file_date() {
        assert_eq!(renewable_file_date("01-09-2025.xlsx"), Some(ymd(2025, 9, 1)));
        assert_eq!(renewable_file_date("5_Sept_2025_RE.xlsx"), Some(ymd(2025, 9, 5)));
        assert_eq!(renewable_file_date("12_Aug_2025_report.pdf"), Some(ymd(2025, 8, 12)));
        assert_eq!(renewable_file_date("notes.xlsx"), None);
    }

    #[test]
    fn test_discover_orders_by_date_and_filters_extensions() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["dgr2-2025-08-03.xls", "dgr2-2025-08-01.xlsx", "legacy.xls", "readme.txt"] {
            std::fs::write(dir.path().join(name), "x").unwrap();
        }
        let files = discover(dir.path(), DAILY_EXTENSIONS, daily_file_date);
        let names: Vec<String> = files.iter().map(ReportFile::name).collect();
        assert_eq!(names, vec!["dgr2-2025-08-01.xlsx", "dgr2-2025-08-03.xls", "legacy.xls"]);
        assert_eq!(files[2].date, None);
    }

    #[test]
    fn test_discover_missing_directory_is_empty() {
        let files = discover(Path::new("/nonexistent/dgr"), DAILY_EXTENSIONS, daily_file_date);
        assert!(files.is_empty());
    }

    #[tokio::test]
    async fn test_daily_stage_end_to_end() {
        crate::logging::init_test();
        let fx = fixture();
        let store = MemoryStore::new();

        let summary = run(&store, &fx.config, &options(Stage::Daily)).await.unwrap();
        assert_eq!(summary.processed, 2);
        assert_eq!(summary.failed, 0);

        let tables = store.snapshot();
        assert_eq!(tables.plants.len(), 1);
        assert_eq!(tables.plants[&PlantId(1)].state, "RJ");
        assert_eq!(tables.production.len(), 2);
        assert_eq!(tables.production[&(PlantId(1), ymd(2025, 8, 2))].actual_mu, Some(300.0));
        assert_eq!(tables.regions.len(), 2);
        assert_eq!(tables.dates.len(), 2);

        let run = tables.runs.values().next().unwrap();
        assert_eq!(run.stage, "daily");
        assert_eq!(run.status, "ok");
        assert_eq!(run.detail["processed"], 2);
    }

    #[tokio::test]
    async fn test_second_run_resumes_after_watermark() {
        let fx = fixture();
        let store = MemoryStore::new();
        run(&store, &fx.config, &options(Stage::Daily)).await.unwrap();

        let again = run(&store, &fx.config, &options(Stage::Daily)).await.unwrap();
        assert_eq!(again.processed, 0);
    }

    #[tokio::test]
    async fn test_reprocess_is_idempotent() {
        let fx = fixture();
        let store = MemoryStore::new();
        run(&store, &fx.config, &options(Stage::Daily)).await.unwrap();
        let before = store.snapshot();

        let opts = RunOptions {
            stage: Stage::Daily,
            reprocess: true,
            ..RunOptions::default()
        };
        let summary = run(&store, &fx.config, &opts).await.unwrap();
        assert_eq!(summary.processed, 2);
        assert_eq!(summary.inserted, 0);

        let after = store.snapshot();
        assert_eq!(after.plants, before.plants);
        assert_eq!(after.production, before.production);
        assert_eq!(after.statuses, before.statuses);
        assert_eq!(after.regions, before.regions);
    }

    #[tokio::test]
    async fn test_since_limits_daily_files() {
        let fx = fixture();
        let store = MemoryStore::new();
        let opts = RunOptions {
            stage: Stage::Daily,
            since: Some(ymd(2025, 8, 2)),
            ..RunOptions::default()
        };
        let summary = run(&store, &fx.config, &opts).await.unwrap();
        assert_eq!(summary.processed, 1);
        assert_eq!(store.snapshot().dates.into_iter().collect::<Vec<_>>(), vec![ymd(2025, 8, 2)]);
    }

    #[tokio::test]
    async fn test_file_outcomes_are_independent() {
        let fx = fixture();
        let junk = fx.config.reports_dir.join("dgr2-2025-08-03.xls");
        std::fs::write(junk, [0u8, 1, 2, 3, 0, 0, 7]).unwrap();
        std::fs::write(
            fx.config.reports_dir.join("notes.xls"),
            "NAME\tREMARKS\nALPHA TPS\tpending\n",
        )
        .unwrap();
        let store = MemoryStore::new();

        let summary = run(&store, &fx.config, &options(Stage::Daily)).await.unwrap();
        assert_eq!(summary.processed, 2);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(store.snapshot().dates.len(), 2);
        assert_eq!(store.snapshot().runs.values().next().unwrap().status, "partial");
    }

    #[tokio::test]
    async fn test_undated_file_takes_date_from_title() {
        let fx = fixture();
        write_daily(
            &fx.config.reports_dir,
            "legacy.xls",
            "DAILY GENERATION REPORT FOR 05-08-2025",
            &["GUJARAT", "BETA TPS\t900\t800\t780"],
        );
        let store = MemoryStore::new();

        let summary = run(&store, &fx.config, &options(Stage::Daily)).await.unwrap();
        assert_eq!(summary.processed, 3);
        let tables = store.snapshot();
        assert!(tables.dates.contains(&ymd(2025, 8, 5)));
        assert!(tables.plants.values().any(|p| p.name == "BETA TPS" && p.state == "GJT"));
    }

    #[tokio::test]
    async fn test_renewable_and_demand_stages() {
        let fx = fixture();
        std::fs::write(
            fx.config.renewable_dir.join("01-08-2025.xlsx"),
            "State / Region\tWind\tSolar\tOthers RES\tTotal\n\
             Rajasthan\t10\t80\t2.5\t92.5\n\
             Chandigarh\t0\t1\t0.1\t1.1\n",
        )
        .unwrap();
        std::fs::write(
            &fx.config.demand_csv,
            "StateCode,Date,Avg_Demand\nRJ,2025-08-01,312.5\nRJ,2025-09-01,1\n",
        )
        .unwrap();
        let store = MemoryStore::new();
        let key = ("RJ".to_string(), ymd(2025, 8, 1));

        let daily = run(&store, &fx.config, &options(Stage::Daily)).await.unwrap();
        assert_eq!(daily.processed, 2);
        let region = store.snapshot().regions[&key].clone();
        assert_eq!(region.monitored_capacity_mw, Some(500.0));
        assert_eq!(region.demand_mu, None);

        let renewable = run(&store, &fx.config, &options(Stage::Renewable)).await.unwrap();
        assert_eq!(renewable.processed, 1);
        assert_eq!(renewable.unresolved.iter().collect::<Vec<_>>(), vec!["Chandigarh"]);
        assert_eq!(store.snapshot().regions[&key].demand_mu, None);

        let demand = run(&store, &fx.config, &options(Stage::Demand)).await.unwrap();
        assert_eq!(demand.processed, 1);
        assert_eq!(demand.failed, 0);

        let tables = store.snapshot();
        assert!(tables.plants.values().any(|p| p.name == "Biomass_RJ"));
        let region = &tables.regions[&key];
        assert_eq!(region.monitored_capacity_mw, Some(500.0));
        assert_eq!(region.demand_mu, Some(312.5));
    }

    #[tokio::test]
    async fn test_missing_demand_csv_fails_stage_only() {
        let fx = fixture();
        let store = MemoryStore::new();
        let summary = run(&store, &fx.config, &options(Stage::Demand)).await.unwrap();
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.processed, 0);
    }
}
