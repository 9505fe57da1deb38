//! Parser - ingests daily generation reports into the grid database
//!
//! Stages, in order:
//! - Daily generation spreadsheets (resumes after the latest stored date)
//! - Renewable reports (workbook or PDF, processed in full)
//! - State demand backfill from the daily-average CSV
//!
//! Every write is an upsert, so re-running over the same files is safe.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Parser;
use sqlx::postgres::PgPoolOptions;

use grid_parser::config::Config;
use grid_parser::logging;
use grid_parser::runner::{self, RunOptions, Stage};
use grid_parser::store::{MemoryStore, PgStore, ReportStore};

#[derive(Parser, Debug)]
#[command(name = "parser", about = "Ingests daily power-generation reports")]
struct Args {
    /// Stage to run
    #[arg(long, value_enum, default_value_t = Stage::All)]
    stage: Stage,

    /// First report date to ingest (YYYY-MM-DD), overriding the resume watermark
    #[arg(long)]
    since: Option<NaiveDate>,

    /// Ignore the resume watermark and start from DEFAULT_START_DATE
    #[arg(long, default_value = "false")]
    reprocess: bool,

    /// Dry run - parse into an in-memory store, no database
    #[arg(long, default_value = "false")]
    dry_run: bool,

    #[arg(long, default_value = "5")]
    max_connections: u32,

    /// Overrides REPORTS_DIR
    #[arg(long)]
    reports_dir: Option<PathBuf>,

    /// Overrides RENEWABLE_DIR
    #[arg(long)]
    renewable_dir: Option<PathBuf>,

    /// Overrides DEMAND_CSV
    #[arg(long)]
    demand_csv: Option<PathBuf>,
}

impl Args {
    fn apply(&self, config: &mut Config) {
        if let Some(dir) = &self.reports_dir {
            config.reports_dir = dir.clone();
        }
        if let Some(dir) = &self.renewable_dir {
            config.renewable_dir = dir.clone();
        }
        if let Some(path) = &self.demand_csv {
            config.demand_csv = path.clone();
        }
    }

    fn run_options(&self) -> RunOptions {
        RunOptions {
            stage: self.stage,
            since: self.since,
            reprocess: self.reprocess,
        }
    }
}

async fn connect(config: &Config, max_connections: u32) -> Result<PgStore> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(config.require_db_url()?)
        .await
        .context("Failed to connect to database")?;
    let store = PgStore::new(pool);
    store.migrate().await.context("Failed to apply migrations")?;
    Ok(store)
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    logging::init();
    let args = Args::parse();

    let mut config = Config::from_env()?;
    args.apply(&mut config);

    let mode = if args.dry_run { "dry-run" } else { "live" };
    tracing::info!(
        stage = args.stage.as_str(),
        mode,
        reports_dir = %config.reports_dir.display(),
        renewable_dir = %config.renewable_dir.display(),
        "parser starting"
    );

    let store: Box<dyn ReportStore> = if args.dry_run {
        Box::new(MemoryStore::new())
    } else {
        Box::new(connect(&config, args.max_connections).await?)
    };

    let summary = runner::run(store.as_ref(), &config, &args.run_options())
        .await
        .context("Ingestion run failed")?;

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
