//! INSEE reference data import.
//!
//! Loads regions, departments, postal codes and communes from the INSEE CSV
//! files into the sled reference store used by the query server.

mod config;

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use insee::importer::{ImportObserver, Importer, ReimportPolicy, Stage};
use insee::store::ReferenceStore;

use crate::config::Config;

#[derive(Parser, Debug)]
#[command(name = "ingest")]
#[command(about = "Import INSEE reference data into the reference store")]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory containing the INSEE CSV files
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Reference store (sled database directory)
    #[arg(long)]
    db: Option<PathBuf>,

    /// Import again even if reference data is already present (duplicates it)
    #[arg(long)]
    append: bool,
}

/// One spinner per import stage.
struct StageProgress {
    style: ProgressStyle,
    current: RefCell<Option<ProgressBar>>,
}

impl StageProgress {
    fn new() -> Result<Self> {
        let style = ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg} {pos} rows ({per_sec})")?;
        Ok(Self {
            style,
            current: RefCell::new(None),
        })
    }
}

impl ImportObserver for StageProgress {
    fn stage_started(&self, stage: Stage, path: &Path) {
        let pb = ProgressBar::new_spinner();
        pb.set_style(self.style.clone());
        pb.set_message(format!("{} <- {}", stage, path.display()));
        pb.enable_steady_tick(Duration::from_millis(120));
        *self.current.borrow_mut() = Some(pb);
    }

    fn row_imported(&self, _stage: Stage) {
        if let Some(pb) = self.current.borrow().as_ref() {
            pb.inc(1);
        }
    }

    fn stage_finished(&self, stage: Stage, count: usize) {
        if let Some(pb) = self.current.borrow_mut().take() {
            pb.finish_with_message(format!("{}: {} imported", stage, count));
        }
    }
}

fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load_from_file(path)?,
        None => Config::default(),
    };
    let data_dir = args
        .data_dir
        .clone()
        .unwrap_or_else(|| config.global.data_dir.clone());
    let db_path = args
        .db
        .clone()
        .unwrap_or_else(|| config.global.db_path.clone());
    let policy = if args.append {
        ReimportPolicy::Append
    } else {
        config.import.policy
    };

    info!("INSEE Ingest");
    info!("Data directory: {}", data_dir.display());
    info!("Reference store: {}", db_path.display());

    let store = ReferenceStore::open_sled(&db_path)
        .with_context(|| format!("Failed to open reference store {}", db_path.display()))?;

    for country in config.baseline_countries() {
        store
            .ensure_country(&country.name, &country.code)
            .with_context(|| format!("Failed to seed country {}", country.name))?;
    }

    let progress = StageProgress::new()?;
    let report = Importer::new(&store)
        .files(config.files.clone())
        .policy(policy)
        .observer(&progress)
        .run(&data_dir)
        .context("INSEE import failed")?;

    store.flush().context("Failed to flush reference store")?;

    for stage in Stage::all() {
        info!("{}: {}", stage, report.count(*stage));
    }
    if report.unlinked_cities > 0 {
        info!(
            "{} cities have no matching department",
            report.unlinked_cities
        );
    }
    info!(
        "Import finished in {}s",
        (report.finished_at - report.started_at).num_seconds()
    );

    Ok(())
}
