//! Horizon Backtest CLI
//!
//! # Run a walk-forward backtest and score it
//! horizon-backtest run --config config/cm.toml --data data/cm_features.parquet
//!
//! # Print the origin schedule
//! horizon-backtest schedule --config config/cm.toml
//!
//! # Check a panel against the configured partition
//! horizon-backtest validate --config config/cm.toml --data data/cm_features.parquet

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use horizon_backtest::config::RunConfig;
use horizon_backtest::data::{
    evaluation_to_dataframe, reconciled_to_dataframe, row_errors_to_dataframe, write_dataframe,
    PanelDataset, PanelLoader,
};
use horizon_backtest::validation::PanelIntegrityValidator;
use horizon_backtest::walkforward::WalkForwardEngine;

#[derive(Parser)]
#[command(name = "horizon-backtest")]
#[command(about = "Walk-forward multi-horizon forecasting backtests on panel data")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the walk-forward loop, evaluate, and write the results
    Run {
        /// Path to configuration file
        #[arg(short, long)]
        config: PathBuf,

        /// Panel data file (.parquet or .csv)
        #[arg(short, long)]
        data: PathBuf,

        /// Output directory, overriding the config
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print every origin with its training and prediction ranges
    Schedule {
        /// Path to configuration file
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Run integrity checks on a panel
    Validate {
        /// Path to configuration file
        #[arg(short, long)]
        config: PathBuf,

        /// Panel data file (.parquet or .csv)
        #[arg(short, long)]
        data: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("horizon_backtest=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            data,
            output,
        } => run(&config, &data, output),
        Commands::Schedule { config } => schedule(&config),
        Commands::Validate { config, data } => validate(&config, &data),
    }
}

fn load_config(path: &Path) -> Result<RunConfig> {
    RunConfig::from_path(path).with_context(|| format!("Failed to load config {}", path.display()))
}

fn load_panel(config: &RunConfig, path: &Path) -> Result<PanelDataset> {
    let mut loader = PanelLoader::new(config.columns.clone());
    if let Some(calendar) = config.calendar() {
        loader = loader.with_calendar(calendar);
    }
    let dataset = loader
        .load(path)
        .with_context(|| format!("Failed to load panel {}", path.display()))?;

    let (first, last) = dataset.time_bounds().unwrap_or_default();
    info!(
        "Loaded {} rows, {} entities, periods {} to {}",
        dataset.len(),
        dataset.entities().len(),
        first,
        last
    );
    Ok(dataset)
}

fn run(config_path: &Path, data: &Path, output: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_path)?;
    let dataset = load_panel(&config, data)?;

    let engine = WalkForwardEngine::new(config.engine.clone());
    let model = config.model.clone();
    let forecast = engine
        .run(&dataset, &config.partition, &|| model.build(), true)
        .context("Walk-forward run failed")?;

    if forecast.skipped_origins() > 0 {
        warn!("{} origins skipped for lack of training data", forecast.skipped_origins());
    }

    let report = forecast.evaluate().context("Evaluation failed")?;

    let dir = output.unwrap_or_else(|| config.output.dir.clone());
    fs::create_dir_all(&dir).with_context(|| format!("Failed to create {}", dir.display()))?;

    let predictions = config.output.file(&dir, "predictions");
    let mut df = reconciled_to_dataframe(&forecast.table, &config.columns)?;
    write_dataframe(&mut df, &predictions)
        .with_context(|| format!("Failed to write {}", predictions.display()))?;

    if let Some(rows) = &forecast.evaluation_rows {
        let evaluation = config.output.file(&dir, "evaluation");
        let mut df = evaluation_to_dataframe(rows, forecast.steps, &config.columns)?;
        write_dataframe(&mut df, &evaluation)
            .with_context(|| format!("Failed to write {}", evaluation.display()))?;
    }

    let row_metrics = config.output.file(&dir, "row_metrics");
    let mut df = row_errors_to_dataframe(&report.per_row, &config.columns)?;
    write_dataframe(&mut df, &row_metrics)
        .with_context(|| format!("Failed to write {}", row_metrics.display()))?;

    let metrics = dir.join("metrics.json");
    fs::write(&metrics, serde_json::to_string_pretty(&report)?)
        .with_context(|| format!("Failed to write {}", metrics.display()))?;

    let origins = dir.join("origins.json");
    fs::write(&origins, serde_json::to_string_pretty(&forecast.origins)?)
        .with_context(|| format!("Failed to write {}", origins.display()))?;

    info!("Results written to {}", dir.display());
    println!("{}", report.summary());
    Ok(())
}

fn schedule(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let schedule = config.schedule()?;
    let calendar = config.calendar();
    let label = |t: i64| match &calendar {
        Some(calendar) => format!("{} ({})", t, calendar.label(t)),
        None => t.to_string(),
    };

    println!(
        "{} origins, steps = {}, test {} to {}",
        schedule.len(),
        schedule.steps(),
        label(config.partition.test_start),
        label(config.partition.test_end)
    );
    for window in &schedule {
        let predict = window.predict_range();
        println!(
            "{:>4}  origin {}  train {}..{}  predict {}..{}  max_h {}",
            window.period_num,
            label(window.origin),
            label(window.train_range().start),
            label(window.anchor()),
            label(predict.start),
            label(predict.end - 1),
            window.max_horizon()
        );
    }
    Ok(())
}

fn validate(config_path: &Path, data: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let dataset = load_panel(&config, data)?;

    let validator = PanelIntegrityValidator::new(config.partition, config.engine.steps)?;
    let report = validator.validate(&dataset);

    println!("{}", report.summary());
    for check in &report.checks {
        let status = if check.passed { "PASS" } else { "FAIL" };
        println!("  [{}] {}: {}", status, check.name, check.message);
        if let Some(details) = &check.details {
            println!("         {}", details);
        }
    }

    if !report.all_passed() {
        bail!("{} integrity checks failed", report.failed_checks().len());
    }
    Ok(())
}
