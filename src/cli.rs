//! CLI commands for racelens.
//!
//! `run` executes the cleaning pipeline, `train` fits the win models on
//! an assembled dataset.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::{AppConfig, FEATURE_NAMES};
use crate::model::data::{load_training_data, train_test_split};
use crate::model::gbt::{GbtParams, GradientBoostedTrees};
use crate::model::logistic::LogisticRegression;
use crate::model::metrics::ClassificationMetrics;
use crate::pipeline;
use crate::pipeline::RunReport;

#[derive(Parser)]
#[command(name = "racelens")]
#[command(version, about = "RaceLens: race history cleaning pipeline and win models", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the cleaning pipeline and write the dataset artifacts
    Run {
        /// Entry CSV path override
        #[arg(long)]
        entries: Option<PathBuf>,

        /// Races sheet path override
        #[arg(long)]
        races: Option<PathBuf>,

        /// Past performance sheet path override
        #[arg(long)]
        horses: Option<PathBuf>,

        /// Output parquet path override
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Validation summary path override
        #[arg(long)]
        summary: Option<PathBuf>,

        /// Output format (table, json)
        #[arg(short, long, default_value = "table")]
        format: String,
    },

    /// Train win models on an assembled dataset
    Train {
        /// Path to the assembled parquet dataset
        #[arg(value_name = "DATA")]
        data: PathBuf,

        /// Which model to train (logistic, gbt, both)
        #[arg(short, long, default_value = "both")]
        model: String,

        /// Train/test split seed override
        #[arg(long)]
        seed: Option<u64>,

        /// Held-out test fraction override
        #[arg(long)]
        test_fraction: Option<f64>,

        /// Output format (table, json)
        #[arg(short, long, default_value = "table")]
        format: String,
    },
}

/// Run the pipeline with optional path overrides.
pub fn run_pipeline(
    entries: Option<PathBuf>,
    races: Option<PathBuf>,
    horses: Option<PathBuf>,
    output: Option<PathBuf>,
    summary: Option<PathBuf>,
    format: String,
) -> anyhow::Result<()> {
    let mut config = AppConfig::load()?;

    if let Some(path) = entries {
        config.data.entries_csv = path.to_string_lossy().to_string();
    }
    if let Some(path) = races {
        config.data.races_sheet = path.to_string_lossy().to_string();
    }
    if let Some(path) = horses {
        config.data.horses_sheet = path.to_string_lossy().to_string();
    }
    if let Some(path) = output {
        config.data.output_parquet = path.to_string_lossy().to_string();
    }
    if let Some(path) = summary {
        config.data.summary_json = path.to_string_lossy().to_string();
    }

    let report = pipeline::run(&config)?;

    match format.as_str() {
        "json" => {
            let json_output = serde_json::json!({
                "summary": report.summary,
                "output_parquet": report.output_parquet,
                "summary_json": report.summary_json,
            });
            println!("{}", serde_json::to_string_pretty(&json_output)?);
        }
        _ => print_run_table(&report),
    }

    Ok(())
}

fn print_run_table(report: &RunReport) {
    let s = &report.summary;
    println!("=== Pipeline Summary ===");
    println!("  Rows loaded:         {}", s.rows_loaded);
    println!("  Duplicates dropped:  {}", s.duplicate_rows_dropped);
    println!("  Rows without ids:    {}", s.rows_without_identity);
    println!("  Horses seen:         {}", s.horses_seen);
    println!(
        "  DNF rows:            {} / {}",
        s.dnf.dnf_rows, s.dnf.rows_with_figure
    );
    println!(
        "  Categories:          {} tracks, {} jockeys, {} trainers",
        s.categories.tracks, s.categories.jockeys, s.categories.trainers
    );
    println!();

    println!("=== Excluded Horses ===");
    let e = &s.horses_excluded;
    println!("  Bad race sequence:     {}", e.bad_race_sequence);
    println!("  All prior races DNF:   {}", e.all_prior_races_dnf);
    println!("  Incomplete covariates: {}", e.incomplete_covariates);
    println!("  Missing label:         {}", e.missing_label);
    println!("  Label conflicts:       {}", e.label_conflicts);
    println!();

    println!("  Final rows: {}", s.final_rows);
    println!("  Dataset:    {}", report.output_parquet.display());
    println!("  Summary:    {}", report.summary_json.display());
}

/// Train and evaluate the requested models.
pub fn run_train(
    data: PathBuf,
    model: String,
    seed: Option<u64>,
    test_fraction: Option<f64>,
    format: String,
) -> anyhow::Result<()> {
    let mut config = AppConfig::load()?;

    if let Some(seed) = seed {
        config.training.seed = seed;
    }
    if let Some(fraction) = test_fraction {
        config.training.test_fraction = fraction;
    }

    let train_logistic = model == "both" || model == "logistic";
    let train_gbt = model == "both" || model == "gbt";
    if !train_logistic && !train_gbt {
        anyhow::bail!("unknown model '{}', expected logistic, gbt or both", model);
    }

    eprintln!("Loading dataset from: {}", data.display());
    let dataset = load_training_data(&data)?;
    eprintln!(
        "Loaded {} rows x {} features",
        dataset.x.nrows(),
        dataset.x.ncols()
    );

    let split = train_test_split(&dataset, config.training.test_fraction, config.training.seed);
    if split.x_train.nrows() == 0 || split.x_test.nrows() == 0 {
        anyhow::bail!(
            "split left an empty side ({} train / {} test); adjust the test fraction",
            split.x_train.nrows(),
            split.x_test.nrows()
        );
    }

    let mut results: Vec<(&str, ClassificationMetrics)> = Vec::new();
    let mut coefficient_summary = None;

    if train_logistic {
        eprintln!("Training logistic regression...");
        let mut lr = LogisticRegression::default();
        lr.fit(&split.x_train, &split.y_train)?;
        let proba = lr.predict_proba(&split.x_test)?;
        let pred = lr.predict(&split.x_test)?;
        results.push((
            "logistic",
            ClassificationMetrics::calculate(&split.y_test, &pred, &proba),
        ));
        coefficient_summary = Some(lr.summary(&FEATURE_NAMES));
    }

    if train_gbt {
        eprintln!("Training gradient boosted trees...");
        let params = GbtParams {
            seed: config.training.seed,
            ..GbtParams::default()
        };
        let mut gbt = GradientBoostedTrees::new(params);
        gbt.fit(&split.x_train, &split.y_train)?;
        let proba = gbt.predict_proba(&split.x_test)?;
        let pred = gbt.predict(&split.x_test)?;
        results.push((
            "gbt",
            ClassificationMetrics::calculate(&split.y_test, &pred, &proba),
        ));
    }

    match format.as_str() {
        "json" => {
            let json_output = serde_json::json!({
                "rows": dataset.x.nrows(),
                "train_rows": split.x_train.nrows(),
                "test_rows": split.x_test.nrows(),
                "seed": config.training.seed,
                "models": results.iter().map(|(name, m)| serde_json::json!({
                    "model": name,
                    "accuracy": m.accuracy,
                    "precision": m.precision,
                    "recall": m.recall,
                    "f1": m.f1,
                    "auc_roc": m.auc_roc,
                    "log_loss": m.log_loss,
                })).collect::<Vec<_>>(),
            });
            println!("{}", serde_json::to_string_pretty(&json_output)?);
        }
        _ => {
            println!(
                "Rows: {} ({} train / {} test, seed {})",
                dataset.x.nrows(),
                split.x_train.nrows(),
                split.x_test.nrows(),
                config.training.seed
            );
            for (name, metrics) in &results {
                println!();
                println!("=== {} ===", name);
                print!("{}", metrics.report());
            }
            if let Some(summary) = coefficient_summary {
                println!();
                println!("=== Coefficients ===");
                print!("{}", summary);
            }
        }
    }

    Ok(())
}
