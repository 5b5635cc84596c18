//! RaceLens
//!
//! Cleans raw race history exports into a model-ready dataset and trains
//! win-probability models on it.

mod cli;
mod config;
mod dataset;
mod dnf;
mod error;
mod features;
mod loader;
mod model;
mod normalize;
mod pipeline;
mod types;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::{Cli, Commands};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "racelens=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            entries,
            races,
            horses,
            output,
            summary,
            format,
        } => cli::run_pipeline(entries, races, horses, output, summary, format),
        Commands::Train {
            data,
            model,
            seed,
            test_fraction,
            format,
        } => cli::run_train(data, model, seed, test_fraction, format),
    }
}
