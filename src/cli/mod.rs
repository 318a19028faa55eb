// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// Parses arguments with clap and routes each subcommand to a
// Layer 2 use case. Results are printed here and nowhere else.
//
// Reference: Rust Book §12 (CLI programs)

pub mod commands;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use std::{fs, path::Path};

use crate::application::{evaluate_use_case::EvaluateUseCase, train_use_case::TrainUseCase};
use crate::data::loader::JsonSampleLoader;
use crate::ml::trainer::TrainStatus;
use commands::{Commands, EvalArgs, TrainArgs};

#[derive(Parser, Debug)]
#[command(
    name = "model-wrangler",
    version,
    about = "Assemble, train and checkpoint dense and convolutional autoencoders."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args)      => run_train(args),
            Commands::Predict(args)    => run_predict(&args),
            Commands::Score(args)      => run_score(&args),
            Commands::Importance(args) => run_importance(&args),
        }
    }
}

fn run_train(args: TrainArgs) -> Result<()> {
    tracing::info!("Training on samples from: {}", args.data.display());
    let source = JsonSampleLoader::new(&args.data);
    let use_case = TrainUseCase::new(args.into_config()?, source);

    let (status, params_file) = use_case.execute()?;
    match status {
        TrainStatus::Completed { epochs } => {
            println!("Training complete after {epochs} epochs.");
        }
        TrainStatus::Stopped { epochs_completed } => {
            println!("Training stopped after {epochs_completed} epochs.");
        }
    }
    println!("Parameters: {}", params_file.display());
    Ok(())
}

fn run_predict(args: &EvalArgs) -> Result<()> {
    let use_case = EvaluateUseCase::new(&args.params)?;
    let prediction = use_case.predict(&JsonSampleLoader::new(&args.data))?;
    emit(&prediction, args.output.as_deref())
}

fn run_score(args: &EvalArgs) -> Result<()> {
    let use_case = EvaluateUseCase::new(&args.params)?;
    let score = use_case.score(&JsonSampleLoader::new(&args.data))?;
    emit(&score, args.output.as_deref())
}

fn run_importance(args: &EvalArgs) -> Result<()> {
    let use_case = EvaluateUseCase::new(&args.params)?;
    let importance = use_case.feature_importance(&JsonSampleLoader::new(&args.data))?;
    emit(&importance, args.output.as_deref())
}

/// Print `value` as JSON, or write it to `output`.
fn emit<T: Serialize>(value: &T, output: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    match output {
        Some(path) => fs::write(path, json)
            .with_context(|| format!("Cannot write '{}'", path.display()))?,
        None => println!("{json}"),
    }
    Ok(())
}
