// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the four subcommands and their flags:
//
//   train       build (or resume) a model and train it
//   predict     print the model output for an input file
//   score       print the model loss on an input / target file
//   importance  print the per-feature input importance
//
// Data files are JSON: { "input": ..., "target": ... }, see
// data::loader for the accepted block formats.

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};
use serde_json::{Map, Value};
use std::{fs, path::PathBuf};

use crate::application::train_use_case::TrainConfig;
use crate::domain::params::Architecture;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train a model on a JSON data file
    Train(TrainArgs),

    /// Predict outputs for a JSON data file with a saved model
    Predict(EvalArgs),

    /// Score a saved model on a JSON data file
    Score(EvalArgs),

    /// Rank input features of a saved model by squared loss gradient
    Importance(EvalArgs),
}

#[derive(Args, Debug)]
pub struct TrainArgs {
    /// JSON file with "input" and optional "target" samples
    #[arg(long)]
    pub data: PathBuf,

    /// baseline, dense-autoencoder or conv-autoencoder
    #[arg(long, default_value = "dense-autoencoder")]
    pub architecture: Architecture,

    /// JSON file with parameter overrides
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Single override, KEY=VALUE; VALUE is parsed as JSON when possible
    #[arg(long = "set", value_name = "KEY=VALUE")]
    pub set: Vec<String>,

    /// Resume from a saved <name>-params.json instead of a fresh model
    #[arg(long)]
    pub resume: Option<PathBuf>,

    /// Class id to oversample into half of every batch (repeatable)
    #[arg(long = "positive")]
    pub positive: Vec<usize>,
}

impl TrainArgs {
    /// Merge the config file and every `--set` into one override object.
    pub fn overrides(&self) -> Result<Value> {
        let mut merged = match &self.config {
            Some(path) => {
                let text = fs::read_to_string(path)
                    .with_context(|| format!("Cannot read config '{}'", path.display()))?;
                match serde_json::from_str(&text)? {
                    Value::Object(map) => map,
                    _ => bail!("config '{}' must hold a JSON object", path.display()),
                }
            }
            None => Map::new(),
        };

        for pair in &self.set {
            let Some((key, raw)) = pair.split_once('=') else {
                bail!("--set expects KEY=VALUE, got '{pair}'");
            };
            let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
            merged.insert(key.trim().to_string(), value);
        }
        Ok(Value::Object(merged))
    }

    pub fn into_config(self) -> Result<TrainConfig> {
        Ok(TrainConfig {
            overrides:        self.overrides()?,
            architecture:     self.architecture,
            resume:           self.resume,
            positive_classes: self.positive,
        })
    }
}

#[derive(Args, Debug)]
pub struct EvalArgs {
    /// Saved <name>-params.json of the model
    #[arg(long)]
    pub params: PathBuf,

    /// JSON file with "input" and optional "target" samples
    #[arg(long)]
    pub data: PathBuf,

    /// Write the result as JSON here instead of stdout
    #[arg(long)]
    pub output: Option<PathBuf>,
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Harness {
        #[command(subcommand)]
        command: Commands,
    }

    #[test]
    fn test_set_values_parse_as_json_or_string() {
        let h = Harness::try_parse_from([
            "mw", "train", "--data", "d.json",
            "--set", "encode_nodes=[8,4]", "--set", "name=demo", "--set", "num_epochs=2",
        ])
        .unwrap();
        let Commands::Train(args) = h.command else { panic!("expected train") };
        let overrides = args.overrides().unwrap();
        assert_eq!(overrides["encode_nodes"], serde_json::json!([8, 4]));
        assert_eq!(overrides["name"], "demo");
        assert_eq!(overrides["num_epochs"], 2);
    }

    #[test]
    fn test_architecture_flag_accepts_dashes() {
        let h = Harness::try_parse_from([
            "mw", "train", "--data", "d.json", "--architecture", "conv-autoencoder",
        ])
        .unwrap();
        let Commands::Train(args) = h.command else { panic!("expected train") };
        assert_eq!(args.architecture, Architecture::ConvAutoencoder);
    }

    #[test]
    fn test_malformed_set_rejected() {
        let h = Harness::try_parse_from(["mw", "train", "--data", "d.json", "--set", "oops"]).unwrap();
        let Commands::Train(args) = h.command else { panic!("expected train") };
        assert!(args.overrides().is_err());
    }
}
