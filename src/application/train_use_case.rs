// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates one training run from files on disk:
//
//   Step 1: Load input / target blocks   (Layer 4 - data)
//   Step 2: Build or restore the model   (Layer 2 - wrangler)
//   Step 3: Train, checkpointing per epoch; Ctrl-C stops after
//           the current epoch
//
// A fresh model merges the overrides over the architecture's
// defaults; `resume` instead reloads a saved params file and its
// newest checkpoint and keeps training from there.

use anyhow::Result;
use serde_json::Value;
use std::path::PathBuf;

use crate::application::wrangler::ModelWrangler;
use crate::domain::params::Architecture;
use crate::domain::traits::SampleSource;
use crate::infra::interrupt::stop_on_interrupt;
use crate::ml::trainer::TrainStatus;
use crate::DefaultBackend;

// ─── Training Configuration ──────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct TrainConfig {
    pub architecture:     Architecture,
    /// Parameter overrides, a JSON object
    pub overrides:        Value,
    /// Continue from this saved params file instead of a fresh model
    pub resume:           Option<PathBuf>,
    /// Class ids that fill half of every balanced batch
    pub positive_classes: Vec<usize>,
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase<S: SampleSource> {
    config: TrainConfig,
    source: S,
}

impl<S: SampleSource> TrainUseCase<S> {
    pub fn new(config: TrainConfig, source: S) -> Self {
        Self { config, source }
    }

    /// Returns the training status and the params file of the model.
    pub fn execute(&self) -> Result<(TrainStatus, PathBuf)> {
        // ── Step 1: Load data ─────────────────────────────────────────────────
        let (input, target) = self.source.load_samples()?;
        let target = target.unwrap_or_else(|| input.clone());

        // ── Step 2: Build or restore ──────────────────────────────────────────
        let device = Default::default();
        let mut wrangler = match &self.config.resume {
            Some(params_file) => {
                tracing::info!("Resuming from '{}'", params_file.display());
                ModelWrangler::<DefaultBackend>::load(params_file, device)?
            }
            None => ModelWrangler::<DefaultBackend>::new(
                self.config.architecture,
                self.config.overrides.clone(),
                device,
            )?,
        };

        // ── Step 3: Train ─────────────────────────────────────────────────────
        stop_on_interrupt(wrangler.stop_token())?;
        let status = wrangler.train(&input, &target, &self.config.positive_classes)?;
        Ok((status, wrangler.params().common.params_file()))
    }
}
