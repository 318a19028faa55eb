// ============================================================
// Layer 6 — Persistence Manager
// ============================================================
// Saves and restores model weights with Burn's
// NamedMpkFileRecorder at full precision.
//
// One checkpoint = params JSON rewrite + one weights record.
// Only the newest MAX_TO_KEEP records survive a save, and the
// metadata file is rewritten after every prune.
//
// File layout under the model's `path`:
//   autoenc-params.json          ← architecture parameters
//   autoenc-00000000.mpk         ← weights after step 0
//   autoenc-00000001.mpk
//   ...
//   saver-meta                   ← { model, steps, latest }
//
// The latest checkpoint is found by the step number embedded in
// the file name, so a stale or missing metadata file does not
// change what gets restored.

use anyhow::{bail, Context, Result};
use burn::{
    prelude::*,
    record::{FullPrecisionSettings, NamedMpkFileRecorder, Recorder},
};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::domain::params::ArchitectureParams;
use crate::domain::traits::Persistable;
use crate::ml::network::Network;

/// Number of weight records kept on disk.
pub const MAX_TO_KEEP: usize = 4;

const WEIGHTS_EXT: &str = "mpk";

/// Contents of the checkpoint metadata file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaverMeta {
    pub model:  String,
    pub steps:  Vec<usize>,
    pub latest: Option<usize>,
}

pub struct PersistenceManager {
    dir:       PathBuf,
    name:      String,
    meta_file: PathBuf,
}

impl PersistenceManager {
    pub fn new(dir: impl Into<PathBuf>, name: impl Into<String>, meta_file: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into(), name: name.into(), meta_file: meta_file.into() }
    }

    pub fn for_params(params: &ArchitectureParams) -> Self {
        Self::new(params.path(), params.name(), &params.common.meta_filename)
    }

    /// `<dir>/<name>-<step:08>` (the recorder appends the extension).
    fn stem(&self, step: usize) -> PathBuf {
        self.dir.join(format!("{}-{step:08}", self.name))
    }

    /// Full path of the weights record for `step`.
    pub fn weights_file(&self, step: usize) -> PathBuf {
        self.stem(step).with_extension(WEIGHTS_EXT)
    }

    /// Write params, then the weights for `step`, then prune and
    /// refresh the metadata.
    pub fn save_checkpoint<B: Backend>(
        &self,
        params:  &ArchitectureParams,
        network: &Network<B>,
        step:    usize,
    ) -> Result<PathBuf> {
        params.save()?;
        let path = self.save_weights(network, step)?;
        let steps = self.prune()?;
        self.write_meta(&steps)?;
        tracing::info!("Saved checkpoint {}", path.display());
        Ok(path)
    }

    pub fn save_weights<B: Backend>(&self, network: &Network<B>, step: usize) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Cannot create '{}'", self.dir.display()))?;
        let stem = self.stem(step);

        NamedMpkFileRecorder::<FullPrecisionSettings>::new()
            .record(network.clone().into_record(), stem.clone())
            .with_context(|| format!("Failed to save weights to '{}'", stem.display()))?;

        Ok(self.weights_file(step))
    }

    /// Restore the newest checkpoint into `network`.
    /// Returns the restored network and its step.
    pub fn load_latest<B: Backend>(
        &self,
        network: Network<B>,
        device:  &B::Device,
    ) -> Result<(Network<B>, usize)> {
        let Some(step) = self.latest_step()? else {
            bail!(
                "No checkpoint for '{}' in '{}'. Has the model been trained or saved?",
                self.name, self.dir.display()
            );
        };
        let stem = self.stem(step);
        tracing::info!("Restoring weights from {}", self.weights_file(step).display());

        let record = NamedMpkFileRecorder::<FullPrecisionSettings>::new()
            .load(stem.clone(), device)
            .with_context(|| format!("Cannot load weights '{}'", stem.display()))?;

        Ok((network.load_record(record), step))
    }

    /// Steps with a weights record on disk, ascending.
    pub fn steps(&self) -> Result<Vec<usize>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let prefix = format!("{}-", self.name);
        let mut steps = Vec::new();

        for entry in fs::read_dir(&self.dir)
            .with_context(|| format!("Cannot read directory '{}'", self.dir.display()))?
        {
            let path = entry?.path();
            if let Some(step) = parse_step(&path, &prefix) {
                steps.push(step);
            }
        }
        steps.sort_unstable();
        Ok(steps)
    }

    pub fn latest_step(&self) -> Result<Option<usize>> {
        Ok(self.steps()?.last().copied())
    }

    pub fn read_meta(&self) -> Result<SaverMeta> {
        let text = fs::read_to_string(&self.meta_file)
            .with_context(|| format!("Cannot read '{}'", self.meta_file.display()))?;
        Ok(serde_json::from_str(&text)?)
    }

    fn prune(&self) -> Result<Vec<usize>> {
        let mut steps = self.steps()?;
        let excess = steps.len().saturating_sub(MAX_TO_KEEP);
        for step in steps.drain(..excess) {
            let file = self.weights_file(step);
            fs::remove_file(&file)
                .with_context(|| format!("Cannot remove old checkpoint '{}'", file.display()))?;
            tracing::debug!("Pruned checkpoint {}", file.display());
        }
        Ok(steps)
    }

    fn write_meta(&self, steps: &[usize]) -> Result<()> {
        let meta = SaverMeta {
            model:  self.name.clone(),
            steps:  steps.to_vec(),
            latest: steps.last().copied(),
        };
        fs::write(&self.meta_file, serde_json::to_string_pretty(&meta)?)
            .with_context(|| format!("Cannot write '{}'", self.meta_file.display()))
    }
}

fn parse_step(path: &Path, prefix: &str) -> Option<usize> {
    if path.extension()?.to_str()? != WEIGHTS_EXT {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    let digits = stem.strip_prefix(prefix)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}
