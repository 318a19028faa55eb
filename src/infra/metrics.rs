// ============================================================
// Layer 6 — Scalar Tracker
// ============================================================
// Records tagged training scalars to a CSV file in the model's
// tensorboard-style log directory (`tb_log_path`).
//
// Output file: <path>/tb_log/scalars.csv
//
//   step,tag,value
//   0,training_loss,0.412300
//   0,holdout_loss,0.398100
//   1,training_loss,0.405500
//   ...
//
// Tags written by the trainer:
//   training_loss        objective of one batch (loss + penalties)
//   holdout_loss         holdout loss, every 100th batch
//   epoch_training_loss  mean batch objective of an epoch
//   epoch_holdout_loss   holdout loss at the end of an epoch
//
// The file is appended to across runs, so a reloaded model keeps
// extending the same curve.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

/// End-of-epoch summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochSummary {
    pub epoch: usize,

    /// Mean training objective over the epoch's batches
    pub training_loss: f64,

    /// Holdout loss after the epoch, if there is a holdout set
    pub holdout_loss: Option<f64>,
}

impl EpochSummary {
    pub fn new(epoch: usize, training_loss: f64, holdout_loss: Option<f64>) -> Self {
        Self { epoch, training_loss, holdout_loss }
    }

    /// True if the holdout loss beat `best_holdout_loss`.
    pub fn is_improvement(&self, best_holdout_loss: f64) -> bool {
        self.holdout_loss.is_some_and(|loss| loss < best_holdout_loss)
    }
}

/// Appends `step,tag,value` rows to `scalars.csv`.
pub struct ScalarTracker {
    csv_path: PathBuf,
}

impl ScalarTracker {
    /// Writes the CSV header if the file doesn't exist yet.
    pub fn new(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("Cannot create log directory '{}'", dir.display()))?;

        let csv_path = dir.join("scalars.csv");
        if !csv_path.exists() {
            let mut f = fs::File::create(&csv_path)
                .with_context(|| format!("Cannot create '{}'", csv_path.display()))?;
            writeln!(f, "step,tag,value")?;
            tracing::debug!("Created scalar log '{}'", csv_path.display());
        }

        Ok(Self { csv_path })
    }

    pub fn record(&self, step: usize, tag: &str, value: f64) -> Result<()> {
        let mut f = OpenOptions::new()
            .append(true)
            .open(&self.csv_path)
            .with_context(|| format!("Cannot open '{}'", self.csv_path.display()))?;
        writeln!(f, "{step},{tag},{value:.6}")?;
        Ok(())
    }

    pub fn record_epoch(&self, step: usize, summary: &EpochSummary) -> Result<()> {
        self.record(step, "epoch_training_loss", summary.training_loss)?;
        if let Some(loss) = summary.holdout_loss {
            self.record(step, "epoch_holdout_loss", loss)?;
        }
        Ok(())
    }

    /// Last step written to the file, used to continue numbering
    /// after a reload.
    pub fn last_step(&self) -> Result<Option<usize>> {
        let text = fs::read_to_string(&self.csv_path)
            .with_context(|| format!("Cannot read '{}'", self.csv_path.display()))?;
        Ok(text
            .lines()
            .skip(1)
            .filter_map(|line| line.split(',').next()?.parse::<usize>().ok())
            .max())
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_improvement() {
        let s = EpochSummary::new(2, 2.5, Some(2.3));
        assert!(s.is_improvement(3.0));
        assert!(!s.is_improvement(2.0));
        assert!(!EpochSummary::new(0, 1.0, None).is_improvement(f64::INFINITY));
    }

    #[test]
    fn test_rows_append_across_trackers() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("tb_log");

        ScalarTracker::new(&dir).unwrap().record(0, "training_loss", 0.5).unwrap();
        let tracker = ScalarTracker::new(&dir).unwrap();
        tracker.record(3, "holdout_loss", 0.25).unwrap();

        let text = fs::read_to_string(tracker.csv_path()).unwrap();
        assert_eq!(
            text.lines().collect::<Vec<_>>(),
            ["step,tag,value", "0,training_loss,0.500000", "3,holdout_loss,0.250000"]
        );
        assert_eq!(tracker.last_step().unwrap(), Some(3));
    }
}
