// ============================================================
// Layer 4 — Sample File Loader
// ============================================================
// Reads input / target blocks from a JSON file:
//
//   {
//     "input":  { "shape": [100, 10], "values": [ ... ] },
//     "target": { "shape": [100, 10], "values": [ ... ] }
//   }
//
// `target` is optional; autoencoders reconstruct their input,
// so callers fall back to the input when it is missing.
// Rows may also be given as nested arrays instead of a shape:
//
//   { "input": [[0.1, 0.2], [0.3, 0.4]] }

use anyhow::{Context, Result};
use serde::Deserialize;
use std::{fs, path::PathBuf};

use crate::domain::samples::Samples;
use crate::domain::traits::SampleSource;

// Rows must be tried first: a struct also deserializes from a
// two-element sequence.
#[derive(Deserialize)]
#[serde(untagged)]
enum SampleBlock {
    Rows(Vec<Vec<f32>>),
    Shaped(Samples),
}

impl SampleBlock {
    fn into_samples(self) -> Result<Samples> {
        match self {
            SampleBlock::Rows(rows) => Samples::from_rows(&rows),
            SampleBlock::Shaped(s) => Ok(s),
        }
    }
}

#[derive(Deserialize)]
struct SampleFile {
    input:  SampleBlock,
    #[serde(default)]
    target: Option<SampleBlock>,
}

/// Loads samples from one JSON file.
pub struct JsonSampleLoader {
    path: PathBuf,
}

impl JsonSampleLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SampleSource for JsonSampleLoader {
    fn load_samples(&self) -> Result<(Samples, Option<Samples>)> {
        let text = fs::read_to_string(&self.path)
            .with_context(|| format!("Cannot read sample file '{}'", self.path.display()))?;
        let file: SampleFile = serde_json::from_str(&text)
            .with_context(|| format!("Malformed sample file '{}'", self.path.display()))?;

        let input  = file.input.into_samples()?;
        let target = file.target.map(SampleBlock::into_samples).transpose()?;

        tracing::info!(
            "Loaded {} rows of shape {:?} from '{}'",
            input.rows(), input.sample_shape(), self.path.display()
        );
        Ok((input, target))
    }
}
