// ============================================================
// Layer 2 — Evaluate Use Case
// ============================================================
// Restores a saved model and runs one single-shot evaluation:
// prediction, score, or per-feature importance.

use anyhow::Result;
use std::path::Path;

use crate::application::wrangler::ModelWrangler;
use crate::domain::samples::Samples;
use crate::domain::traits::SampleSource;
use crate::DefaultBackend;

pub struct EvaluateUseCase {
    wrangler: ModelWrangler<DefaultBackend>,
}

impl EvaluateUseCase {
    /// Load the model described by `params_file` and its newest checkpoint.
    pub fn new(params_file: &Path) -> Result<Self> {
        let wrangler = ModelWrangler::load(params_file, Default::default())?;
        Ok(Self { wrangler })
    }

    pub fn predict(&self, source: &impl SampleSource) -> Result<Samples> {
        let (input, _) = source.load_samples()?;
        self.wrangler.predict(&input)
    }

    pub fn score(&self, source: &impl SampleSource) -> Result<f64> {
        let (input, target) = source.load_samples()?;
        let target = target.unwrap_or_else(|| input.clone());
        self.wrangler.score(&input, &target)
    }

    pub fn feature_importance(&self, source: &impl SampleSource) -> Result<Vec<f32>> {
        let (input, target) = source.load_samples()?;
        let target = target.unwrap_or_else(|| input.clone());
        self.wrangler.feature_importance(&input, &target)
    }
}
