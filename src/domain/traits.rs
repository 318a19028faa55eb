// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// Seams between the layers:
//
//   SampleSource — anything that can supply training/scoring data
//                  (the JSON sample loader in Layer 4 implements it)
//   Persistable  — anything whose state is written under the
//                  model's artifact directory and read back
//                  (ArchitectureParams implements it)

use anyhow::Result;
use std::path::{Path, PathBuf};

use crate::domain::samples::Samples;

// ─── SampleSource ─────────────────────────────────────────────────────────────
/// A source of `(input, target)` sample blocks.
pub trait SampleSource {
    /// Load the input block and, when the source has one, the target block.
    fn load_samples(&self) -> Result<(Samples, Option<Samples>)>;
}

// ─── Persistable ──────────────────────────────────────────────────────────────
/// State that knows where it lives on disk.
pub trait Persistable: Sized {
    /// Write this component's state and return the file written.
    fn save(&self) -> Result<PathBuf>;

    /// Restore a component from a file previously produced by `save`.
    fn load(path: &Path) -> Result<Self>;
}
