// ============================================================
// Layer 6 — Model Log Sink
// ============================================================
// Every model writes its own log file, `<path>/<name>.log`.
//
// Instead of installing a global subscriber (which the binary
// owns), each wrangler builds a private `tracing::Dispatch` and
// runs its operations inside `ModelLog::scope`. Events emitted
// anywhere below that call, including the data and ml layers,
// land in the model's file, and on stdout too when `verb` is set.

use anyhow::{Context, Result};
use std::{
    fs::OpenOptions,
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::Dispatch;
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};

pub struct ModelLog {
    dispatch: Dispatch,
    file:     PathBuf,
}

impl ModelLog {
    pub fn new(file: &Path, verbose: bool) -> Result<Self> {
        let handle = OpenOptions::new()
            .create(true)
            .append(true)
            .open(file)
            .with_context(|| format!("Cannot open log file '{}'", file.display()))?;
        let handle = Arc::new(handle);

        let writer = if verbose {
            BoxMakeWriter::new(handle.and(std::io::stdout))
        } else {
            BoxMakeWriter::new(handle)
        };

        let subscriber = tracing_subscriber::fmt()
            .with_writer(writer)
            .with_ansi(false)
            .with_target(false)
            .with_max_level(tracing::Level::INFO)
            .finish();

        Ok(Self { dispatch: Dispatch::new(subscriber), file: file.to_path_buf() })
    }

    /// Run `f` with this model's sink as the default subscriber.
    pub fn scope<T>(&self, f: impl FnOnce() -> T) -> T {
        tracing::dispatcher::with_default(&self.dispatch, f)
    }

    pub fn file(&self) -> &Path {
        &self.file
    }
}
