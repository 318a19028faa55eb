// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Cross-cutting concerns every model needs but no other layer
// owns:
//
//   checkpoint.rs — weights records, pruning to the newest four,
//                   the `saver-meta` file, restore-by-latest
//
//   metrics.rs    — tagged scalars appended to tb_log/scalars.csv
//
//   logging.rs    — the per-model log file sink
//
//   interrupt.rs  — Ctrl-C → StopToken during training
//
// Reference: Burn Book §5 (Records and Checkpointing)

/// Model checkpoint saving and loading
pub mod checkpoint;

/// Training scalar CSV logger
pub mod metrics;

/// Per-model tracing sink
pub mod logging;

/// Ctrl-C listener for training runs
pub mod interrupt;
