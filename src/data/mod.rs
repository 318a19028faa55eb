// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Everything between caller-supplied sample blocks and the
// tensor batches the trainer consumes:
//
//   JSON file / Samples
//       │
//       ▼
//   JsonSampleLoader  → reads input / target blocks (CLI only)
//       │
//       ▼
//   DatasetManager    → pairs rows, labels them, splits off holdout
//       │
//       ▼
//   Batches           → plain or class-balanced row batches
//       │
//       ▼
//   RowBatcher        → stacks rows into NCHW tensors
//
// Reference: Burn Book §4 (Datasets and Dataloaders)

/// Loads sample blocks from JSON files
pub mod loader;

/// Holdout split plus plain and balanced batch iterators
pub mod dataset;

/// Implements Burn's Batcher trait for row batches
pub mod batcher;

/// Shuffles and splits rows into train / holdout sets
pub mod splitter;
