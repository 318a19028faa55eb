// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// The ModelWrangler facade plus the file-driven workflows the
// CLI runs on top of it.
//
// Rules for this layer:
//   - No tensor math here (that's Layer 5)
//   - No printing here (that's Layer 1)
//   - Only workflow coordination

/// One model: params, graph, weights, checkpoints, logs
pub mod wrangler;

/// Load data, build or resume a model, train it
pub mod train_use_case;

/// Restore a model and predict / score / rank features
pub mod evaluate_use_case;
