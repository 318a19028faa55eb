// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain Rust structs, enums and traits describing a model:
// its sample data, its per-stage layer options and its full
// parameter set. No Burn types live here.

// Shaped blocks of f32 samples
pub mod samples;

// Per-stage options: activation, regularization, batchnorm, dropout, pooling
pub mod layer_option;

// Typed architecture parameters and the three-tier default merge
pub mod params;

// Core abstractions other layers implement
pub mod traits;
