#![recursion_limit = "256"]

//! Configuration-driven assembly, training and checkpointing of
//! dense and convolutional autoencoders on Burn.
//!
//! ```no_run
//! use model_wrangler::{Architecture, DefaultBackend, ModelWrangler, Samples};
//! use serde_json::json;
//!
//! # fn main() -> anyhow::Result<()> {
//! let mut model = ModelWrangler::<DefaultBackend>::new(
//!     Architecture::DenseAutoencoder,
//!     json!({ "name": "demo", "in_size": 4, "num_epochs": 2 }),
//!     Default::default(),
//! )?;
//! let x = Samples::from_rows(&vec![vec![0.0, 1.0, 0.5, 0.2]; 32])?;
//! model.train(&x, &x, &[])?;
//! println!("loss: {}", model.score(&x, &x)?);
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod application;
pub mod domain;
pub mod data;
pub mod ml;
pub mod infra;

pub use application::wrangler::ModelWrangler;
pub use domain::params::{Architecture, ArchitectureParams};
pub use domain::samples::Samples;
pub use ml::ops::{MeanSquaredError, ScoreFn};
pub use ml::trainer::{StopToken, TrainStatus};

/// Backend used by the CLI: NdArray on the CPU, or WGPU with the
/// `wgpu` feature.
#[cfg(not(feature = "wgpu"))]
pub type DefaultBackend = burn::backend::Autodiff<burn::backend::NdArray>;

#[cfg(feature = "wgpu")]
pub type DefaultBackend = burn::backend::Autodiff<burn::backend::Wgpu>;
