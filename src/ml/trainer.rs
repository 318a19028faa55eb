// ============================================================
// Layer 5 — Training Loop
// ============================================================
// Epoch / batch loop with SGD + momentum.
//
// Per epoch:
//   1. check the stop token (stop → return Stopped, no rollback)
//   2. drain the batch iterator (balanced when positive classes
//      are given), one optimiser step per batch
//   3. record every batch objective; after every 100th batch
//      (100, 200, ...) also score the holdout rows in inference mode
//   4. log the epoch summary, then write params + weights
//
// Key Burn 0.20 insight:
//   - the wrangler's network lives on the autodiff backend B
//   - network.valid() returns it on B::InnerBackend, which is
//     what holdout scoring uses (no graph is recorded)
//
// Momentum update (no dampening):
//   v = 0.9 * v + g
//   θ = θ - lr * v

use anyhow::Result;
use burn::{
    data::dataloader::batcher::Batcher,
    module::AutodiffModule,
    optim::{momentum::MomentumConfig, GradientsParams, Optimizer, SgdConfig},
    prelude::*,
    tensor::backend::AutodiffBackend,
};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use crate::data::batcher::{RowBatch, RowBatcher};
use crate::data::dataset::DatasetManager;
use crate::domain::params::ArchitectureParams;
use crate::infra::checkpoint::PersistenceManager;
use crate::infra::metrics::{EpochSummary, ScalarTracker};
use crate::ml::network::{Graph, Network, RunMode};
use crate::ml::ops::{chw, scalar, to_nchw};

/// Holdout loss is logged on every Nth batch of an epoch.
pub const HOLDOUT_EVERY: usize = 100;

pub const MOMENTUM: f64 = 0.9;

/// Cooperative cancellation flag, checked at every epoch boundary.
/// Clones share the same flag, so it can be handed to another thread.
#[derive(Debug, Clone, Default)]
pub struct StopToken(Arc<AtomicBool>);

impl StopToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainStatus {
    Completed { epochs: usize },
    Stopped { epochs_completed: usize },
}

/// Where the next epoch / batch numbering continues from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrainCursor {
    /// Checkpoint step of the next epoch
    pub epoch: usize,
    /// Scalar-log step of the next batch
    pub step:  usize,
}

pub struct TrainingOrchestrator<'a, B: AutodiffBackend> {
    pub graph:   &'a Graph,
    pub params:  &'a ArchitectureParams,
    pub store:   &'a PersistenceManager,
    pub tracker: &'a ScalarTracker,
    pub stop:    &'a StopToken,
    pub device:  &'a B::Device,
}

impl<B: AutodiffBackend> TrainingOrchestrator<'_, B> {
    pub fn run(
        &self,
        network:  Network<B>,
        dataset:  &DatasetManager,
        positive: &[usize],
        cursor:   &mut TrainCursor,
    ) -> Result<(Network<B>, TrainStatus)> {
        let common  = &self.params.common;
        let batcher = RowBatcher::new(chw(&self.graph.input_shape)?, self.graph.target_chw);

        let holdout = match dataset.holdout_samples()? {
            Some((x, y)) => Some((
                to_nchw::<B::InnerBackend>(&x, self.device)?,
                to_nchw::<B::InnerBackend>(&y, self.device)?,
            )),
            None => None,
        };

        let momentum = MomentumConfig::new().with_momentum(MOMENTUM).with_dampening(0.0);
        let mut optim = SgdConfig::new()
            .with_momentum(Some(momentum))
            .init::<B, Network<B>>();

        let mut network = network;
        let mut best_holdout = f64::INFINITY;

        for done in 0..common.num_epochs {
            if self.stop.is_stopped() {
                tracing::info!("Stop requested, ending training after {} epochs", done);
                return Ok((network, TrainStatus::Stopped { epochs_completed: done }));
            }
            let epoch = cursor.epoch;

            let batches = if positive.is_empty() {
                dataset.batches(common.batch_size)
            } else {
                dataset.balanced_batches(positive, common.batch_size)
            };

            let mut loss_sum = 0.0f64;
            let mut n_batches = 0usize;

            for (idx, items) in batches.enumerate() {
                let batch: RowBatch<B> = batcher.batch(items, self.device);
                let out = network.forward(self.graph, batch.input, RunMode::Training);
                let loss = self.graph.loss(&out, batch.target);
                let objective = match out.penalty {
                    Some(penalty) => loss + penalty,
                    None => loss,
                };

                let value = scalar(objective.clone());
                self.tracker.record(cursor.step, "training_loss", value)?;
                loss_sum  += value;
                n_batches += 1;

                let grads = objective.backward();
                let grads = GradientsParams::from_grads(grads, &network);
                network = optim.step(common.learning_rate, network, grads);

                if holdout_due(idx) {
                    if let Some((x, y)) = &holdout {
                        let loss = holdout_loss(self.graph, &network, x.clone(), y.clone());
                        self.tracker.record(cursor.step, "holdout_loss", loss)?;
                        tracing::info!("Epoch {} batch {}: holdout loss {:.6}", epoch, idx, loss);
                    }
                }
                cursor.step += 1;
            }

            let holdout_end = holdout
                .as_ref()
                .map(|(x, y)| holdout_loss(self.graph, &network, x.clone(), y.clone()));
            let training_loss = if n_batches > 0 { loss_sum / n_batches as f64 } else { f64::NAN };
            let summary = EpochSummary::new(epoch, training_loss, holdout_end);
            self.tracker.record_epoch(cursor.step, &summary)?;

            match summary.holdout_loss {
                Some(h) => tracing::info!(
                    "Epoch {:>3} | training_loss={:.6} | holdout_loss={:.6}{}",
                    epoch, training_loss, h,
                    if summary.is_improvement(best_holdout) { " (best)" } else { "" },
                ),
                None => tracing::info!("Epoch {:>3} | training_loss={:.6}", epoch, training_loss),
            }
            if let Some(h) = summary.holdout_loss {
                best_holdout = best_holdout.min(h);
            }

            self.store.save_checkpoint(self.params, &network, epoch)?;
            cursor.epoch += 1;
        }

        tracing::info!("Training complete");
        Ok((network, TrainStatus::Completed { epochs: common.num_epochs }))
    }
}

/// True after the 100th, 200th, ... batch (`idx` counts from 0).
fn holdout_due(idx: usize) -> bool {
    (idx + 1) % HOLDOUT_EVERY == 0
}

/// Plain loss of the holdout rows in inference mode.
fn holdout_loss<B: AutodiffBackend>(
    graph:   &Graph,
    network: &Network<B>,
    input:   Tensor<B::InnerBackend, 4>,
    target:  Tensor<B::InnerBackend, 4>,
) -> f64 {
    let valid = network.valid();
    let out = valid.forward(graph, input, RunMode::Inference);
    scalar(graph.loss(&out, target))
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_token_is_shared_between_clones() {
        let token = StopToken::new();
        let other = token.clone();
        assert!(!token.is_stopped());
        other.stop();
        assert!(token.is_stopped());
        token.reset();
        assert!(!other.is_stopped());
    }

    #[test]
    fn test_holdout_runs_after_every_hundredth_batch() {
        let due: Vec<usize> = (0..250).filter(|&idx| holdout_due(idx)).collect();
        assert_eq!(due, vec![99, 199]);
    }
}
