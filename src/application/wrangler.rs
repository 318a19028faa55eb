// ============================================================
// Layer 2 — ModelWrangler
// ============================================================
// The single entry point for one model. It owns:
//
//   params   — the merged ArchitectureParams
//   graph    — the plain-data plan built from them
//   network  — the weights (persist across calls, never re-initialised)
//   store    — checkpoint files under `path`
//   tracker  — tb_log/scalars.csv
//   log      — the model's own log file
//
// Every public operation runs inside the model's log scope, so
// everything logged below it lands in `<path>/<name>.log`.
//
//   new / from_params   build params → graph → fresh weights
//   load                read params JSON, rebuild, restore latest
//   train               epochs over a DatasetManager
//   save                params + weights for one step
//   predict             inference-mode forward pass
//   score(_with)        scalar loss of a prediction
//   feature_importance  mean squared input gradient of the score

use anyhow::{anyhow, bail, Result};
use burn::{module::AutodiffModule, prelude::*, tensor::backend::AutodiffBackend};
use serde_json::Value;
use std::path::{Path, PathBuf};

use crate::data::dataset::DatasetManager;
use crate::domain::params::{Architecture, ArchitectureParams};
use crate::domain::samples::Samples;
use crate::domain::traits::Persistable;
use crate::infra::{
    checkpoint::PersistenceManager, logging::ModelLog, metrics::ScalarTracker,
};
use crate::ml::{
    builder::GraphBuilder,
    network::{Graph, Network, NetworkOutput, RunMode},
    ops::{from_nchw, scalar, to_nchw, ScoreFn},
    trainer::{StopToken, TrainCursor, TrainStatus, TrainingOrchestrator},
};

pub struct ModelWrangler<B: AutodiffBackend> {
    params:  ArchitectureParams,
    graph:   Graph,
    network: Network<B>,
    device:  B::Device,
    store:   PersistenceManager,
    tracker: ScalarTracker,
    log:     ModelLog,
    stop:    StopToken,
    cursor:  TrainCursor,
}

impl<B: AutodiffBackend> ModelWrangler<B> {
    /// Merge `overrides` over the architecture's defaults and build a
    /// model with fresh weights.
    pub fn new(architecture: Architecture, overrides: Value, device: B::Device) -> Result<Self> {
        let params = ArchitectureParams::construct(architecture, overrides)?;
        Self::from_params(params, device)
    }

    pub fn from_params(params: ArchitectureParams, device: B::Device) -> Result<Self> {
        let log = ModelLog::new(&params.common.log_file(), params.common.verb)?;

        let (graph, network, tracker) = log.scope(|| -> Result<_> {
            tracing::info!(
                "Building {} model '{}' in {}",
                params.architecture(), params.name(), params.path().display()
            );
            let assembled = params.assemble::<B>(&device)?;
            for plan in &assembled.graph.layers {
                tracing::info!("  {:<14} {:?}", plan.label, plan.out_shape);
            }
            let tracker = ScalarTracker::new(&params.common.tb_log_path)?;
            Ok((assembled.graph, assembled.network, tracker))
        })?;

        // numbering continues after whatever is already on disk
        let store = PersistenceManager::for_params(&params);
        let cursor = TrainCursor {
            epoch: store.latest_step()?.map_or(0, |s| s + 1),
            step:  tracker.last_step()?.map_or(0, |s| s + 1),
        };

        Ok(Self {
            params, graph, network, device, store, tracker, log,
            stop: StopToken::new(),
            cursor,
        })
    }

    /// Rebuild a model from its saved params file and restore the
    /// newest checkpoint next to it.
    pub fn load(param_file: &Path, device: B::Device) -> Result<Self> {
        let params = ArchitectureParams::load(param_file)?;
        let mut wrangler = Self::from_params(params, device)?;

        let network = wrangler.network.clone();
        let (network, step) = wrangler
            .log
            .scope(|| wrangler.store.load_latest(network, &wrangler.device))?;
        wrangler.network = network;
        wrangler.cursor.epoch = step + 1;
        Ok(wrangler)
    }

    /// Train for `num_epochs`. With `positive_classes` non-empty every
    /// batch is half positive rows. Returns `Stopped` when the stop
    /// token was raised; weights trained so far are kept and the token
    /// is cleared for the next call.
    pub fn train(
        &mut self,
        input:            &Samples,
        target:           &Samples,
        positive_classes: &[usize],
    ) -> Result<TrainStatus> {
        self.check_input(input)?;
        self.check_target(target)?;

        let log = &self.log;
        log.scope(|| {
            let dataset = DatasetManager::new(input, target, true, self.params.common.holdout_prop)?;
            let orchestrator = TrainingOrchestrator::<B> {
                graph:   &self.graph,
                params:  &self.params,
                store:   &self.store,
                tracker: &self.tracker,
                stop:    &self.stop,
                device:  &self.device,
            };
            let (network, status) = orchestrator.run(
                self.network.clone(),
                &dataset,
                positive_classes,
                &mut self.cursor,
            )?;
            self.network = network;
            if let TrainStatus::Stopped { .. } = status {
                self.stop.reset();
            }
            Ok(status)
        })
    }

    /// Write params and the current weights as checkpoint `iteration`.
    pub fn save(&self, iteration: usize) -> Result<PathBuf> {
        self.log
            .scope(|| self.store.save_checkpoint(&self.params, &self.network, iteration))
    }

    /// Network output in target layout (`[rows, target sample shape..]`).
    pub fn predict(&self, input: &Samples) -> Result<Samples> {
        self.check_input(input)?;
        self.log.scope(|| {
            let x = to_nchw::<B::InnerBackend>(input, &self.device)?;
            let out = self.network.valid().forward(&self.graph, x, RunMode::Inference);
            from_nchw(out.output, &self.graph.target_shape)
        })
    }

    /// The model's own loss (MSE, or sigmoid cross-entropy for the
    /// baseline) on `input` against `target`.
    pub fn score(&self, input: &Samples, target: &Samples) -> Result<f64> {
        self.evaluate(input, target, |out, y| self.graph.loss(&out, y))
    }

    pub fn score_with<S: ScoreFn>(&self, input: &Samples, target: &Samples, score_fn: &S) -> Result<f64> {
        self.evaluate(input, target, |out, y| score_fn.score(out.output, y))
    }

    /// Mean over rows of the squared gradient of the loss with
    /// respect to every input value, in caller layout.
    pub fn feature_importance(&self, input: &Samples, target: &Samples) -> Result<Vec<f32>> {
        self.importance(input, target, |out, y| self.graph.loss(&out, y))
    }

    pub fn feature_importance_with<S: ScoreFn>(
        &self,
        input:    &Samples,
        target:   &Samples,
        score_fn: &S,
    ) -> Result<Vec<f32>> {
        self.importance(input, target, |out, y| score_fn.score(out.output, y))
    }

    /// Shared flag that stops `train` at the next epoch boundary.
    pub fn stop_token(&self) -> StopToken {
        self.stop.clone()
    }

    pub fn params(&self) -> &ArchitectureParams {
        &self.params
    }

    // ─── Internals ────────────────────────────────────────────────────────────
    fn evaluate(
        &self,
        input:  &Samples,
        target: &Samples,
        objective: impl Fn(NetworkOutput<B::InnerBackend>, Tensor<B::InnerBackend, 4>) -> Tensor<B::InnerBackend, 1>,
    ) -> Result<f64> {
        self.check_pair(input, target)?;
        self.log.scope(|| {
            let x = to_nchw::<B::InnerBackend>(input, &self.device)?;
            let y = to_nchw::<B::InnerBackend>(target, &self.device)?;
            let out = self.network.valid().forward(&self.graph, x, RunMode::Inference);
            let value = scalar(objective(out, y));
            tracing::info!("Score on {} rows: {:.6}", input.rows(), value);
            Ok(value)
        })
    }

    fn importance(
        &self,
        input:  &Samples,
        target: &Samples,
        objective: impl Fn(NetworkOutput<B>, Tensor<B, 4>) -> Tensor<B, 1>,
    ) -> Result<Vec<f32>> {
        self.check_pair(input, target)?;
        self.log.scope(|| {
            let x = to_nchw::<B>(input, &self.device)?.require_grad();
            let y = to_nchw::<B>(target, &self.device)?;
            let out = self.network.forward(&self.graph, x.clone(), RunMode::Inference);

            let grads = objective(out, y).backward();
            let grad = x
                .grad(&grads)
                .ok_or_else(|| anyhow!("no gradient reached the model input"))?;

            let mean_sq = grad.powf_scalar(2.0).mean_dim(0);
            let per_feature = from_nchw(mean_sq, input.sample_shape())?;
            Ok(per_feature.into_values())
        })
    }

    fn check_pair(&self, input: &Samples, target: &Samples) -> Result<()> {
        self.check_input(input)?;
        self.check_target(target)?;
        if input.rows() != target.rows() {
            bail!("input has {} rows but target has {}", input.rows(), target.rows());
        }
        Ok(())
    }

    fn check_input(&self, input: &Samples) -> Result<()> {
        if input.rows() == 0 {
            bail!("input samples have no rows");
        }
        if input.sample_shape() != self.graph.input_shape.as_slice() {
            bail!(
                "input samples have shape {:?}, the model expects {:?}",
                input.sample_shape(), self.graph.input_shape
            );
        }
        Ok(())
    }

    fn check_target(&self, target: &Samples) -> Result<()> {
        if target.sample_shape() != self.graph.target_shape.as_slice() {
            bail!(
                "target samples have shape {:?}, the model expects {:?}",
                target.sample_shape(), self.graph.target_shape
            );
        }
        Ok(())
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::ops::MeanSquaredError;
    use serde_json::json;

    type TestBackend = burn::backend::Autodiff<burn::backend::NdArray>;

    fn overrides(tmp: &tempfile::TempDir, extra: Value) -> Value {
        let mut base = json!({
            "name": "autoenc",
            "path": tmp.path().join("autoenc"),
            "verb": false,
            "in_size": 10,
            "encode_nodes": [5],
            "bottleneck_dim": 3,
            "decode_nodes": [5],
            "num_epochs": 1,
            "batch_size": 10,
            "holdout_prop": 0.1
        });
        if let (Some(base), Value::Object(extra)) = (base.as_object_mut(), extra) {
            base.extend(extra);
        }
        base
    }

    fn rows(n: usize, width: usize) -> Samples {
        let rows: Vec<Vec<f32>> = (0..n)
            .map(|i| (0..width).map(|j| ((i * 7 + j * 3) % 11) as f32 / 11.0).collect())
            .collect();
        Samples::from_rows(&rows).unwrap()
    }

    #[test]
    fn test_dense_autoencoder_end_to_end() {
        let tmp = tempfile::tempdir().unwrap();
        let device = Default::default();
        let mut w = ModelWrangler::<TestBackend>::new(
            Architecture::DenseAutoencoder,
            overrides(&tmp, json!({})),
            device,
        )
        .unwrap();

        let x = rows(100, 10);
        let status = w.train(&x, &x, &[]).unwrap();
        assert_eq!(status, TrainStatus::Completed { epochs: 1 });

        let dir = tmp.path().join("autoenc");
        assert!(dir.join("autoenc-params.json").exists());
        assert!(dir.join("autoenc-00000000.mpk").exists());
        assert!(dir.join("saver-meta").exists());
        assert!(dir.join("autoenc.log").exists());
        assert!(dir.join("tb_log").join("scalars.csv").exists());

        let holdout = rows(10, 10);
        let score = w.score(&holdout, &holdout).unwrap();
        assert!(score.is_finite() && score >= 0.0);

        let prediction = w.predict(&holdout).unwrap();
        assert_eq!(prediction.shape(), &[10, 10]);
    }

    #[test]
    fn test_feature_importance_shape_and_sign() {
        let tmp = tempfile::tempdir().unwrap();
        let w = ModelWrangler::<TestBackend>::new(
            Architecture::DenseAutoencoder,
            overrides(&tmp, json!({ "decode_params": { "batchnorm": true } })),
            Default::default(),
        )
        .unwrap();

        let x = rows(8, 10);
        let importance = w.feature_importance(&x, &x).unwrap();
        assert_eq!(importance.len(), 10);
        assert!(importance.iter().all(|v| *v >= 0.0 && v.is_finite()));

        let custom = w.feature_importance_with(&x, &x, &MeanSquaredError).unwrap();
        assert_eq!(custom, importance);
    }

    #[test]
    fn test_stopped_training_then_reload() {
        let tmp = tempfile::tempdir().unwrap();
        let mut w = ModelWrangler::<TestBackend>::new(
            Architecture::DenseAutoencoder,
            overrides(&tmp, json!({ "num_epochs": 2 })),
            Default::default(),
        )
        .unwrap();
        let x = rows(40, 10);
        w.train(&x, &x, &[]).unwrap();

        w.stop_token().stop();
        let status = w.train(&x, &x, &[]).unwrap();
        assert_eq!(status, TrainStatus::Stopped { epochs_completed: 0 });
        assert!(!w.stop_token().is_stopped());

        let before = w.predict(&x).unwrap();
        let param_file = w.params().common.params_file();
        let restored = ModelWrangler::<TestBackend>::load(&param_file, Default::default()).unwrap();
        assert_eq!(restored.params(), w.params());

        let after = restored.predict(&x).unwrap();
        for (a, b) in before.values().iter().zip(after.values()) {
            assert!((a - b).abs() < 1e-5);
        }
    }

    #[test]
    fn test_load_without_checkpoint_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let params = ArchitectureParams::construct(
            Architecture::DenseAutoencoder,
            overrides(&tmp, json!({})),
        )
        .unwrap();
        let file = params.save().unwrap();
        assert!(ModelWrangler::<TestBackend>::load(&file, Default::default()).is_err());
    }

    #[test]
    fn test_balanced_baseline_training() {
        let tmp = tempfile::tempdir().unwrap();
        let mut w = ModelWrangler::<TestBackend>::new(
            Architecture::Baseline,
            json!({
                "name": "base",
                "path": tmp.path().join("base"),
                "verb": false,
                "in_size": 4,
                "out_size": 1,
                "batch_size": 8,
                "num_epochs": 1
            }),
            Default::default(),
        )
        .unwrap();

        let x = rows(50, 4);
        let labels: Vec<Vec<f32>> = (0..50).map(|i| vec![if i % 10 == 0 { 1.0 } else { 0.0 }]).collect();
        let y = Samples::from_rows(&labels).unwrap();
        assert!(matches!(w.train(&x, &y, &[1]).unwrap(), TrainStatus::Completed { .. }));

        let p = w.predict(&x).unwrap();
        assert!(p.values().iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn test_conv_autoencoder_signal() {
        let tmp = tempfile::tempdir().unwrap();
        let mut w = ModelWrangler::<TestBackend>::new(
            Architecture::ConvAutoencoder,
            json!({
                "path": tmp.path().join("conv"),
                "verb": false,
                "in_size": 12,
                "encode_nodes": [4],
                "decode_nodes": [4],
                "batch_size": 4,
                "num_epochs": 1
            }),
            Default::default(),
        )
        .unwrap();

        let x = Samples::new(vec![16, 12, 1], rows(16, 12).into_values()).unwrap();
        w.train(&x, &x, &[]).unwrap();
        assert_eq!(w.predict(&x).unwrap().shape(), &[16, 12, 1]);
        assert_eq!(w.feature_importance(&x, &x).unwrap().len(), 12);
    }

    #[test]
    fn test_wrong_input_shape_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let w = ModelWrangler::<TestBackend>::new(
            Architecture::DenseAutoencoder,
            overrides(&tmp, json!({})),
            Default::default(),
        )
        .unwrap();
        assert!(w.predict(&rows(3, 7)).is_err());
    }

    #[test]
    fn test_training_resumes_after_a_stop() {
        let tmp = tempfile::tempdir().unwrap();
        let mut w = ModelWrangler::<TestBackend>::new(
            Architecture::DenseAutoencoder,
            overrides(&tmp, json!({})),
            Default::default(),
        )
        .unwrap();
        let x = rows(20, 10);

        w.stop_token().stop();
        assert_eq!(w.train(&x, &x, &[]).unwrap(), TrainStatus::Stopped { epochs_completed: 0 });
        assert_eq!(w.train(&x, &x, &[]).unwrap(), TrainStatus::Completed { epochs: 1 });
    }

    #[test]
    fn test_empty_input_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let mut w = ModelWrangler::<TestBackend>::new(
            Architecture::DenseAutoencoder,
            overrides(&tmp, json!({})),
            Default::default(),
        )
        .unwrap();
        let empty = Samples::new(vec![0, 10], vec![]).unwrap();

        assert!(w.predict(&empty).is_err());
        assert!(w.score(&empty, &empty).is_err());
        assert!(w.feature_importance(&empty, &empty).is_err());
        assert!(w.train(&empty, &empty, &[]).is_err());
    }

    #[test]
    fn test_score_excludes_activity_penalty() {
        let tmp = tempfile::tempdir().unwrap();
        let w = ModelWrangler::<TestBackend>::new(
            Architecture::DenseAutoencoder,
            overrides(&tmp, json!({
                "bottleneck_params": { "act_reg": { "kind": "l1", "strength": 1000.0 } }
            })),
            Default::default(),
        )
        .unwrap();
        let x = rows(10, 10);

        let prediction = w.predict(&x).unwrap();
        let mse = prediction
            .values()
            .iter()
            .zip(x.values())
            .map(|(p, t)| ((p - t) as f64).powi(2))
            .sum::<f64>()
            / x.values().len() as f64;

        let score = w.score(&x, &x).unwrap();
        assert!((score - mse).abs() < 1e-5, "score {score} vs plain mse {mse}");
    }
}
