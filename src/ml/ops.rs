// ============================================================
// Layer 5 — Primitive Ops
// ============================================================
// Small tensor helpers shared by the network and the trainer:
//
//   Activation / Regularizer — kind strings resolved to ops
//   fit_to_shape             — crop/pad reconciliation with the target
//   upsample                 — nearest-neighbour unpool / unstride
//   loss_mse, loss_sigmoid_ce
//   ScoreFn                  — pluggable scalar score
//   to_nchw / from_nchw      — caller layout <-> network layout
//
// Inside the network every tensor is NCHW. Dense data [N, F] is
// carried as [N, F, 1, 1], 1-D signals [N, L, C] as [N, C, 1, L]
// and images [N, H, W, C] as [N, C, H, W].

use anyhow::{anyhow, bail, Result};
use burn::{
    nn::loss::{MseLoss, Reduction},
    prelude::*,
    tensor::activation,
};

use crate::domain::layer_option::Regularization;
use crate::domain::samples::Samples;

// ─── Activation ───────────────────────────────────────────────────────────────
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Activation {
    Relu,
    LeakyRelu,
    Sigmoid,
    Tanh,
    Gelu,
    Silu,
}

impl Activation {
    /// Resolve an activation kind; `None` means identity.
    pub fn resolve(kind: Option<&str>) -> Result<Option<Self>> {
        let Some(kind) = kind else { return Ok(None) };
        let act = match kind.to_ascii_lowercase().as_str() {
            "relu"       => Activation::Relu,
            "leaky_relu" => Activation::LeakyRelu,
            "sigmoid"    => Activation::Sigmoid,
            "tanh"       => Activation::Tanh,
            "gelu"       => Activation::Gelu,
            "silu" | "swish" => Activation::Silu,
            other => bail!("unrecognised activation kind '{other}'"),
        };
        Ok(Some(act))
    }

    pub fn apply<B: Backend, const D: usize>(self, x: Tensor<B, D>) -> Tensor<B, D> {
        match self {
            Activation::Relu      => activation::relu(x),
            Activation::LeakyRelu => activation::leaky_relu(x, 0.2),
            Activation::Sigmoid   => activation::sigmoid(x),
            Activation::Tanh      => activation::tanh(x),
            Activation::Gelu      => activation::gelu(x),
            Activation::Silu      => activation::silu(x),
        }
    }
}

// ─── Regularizer ──────────────────────────────────────────────────────────────
/// Activity regularization on a stage output, averaged over the batch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Regularizer {
    L1(f64),
    L2(f64),
}

impl Regularizer {
    pub fn resolve(reg: Option<&Regularization>) -> Result<Option<Self>> {
        let Some(reg) = reg else { return Ok(None) };
        let r = match reg.kind.to_ascii_lowercase().as_str() {
            "l1" => Regularizer::L1(reg.strength),
            "l2" => Regularizer::L2(reg.strength),
            other => bail!("unrecognised regularization kind '{other}'"),
        };
        Ok(Some(r))
    }

    pub fn penalty<B: Backend>(self, x: Tensor<B, 4>) -> Tensor<B, 1> {
        let batch = x.dims()[0].max(1) as f64;
        match self {
            Regularizer::L1(s) => x.abs().sum().mul_scalar(s / batch),
            Regularizer::L2(s) => x.powf_scalar(2.0).sum().mul_scalar(s / batch),
        }
    }
}

// ─── Shape helpers ────────────────────────────────────────────────────────────
/// Crop or zero-pad every non-batch dimension of `x` to `target`.
///
/// Cropping keeps the centre (an odd surplus loses its extra unit at
/// the end); padding puts `diff / 2` in front and the rest behind.
pub fn fit_to_shape<B: Backend>(x: Tensor<B, 4>, target: [usize; 4]) -> Tensor<B, 4> {
    let mut x = x;
    for dim in 1..4 {
        let current = x.dims()[dim];
        let wanted  = target[dim];

        if current > wanted {
            let start = (current - wanted) / 2;
            x = x.narrow(dim, start, wanted);
        } else if current < wanted {
            let before = (wanted - current) / 2;
            let after  = wanted - current - before;
            let device = x.device();
            let mut parts = Vec::with_capacity(3);
            let mut pad_shape = x.dims();
            if before > 0 {
                pad_shape[dim] = before;
                parts.push(Tensor::zeros(pad_shape, &device));
            }
            parts.push(x);
            if after > 0 {
                pad_shape[dim] = after;
                parts.push(Tensor::zeros(pad_shape, &device));
            }
            x = Tensor::cat(parts, dim);
        }
    }
    x
}

/// Nearest-neighbour upsampling of the two spatial axes.
pub fn upsample<B: Backend>(x: Tensor<B, 4>, factor: [usize; 2]) -> Tensor<B, 4> {
    let [fh, fw] = factor;
    if fh == 1 && fw == 1 {
        return x;
    }
    let [n, c, h, w] = x.dims();
    x.reshape([n, c, h, 1, w, 1])
        .expand([n, c, h, fh, w, fw])
        .reshape([n, c, h * fh, w * fw])
}

// ─── Losses ───────────────────────────────────────────────────────────────────
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LossKind {
    /// Mean squared error between target and (post-activation) output.
    MeanSquaredError,
    /// Sigmoid cross-entropy between target and the raw pre-activation.
    SigmoidCrossEntropy,
}

pub fn loss_mse<B: Backend>(target: Tensor<B, 4>, output: Tensor<B, 4>) -> Tensor<B, 1> {
    MseLoss::new().forward(output, target, Reduction::Mean)
}

/// Numerically stable `max(x, 0) - x * z + log(1 + exp(-|x|))`, averaged.
pub fn loss_sigmoid_ce<B: Backend>(target: Tensor<B, 4>, logits: Tensor<B, 4>) -> Tensor<B, 1> {
    let positive = logits.clone().clamp_min(0.0);
    let cross    = logits.clone().mul(target);
    let soft     = logits.abs().neg().exp().log1p();
    (positive - cross + soft).mean()
}

/// A scalar score of a prediction against its target, both NCHW.
/// Implement this to plug a custom score into `score_with` and
/// `feature_importance_with`.
pub trait ScoreFn {
    fn score<B: Backend>(&self, output: Tensor<B, 4>, target: Tensor<B, 4>) -> Tensor<B, 1>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MeanSquaredError;

impl ScoreFn for MeanSquaredError {
    fn score<B: Backend>(&self, output: Tensor<B, 4>, target: Tensor<B, 4>) -> Tensor<B, 1> {
        loss_mse(target, output)
    }
}

// ─── Layout conversion ────────────────────────────────────────────────────────
/// `[channels, height, width]` of a caller-layout sample shape.
pub fn chw(sample_shape: &[usize]) -> Result<[usize; 3]> {
    match *sample_shape {
        [features]                => Ok([features, 1, 1]),
        [length, channels]        => Ok([channels, 1, length]),
        [height, width, channels] => Ok([channels, height, width]),
        _ => bail!(
            "unsupported sample shape {:?} (expected 1 to 3 dimensions)",
            sample_shape
        ),
    }
}

pub fn to_nchw<B: Backend>(samples: &Samples, device: &B::Device) -> Result<Tensor<B, 4>> {
    let shape = chw(samples.sample_shape())?;
    Ok(nchw_from_flat(samples.values().to_vec(), samples.rows(), shape, device))
}

/// Build an NCHW tensor from row-major, channels-last values.
pub fn nchw_from_flat<B: Backend>(
    values: Vec<f32>,
    rows:   usize,
    shape:  [usize; 3],
    device: &B::Device,
) -> Tensor<B, 4> {
    let [c, h, w] = shape;
    let data = TensorData::new(values, [rows, h, w, c]);
    Tensor::<B, 4>::from_data(data, device).permute([0, 3, 1, 2])
}

/// Convert an NCHW tensor back to caller layout with `sample_shape`.
pub fn from_nchw<B: Backend>(x: Tensor<B, 4>, sample_shape: &[usize]) -> Result<Samples> {
    let rows = x.dims()[0];
    let values = x
        .permute([0, 2, 3, 1])
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| anyhow!("cannot read tensor values: {e:?}"))?;

    let mut shape = Vec::with_capacity(sample_shape.len() + 1);
    shape.push(rows);
    shape.extend_from_slice(sample_shape);
    Samples::new(shape, values)
}

/// Read a one-element tensor as f64.
pub fn scalar<B: Backend>(x: Tensor<B, 1>) -> f64 {
    x.into_scalar().elem::<f64>()
}
