// ============================================================
// Layer 5 — Network
// ============================================================
// The assembled model, split in two halves:
//
//   Graph      — plain data. Input / target shapes, one LayerPlan
//                per architectural stage, the loss kind. Built by
//                the graph builders and never mutated afterwards.
//   Network<B> — the Burn module holding the trainable weights,
//                one Layer<B> per LayerPlan, in the same order.
//
// Keeping the plan outside the module lets the optimiser own the
// module by value (`optim.step` consumes it) while the wrangler
// keeps borrowing the plan.
//
// Each stage runs its ops in plan order. The transform op
// (dense / conv / deconv) applies the activation straight away,
// so later ops see the activated output:
//
//   dense:  transform -> batchnorm -> dropout
//   conv:   transform -> batchnorm -> pool -> dropout
//   deconv: transform -> batchnorm -> unpool -> unstride -> dropout

use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig, ConvTranspose2d, ConvTranspose2dConfig},
        pool::{MaxPool2d, MaxPool2dConfig},
        BatchNorm, BatchNormConfig,
        Dropout, DropoutConfig,
        Linear, LinearConfig,
        PaddingConfig2d,
    },
    prelude::*,
};

use crate::ml::ops::{
    fit_to_shape, loss_mse, loss_sigmoid_ce, upsample, Activation, LossKind, Regularizer,
};

/// Whether dropout and batch statistics run in training form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Training,
    Inference,
}

// ─── Plan ─────────────────────────────────────────────────────────────────────
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Op {
    Dense     { d_in: usize, d_out: usize },
    Conv      { channels: [usize; 2], kernel: [usize; 2], stride: [usize; 2], padding: [usize; 2] },
    Deconv    { channels: [usize; 2], kernel: [usize; 2], padding: [usize; 2] },
    BatchNorm { channels: usize },
    Pool      { window: [usize; 2] },
    Unpool    { factor: [usize; 2] },
    Unstride  { factor: [usize; 2] },
    Dropout   { rate: f64 },
}

impl Op {
    /// Name suffix this op appends to the stage's name stack.
    fn suffix(&self) -> Option<&'static str> {
        match self {
            Op::Dense { .. } | Op::Conv { .. } | Op::Deconv { .. } => None,
            Op::BatchNorm { .. } => Some("batchnorm"),
            Op::Pool { .. }      => Some("pooling"),
            Op::Unpool { .. }    => Some("unpool"),
            Op::Unstride { .. }  => Some("unstride"),
            Op::Dropout { .. }   => Some("dropout"),
        }
    }
}

/// One architectural stage.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerPlan {
    pub label:       String,
    pub ops:         Vec<Op>,
    pub bias:        bool,
    pub activation:  Option<Activation>,
    pub regularizer: Option<Regularizer>,
    /// `[channels, height, width]` after the last op.
    pub out_shape:   [usize; 3],
}

impl LayerPlan {
    /// Names of every op in order; each one extends the previous name,
    /// e.g. `encode_0`, `encode_0_batchnorm`, `encode_0_batchnorm_pooling`.
    pub fn op_names(&self) -> Vec<String> {
        let mut current = self.label.clone();
        self.ops
            .iter()
            .map(|op| {
                if let Some(suffix) = op.suffix() {
                    current = format!("{current}_{suffix}");
                }
                current.clone()
            })
            .collect()
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> Layer<B> {
        let mut layer = Layer {
            dense: None, conv: None, deconv: None,
            batchnorm: None, pool: None, dropout: None,
        };
        for op in &self.ops {
            match *op {
                Op::Dense { d_in, d_out } => {
                    layer.dense = Some(
                        LinearConfig::new(d_in, d_out).with_bias(self.bias).init(device),
                    );
                }
                Op::Conv { channels, kernel, stride, padding } => {
                    layer.conv = Some(
                        Conv2dConfig::new(channels, kernel)
                            .with_stride(stride)
                            .with_padding(PaddingConfig2d::Explicit(padding[0], padding[1]))
                            .with_bias(self.bias)
                            .init(device),
                    );
                }
                Op::Deconv { channels, kernel, padding } => {
                    layer.deconv = Some(
                        ConvTranspose2dConfig::new(channels, kernel)
                            .with_padding(padding)
                            .with_bias(self.bias)
                            .init(device),
                    );
                }
                Op::BatchNorm { channels } => {
                    layer.batchnorm = Some(BatchNormConfig::new(channels).init(device));
                }
                Op::Pool { window } => {
                    layer.pool = Some(MaxPool2dConfig::new(window).with_strides(window).init());
                }
                Op::Dropout { rate } => {
                    layer.dropout = Some(DropoutConfig::new(rate).init());
                }
                Op::Unpool { .. } | Op::Unstride { .. } => {}
            }
        }
        layer
    }
}

/// The complete plan of a network.
#[derive(Debug, Clone, PartialEq)]
pub struct Graph {
    /// Per-sample input shape in caller layout.
    pub input_shape:  Vec<usize>,
    /// Per-sample target shape in caller layout.
    pub target_shape: Vec<usize>,
    /// Target shape as `[channels, height, width]`.
    pub target_chw:   [usize; 3],
    pub layers:       Vec<LayerPlan>,
    pub loss:         LossKind,
}

impl Graph {
    pub fn init<B: Backend>(&self, device: &B::Device) -> Network<B> {
        Network {
            layers: self.layers.iter().map(|plan| plan.init(device)).collect(),
        }
    }

    /// Training / evaluation objective on a forward pass, without
    /// regularization penalties.
    pub fn loss<B: Backend>(&self, out: &NetworkOutput<B>, target: Tensor<B, 4>) -> Tensor<B, 1> {
        match self.loss {
            LossKind::MeanSquaredError    => loss_mse(target, out.output.clone()),
            LossKind::SigmoidCrossEntropy => loss_sigmoid_ce(target, out.logits.clone()),
        }
    }
}

// ─── Module ───────────────────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct Layer<B: Backend> {
    pub dense:     Option<Linear<B>>,
    pub conv:      Option<Conv2d<B>>,
    pub deconv:    Option<ConvTranspose2d<B>>,
    pub batchnorm: Option<BatchNorm<B>>,
    pub pool:      Option<MaxPool2d>,
    pub dropout:   Option<Dropout>,
}

pub struct LayerOutput<B: Backend> {
    pub output:  Tensor<B, 4>,
    /// Transform output before its activation.
    pub preact:  Tensor<B, 4>,
    pub penalty: Option<Tensor<B, 1>>,
}

impl<B: Backend> Layer<B> {
    pub fn forward(&self, plan: &LayerPlan, x: Tensor<B, 4>, mode: RunMode) -> LayerOutput<B> {
        let mut x = x;
        let mut preact  = None;
        let mut penalty = None;

        for op in &plan.ops {
            x = match op {
                Op::Dense { .. } | Op::Conv { .. } | Op::Deconv { .. } => {
                    let pre = self.transform(x);
                    preact = Some(pre.clone());
                    let act = match plan.activation {
                        Some(activation) => activation.apply(pre),
                        None => pre,
                    };
                    if let Some(reg) = plan.regularizer {
                        penalty = Some(reg.penalty(act.clone()));
                    }
                    act
                }
                Op::BatchNorm { .. } => match &self.batchnorm {
                    Some(bn) => batchnorm(bn, x, mode),
                    None => x,
                },
                Op::Pool { .. } => match &self.pool {
                    Some(pool) => pool.forward(x),
                    None => x,
                },
                Op::Unpool { factor } | Op::Unstride { factor } => upsample(x, *factor),
                Op::Dropout { .. } => match (&self.dropout, mode) {
                    (Some(dropout), RunMode::Training) => dropout.forward(x),
                    _ => x,
                },
            };
        }

        let output = x;
        LayerOutput {
            preact: preact.unwrap_or_else(|| output.clone()),
            output,
            penalty,
        }
    }

    fn transform(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        if let Some(linear) = &self.dense {
            // dense layers see every non-batch value as one feature vector
            let [n, c, h, w] = x.dims();
            let y = linear.forward(x.reshape([n, c * h * w]));
            let [_, units] = y.dims();
            return y.reshape([n, units, 1, 1]);
        }
        if let Some(conv) = &self.conv {
            return conv.forward(x);
        }
        if let Some(deconv) = &self.deconv {
            return deconv.forward(x);
        }
        x
    }
}

/// Batch normalisation; inference mode normalises with the running
/// statistics regardless of the backend's autodiff state.
fn batchnorm<B: Backend>(bn: &BatchNorm<B>, x: Tensor<B, 4>, mode: RunMode) -> Tensor<B, 4> {
    match mode {
        RunMode::Training => bn.forward(x),
        RunMode::Inference => {
            let channels = x.dims()[1];
            let shape = [1, channels, 1, 1];
            let mean  = bn.running_mean.value().reshape(shape);
            let var   = bn.running_var.value().reshape(shape);
            let gamma = bn.gamma.val().reshape(shape);
            let beta  = bn.beta.val().reshape(shape);
            (x - mean)
                .div(var.add_scalar(bn.epsilon).sqrt())
                .mul(gamma)
                .add(beta)
        }
    }
}

#[derive(Module, Debug)]
pub struct Network<B: Backend> {
    pub layers: Vec<Layer<B>>,
}

pub struct NetworkOutput<B: Backend> {
    /// Final output, cropped / padded to the target shape.
    pub output:  Tensor<B, 4>,
    /// Final pre-activation, same shape as `output`.
    pub logits:  Tensor<B, 4>,
    /// Sum of every stage's activity penalty.
    pub penalty: Option<Tensor<B, 1>>,
}

impl<B: Backend> Network<B> {
    /// input: [batch, C, H, W] → output: [batch, target C, H, W]
    pub fn forward(&self, graph: &Graph, input: Tensor<B, 4>, mode: RunMode) -> NetworkOutput<B> {
        let mut x = input;
        let mut logits  = x.clone();
        let mut penalty: Option<Tensor<B, 1>> = None;

        for (plan, layer) in graph.layers.iter().zip(&self.layers) {
            let out = layer.forward(plan, x, mode);
            x = out.output;
            logits = out.preact;
            penalty = match (penalty, out.penalty) {
                (Some(total), Some(p)) => Some(total + p),
                (total, p) => total.or(p),
            };
        }

        let [c, h, w] = graph.target_chw;
        let target = [x.dims()[0], c, h, w];
        NetworkOutput {
            output: fit_to_shape(x, target),
            logits: fit_to_shape(logits, target),
            penalty,
        }
    }
}

/// A graph together with freshly initialised weights.
#[derive(Debug)]
pub struct AssembledNetwork<B: Backend> {
    pub graph:   Graph,
    pub network: Network<B>,
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::ops::scalar;

    type TestBackend = burn::backend::NdArray;

    fn plan(ops: Vec<Op>) -> LayerPlan {
        LayerPlan {
            label: "decode_0".into(),
            ops,
            bias: true,
            activation: Some(Activation::Relu),
            regularizer: None,
            out_shape: [1, 1, 1],
        }
    }

    #[test]
    fn test_op_names_extend_the_stack() {
        let p = plan(vec![
            Op::Deconv { channels: [2, 2], kernel: [1, 3], padding: [0, 1] },
            Op::BatchNorm { channels: 2 },
            Op::Unpool { factor: [1, 2] },
            Op::Unstride { factor: [1, 1] },
            Op::Dropout { rate: 0.1 },
        ]);
        assert_eq!(
            p.op_names(),
            vec![
                "decode_0",
                "decode_0_batchnorm",
                "decode_0_batchnorm_unpool",
                "decode_0_batchnorm_unpool_unstride",
                "decode_0_batchnorm_unpool_unstride_dropout",
            ]
        );
    }

    #[test]
    fn test_inference_batchnorm_uses_running_stats() {
        let device = Default::default();
        let p = plan(vec![Op::Dense { d_in: 3, d_out: 2 }, Op::BatchNorm { channels: 2 }]);
        let layer = p.init::<TestBackend>(&device);
        let x = Tensor::<TestBackend, 4>::ones([4, 3, 1, 1], &device);

        // fresh running stats are mean 0 / var 1, so inference is ~identity
        let out = layer.forward(&p, x.clone(), RunMode::Inference);
        let pre = layer.forward(&p, x, RunMode::Inference).preact;
        let expected = Activation::Relu.apply(pre).div_scalar((1.0f64 + 1e-5).sqrt());
        let diff = (out.output - expected).abs().max().into_scalar().elem::<f32>();
        assert!(diff < 1e-4);
    }

    #[test]
    fn test_regularized_stage_reports_activity_penalty() {
        let device = Default::default();
        let mut p = plan(vec![Op::Dense { d_in: 3, d_out: 2 }]);
        p.regularizer = Some(Regularizer::L2(0.5));
        let layer = p.init::<TestBackend>(&device);
        let x = Tensor::<TestBackend, 4>::ones([4, 3, 1, 1], &device);

        let out = layer.forward(&p, x, RunMode::Training);
        let expected = scalar(out.output.clone().powf_scalar(2.0).sum()) * 0.5 / 4.0;
        let penalty = scalar(out.penalty.unwrap());
        assert!((penalty - expected).abs() < 1e-5);

        let plain = plan(vec![Op::Dense { d_in: 3, d_out: 2 }]);
        let x = Tensor::<TestBackend, 4>::ones([4, 3, 1, 1], &device);
        assert!(plain.init::<TestBackend>(&device).forward(&plain, x, RunMode::Training).penalty.is_none());
    }
}
