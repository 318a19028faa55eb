// ============================================================
// Layer 5 — Graph Builders
// ============================================================
// Turns typed architecture parameters into a Graph.
//
// StackBuilder walks the stages in order, tracking the static
// [channels, height, width] shape so every op is sized from the
// previous one and bad configurations (a pooling window larger
// than the map, a kernel wider than a padded signal) fail here,
// before any weights exist.
//
//   baseline           in -> output(out_size)                 sigmoid CE
//   dense autoencoder  in -> encode* -> bottleneck
//                         -> decode* -> output(in_size)       MSE
//   conv autoencoder   same stages with conv / deconv, the
//                      output stage has one unit per channel  MSE
//
// Spatial size arithmetic (p = (k - 1) / 2):
//   conv    out = (in + 2p - k) / s + 1
//   pool    out = floor(in / window)
//   deconv  out = in - 2p + k - 1          (unit stride)
//   unpool / unstride  out = in * factor

use anyhow::{bail, Result};
use burn::prelude::*;

use crate::domain::layer_option::{
    ConvLayerOption, ConvTransform, Direction, LayerOption, PoolOp, StrideOp,
};
use crate::domain::params::{
    ArchitectureParams, BaselineParams, ConvAutoencoderParams, DenseAutoencoderParams,
    ModelParams,
};
use crate::ml::network::{AssembledNetwork, Graph, LayerPlan, Op};
use crate::ml::ops::{chw, Activation, LossKind, Regularizer};

/// Anything that can describe a network graph.
pub trait GraphBuilder {
    fn build_graph(&self) -> Result<Graph>;

    /// Build the graph and initialise fresh weights for it.
    fn assemble<B: Backend>(&self, device: &B::Device) -> Result<AssembledNetwork<B>> {
        let graph   = self.build_graph()?;
        let network = graph.init(device);
        Ok(AssembledNetwork { graph, network })
    }
}

// ─── StackBuilder ─────────────────────────────────────────────────────────────
pub struct StackBuilder {
    shape:       [usize; 3],
    unit_height: bool,
    layers:      Vec<LayerPlan>,
}

impl StackBuilder {
    /// `unit_height` marks a 1-D signal: scalar windows then only span the width.
    pub fn new(input_chw: [usize; 3], unit_height: bool) -> Self {
        Self { shape: input_chw, unit_height, layers: Vec::new() }
    }

    pub fn dense_layer(&mut self, units: usize, label: &str, opt: &LayerOption) -> Result<&mut Self> {
        check_units(units, label)?;
        let [c, h, w] = self.shape;

        let mut ops = vec![Op::Dense { d_in: c * h * w, d_out: units }];
        if opt.batchnorm {
            ops.push(Op::BatchNorm { channels: units });
        }
        if let Some(rate) = opt.dropout() {
            ops.push(Op::Dropout { rate });
        }

        self.shape = [units, 1, 1];
        self.push(label, ops, opt)
    }

    pub fn conv_layer(&mut self, units: usize, label: &str, opt: &ConvLayerOption) -> Result<&mut Self> {
        self.conv_stage(units, label, opt, Direction::Forward)
    }

    pub fn deconv_layer(&mut self, units: usize, label: &str, opt: &ConvLayerOption) -> Result<&mut Self> {
        self.conv_stage(units, label, opt, Direction::Inverse)
    }

    fn conv_stage(
        &mut self,
        units:     usize,
        label:     &str,
        opt:       &ConvLayerOption,
        direction: Direction,
    ) -> Result<&mut Self> {
        check_units(units, label)?;
        let [c, h, w] = self.shape;
        let kernel  = self.kernel(opt, label)?;
        let padding = [(kernel[0] - 1) / 2, (kernel[1] - 1) / 2];

        let (transform, mut shape) = match opt.transform(direction) {
            ConvTransform::Convolution => {
                let stride = match opt.striding(direction) {
                    Some(StrideOp::Stride(window)) => window.resolve(self.unit_height),
                    _ => [1, 1],
                };
                let out_h = conv_extent(h, kernel[0], stride[0], padding[0], label)?;
                let out_w = conv_extent(w, kernel[1], stride[1], padding[1], label)?;
                (
                    Op::Conv { channels: [c, units], kernel, stride, padding },
                    [units, out_h, out_w],
                )
            }
            ConvTransform::TransposedConvolution => (
                Op::Deconv { channels: [c, units], kernel, padding },
                [
                    units,
                    h + kernel[0] - 1 - 2 * padding[0],
                    w + kernel[1] - 1 - 2 * padding[1],
                ],
            ),
        };

        let mut ops = vec![transform];
        if opt.batchnorm {
            ops.push(Op::BatchNorm { channels: units });
        }
        match opt.pooling(direction) {
            Some(PoolOp::Pool(window)) => {
                let window = window.resolve(self.unit_height);
                if window[0] > shape[1] || window[1] > shape[2] {
                    bail!(
                        "{label}: pooling window {:?} exceeds the {}x{} feature map",
                        window, shape[1], shape[2]
                    );
                }
                ops.push(Op::Pool { window });
                shape = [units, shape[1] / window[0], shape[2] / window[1]];
            }
            Some(PoolOp::Unpool(window)) => {
                let factor = window.resolve(self.unit_height);
                ops.push(Op::Unpool { factor });
                shape = [units, shape[1] * factor[0], shape[2] * factor[1]];
            }
            None => {}
        }
        if let Some(StrideOp::Unstride(window)) = opt.striding(direction) {
            let factor = window.resolve(self.unit_height);
            ops.push(Op::Unstride { factor });
            shape = [units, shape[1] * factor[0], shape[2] * factor[1]];
        }
        if let Some(rate) = opt.dropout() {
            ops.push(Op::Dropout { rate });
        }

        self.shape = shape;
        self.push(label, ops, &opt.base())
    }

    pub fn finish(self, input_shape: Vec<usize>, target_shape: Vec<usize>, loss: LossKind) -> Result<Graph> {
        let target_chw = chw(&target_shape)?;
        if self.shape != target_chw {
            tracing::debug!(
                "final stage shape {:?} will be fitted to target {:?}",
                self.shape, target_chw
            );
        }
        Ok(Graph { input_shape, target_shape, target_chw, layers: self.layers, loss })
    }

    fn kernel(&self, opt: &ConvLayerOption, label: &str) -> Result<[usize; 2]> {
        if opt.kernel.is_zero() {
            bail!("{label}: kernel size must be positive");
        }
        Ok(opt.kernel.resolve(self.unit_height))
    }

    fn push(&mut self, label: &str, ops: Vec<Op>, opt: &LayerOption) -> Result<&mut Self> {
        let plan = LayerPlan {
            label:       label.to_string(),
            ops,
            bias:        opt.bias,
            activation:  Activation::resolve(opt.activation.as_deref())?,
            regularizer: Regularizer::resolve(opt.act_reg.as_ref())?,
            out_shape:   self.shape,
        };
        tracing::debug!("{} -> {:?}  {:?}", plan.label, plan.out_shape, plan.op_names());
        self.layers.push(plan);
        Ok(self)
    }
}

fn check_units(units: usize, label: &str) -> Result<()> {
    if units == 0 {
        bail!("{label}: a stage needs at least one unit");
    }
    Ok(())
}

fn conv_extent(input: usize, kernel: usize, stride: usize, padding: usize, label: &str) -> Result<usize> {
    let padded = input + 2 * padding;
    if kernel > padded {
        bail!("{label}: kernel {kernel} does not fit an input of {input} (padding {padding})");
    }
    Ok((padded - kernel) / stride + 1)
}

// ─── Architectures ────────────────────────────────────────────────────────────
impl GraphBuilder for BaselineParams {
    fn build_graph(&self) -> Result<Graph> {
        let mut stack = StackBuilder::new([self.in_size, 1, 1], false);
        stack.dense_layer(self.out_size, "output_layer", &self.output_params)?;
        stack.finish(vec![self.in_size], vec![self.out_size], LossKind::SigmoidCrossEntropy)
    }
}

impl GraphBuilder for DenseAutoencoderParams {
    fn build_graph(&self) -> Result<Graph> {
        let mut stack = StackBuilder::new([self.in_size, 1, 1], false);
        for (idx, &units) in self.encode_nodes.iter().enumerate() {
            stack.dense_layer(units, &format!("encode_{idx}"), &self.encode_params)?;
        }
        stack.dense_layer(self.bottleneck_dim, "bottleneck", &self.bottleneck_params)?;
        for (idx, &units) in self.decode_nodes.iter().enumerate() {
            stack.dense_layer(units, &format!("decode_{idx}"), &self.decode_params)?;
        }
        stack.dense_layer(self.in_size, "output_layer", &self.output_params)?;
        stack.finish(vec![self.in_size], vec![self.in_size], LossKind::MeanSquaredError)
    }
}

impl GraphBuilder for ConvAutoencoderParams {
    fn build_graph(&self) -> Result<Graph> {
        let sample = self.in_size.sample_shape();
        let input  = chw(&sample)?;
        let mut stack = StackBuilder::new(input, sample.len() < 3);

        for (idx, &units) in self.encode_nodes.iter().enumerate() {
            stack.conv_layer(units, &format!("encode_{idx}"), &self.encode_params)?;
        }
        stack.conv_layer(self.bottleneck_dim, "bottleneck", &self.bottleneck_params)?;
        for (idx, &units) in self.decode_nodes.iter().enumerate() {
            stack.deconv_layer(units, &format!("decode_{idx}"), &self.decode_params)?;
        }
        stack.deconv_layer(input[0], "output_layer", &self.output_params)?;
        stack.finish(sample.clone(), sample, LossKind::MeanSquaredError)
    }
}

impl GraphBuilder for ModelParams {
    fn build_graph(&self) -> Result<Graph> {
        match self {
            ModelParams::Baseline(p)         => p.build_graph(),
            ModelParams::DenseAutoencoder(p) => p.build_graph(),
            ModelParams::ConvAutoencoder(p)  => p.build_graph(),
        }
    }
}

impl GraphBuilder for ArchitectureParams {
    fn build_graph(&self) -> Result<Graph> {
        self.model.build_graph()
    }
}
