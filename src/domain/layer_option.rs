// ============================================================
// Layer 3 — Layer Options
// ============================================================
// Per-stage configuration for one architectural position
// (encode, bottleneck, decode, output).
//
// Every field has a default, so a partial JSON mapping such as
//   { "dropout_rate": 0.1 }
// always deserializes. Disabled sub-operations are expressed with
// a sentinel (None / 0 / false) and simply produce no stage.
//
// Kind strings (activation, regularization) are NOT validated here.
// They are resolved by the graph builder, which fails loudly when
// a kind is unknown.

use serde::{Deserialize, Serialize};

/// Activity regularization applied to a stage's transform output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Regularization {
    /// `l1` or `l2`
    pub kind:     String,
    pub strength: f64,
}

// ─── LayerOption ──────────────────────────────────────────────────────────────
/// Options for a dense stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayerOption {
    /// Activation kind applied after the transform, `None` for identity.
    pub activation:   Option<String>,
    pub bias:         bool,
    #[serde(alias = "regularization")]
    pub act_reg:      Option<Regularization>,
    pub batchnorm:    bool,
    pub dropout_rate: Option<f64>,
}

impl Default for LayerOption {
    fn default() -> Self {
        Self {
            activation:   Some("relu".to_string()),
            bias:         true,
            act_reg:      None,
            batchnorm:    false,
            dropout_rate: None,
        }
    }
}

impl LayerOption {
    /// Dropout rate if a dropout stage should exist (`0` counts as disabled).
    pub fn dropout(&self) -> Option<f64> {
        active_rate(self.dropout_rate)
    }
}

fn active_rate(rate: Option<f64>) -> Option<f64> {
    rate.filter(|r| *r > 0.0)
}

// ─── Window ───────────────────────────────────────────────────────────────────
/// A kernel / stride / pool extent: one int for every spatial axis,
/// or an explicit `[height, width]` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Window {
    Scalar(usize),
    Pair([usize; 2]),
}

impl Window {
    /// Resolve to `[height, width]`. One-dimensional signals are laid out
    /// with a unit height, so a scalar window only spans the width there.
    pub fn resolve(self, unit_height: bool) -> [usize; 2] {
        match self {
            Window::Scalar(k) if unit_height => [1, k],
            Window::Scalar(k) => [k, k],
            Window::Pair(pair) => pair,
        }
    }

    pub fn is_zero(self) -> bool {
        match self {
            Window::Scalar(k) => k == 0,
            Window::Pair([h, w]) => h == 0 || w == 0,
        }
    }
}

// ─── Direction resolvers ──────────────────────────────────────────────────────
/// Whether a stage reads forward (encode) or inverse (decode).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Inverse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvTransform {
    Convolution,
    TransposedConvolution,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolOp {
    Pool(Window),
    Unpool(Window),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrideOp {
    Stride(Window),
    Unstride(Window),
}

// ─── ConvLayerOption ──────────────────────────────────────────────────────────
/// Options for a convolutional (or transposed convolutional) stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvLayerOption {
    pub activation:   Option<String>,
    pub bias:         bool,
    #[serde(alias = "regularization")]
    pub act_reg:      Option<Regularization>,
    pub batchnorm:    bool,
    pub dropout_rate: Option<f64>,
    pub kernel:       Window,
    pub strides:      Option<Window>,
    pub pool_size:    Option<Window>,
}

impl Default for ConvLayerOption {
    fn default() -> Self {
        let base = LayerOption::default();
        Self {
            activation:   base.activation,
            bias:         base.bias,
            act_reg:      base.act_reg,
            batchnorm:    base.batchnorm,
            dropout_rate: base.dropout_rate,
            kernel:       Window::Scalar(3),
            strides:      Some(Window::Scalar(1)),
            pool_size:    None,
        }
    }
}

impl ConvLayerOption {
    pub fn dropout(&self) -> Option<f64> {
        active_rate(self.dropout_rate)
    }

    pub fn transform(&self, direction: Direction) -> ConvTransform {
        match direction {
            Direction::Forward => ConvTransform::Convolution,
            Direction::Inverse => ConvTransform::TransposedConvolution,
        }
    }

    /// Pooling for forward stages, size-matched unpooling for inverse ones.
    pub fn pooling(&self, direction: Direction) -> Option<PoolOp> {
        let window = self.pool_size.filter(|w| !w.is_zero())?;
        Some(match direction {
            Direction::Forward => PoolOp::Pool(window),
            Direction::Inverse => PoolOp::Unpool(window),
        })
    }

    pub fn striding(&self, direction: Direction) -> Option<StrideOp> {
        let window = self.strides.filter(|w| !w.is_zero())?;
        Some(match direction {
            Direction::Forward => StrideOp::Stride(window),
            Direction::Inverse => StrideOp::Unstride(window),
        })
    }

    /// The dense-layer view of the shared fields.
    pub fn base(&self) -> LayerOption {
        LayerOption {
            activation:   self.activation.clone(),
            bias:         self.bias,
            act_reg:      self.act_reg.clone(),
            batchnorm:    self.batchnorm,
            dropout_rate: self.dropout_rate,
        }
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_mapping_fills_defaults() {
        let opt: LayerOption = serde_json::from_str(r#"{ "dropout_rate": 0.1 }"#).unwrap();
        assert_eq!(opt.dropout_rate, Some(0.1));
        assert_eq!(opt.activation.as_deref(), Some("relu"));
        assert!(opt.bias);
        assert!(!opt.batchnorm);
    }

    #[test]
    fn test_zero_and_null_dropout_disable_stage() {
        let zero: LayerOption = serde_json::from_str(r#"{ "dropout_rate": 0 }"#).unwrap();
        let null: LayerOption = serde_json::from_str(r#"{ "dropout_rate": null }"#).unwrap();
        assert_eq!(zero.dropout(), None);
        assert_eq!(null.dropout(), None);
    }

    #[test]
    fn test_regularization_alias() {
        let opt: LayerOption = serde_json::from_str(
            r#"{ "regularization": { "kind": "l2", "strength": 0.5 } }"#,
        ).unwrap();
        assert_eq!(opt.act_reg.unwrap().kind, "l2");
    }

    #[test]
    fn test_window_accepts_int_or_pair() {
        let opt: ConvLayerOption =
            serde_json::from_str(r#"{ "kernel": [3, 5], "pool_size": 2 }"#).unwrap();
        assert_eq!(opt.kernel, Window::Pair([3, 5]));
        assert_eq!(opt.pool_size, Some(Window::Scalar(2)));
        assert_eq!(Window::Scalar(2).resolve(true), [1, 2]);
        assert_eq!(Window::Scalar(2).resolve(false), [2, 2]);
    }

    #[test]
    fn test_direction_resolvers() {
        let opt = ConvLayerOption {
            pool_size: Some(Window::Scalar(2)),
            ..ConvLayerOption::default()
        };
        assert_eq!(opt.transform(Direction::Inverse), ConvTransform::TransposedConvolution);
        assert_eq!(opt.pooling(Direction::Forward), Some(PoolOp::Pool(Window::Scalar(2))));
        assert_eq!(opt.pooling(Direction::Inverse), Some(PoolOp::Unpool(Window::Scalar(2))));
        assert_eq!(
            opt.striding(Direction::Inverse),
            Some(StrideOp::Unstride(Window::Scalar(1)))
        );
    }

    #[test]
    fn test_zero_pool_means_no_pooling() {
        let opt = ConvLayerOption {
            pool_size: Some(Window::Scalar(0)),
            strides:   None,
            ..ConvLayerOption::default()
        };
        assert_eq!(opt.pooling(Direction::Forward), None);
        assert_eq!(opt.striding(Direction::Forward), None);
    }
}
