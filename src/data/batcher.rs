// ============================================================
// Layer 4 — Row Batcher
// ============================================================
// Implements Burn's Batcher trait to turn a Vec<Row> into the
// NCHW input / target tensors the network consumes.
//
// Rows are flat, channels-last slices; the batcher knows each
// side's [channels, height, width] so it can lay them out:
//
//   N rows of F values  ->  [N, F, 1, 1]          dense
//   N rows of L x C     ->  [N, C, 1, L]          1-D conv
//   N rows of H x W x C ->  [N, C, H, W]          2-D conv

use burn::{
    data::dataloader::batcher::Batcher,
    prelude::*,
};

use crate::data::dataset::Row;
use crate::ml::ops::nchw_from_flat;

#[derive(Debug, Clone)]
pub struct RowBatch<B: Backend> {
    pub input:  Tensor<B, 4>,
    pub target: Tensor<B, 4>,
}

#[derive(Clone, Debug)]
pub struct RowBatcher {
    input_chw:  [usize; 3],
    target_chw: [usize; 3],
}

impl RowBatcher {
    pub fn new(input_chw: [usize; 3], target_chw: [usize; 3]) -> Self {
        Self { input_chw, target_chw }
    }
}

impl<B: Backend> Batcher<B, Row, RowBatch<B>> for RowBatcher {
    fn batch(&self, items: Vec<Row>, device: &B::Device) -> RowBatch<B> {
        let rows = items.len();
        let (inputs, targets): (Vec<Vec<f32>>, Vec<Vec<f32>>) =
            items.into_iter().map(|r| (r.input, r.target)).unzip();

        RowBatch {
            input:  nchw_from_flat(inputs.concat(), rows, self.input_chw, device),
            target: nchw_from_flat(targets.concat(), rows, self.target_chw, device),
        }
    }
}
