// ============================================================
// Layer 4 — Dataset Manager
// ============================================================
// Holds one training run's data: the rows left for training and
// the holdout rows kept aside for evaluation.
//
// Rows are split once, at construction, using the shared
// shuffle-and-split helper. Batch iterators are lazy and every
// call starts a fresh pass:
//
//   batches(n)                 shuffled, every training row once,
//                              the last batch may be short
//   balanced_batches(pos, n)   ceil(rows / n) full batches, half of
//                              each drawn (with replacement) from the
//                              positive-class rows, half from the rest
//
// Class labels are only meaningful for categorical data: a single
// target column is rounded to its class id, a wider target row is
// read as one-hot and labelled with its argmax.

use anyhow::{bail, Result};
use burn::data::dataset::Dataset;
use rand::{rngs::ThreadRng, seq::SliceRandom, Rng};

use crate::data::splitter::split_train_val;
use crate::domain::samples::Samples;

/// Share of each balanced batch drawn from the positive classes.
pub const BALANCED_POSITIVE_FRACTION: f64 = 0.5;

/// One input row, its target row and its class label.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub input:  Vec<f32>,
    pub target: Vec<f32>,
    pub label:  usize,
}

pub struct RowDataset {
    rows: Vec<Row>,
}

impl RowDataset {
    pub fn new(rows: Vec<Row>) -> Self { Self { rows } }

    pub fn rows(&self) -> &[Row] { &self.rows }
}

impl Dataset<Row> for RowDataset {
    fn get(&self, index: usize) -> Option<Row> {
        self.rows.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.rows.len()
    }
}

// ─── DatasetManager ───────────────────────────────────────────────────────────
pub struct DatasetManager {
    input_shape:  Vec<usize>,
    target_shape: Vec<usize>,
    train:        RowDataset,
    holdout:      RowDataset,
}

impl DatasetManager {
    pub fn new(
        input:        &Samples,
        target:       &Samples,
        categorical:  bool,
        holdout_prop: f64,
    ) -> Result<Self> {
        if input.rows() != target.rows() {
            bail!(
                "input has {} rows but target has {}",
                input.rows(), target.rows()
            );
        }
        if !(0.0..1.0).contains(&holdout_prop) {
            bail!("holdout_prop must be in [0, 1), got {holdout_prop}");
        }

        let rows: Vec<Row> = input
            .iter_rows()
            .zip(target.iter_rows())
            .map(|(x, y)| Row {
                input:  x.to_vec(),
                target: y.to_vec(),
                label:  if categorical { class_label(y) } else { 0 },
            })
            .collect();

        let (train, holdout) = split_train_val(rows, 1.0 - holdout_prop);
        tracing::info!(
            "Dataset ready: {} training rows, {} holdout rows",
            train.len(), holdout.len()
        );

        Ok(Self {
            input_shape:  input.sample_shape().to_vec(),
            target_shape: target.sample_shape().to_vec(),
            train:        RowDataset::new(train),
            holdout:      RowDataset::new(holdout),
        })
    }

    pub fn train(&self) -> &RowDataset { &self.train }

    pub fn holdout(&self) -> &RowDataset { &self.holdout }

    /// Shuffled batches over every training row.
    pub fn batches(&self, batch_size: usize) -> Batches<'_> {
        let mut order: Vec<usize> = (0..self.train.len()).collect();
        let mut rng = rand::thread_rng();
        order.shuffle(&mut rng);
        Batches::new(self.train.rows(), BatchPlan::Sequential(order), batch_size, rng)
    }

    /// Batches with a fixed share of rows whose label is in `positive`.
    /// Falls back to plain batches when either class pool is empty.
    pub fn balanced_batches(&self, positive: &[usize], batch_size: usize) -> Batches<'_> {
        let (pos, neg): (Vec<usize>, Vec<usize>) = (0..self.train.len())
            .partition(|&i| positive.contains(&self.train.rows()[i].label));

        if pos.is_empty() || neg.is_empty() {
            tracing::warn!(
                "Cannot balance batches ({} positive, {} negative rows), using plain batches",
                pos.len(), neg.len()
            );
            return self.batches(batch_size);
        }

        let plan = BatchPlan::Balanced { positive: pos, negative: neg };
        Batches::new(self.train.rows(), plan, batch_size, rand::thread_rng())
    }

    /// The holdout rows as (input, target) blocks, `None` when empty.
    pub fn holdout_samples(&self) -> Result<Option<(Samples, Samples)>> {
        if self.holdout.is_empty() {
            return Ok(None);
        }
        let rows = self.holdout.rows();
        let input  = Samples::stack(&self.input_shape,  rows.iter().map(|r| r.input.as_slice()))?;
        let target = Samples::stack(&self.target_shape, rows.iter().map(|r| r.target.as_slice()))?;
        Ok(Some((input, target)))
    }
}

fn class_label(target: &[f32]) -> usize {
    match target {
        [value] => value.round().max(0.0) as usize,
        _ => target
            .iter()
            .enumerate()
            .fold((0, f32::NEG_INFINITY), |best, (i, &v)| if v > best.1 { (i, v) } else { best })
            .0,
    }
}

// ─── Batch iterator ───────────────────────────────────────────────────────────
enum BatchPlan {
    Sequential(Vec<usize>),
    Balanced { positive: Vec<usize>, negative: Vec<usize> },
}

pub struct Batches<'a> {
    rows:       &'a [Row],
    plan:       BatchPlan,
    batch_size: usize,
    emitted:    usize,
    total:      usize,
    rng:        ThreadRng,
}

impl<'a> Batches<'a> {
    fn new(rows: &'a [Row], plan: BatchPlan, batch_size: usize, rng: ThreadRng) -> Self {
        let batch_size = batch_size.max(1);
        let total = rows.len().div_ceil(batch_size);
        Self { rows, plan, batch_size, emitted: 0, total, rng }
    }
}

impl Iterator for Batches<'_> {
    type Item = Vec<Row>;

    fn next(&mut self) -> Option<Vec<Row>> {
        if self.emitted >= self.total {
            return None;
        }
        let batch = match &self.plan {
            BatchPlan::Sequential(order) => {
                let start = self.emitted * self.batch_size;
                let end   = (start + self.batch_size).min(order.len());
                order[start..end].iter().map(|&i| self.rows[i].clone()).collect()
            }
            BatchPlan::Balanced { positive, negative } => {
                let n_pos = ((self.batch_size as f64) * BALANCED_POSITIVE_FRACTION).round() as usize;
                let mut picked: Vec<Row> = (0..self.batch_size)
                    .map(|slot| {
                        let pool = if slot < n_pos { positive } else { negative };
                        self.rows[pool[self.rng.gen_range(0..pool.len())]].clone()
                    })
                    .collect();
                picked.shuffle(&mut self.rng);
                picked
            }
        };
        self.emitted += 1;
        Some(batch)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.total - self.emitted;
        (left, Some(left))
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    /// 100 rows, 10 of class 1 and 90 of class 0.
    fn imbalanced() -> (Samples, Samples) {
        let input: Vec<Vec<f32>>  = (0..100).map(|i| vec![i as f32, 1.0]).collect();
        let target: Vec<Vec<f32>> = (0..100).map(|i| vec![if i < 10 { 1.0 } else { 0.0 }]).collect();
        (Samples::from_rows(&input).unwrap(), Samples::from_rows(&target).unwrap())
    }

    #[test]
    fn test_holdout_split_sizes() {
        let (x, y) = imbalanced();
        let dm = DatasetManager::new(&x, &y, true, 0.1).unwrap();
        assert_eq!(dm.train().len(), 90);
        assert_eq!(dm.holdout().len(), 10);
        let (hx, hy) = dm.holdout_samples().unwrap().unwrap();
        assert_eq!(hx.shape(), &[10, 2]);
        assert_eq!(hy.shape(), &[10, 1]);
    }

    #[test]
    fn test_plain_batches_cover_every_row_once() {
        let (x, y) = imbalanced();
        let dm = DatasetManager::new(&x, &y, true, 0.0).unwrap();
        let batches: Vec<Vec<Row>> = dm.batches(30).collect();
        assert_eq!(batches.len(), 4);
        assert_eq!(batches[3].len(), 10);
        let mut seen: Vec<i64> = batches.iter().flatten().map(|r| r.input[0] as i64).collect();
        seen.sort();
        assert_eq!(seen, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn test_balanced_batches_hit_half_positive() {
        let (x, y) = imbalanced();
        let dm = DatasetManager::new(&x, &y, true, 0.0).unwrap();
        let batches: Vec<Vec<Row>> = dm.balanced_batches(&[1], 10).collect();
        assert_eq!(batches.len(), 10);
        for batch in &batches {
            assert_eq!(batch.len(), 10);
            assert_eq!(batch.iter().filter(|r| r.label == 1).count(), 5);
        }
    }

    #[test]
    fn test_balanced_without_positive_rows_falls_back() {
        let (x, y) = imbalanced();
        let dm = DatasetManager::new(&x, &y, true, 0.0).unwrap();
        let rows: usize = dm.balanced_batches(&[7], 10).map(|b| b.len()).sum();
        assert_eq!(rows, 100);
    }

    #[test]
    fn test_one_hot_labels_use_argmax() {
        assert_eq!(class_label(&[0.0, 0.2, 0.9]), 2);
        assert_eq!(class_label(&[1.0]), 1);
    }

    #[test]
    fn test_row_count_mismatch_rejected() {
        let (x, _) = imbalanced();
        let y = Samples::from_rows(&[vec![1.0]]).unwrap();
        assert!(DatasetManager::new(&x, &y, true, 0.1).is_err());
    }
}
