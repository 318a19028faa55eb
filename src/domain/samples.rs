// ============================================================
// Layer 3 — Samples Domain Type
// ============================================================
// A dense block of f32 values with an explicit shape.
// The first dimension is always the number of rows (samples);
// everything after it is the per-sample shape in caller layout:
//
//   dense models:          [rows, features]
//   1-D conv models:       [rows, length, channels]
//   2-D conv models:       [rows, height, width, channels]
//
// Values are stored row-major, so row `i` is one contiguous slice.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawSamples")]
pub struct Samples {
    shape:  Vec<usize>,
    values: Vec<f32>,
}

/// Wire form of `Samples`; every decoded block goes through `Samples::new`.
#[derive(Deserialize)]
struct RawSamples {
    shape:  Vec<usize>,
    values: Vec<f32>,
}

impl TryFrom<RawSamples> for Samples {
    type Error = anyhow::Error;

    fn try_from(raw: RawSamples) -> Result<Self> {
        Samples::new(raw.shape, raw.values)
    }
}

impl Samples {
    /// Create a new block, checking that `values` fills `shape` exactly.
    pub fn new(shape: Vec<usize>, values: Vec<f32>) -> Result<Self> {
        if shape.is_empty() {
            bail!("samples need at least a row dimension");
        }
        let expected: usize = shape.iter().product();
        if expected != values.len() {
            bail!(
                "shape {:?} holds {} values but {} were given",
                shape, expected, values.len()
            );
        }
        Ok(Self { shape, values })
    }

    /// Build a `[rows, features]` block from equally sized rows.
    pub fn from_rows(rows: &[Vec<f32>]) -> Result<Self> {
        let width = rows.first().map(Vec::len).unwrap_or(0);
        if let Some(bad) = rows.iter().position(|r| r.len() != width) {
            bail!("row {} has {} values, expected {}", bad, rows[bad].len(), width);
        }
        let values = rows.iter().flatten().copied().collect();
        Self::new(vec![rows.len(), width], values)
    }

    /// Stack per-sample slices that all share `sample_shape`.
    pub fn stack<'a>(
        sample_shape: &[usize],
        rows: impl IntoIterator<Item = &'a [f32]>,
    ) -> Result<Self> {
        let mut values = Vec::new();
        let mut count  = 0usize;
        for row in rows {
            values.extend_from_slice(row);
            count += 1;
        }
        let mut shape = Vec::with_capacity(sample_shape.len() + 1);
        shape.push(count);
        shape.extend_from_slice(sample_shape);
        Self::new(shape, values)
    }

    pub fn rows(&self) -> usize {
        self.shape[0]
    }

    /// Shape of one sample (everything but the row dimension).
    pub fn sample_shape(&self) -> &[usize] {
        &self.shape[1..]
    }

    /// Number of scalar values per sample.
    pub fn sample_len(&self) -> usize {
        self.sample_shape().iter().product()
    }

    pub fn row(&self, index: usize) -> &[f32] {
        let width = self.sample_len();
        &self.values[index * width..(index + 1) * width]
    }

    pub fn iter_rows(&self) -> impl Iterator<Item = &[f32]> {
        (0..self.rows()).map(move |i| self.row(i))
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn into_values(self) -> Vec<f32> {
        self.values
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_must_match_values() {
        assert!(Samples::new(vec![2, 3], vec![0.0; 5]).is_err());
        assert!(Samples::new(vec![], vec![]).is_err());
        assert!(Samples::new(vec![2, 3], vec![0.0; 6]).is_ok());
    }

    #[test]
    fn test_rows_are_contiguous() {
        let s = Samples::from_rows(&[vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
        assert_eq!(s.rows(), 2);
        assert_eq!(s.sample_shape(), &[2]);
        assert_eq!(s.row(1), &[3.0, 4.0]);
    }

    #[test]
    fn test_deserialize_validates_shape() {
        let bad = serde_json::from_str::<Samples>(r#"{"shape":[3,2],"values":[1.0]}"#);
        assert!(bad.is_err());

        let ok: Samples = serde_json::from_str(r#"{"shape":[1,2],"values":[1.0,2.0]}"#).unwrap();
        assert_eq!(ok.row(0), &[1.0, 2.0]);
    }

    #[test]
    fn test_ragged_rows_rejected() {
        assert!(Samples::from_rows(&[vec![1.0, 2.0], vec![3.0]]).is_err());
    }

    #[test]
    fn test_stack_keeps_sample_shape() {
        let s = Samples::new(vec![3, 2, 2], (0..12).map(|v| v as f32).collect()).unwrap();
        let picked = Samples::stack(s.sample_shape(), [s.row(2), s.row(0)]).unwrap();
        assert_eq!(picked.shape(), &[2, 2, 2]);
        assert_eq!(picked.row(0), s.row(2));
    }
}
