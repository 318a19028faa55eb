// ============================================================
// Layer 4 — Train / Holdout Splitter
// ============================================================
// Shuffles rows and splits them into a training part and a
// holdout part. The holdout rows are never used for weight
// updates; the trainer scores them periodically.
//
// The split point is rounded, so 100 rows with a training
// fraction of 0.9 give exactly 90 / 10.

use rand::seq::SliceRandom;

/// Randomly shuffle `rows` and split into (train, holdout).
///
/// `train_fraction` is the share kept for training, e.g. `0.9`.
pub fn split_train_val<T>(mut rows: Vec<T>, train_fraction: f64) -> (Vec<T>, Vec<T>) {
    let mut rng = rand::thread_rng();
    rows.shuffle(&mut rng);

    let total    = rows.len();
    let split_at = ((total as f64) * train_fraction).round() as usize;
    let split_at = split_at.min(total);

    let holdout = rows.split_off(split_at);

    tracing::debug!(
        "Dataset split: {} training, {} holdout ({}% / {}%)",
        rows.len(),
        holdout.len(),
        (rows.len()    * 100) / total.max(1),
        (holdout.len() * 100) / total.max(1),
    );

    (rows, holdout)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_correct_split_sizes() {
        let items: Vec<usize> = (0..100).collect();
        let (train, holdout)  = split_train_val(items, 0.9);
        assert_eq!(train.len(),   90);
        assert_eq!(holdout.len(), 10);
    }

    #[test]
    fn test_all_items_preserved() {
        let items: Vec<usize> = (0..50).collect();
        let (mut train, holdout) = split_train_val(items, 0.7);
        train.extend(holdout);
        train.sort();
        assert_eq!(train, (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn test_empty_dataset() {
        let (train, holdout) = split_train_val(Vec::<usize>::new(), 0.9);
        assert!(train.is_empty());
        assert!(holdout.is_empty());
    }

    #[test]
    fn test_zero_holdout_keeps_everything() {
        let items: Vec<usize> = (0..10).collect();
        let (train, holdout)  = split_train_val(items, 1.0);
        assert_eq!(train.len(), 10);
        assert!(holdout.is_empty());
    }
}
