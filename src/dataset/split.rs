//! Deterministic stratified train/test split of the labeled set.

use std::collections::BTreeMap;

/// Labeled sets at or below this size are evaluated on their training rows.
pub const DEFAULT_MIN_SPLIT_SIZE: usize = 10;
/// Fraction of each class held out for evaluation.
pub const DEFAULT_TEST_FRACTION: f64 = 0.2;

/// Row indices of the labeled set assigned to training and evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitPlan {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
    /// True when train and test are the same full set.
    pub degraded: bool,
}

impl SplitPlan {
    fn full(n: usize) -> Self {
        let all: Vec<usize> = (0..n).collect();
        Self {
            train: all.clone(),
            test: all,
            degraded: true,
        }
    }
}

/// Split rows per label, holding out `test_fraction` of each class.
///
/// Row order inside a class is keyed by a seeded hash of the row index, so a
/// row keeps its side of the split when later rounds append new rows.
pub fn stratified_split(
    labels: &[String],
    seed: u64,
    test_fraction: f64,
    min_size: usize,
) -> SplitPlan {
    let n = labels.len();
    if n <= min_size || !(0.0..1.0).contains(&test_fraction) {
        return SplitPlan::full(n);
    }

    let mut by_class: BTreeMap<&str, Vec<(u128, usize)>> = BTreeMap::new();
    for (row, label) in labels.iter().enumerate() {
        let hash = blake3::hash(format!("{seed}|{label}|{row}").as_bytes());
        let mut key_bytes = [0u8; 16];
        key_bytes.copy_from_slice(&hash.as_bytes()[0..16]);
        by_class
            .entry(label.as_str())
            .or_default()
            .push((u128::from_le_bytes(key_bytes), row));
    }

    let mut train = Vec::with_capacity(n);
    let mut test = Vec::new();
    for (_label, mut entries) in by_class {
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        let count = entries.len();
        let mut test_n = ((count as f64) * test_fraction).round() as usize;
        if count == 1 {
            test_n = 0;
        } else if test_n >= count {
            test_n = count - 1;
        }
        for (idx, (_hash, row)) in entries.into_iter().enumerate() {
            if idx < test_n {
                test.push(row);
            } else {
                train.push(row);
            }
        }
    }

    if test.is_empty() || train.is_empty() {
        return SplitPlan::full(n);
    }
    train.sort_unstable();
    test.sort_unstable();
    SplitPlan {
        train,
        test,
        degraded: false,
    }
}
