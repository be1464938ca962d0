//! Dimension fusion and stride-importance scoring.
//!
//! Dimension lists here are ordered innermost first: position 0 varies
//! fastest during traversal.

use std::cmp::Ordering;

/// Merge adjacent dimensions that are contiguous for every operand.
///
/// Dimension `i` folds into `i - 1` when `strides[i] == dims[i - 1] * strides[i - 1]`
/// holds for all operands; the folded dimension is left with size 1. Visiting
/// order is unchanged.
pub(crate) fn fuse_dims(dims: &[usize], all_strides: &[Vec<isize>]) -> Vec<usize> {
    let mut result = dims.to_vec();
    if result.len() <= 1 || all_strides.is_empty() {
        return result;
    }
    for i in (1..result.len()).rev() {
        let contiguous = all_strides
            .iter()
            .all(|s| s[i] == result[i - 1] as isize * s[i - 1]);
        if contiguous {
            result[i - 1] *= result[i];
            result[i] = 1;
        }
    }
    result
}

/// Drop size-1 dimensions, keeping a single one if nothing else remains.
pub(crate) fn compress_dims(
    dims: &[usize],
    all_strides: &[Vec<isize>],
) -> (Vec<usize>, Vec<Vec<isize>>) {
    let kept: Vec<usize> = (0..dims.len()).filter(|&i| dims[i] != 1).collect();
    if kept.is_empty() {
        if dims.is_empty() {
            return (vec![], all_strides.to_vec());
        }
        return (vec![1], all_strides.iter().map(|s| vec![s[0]]).collect());
    }
    let new_dims = kept.iter().map(|&i| dims[i]).collect();
    let new_strides = all_strides
        .iter()
        .map(|s| kept.iter().map(|&i| s[i]).collect())
        .collect();
    (new_dims, new_strides)
}

/// Importance of one loop dimension, compared lexicographically.
///
/// `digits[r]` is the summed weight of operands for which this dimension has
/// the `r`-th smallest stride (rank `r + 1` in [`crate::auxiliary::index_order`]).
/// Orders like a packed score in base `m + 2` with one digit per rank, with
/// no width limit on the number of operands or dimensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Importance {
    digits: Vec<u32>,
}

impl Ord for Importance {
    fn cmp(&self, other: &Self) -> Ordering {
        self.digits.cmp(&other.digits)
    }
}

impl PartialOrd for Importance {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Importance of every dimension. The operand at `index_orders[0]` weighs 2,
/// every other operand 1; size-1 dimensions get zero importance.
pub(crate) fn compute_importance(dims: &[usize], index_orders: &[Vec<usize>]) -> Vec<Importance> {
    let n = dims.len();
    (0..n)
        .map(|i| {
            let mut digits = vec![0u32; n];
            if dims[i] > 1 {
                for (k, orders) in index_orders.iter().enumerate() {
                    let weight = if k == 0 { 2 } else { 1 };
                    digits[orders[i] - 1] += weight;
                }
            }
            Importance { digits }
        })
        .collect()
}
