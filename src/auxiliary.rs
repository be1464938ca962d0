//! Stride ranking and sign normalization for loop planning.

/// Rank of each stride's magnitude among the non-zero strides.
///
/// `result[i]` is 1 plus the number of non-zero strides strictly smaller in
/// magnitude than `strides[i]`. Zero strides rank 1.
pub(crate) fn index_order(strides: &[isize]) -> Vec<usize> {
    strides
        .iter()
        .map(|&si| {
            let si = si.unsigned_abs();
            if si == 0 {
                return 1;
            }
            1 + strides
                .iter()
                .filter(|&&s| s != 0 && s.unsigned_abs() < si)
                .count()
        })
        .collect()
}

/// Flip every loop dimension along which no operand moves forward.
///
/// A dimension is flipped when all strides along it are `<= 0` and at least
/// one is negative. Returns the byte offset each operand's base pointer must
/// move by so that traversal starts at the new first element.
pub(crate) fn flip_negative_dims(dims: &[usize], strides: &mut [Vec<isize>]) -> Vec<isize> {
    let mut offsets = vec![0isize; strides.len()];
    for (k, &dim) in dims.iter().enumerate() {
        if dim < 2 {
            continue;
        }
        let backwards = strides.iter().all(|s| s[k] <= 0) && strides.iter().any(|s| s[k] < 0);
        if backwards {
            for (s, offset) in strides.iter_mut().zip(offsets.iter_mut()) {
                *offset += s[k] * (dim as isize - 1);
                s[k] = -s[k];
            }
        }
    }
    offsets
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_order() {
        assert_eq!(index_order(&[32, 8, 16]), vec![3, 1, 2]);
        assert_eq!(index_order(&[-32, 8, -16]), vec![3, 1, 2]);
    }

    #[test]
    fn test_index_order_zero_and_ties() {
        assert_eq!(index_order(&[16, 0, 8]), vec![2, 1, 1]);
        assert_eq!(index_order(&[8, 8, 4]), vec![2, 2, 1]);
    }

    #[test]
    fn test_flip_negative_dims() {
        // Two operands walking dim 0 backwards, one of them stretched.
        let mut strides = vec![vec![-8, 24], vec![0, 8]];
        let offsets = flip_negative_dims(&[3, 2], &mut strides);
        assert_eq!(strides, vec![vec![8, 24], vec![0, 8]]);
        assert_eq!(offsets, vec![-16, 0]);
    }

    #[test]
    fn test_flip_skips_mixed_and_trivial_dims() {
        let mut strides = vec![vec![-8, -8], vec![8, 0]];
        let offsets = flip_negative_dims(&[4, 1], &mut strides);
        assert_eq!(strides, vec![vec![-8, -8], vec![8, 0]]);
        assert_eq!(offsets, vec![0, 0]);
    }
}
