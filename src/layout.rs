//! Memory order and byte-stride helpers.

use crate::{NdError, Result};

/// Memory layout requested for a new array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Order {
    /// Row-major.
    #[default]
    C,
    /// Column-major.
    F,
    /// F if the source is F-contiguous and not C-contiguous, else C.
    A,
    /// Follow the source's stride order as closely as possible.
    K,
}

impl Order {
    /// Parse the single-letter form used by array runtimes.
    pub fn from_char(c: char) -> Option<Order> {
        match c.to_ascii_uppercase() {
            'C' => Some(Order::C),
            'F' => Some(Order::F),
            'A' => Some(Order::A),
            'K' => Some(Order::K),
            _ => None,
        }
    }
}

/// Row-major byte strides (last index varies fastest).
///
/// Fails with [`NdError::ShapeTooLarge`] when a stride does not fit in `isize`.
pub fn row_major_strides(shape: &[usize], itemsize: usize) -> Result<Vec<isize>> {
    let rank = shape.len();
    let mut strides = vec![0isize; rank];
    let mut running = to_isize(itemsize, shape, itemsize)?;
    for i in (0..rank).rev() {
        strides[i] = running;
        running = scaled(running, shape[i], shape, itemsize)?;
    }
    Ok(strides)
}

/// Column-major byte strides (first index varies fastest).
pub fn col_major_strides(shape: &[usize], itemsize: usize) -> Result<Vec<isize>> {
    let rank = shape.len();
    let mut strides = vec![0isize; rank];
    let mut running = to_isize(itemsize, shape, itemsize)?;
    for i in 0..rank {
        strides[i] = running;
        running = scaled(running, shape[i], shape, itemsize)?;
    }
    Ok(strides)
}

/// Dense byte strides whose axis order follows `src_strides`.
///
/// Axes with larger absolute source stride become outer axes; ties keep
/// declaration order. All returned strides are non-negative.
pub fn keep_order_strides(
    shape: &[usize],
    src_strides: &[isize],
    itemsize: usize,
) -> Result<Vec<isize>> {
    let rank = shape.len();
    let mut axes: Vec<usize> = (0..rank).collect();
    axes.sort_by(|&a, &b| {
        src_strides[b]
            .unsigned_abs()
            .cmp(&src_strides[a].unsigned_abs())
            .then(a.cmp(&b))
    });
    let mut strides = vec![0isize; rank];
    let mut running = to_isize(itemsize, shape, itemsize)?;
    for &axis in axes.iter().rev() {
        strides[axis] = running;
        running = scaled(running, shape[axis], shape, itemsize)?;
    }
    Ok(strides)
}

fn to_isize(n: usize, shape: &[usize], itemsize: usize) -> Result<isize> {
    isize::try_from(n).map_err(|_| too_large(shape, itemsize))
}

// Zero-size dimensions count as 1 so that the extent of every other axis
// is still bounded.
fn scaled(running: isize, dim: usize, shape: &[usize], itemsize: usize) -> Result<isize> {
    let dim = to_isize(dim.max(1), shape, itemsize)?;
    running
        .checked_mul(dim)
        .ok_or_else(|| too_large(shape, itemsize))
}

fn too_large(shape: &[usize], itemsize: usize) -> NdError {
    NdError::ShapeTooLarge {
        shape: shape.to_vec(),
        itemsize,
    }
}

/// C-contiguity: scanning last to first, each stride equals the running
/// product of itemsize and the sizes already scanned.
pub fn is_c_contiguous(shape: &[usize], strides: &[isize], itemsize: usize) -> bool {
    contiguous_scan(shape.iter().zip(strides).rev(), itemsize)
}

/// F-contiguity: the same scan as [`is_c_contiguous`], first to last.
pub fn is_f_contiguous(shape: &[usize], strides: &[isize], itemsize: usize) -> bool {
    contiguous_scan(shape.iter().zip(strides), itemsize)
}

fn contiguous_scan<'a>(
    axes: impl Iterator<Item = (&'a usize, &'a isize)>,
    itemsize: usize,
) -> bool {
    // `None` once the running product no longer fits; no stride can match it.
    let mut running = isize::try_from(itemsize).ok();
    for (&dim, &stride) in axes {
        if running != Some(stride) {
            return false;
        }
        // Zero-size axes scale like the dense builders above.
        running = isize::try_from(dim.max(1)).ok().and_then(|d| stride.checked_mul(d));
    }
    true
}

/// Every stride is a multiple of the itemsize.
pub fn is_aligned(strides: &[isize], itemsize: usize) -> bool {
    strides.iter().all(|&s| s % itemsize as isize == 0)
}

/// Number of elements of a shape.
///
/// Fails with [`NdError::ShapeTooLarge`] when the count overflows `usize`.
pub fn shape_size(shape: &[usize]) -> Result<usize> {
    if shape.contains(&0) {
        return Ok(0);
    }
    shape
        .iter()
        .try_fold(1usize, |acc, &d| acc.checked_mul(d))
        .ok_or_else(|| too_large(shape, 1))
}

/// Element count of a new dense array, checking that its byte extent fits
/// in `isize`.
pub(crate) fn checked_extent(shape: &[usize], itemsize: usize) -> Result<usize> {
    let size = shape_size(shape)?;
    // The stride walk multiplies through every axis, so it bounds the extent.
    row_major_strides(shape, itemsize)?;
    Ok(size)
}

/// Check that every element of a strided region lies in `[0, nbytes)`.
pub(crate) fn validate_bounds(
    nbytes: usize,
    shape: &[usize],
    strides: &[isize],
    offset: isize,
    itemsize: usize,
) -> Result<()> {
    if shape.len() != strides.len() {
        return Err(NdError::StrideLengthMismatch);
    }
    // Empty array - no access needed
    if shape.iter().any(|&d| d == 0) {
        return Ok(());
    }
    let mut min_offset = offset;
    let mut max_offset = offset;
    for (&dim, &stride) in shape.iter().zip(strides.iter()) {
        if dim > 1 {
            let end = stride
                .checked_mul(dim as isize - 1)
                .ok_or(NdError::OffsetOverflow)?;
            if end >= 0 {
                max_offset = max_offset
                    .checked_add(end)
                    .ok_or(NdError::OffsetOverflow)?;
            } else {
                min_offset = min_offset
                    .checked_add(end)
                    .ok_or(NdError::OffsetOverflow)?;
            }
        }
    }
    if min_offset < 0 || max_offset < 0 {
        return Err(NdError::OffsetOverflow);
    }
    let last = (max_offset as usize)
        .checked_add(itemsize)
        .ok_or(NdError::OffsetOverflow)?;
    if last > nbytes {
        return Err(NdError::OffsetOverflow);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_and_col_major() {
        assert_eq!(row_major_strides(&[2, 3, 4], 8).unwrap(), vec![96, 32, 8]);
        assert_eq!(col_major_strides(&[2, 3, 4], 8).unwrap(), vec![8, 16, 48]);
        assert!(row_major_strides(&[], 8).unwrap().is_empty());
        assert_eq!(row_major_strides(&[0, 3], 8).unwrap(), vec![24, 8]);
    }

    #[test]
    fn test_oversized_shapes_rejected() {
        assert!(matches!(
            shape_size(&[1usize << 63, 2]),
            Err(NdError::ShapeTooLarge { .. })
        ));
        assert_eq!(shape_size(&[1usize << 63, 4, 0]).unwrap(), 0);
        assert!(row_major_strides(&[1 << 62, 4], 8).is_err());
        assert!(col_major_strides(&[4, 1 << 62], 8).is_err());
        assert!(keep_order_strides(&[4, 1 << 62], &[8, 32], 8).is_err());
        assert!(checked_extent(&[1 << 62, 4], 1).is_err());
        assert!(checked_extent(&[1 << 61], 8).is_err());
        assert_eq!(checked_extent(&[1 << 20, 4], 8).unwrap(), 1 << 22);
        // Strides this large can never satisfy the running product.
        assert!(!is_c_contiguous(&[1 << 62, 4], &[isize::MAX, 8], 8));
        assert!(!is_f_contiguous(&[usize::MAX, 2], &[8, 8], 8));
    }

    #[test]
    fn test_contiguity_predicates() {
        assert!(is_c_contiguous(&[2, 3], &[24, 8], 8));
        assert!(!is_f_contiguous(&[2, 3], &[24, 8], 8));
        assert!(is_f_contiguous(&[2, 3], &[8, 16], 8));
        assert!(!is_c_contiguous(&[2, 3], &[8, 16], 8));
        assert!(is_c_contiguous(&[], &[], 4));
        let empty = row_major_strides(&[3, 0], 8).unwrap();
        assert!(is_c_contiguous(&[3, 0], &empty, 8));
        assert!(is_f_contiguous(&[], &[], 4));
    }

    #[test]
    fn test_aligned() {
        assert!(is_aligned(&[24, -8], 8));
        assert!(!is_aligned(&[12, 4], 8));
    }

    #[test]
    fn test_keep_order_strides() {
        // Source is a transposed C array: axis 1 is outermost.
        assert_eq!(keep_order_strides(&[3, 2], &[8, 24], 8).unwrap(), vec![8, 24]);
        assert_eq!(keep_order_strides(&[3, 2], &[-16, 8], 4).unwrap(), vec![8, 4]);
    }

    #[test]
    fn test_order_from_char() {
        assert_eq!(Order::from_char('k'), Some(Order::K));
        assert_eq!(Order::from_char('x'), None);
    }

    #[test]
    fn test_validate_bounds() {
        assert!(validate_bounds(48, &[2, 3], &[24, 8], 0, 8).is_ok());
        assert!(validate_bounds(40, &[2, 3], &[24, 8], 0, 8).is_err());
        assert!(validate_bounds(48, &[2, 3], &[-24, 8], 24, 8).is_ok());
        assert!(validate_bounds(48, &[2, 3], &[-24, 8], 0, 8).is_err());
        assert!(matches!(
            validate_bounds(48, &[2, 3], &[8], 0, 8),
            Err(NdError::StrideLengthMismatch)
        ));
        assert!(validate_bounds(0, &[0, 3], &[24, 8], 0, 8).is_ok());
    }
}
