//! Operand descriptors and loop-shape resolution.
//!
//! Each operand contributes a *broadcast prefix* (its shape minus the trailing
//! [`CoreShape`]) to a common loop shape. Prefixes are right-aligned unless
//! the operand carries an explicit broadcast-reduction map, and size-1
//! dimensions stretch with stride 0.
//!
//! # Example
//!
//! ```rust
//! use ndbridge::{broadcast_shapes, NdError};
//!
//! assert_eq!(broadcast_shapes(&[&[3, 1, 5], &[1, 4, 5]]).unwrap(), vec![3, 4, 5]);
//! assert!(matches!(
//!     broadcast_shapes(&[&[3, 4], &[3, 5]]),
//!     Err(NdError::BroadcastMismatch { axis: 1, left: 4, right: 5 })
//! ));
//! ```

use smallvec::SmallVec;

use crate::array::Array;
use crate::config::IterationConfig;
use crate::{NdError, Result};

/// Access mode of one operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OperandFlags {
    /// Neither read nor written (only its address is used).
    None,
    #[default]
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

impl OperandFlags {
    #[inline]
    pub fn is_readable(self) -> bool {
        matches!(self, OperandFlags::ReadOnly | OperandFlags::ReadWrite)
    }

    #[inline]
    pub fn is_writable(self) -> bool {
        matches!(self, OperandFlags::WriteOnly | OperandFlags::ReadWrite)
    }
}

/// Trailing dimensions an operand contributes per loop element.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct CoreShape(SmallVec<[usize; 4]>);

impl CoreShape {
    /// One element per loop position.
    pub fn scalar() -> Self {
        CoreShape(SmallVec::new())
    }

    pub fn new(dims: &[usize]) -> Self {
        CoreShape(SmallVec::from_slice(dims))
    }

    #[inline]
    pub fn dims(&self) -> &[usize] {
        &self.0
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// One array taking part in a multi-operand iteration.
#[derive(Debug, Clone)]
pub struct OperandDescriptor {
    array: Array,
    flags: OperandFlags,
    core: CoreShape,
    map: Option<Vec<Option<usize>>>,
}

impl OperandDescriptor {
    pub fn new(array: Array, flags: OperandFlags) -> Self {
        Self {
            array,
            flags,
            core: CoreShape::scalar(),
            map: None,
        }
    }

    pub fn readonly(array: Array) -> Self {
        Self::new(array, OperandFlags::ReadOnly)
    }

    pub fn writeonly(array: Array) -> Self {
        Self::new(array, OperandFlags::WriteOnly)
    }

    pub fn readwrite(array: Array) -> Self {
        Self::new(array, OperandFlags::ReadWrite)
    }

    pub fn with_core_shape(mut self, core: CoreShape) -> Self {
        self.core = core;
        self
    }

    /// Explicit map from loop dimension to operand dimension.
    ///
    /// `None` entries broadcast (stride 0). Every prefix dimension of the
    /// operand must appear exactly once.
    pub fn with_broadcast_map(mut self, map: Vec<Option<usize>>) -> Self {
        self.map = Some(map);
        self
    }

    #[inline]
    pub fn array(&self) -> &Array {
        &self.array
    }

    #[inline]
    pub fn flags(&self) -> OperandFlags {
        self.flags
    }

    #[inline]
    pub fn core_shape(&self) -> &CoreShape {
        &self.core
    }

    #[inline]
    pub fn broadcast_map(&self) -> Option<&[Option<usize>]> {
        self.map.as_deref()
    }

    /// Core-dimension byte strides (the operand's trailing strides).
    pub fn core_strides(&self) -> &[isize] {
        let strides = self.array.strides();
        &strides[strides.len().saturating_sub(self.core.len())..]
    }
}

/// Result of negotiating a loop over a set of operands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastPlan {
    /// Resolved loop shape, outermost dimension first.
    pub loop_shape: Vec<usize>,
    /// Per operand, per loop dimension: the operand dimension or `None`.
    pub maps: Vec<Vec<Option<usize>>>,
    /// Per operand, per loop dimension: byte stride (0 when stretched).
    pub strides: Vec<Vec<isize>>,
}

impl BroadcastPlan {
    /// Number of loop positions; fails when the count overflows `usize`.
    pub fn size(&self) -> Result<usize> {
        crate::layout::shape_size(&self.loop_shape)
    }
}

/// Fold one operand size into the resolved size of a loop axis.
fn merge_dim(axis: usize, resolved: &mut Option<usize>, size: usize) -> Result<()> {
    if size == 1 {
        return Ok(());
    }
    match *resolved {
        Some(current) if current != size => Err(NdError::BroadcastMismatch {
            axis,
            left: current,
            right: size,
        }),
        _ => {
            *resolved = Some(size);
            Ok(())
        }
    }
}

/// Broadcast several shapes together under right-alignment.
pub fn broadcast_shapes(shapes: &[&[usize]]) -> Result<Vec<usize>> {
    let rank = shapes.iter().map(|s| s.len()).max().unwrap_or(0);
    let mut resolved = vec![None; rank];
    for shape in shapes {
        let offset = rank - shape.len();
        for (d, &size) in shape.iter().enumerate() {
            merge_dim(offset + d, &mut resolved[offset + d], size)?;
        }
    }
    Ok(resolved.into_iter().map(|r| r.unwrap_or(1)).collect())
}

fn validate_map(operand: usize, map: &[Option<usize>], rank: usize, prefix_rank: usize) -> Result<()> {
    let invalid = || NdError::InvalidBroadcastMap {
        operand,
        map: map.to_vec(),
    };
    if map.len() != rank {
        return Err(invalid());
    }
    let mut seen = vec![false; prefix_rank];
    for &d in map.iter().flatten() {
        if d >= prefix_rank || seen[d] {
            return Err(invalid());
        }
        seen[d] = true;
    }
    if seen.iter().any(|&s| !s) {
        return Err(invalid());
    }
    Ok(())
}

/// Resolve the loop shape and per-operand strides.
///
/// With `itershape`, the loop rank is its length and `Some` entries fix the
/// size of that loop dimension; `None` entries are inferred from the operands.
pub fn resolve(
    operands: &[OperandDescriptor],
    itershape: Option<&[Option<usize>]>,
    config: &IterationConfig,
) -> Result<BroadcastPlan> {
    let mut prefix_ranks = Vec::with_capacity(operands.len());
    for (i, op) in operands.iter().enumerate() {
        let shape = op.array.shape();
        let core = op.core.dims();
        let split = shape.len().saturating_sub(core.len());
        if core.len() > shape.len() || &shape[split..] != core {
            return Err(NdError::CoreShapeMismatch {
                operand: i,
                expected: core.to_vec(),
                found: shape[split..].to_vec(),
            });
        }
        prefix_ranks.push(split);
    }

    let rank = match itershape {
        Some(shape) => shape.len(),
        None => operands
            .iter()
            .zip(&prefix_ranks)
            .map(|(op, &p)| op.map.as_ref().map_or(p, Vec::len))
            .max()
            .unwrap_or(0),
    };

    let mut maps = Vec::with_capacity(operands.len());
    for (i, (op, &p)) in operands.iter().zip(&prefix_ranks).enumerate() {
        let map = match &op.map {
            Some(map) => {
                validate_map(i, map, rank, p)?;
                map.clone()
            }
            None => {
                if p > rank {
                    return Err(NdError::RankMismatch(p, rank));
                }
                let offset = rank - p;
                (0..rank).map(|k| k.checked_sub(offset)).collect()
            }
        };
        maps.push(map);
    }

    let mut resolved: Vec<Option<usize>> = match itershape {
        Some(shape) => shape.to_vec(),
        None => vec![None; rank],
    };
    for (op, map) in operands.iter().zip(&maps) {
        let shape = op.array.shape();
        for (k, d) in map.iter().enumerate() {
            if let Some(d) = *d {
                merge_dim(k, &mut resolved[k], shape[d])?;
            }
        }
    }
    let loop_shape: Vec<usize> = resolved.into_iter().map(|r| r.unwrap_or(1)).collect();

    let mut strides = Vec::with_capacity(operands.len());
    for (i, (op, map)) in operands.iter().zip(&maps).enumerate() {
        let shape = op.array.shape();
        let op_strides = op.array.strides();
        let mut stretched = false;
        let loop_strides: Vec<isize> = map
            .iter()
            .enumerate()
            .map(|(k, d)| match *d {
                Some(d) if shape[d] == loop_shape[k] => op_strides[d],
                _ => {
                    stretched |= loop_shape[k] > 1;
                    0
                }
            })
            .collect();
        if stretched && op.flags.is_writable() && !config.reduce_ok {
            return Err(NdError::NonBroadcastableOutput {
                operand: i,
                shape: shape.to_vec(),
                loop_shape,
            });
        }
        strides.push(loop_strides);
    }

    Ok(BroadcastPlan {
        loop_shape,
        maps,
        strides,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::zeros;
    use ndbridge_traits::DType;

    fn op(shape: &[usize]) -> OperandDescriptor {
        OperandDescriptor::readonly(zeros(shape, DType::FLOAT64).unwrap())
    }

    #[test]
    fn test_resolve_broadcast() {
        let plan = resolve(&[op(&[3, 1, 5]), op(&[1, 4, 5])], None, &IterationConfig::default())
            .unwrap();
        assert_eq!(plan.loop_shape, vec![3, 4, 5]);
        assert_eq!(plan.size().unwrap(), 60);
        assert_eq!(plan.strides[0], vec![40, 0, 8]);
        assert_eq!(plan.strides[1], vec![0, 40, 8]);
    }

    #[test]
    fn test_resolve_mismatch() {
        let err = resolve(&[op(&[3, 4]), op(&[3, 5])], None, &IterationConfig::default())
            .unwrap_err();
        assert!(matches!(
            err,
            NdError::BroadcastMismatch {
                axis: 1,
                left: 4,
                right: 5
            }
        ));
    }

    #[test]
    fn test_right_alignment_and_rank_extension() {
        let plan = resolve(&[op(&[2, 3]), op(&[3])], None, &IterationConfig::default()).unwrap();
        assert_eq!(plan.loop_shape, vec![2, 3]);
        assert_eq!(plan.maps[1], vec![None, Some(0)]);
        assert_eq!(plan.strides[1], vec![0, 8]);
    }

    #[test]
    fn test_zero_size_dimension() {
        let plan = resolve(&[op(&[0, 3]), op(&[1, 3])], None, &IterationConfig::default()).unwrap();
        assert_eq!(plan.loop_shape, vec![0, 3]);
        assert_eq!(plan.size().unwrap(), 0);
    }

    #[test]
    fn test_core_shape_split() {
        let vectors = op(&[2, 3]).with_core_shape(CoreShape::new(&[3]));
        let scalars = op(&[4, 3]);
        let err = resolve(&[vectors.clone(), scalars], None, &IterationConfig::default());
        assert!(matches!(err, Err(NdError::BroadcastMismatch { .. })));

        let plan = resolve(&[vectors.clone(), op(&[5, 1])], None, &IterationConfig::default())
            .unwrap();
        assert_eq!(plan.loop_shape, vec![5, 2]);
        assert_eq!(vectors.core_strides(), &[8]);
    }

    #[test]
    fn test_core_shape_mismatch() {
        let bad = op(&[2, 3]).with_core_shape(CoreShape::new(&[4]));
        let err = resolve(&[bad], None, &IterationConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            NdError::CoreShapeMismatch { operand: 0, ref expected, ref found }
                if expected == &[4] && found == &[3]
        ));
        let too_long = op(&[3]).with_core_shape(CoreShape::new(&[1, 3]));
        assert!(resolve(&[too_long], None, &IterationConfig::default()).is_err());
    }

    #[test]
    fn test_output_cannot_broadcast() {
        let out = OperandDescriptor::writeonly(zeros(&[1, 4], DType::FLOAT64).unwrap());
        let err = resolve(&[out, op(&[3, 4])], None, &IterationConfig::default()).unwrap_err();
        assert!(matches!(err, NdError::NonBroadcastableOutput { operand: 0, .. }));
    }

    #[test]
    fn test_reduction_map() {
        let out = OperandDescriptor::readwrite(zeros(&[3], DType::FLOAT64).unwrap())
            .with_broadcast_map(vec![Some(0), None]);
        let config = IterationConfig::default();
        assert!(resolve(&[out.clone(), op(&[3, 4])], None, &config).is_err());

        let plan = resolve(&[out, op(&[3, 4])], None, &config.with_reduce_ok(true)).unwrap();
        assert_eq!(plan.loop_shape, vec![3, 4]);
        assert_eq!(plan.strides[0], vec![8, 0]);
        assert_eq!(plan.strides[1], vec![32, 8]);
    }

    #[test]
    fn test_invalid_maps() {
        let config = IterationConfig::default().with_reduce_ok(true);
        let short = op(&[3]).with_broadcast_map(vec![Some(0)]);
        assert!(matches!(
            resolve(&[short, op(&[3, 4])], None, &config),
            Err(NdError::InvalidBroadcastMap { operand: 0, .. })
        ));
        let dup = op(&[3, 3]).with_broadcast_map(vec![Some(0), Some(0)]);
        assert!(resolve(&[dup], None, &config).is_err());
        let out_of_range = op(&[3]).with_broadcast_map(vec![Some(1), None]);
        assert!(resolve(&[out_of_range], None, &config).is_err());
        let missing = op(&[3, 4]).with_broadcast_map(vec![Some(0), None]);
        assert!(resolve(&[missing], None, &config).is_err());
    }

    #[test]
    fn test_itershape() {
        let config = IterationConfig::default();
        let plan = resolve(&[op(&[3, 1])], Some(&[None, Some(4)]), &config).unwrap();
        assert_eq!(plan.loop_shape, vec![3, 4]);

        let err = resolve(&[op(&[3, 2])], Some(&[None, Some(4)]), &config).unwrap_err();
        assert!(matches!(err, NdError::BroadcastMismatch { axis: 1, left: 4, right: 2 }));

        let err = resolve(&[op(&[2, 3, 4])], Some(&[None, None]), &config).unwrap_err();
        assert!(matches!(err, NdError::RankMismatch(3, 2)));
    }

    #[test]
    fn test_broadcast_shapes() {
        assert_eq!(broadcast_shapes(&[&[3, 1, 5], &[1, 4, 5]]).unwrap(), vec![3, 4, 5]);
        assert_eq!(broadcast_shapes(&[&[], &[2]]).unwrap(), vec![2]);
        assert_eq!(broadcast_shapes(&[]).unwrap(), Vec::<usize>::new());
        assert!(broadcast_shapes(&[&[3, 4], &[3, 5]]).is_err());
    }

    #[test]
    fn test_operand_flags() {
        assert!(OperandFlags::default().is_readable());
        assert!(!OperandFlags::ReadOnly.is_writable());
        assert!(OperandFlags::ReadWrite.is_readable() && OperandFlags::ReadWrite.is_writable());
        assert!(!OperandFlags::None.is_readable() && !OperandFlags::None.is_writable());
    }
}
