//! The multi-operand cursor engine.
//!
//! A [`Cursor`] walks the resolved loop of a set of operands in lock-step,
//! holding one data pointer per operand. Construction runs the loop planner:
//!
//! 1. [`resolve`](crate::broadcast::resolve) the loop shape and per-operand strides
//! 2. choose the dimension order (row-major, column-major, or by stride importance)
//! 3. optionally flip dimensions every operand walks backwards
//! 4. fuse dimensions that are contiguous for all operands and drop size-1 ones
//!
//! The flattened iteration index counts positions in the cursor's own
//! traversal order. With [`OrderMode::C`](crate::OrderMode::C) or
//! `preserve_order` that is the row-major index of the loop shape.

use smallvec::SmallVec;

use crate::auxiliary::flip_negative_dims;
use crate::broadcast::{resolve, OperandDescriptor};
use crate::config::{IterationConfig, OrderMode};
use crate::fuse::{compress_dims, fuse_dims};
use crate::order::compute_order;
use crate::{NdError, Result};

type SVec<T> = SmallVec<[T; 8]>;

/// Lock-step traversal state over a set of operands.
///
/// Cloning copies the current position; the clone advances independently.
#[derive(Debug, Clone)]
pub struct Cursor {
    operands: Vec<OperandDescriptor>,
    config: IterationConfig,
    loop_shape: Vec<usize>,
    /// Internal dimensions, innermost first.
    dims: SVec<usize>,
    /// `strides[op][k]`: byte stride of operand `op` along internal dim `k`.
    strides: Vec<SVec<isize>>,
    base_ptrs: Vec<*mut u8>,
    index: SVec<usize>,
    ptrs: Vec<*mut u8>,
    iter_index: usize,
    size: usize,
    finished: bool,
}

impl Cursor {
    pub fn new(operands: Vec<OperandDescriptor>, config: IterationConfig) -> Result<Self> {
        Self::build(operands, None, config)
    }

    /// Cursor with an explicit loop shape; `None` entries are inferred.
    pub fn with_itershape(
        operands: Vec<OperandDescriptor>,
        itershape: &[Option<usize>],
        config: IterationConfig,
    ) -> Result<Self> {
        Self::build(operands, Some(itershape), config)
    }

    fn build(
        operands: Vec<OperandDescriptor>,
        itershape: Option<&[Option<usize>]>,
        config: IterationConfig,
    ) -> Result<Self> {
        if !config.allow_object_elements {
            if let Some(operand) = operands.iter().position(|op| op.array().is_object_array()) {
                return Err(NdError::ObjectElementsNotAllowed { operand });
            }
        }
        for op in &operands {
            if op.flags().is_writable() && !op.array().is_writeable() {
                return Err(NdError::NotWriteable);
            }
        }

        let plan = resolve(&operands, itershape, &config)?;
        let rank = plan.loop_shape.len();
        let size = plan.size()?;

        // Internal order, innermost first.
        let perm: Vec<usize> = if config.reorder_allowed() {
            let strides_refs: Vec<&[isize]> = plan.strides.iter().map(|s| s.as_slice()).collect();
            let dest = operands.iter().position(|op| op.flags().is_writable());
            compute_order(&plan.loop_shape, &strides_refs, dest)
        } else if config.order == OrderMode::F && !config.preserve_order {
            (0..rank).collect()
        } else {
            (0..rank).rev().collect()
        };
        let ordered_dims: Vec<usize> = perm.iter().map(|&d| plan.loop_shape[d]).collect();
        let mut ordered_strides: Vec<Vec<isize>> = plan
            .strides
            .iter()
            .map(|s| perm.iter().map(|&d| s[d]).collect())
            .collect();

        let offsets = if config.reorder_allowed() && config.negate_strides {
            flip_negative_dims(&ordered_dims, &mut ordered_strides)
        } else {
            vec![0; operands.len()]
        };

        let fused = fuse_dims(&ordered_dims, &ordered_strides);
        let (dims, strides) = compress_dims(&fused, &ordered_strides);

        let base_ptrs: Vec<*mut u8> = operands
            .iter()
            .zip(&offsets)
            .map(|(op, &off)| op.array().data_ptr().wrapping_offset(off))
            .collect();

        log::debug!(
            "cursor plan: {} operands, loop shape {:?}, inner dims {:?}, size {}",
            operands.len(),
            plan.loop_shape,
            dims,
            size
        );
        for (i, s) in strides.iter().enumerate() {
            log::trace!("operand {} strides {:?} (base offset {})", i, s, offsets[i]);
        }

        let mut cursor = Cursor {
            operands,
            config,
            loop_shape: plan.loop_shape,
            index: SmallVec::from_elem(0, dims.len()),
            dims: SmallVec::from_vec(dims),
            strides: strides.into_iter().map(SmallVec::from_vec).collect(),
            ptrs: base_ptrs.clone(),
            base_ptrs,
            iter_index: 0,
            size,
            finished: false,
        };
        cursor.rewind();
        Ok(cursor)
    }

    fn rewind(&mut self) -> bool {
        self.index.iter_mut().for_each(|i| *i = 0);
        self.ptrs.copy_from_slice(&self.base_ptrs);
        self.iter_index = 0;
        self.finished = self.size == 0;
        !self.finished
    }

    /// Rewind to the first element.
    ///
    /// On an empty loop returns `Ok(false)`, or [`NdError::EmptyIteration`]
    /// when `throws` is set.
    pub fn reset(&mut self, throws: bool) -> Result<bool> {
        if self.rewind() {
            return Ok(true);
        }
        if throws {
            return Err(NdError::EmptyIteration);
        }
        Ok(false)
    }

    /// Advance to the next element. Returns `false` once the loop is exhausted.
    pub fn next(&mut self) -> bool {
        if self.finished {
            return false;
        }
        self.iter_index += 1;
        if self.iter_index >= self.size {
            self.iter_index = self.size;
            self.finished = true;
            return false;
        }
        for k in 0..self.dims.len() {
            self.index[k] += 1;
            if self.index[k] < self.dims[k] {
                for (p, s) in self.ptrs.iter_mut().zip(&self.strides) {
                    *p = p.wrapping_offset(s[k]);
                }
                return true;
            }
            let back = (self.dims[k] - 1) as isize;
            for (p, s) in self.ptrs.iter_mut().zip(&self.strides) {
                *p = p.wrapping_offset(-s[k] * back);
            }
            self.index[k] = 0;
        }
        true
    }

    /// Position at flattened index `i` by recomputing every pointer.
    pub fn jump_to_iter_index(&mut self, i: usize) -> Result<()> {
        if i >= self.size {
            return Err(NdError::IterIndexOutOfRange {
                index: i,
                size: self.size,
            });
        }
        let mut rem = i;
        for (k, &dim) in self.dims.iter().enumerate() {
            self.index[k] = rem % dim;
            rem /= dim;
        }
        for ((p, &base), s) in self.ptrs.iter_mut().zip(&self.base_ptrs).zip(&self.strides) {
            let offset: isize = self
                .index
                .iter()
                .zip(s.iter())
                .map(|(&j, &st)| j as isize * st)
                .sum();
            *p = base.wrapping_offset(offset);
        }
        self.iter_index = i;
        self.finished = false;
        Ok(())
    }

    /// Current data pointer of operand `i`.
    #[inline]
    pub fn get_data(&self, i: usize) -> *mut u8 {
        self.ptrs[i]
    }

    /// Flattened position; equals the size once exhausted.
    #[inline]
    pub fn get_iter_index(&self) -> usize {
        self.iter_index
    }

    /// Number of loop positions (product of the loop shape).
    #[inline]
    pub fn get_iter_size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Number of operands.
    #[inline]
    pub fn nop(&self) -> usize {
        self.operands.len()
    }

    /// Rank of the resolved loop shape.
    #[inline]
    pub fn ndim(&self) -> usize {
        self.loop_shape.len()
    }

    pub fn loop_shape(&self) -> &[usize] {
        &self.loop_shape
    }

    /// Rank after reordering and fusion.
    #[inline]
    pub fn inner_ndim(&self) -> usize {
        self.dims.len()
    }

    pub fn operand(&self, i: usize) -> &OperandDescriptor {
        &self.operands[i]
    }

    pub fn config(&self) -> &IterationConfig {
        &self.config
    }
}
