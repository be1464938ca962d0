//! Loop ordering by stride importance.

use crate::auxiliary::index_order;
use crate::fuse::compute_importance;

/// Permutation of loop dimensions, innermost first.
///
/// Each operand ranks the dimensions by stride magnitude; the ranks are
/// combined into an [`Importance`](crate::fuse::Importance) per dimension with
/// the destination operand (if any) counted twice. Dimensions are sorted by
/// descending importance, so the smallest strides end up innermost. Ties
/// keep the row-major preference: later declared dimensions go inside.
pub(crate) fn compute_order(
    dims: &[usize],
    strides_list: &[&[isize]],
    dest_index: Option<usize>,
) -> Vec<usize> {
    let rank = dims.len();
    if rank == 0 {
        return Vec::new();
    }
    if strides_list.is_empty() {
        return (0..rank).rev().collect();
    }

    let mut index_orders: Vec<Vec<usize>> = strides_list.iter().map(|s| index_order(s)).collect();
    if let Some(dest) = dest_index.filter(|&d| d < index_orders.len()) {
        let dest_order = index_orders.remove(dest);
        index_orders.insert(0, dest_order);
    }

    let importance = compute_importance(dims, &index_orders);
    let mut order: Vec<usize> = (0..rank).collect();
    order.sort_by(|&a, &b| importance[b].cmp(&importance[a]).then(b.cmp(&a)));
    order
}
