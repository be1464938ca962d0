use ndbridge::{Array, Cursor, IterationConfig, MultiFlatIter, OperandDescriptor};
use proptest::prelude::*;

fn strided_case() -> impl Strategy<Value = (Vec<usize>, bool, usize, usize)> {
    prop::collection::vec(1usize..5, 1..5).prop_flat_map(|shape| {
        let size: usize = shape.iter().product();
        (Just(shape), any::<bool>(), 0..size, 0..size)
    })
}

fn operands(shape: &[usize], transposed: bool) -> Vec<OperandDescriptor> {
    let a = Array::from_shape_fn(shape, |i| i.iter().sum::<usize>() as f64).unwrap();
    let a = if transposed { a.transpose() } else { a };
    let last = a.shape()[a.nd() - 1];
    let b = Array::from_shape_fn(&[last], |i| i[0] as i32).unwrap();
    vec![OperandDescriptor::readonly(a), OperandDescriptor::readonly(b)]
}

proptest! {
    #[test]
    fn jump_is_order_independent((shape, transposed, i, j) in strided_case()) {
        for config in [IterationConfig::default(), IterationConfig::unordered()] {
            let ops = operands(&shape, transposed);
            let mut via = Cursor::new(ops.clone(), config).unwrap();
            let mut direct = Cursor::new(ops, config).unwrap();
            via.jump_to_iter_index(i).unwrap();
            via.jump_to_iter_index(j).unwrap();
            direct.jump_to_iter_index(j).unwrap();
            for op in 0..via.nop() {
                prop_assert_eq!(via.get_data(op), direct.get_data(op));
            }
            prop_assert_eq!(via.get_iter_index(), j);
        }
    }

    #[test]
    fn advance_matches_repeated_increment(shape in prop::collection::vec(1usize..4, 0..4), n in 0isize..40) {
        let a = Array::from_shape_fn(&shape, |i| i.len() as i64).unwrap().transpose();
        let it = MultiFlatIter::new(&[a]).unwrap();
        let mut stepped = it.begin();
        for _ in 0..n {
            stepped.increment();
        }
        let mut jumped = it.begin();
        jumped.advance(n);
        prop_assert!(stepped == jumped);
        prop_assert_eq!(it.begin().distance_to(&jumped), (n as usize).min(it.get_iter_size()) as isize);
    }
}
