#![allow(missing_docs)]
#![cfg(not(feature = "loom"))]

use cdg::{Engine, output};
use proptest::prelude::*;
use std::sync::{Arc, LazyLock};

static ENGINE: LazyLock<Arc<Engine>> = LazyLock::new(|| {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    Engine::with_workers(4).expect("pool must build")
});

fn pairs() -> impl Strategy<Value = (Vec<i64>, Vec<i64>)> {
    (0..24usize).prop_flat_map(|len| {
        (
            prop::collection::vec(-1000..1000i64, len),
            prop::collection::vec(-1000..1000i64, len),
        )
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn zip_matches_sequential_map((left, right) in pairs()) {
        let sub = ENGINE.apply("sub", |args: &[i64]| Ok(args[0] - args[1]));
        let out = output(sub.call([left.clone(), right.clone()]).unwrap()).unwrap();
        out.start_computations().unwrap();

        let expected: Vec<i64> = left.iter().zip(&right).map(|(a, b)| a - b).collect();
        prop_assert_eq!(out.try_get_all_in_order().unwrap(), expected);
    }

    #[test]
    fn join_matches_nested_loops(
        left in prop::collection::vec(-50..50i64, 0..6),
        right in prop::collection::vec(-50..50i64, 0..6),
    ) {
        let pair = ENGINE.join("pair", |args: &[i64]| Ok(args[0] * 1000 + args[1]));
        let out = output(pair.call([left.clone(), right.clone()]).unwrap()).unwrap();
        out.start_computations().unwrap();

        let expected: Vec<i64> = left
            .iter()
            .flat_map(|a| right.iter().map(move |b| a * 1000 + b))
            .collect();
        prop_assert_eq!(out.try_get_all_in_order().unwrap(), expected);
    }

    #[test]
    fn pooled_and_local_runs_agree(values in prop::collection::vec(0..100u64, 0..16)) {
        let square = |args: &[u64]| -> Result<u64, cdg::BoxError> { Ok(args[0] * args[0]) };
        let pooled = output(ENGINE.apply("square", square).call([values.clone()]).unwrap()).unwrap();
        let local = output(ENGINE.apply_local("square", square).call([values]).unwrap()).unwrap();
        pooled.start_computations().unwrap();
        local.start_computations().unwrap();

        prop_assert_eq!(
            pooled.try_get_all_in_order().unwrap(),
            local.try_get_all_in_order().unwrap()
        );
    }
}
