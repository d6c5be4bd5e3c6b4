#![allow(missing_docs)]
#![cfg(not(feature = "loom"))]

use cdg::{BoxError, Const, Engine, GraphError, Stream, output};
use std::{
    iter,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    thread,
    time::Duration,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn pooled() -> Arc<Engine> {
    init_tracing();
    Engine::with_workers(4).unwrap()
}

#[test]
fn apply_local_adds_one() {
    let engine = pooled();
    let plus_one = engine.apply_local("plus_one", |args: &[i64]| Ok(args[0] + 1));
    let out = output(plus_one.call([Stream::from_values([0, 1, 2])]).unwrap()).unwrap();

    out.start_computations().unwrap();

    assert_eq!(out.try_get_all_in_order().unwrap(), vec![1, 2, 3]);
}

#[test]
fn zip_broadcasts_constants() {
    let engine = pooled();
    let times = engine.apply("times", |args: &[i64]| Ok(args[0] * args[1]));
    let node = times
        .call([Stream::from_values([0, 1, 2]), Stream::constant(10)])
        .unwrap();
    assert_eq!(node.try_size(), Some(3));

    let out = output(node).unwrap();
    out.start_computations().unwrap();

    assert_eq!(out.try_get_all_in_order().unwrap(), vec![0, 10, 20]);
}

#[test]
fn zip_of_constants_emits_one_item() {
    let engine = pooled();
    let add = engine.apply("add", |args: &[i64]| Ok(args[0] + args[1]));
    let out = output(add.call([vec![2], vec![3]]).unwrap()).unwrap();

    out.start_computations().unwrap();

    assert_eq!(out.try_get_all_in_order().unwrap(), vec![5]);
}

#[test]
fn join_positions_are_row_major() {
    let engine = pooled();
    let add = engine.join("add", |args: &[i64]| Ok(args[0] + args[1]));
    let node = add.call([vec![0, 1], vec![0, 1]]).unwrap();
    assert_eq!(node.try_size(), Some(4));

    let out = output(node).unwrap();
    out.start_computations().unwrap();

    assert_eq!(out.try_get_all_in_order().unwrap(), vec![0, 1, 1, 2]);
}

#[test]
fn join_of_three_inputs() {
    let engine = pooled();
    let digits = engine.join("digits", |args: &[i64]| {
        Ok(args[0] * 100 + args[1] * 10 + args[2])
    });
    let out = output(
        digits
            .call([vec![1, 2], vec![3], vec![4, 5, 6]])
            .unwrap(),
    )
    .unwrap();

    out.start_computations().unwrap();

    assert_eq!(
        out.try_get_all_in_order().unwrap(),
        vec![134, 135, 136, 234, 235, 236]
    );
}

#[test]
fn join_with_an_empty_input_is_empty() {
    let engine = pooled();
    let add = engine.join("add", |args: &[i64]| Ok(args[0] + args[1]));
    let out = output(add.call([vec![1, 2, 3], vec![]]).unwrap()).unwrap();

    out.start_computations().unwrap();

    assert!(out.try_get_all_in_order().unwrap().is_empty());
}

#[test]
fn pooled_results_come_back_in_position_order() {
    let engine = pooled();
    // Earlier positions sleep longer, so they complete last.
    let slow = |args: &[u64]| -> Result<u64, BoxError> {
        thread::sleep(Duration::from_millis(5 * (8 - args[0])));
        Ok(args[0] * 2)
    };
    let values: Vec<u64> = (0..8).collect();

    let pooled = output(engine.apply("slow", slow).call([values.clone()]).unwrap()).unwrap();
    let local = output(engine.apply_local("slow", slow).call([values]).unwrap()).unwrap();
    pooled.start_computations().unwrap();
    local.start_computations().unwrap();

    let expected: Vec<u64> = (0..8).map(|x| x * 2).collect();
    assert_eq!(pooled.try_get_all_in_order().unwrap(), expected);
    assert_eq!(local.try_get_all_in_order().unwrap(), expected);
}

#[test]
fn fan_out_delivers_every_item_to_every_listener() {
    let engine = pooled();
    let source = Stream::from_values([1, 2, 3]);
    let double = engine.apply("double", |args: &[i64]| Ok(args[0] * 2));
    let square = engine.apply("square", |args: &[i64]| Ok(args[0] * args[0]));
    let add = engine.apply("add", |args: &[i64]| Ok(args[0] + args[1]));

    let doubled = double.call([&source]).unwrap();
    let squared = square.call([&source]).unwrap();
    let out = output(add.call([doubled, squared]).unwrap()).unwrap();

    out.start_computations().unwrap();

    assert_eq!(out.try_get_all_in_order().unwrap(), vec![3, 8, 15]);
}

#[test]
fn diamond_starts_shared_upstream_once() {
    let engine = pooled();
    let calls = Arc::new(AtomicUsize::new(0));
    let counted = {
        let calls = calls.clone();
        engine.apply("counted", move |args: &[i64]| {
            calls.fetch_add(1, Ordering::Relaxed);
            Ok(args[0])
        })
    };
    let shared = counted.call([vec![1, 2, 3, 4]]).unwrap();
    let left = engine
        .apply("left", |args: &[i64]| Ok(args[0] + 1))
        .call([&shared])
        .unwrap();
    let right = engine
        .apply("right", |args: &[i64]| Ok(args[0] - 1))
        .call([&shared])
        .unwrap();
    let product = engine
        .apply("product", |args: &[i64]| Ok(args[0] * args[1]))
        .call([left, right])
        .unwrap();
    let out = output(product).unwrap();

    out.start_computations().unwrap();

    assert_eq!(out.try_get_all_in_order().unwrap(), vec![0, 3, 8, 15]);
    assert_eq!(calls.load(Ordering::Relaxed), 4);
}

#[test]
fn summarize_sees_items_in_position_order() {
    let engine = pooled();
    let jitter = engine.apply("jitter", |args: &[u64]| {
        thread::sleep(Duration::from_millis(3 * (5 - args[0])));
        Ok(args[0])
    });
    let concat = engine.summarize("concat", |items: &[u64], _: &[u64]| {
        Ok(items.iter().fold(0, |acc, x| acc * 10 + x))
    });
    let node = concat
        .call([jitter.call([vec![1, 2, 3, 4]]).unwrap()])
        .unwrap();
    assert_eq!(node.try_size(), Some(1));

    let out = output(node).unwrap();
    out.start_computations().unwrap();

    assert_eq!(out.try_get_all_in_order().unwrap(), vec![1234]);
}

#[test]
fn summarize_receives_parameters() {
    let engine = pooled();
    let scaled_sum = engine.summarize_local("scaled_sum", |items: &[i64], params: &[i64]| {
        Ok(items.iter().sum::<i64>() * params[0] + params[1])
    });
    let out = output(
        scaled_sum
            .call([vec![1, 2, 3], vec![10], vec![5]])
            .unwrap(),
    )
    .unwrap();

    out.start_computations().unwrap();

    assert_eq!(out.try_get_all_in_order().unwrap(), vec![65]);
}

#[test]
fn computed_source_size_follows_its_result() {
    let engine = pooled();
    let range = engine.source("range", |args: &[i64]| Ok((0..args[0]).collect()));
    let node = range.call([Stream::constant(4)]).unwrap();
    assert!(matches!(node.size(), Err(GraphError::SizeUnknown { .. })));

    let out = output(&node).unwrap();
    out.start_computations().unwrap();

    assert_eq!(node.size().unwrap(), 4);
    assert_eq!(out.try_get_all_in_order().unwrap(), vec![0, 1, 2, 3]);
}

#[test]
fn computed_source_without_arguments() {
    let engine = pooled();
    let fixed = engine.source("fixed", |_: &[&'static str]| Ok(vec!["a", "b"]));
    let out = output(fixed.call(iter::empty::<Stream<_>>()).unwrap()).unwrap();

    out.start_computations().unwrap();

    assert_eq!(out.try_get_all_in_order().unwrap(), vec!["a", "b"]);
}

#[test]
fn fullstream_feeds_downstream_zip() {
    let engine = pooled();
    let repeat = engine.fullstream("repeat", |items: &[u64], _: &[u64]| {
        Ok(items
            .iter()
            .flat_map(|&x| iter::repeat_n(x, x as usize))
            .collect())
    });
    let expanded = repeat.call([vec![1, 2, 3]]).unwrap();
    assert!(matches!(expanded.size(), Err(GraphError::SizeUnknown { .. })));

    let offset = engine.apply("offset", |args: &[u64]| Ok(args[0] + args[1]));
    let shifted = offset.call([expanded.clone(), Stream::constant(100)]).unwrap();
    assert_eq!(shifted.try_size(), None);

    let out = output(&shifted).unwrap();
    out.start_computations().unwrap();

    assert_eq!(expanded.size().unwrap(), 6);
    assert_eq!(shifted.size().unwrap(), 6);
    assert_eq!(
        out.try_get_all_in_order().unwrap(),
        vec![101, 102, 102, 103, 103, 103]
    );
}

#[test]
fn zip_rejects_mismatched_sizes() {
    let engine = pooled();
    let add = engine.apply("add", |args: &[i64]| Ok(args[0] + args[1]));

    let err = add.call([vec![1, 2, 3], vec![1, 2]]).unwrap_err();

    match err {
        GraphError::SizeMismatch { sizes, .. } => assert_eq!(sizes, vec![3, 2]),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn zip_mismatch_behind_fullstream_is_reported_on_start() {
    let engine = pooled();
    let same = engine.fullstream("same", |items: &[i64], _: &[i64]| Ok(items.to_vec()));
    let add = engine.apply("add", |args: &[i64]| Ok(args[0] + args[1]));
    let node = add
        .call([same.call([vec![1, 2, 3]]).unwrap(), Stream::from_values([1, 2])])
        .unwrap();

    let err = node.start_computations().unwrap_err();

    assert!(matches!(err, GraphError::SizeMismatch { .. }));
}

#[test]
fn the_same_stream_cannot_feed_one_node_twice() {
    let engine = pooled();
    let source = Stream::from_values([0, 1]);
    let add = engine.join("add", |args: &[i64]| Ok(args[0] + args[1]));

    let err = add.call([&source, &source]).unwrap_err();

    assert!(matches!(err, GraphError::DuplicateListener { stream, .. } if stream == source.id()));
}

#[test]
fn reduction_parameters_must_be_single_items() {
    let engine = pooled();
    let sum = engine.summarize("sum", |items: &[i64], _: &[i64]| Ok(items.iter().sum()));

    let err = sum.call([vec![1, 2, 3], vec![1, 2]]).unwrap_err();

    assert!(matches!(err, GraphError::NotConstant { index: 1, size: 2, .. }));
}

#[test]
fn reduction_requires_an_input() {
    let engine = pooled();
    let sum = engine.summarize("sum", |items: &[i64], _: &[i64]| Ok(items.iter().sum()));

    let err = sum.call(iter::empty::<Stream<i64>>()).unwrap_err();

    assert!(matches!(err, GraphError::MissingInput { .. }));
}

#[test]
fn computed_source_arguments_must_be_single_items() {
    let engine = pooled();
    let range = engine.source("range", |args: &[i64]| Ok((0..args[0]).collect()));

    let err = range.call([vec![1, 2]]).unwrap_err();

    assert!(matches!(err, GraphError::NotConstant { index: 0, size: 2, .. }));
}

#[test]
fn listeners_cannot_join_a_started_stream() {
    init_tracing();
    let source = Stream::from_values([1, 2]);
    source.start_computations().unwrap();

    let err = output(&source).unwrap_err();

    assert!(matches!(err, GraphError::LateListener { .. }));
}

#[test]
fn manual_listener_drains_a_stream() {
    init_tracing();
    let source = Stream::from_values(["x", "y", "z"]);
    let listener = cdg::types::next_node_id();
    source.register_listener(listener).unwrap();
    assert!(matches!(
        source.register_listener(listener),
        Err(GraphError::DuplicateListener { .. })
    ));
    assert!(matches!(
        source.get(cdg::types::next_node_id()),
        Err(GraphError::UnknownListener { .. })
    ));

    source.start_computations().unwrap();
    source.start_computations().unwrap();

    let drained: Vec<_> = (0..source.size().unwrap())
        .map(|_| source.get(listener).unwrap().into_parts())
        .map(|(position, value)| (position, value.unwrap()))
        .collect();
    assert_eq!(drained, vec![(0, "x"), (1, "y"), (2, "z")]);
    assert!(source.empty(listener).unwrap());
}

#[test]
fn output_starts_once() {
    init_tracing();
    let out = output(vec![1, 2, 3]).unwrap();
    assert!(!out.is_ready());

    out.start_computations().unwrap();

    assert!(out.is_ready());
    assert!(matches!(
        out.start_computations(),
        Err(GraphError::AlreadyStarted { node }) if node == out.id()
    ));
    assert_eq!(out.try_get_all_in_order().unwrap(), vec![1, 2, 3]);
}

#[test]
fn results_can_be_awaited_from_another_thread() {
    let engine = pooled();
    let slow = engine.apply("slow", |args: &[u64]| {
        thread::sleep(Duration::from_millis(10));
        Ok(args[0] + 1)
    });
    let out = Arc::new(output(slow.call([vec![1, 2, 3]]).unwrap()).unwrap());

    let reader = {
        let out = out.clone();
        thread::spawn(move || out.try_get_all_in_order())
    };
    out.start_computations().unwrap();

    assert_eq!(reader.join().unwrap().unwrap(), vec![2, 3, 4]);
}

#[test]
fn failed_start_is_reported_on_every_call() {
    let engine = pooled();
    let same = engine.fullstream_local("same", |items: &[i64], _: &[i64]| Ok(items.to_vec()));
    let add = engine.apply("add", |args: &[i64]| Ok(args[0] + args[1]));
    let node = add
        .call([same.call([vec![1, 2, 3]]).unwrap(), Stream::from_values([1, 2])])
        .unwrap();

    let first = node.start_computations().unwrap_err();
    let second = node.start_computations().unwrap_err();

    assert!(matches!(first, GraphError::SizeMismatch { .. }));
    assert!(matches!(second, GraphError::SizeMismatch { .. }));
    assert!(node.is_started());
    assert!(matches!(node.size(), Err(GraphError::SizeMismatch { .. })));
    assert_eq!(node.try_size(), None);
}

#[test]
fn failed_start_releases_output_readers() {
    let engine = pooled();
    let same = engine.fullstream("same", |items: &[i64], _: &[i64]| Ok(items.to_vec()));
    let add = engine.apply("add", |args: &[i64]| Ok(args[0] + args[1]));
    let out = Arc::new(
        output(
            add.call([same.call([vec![1, 2, 3]]).unwrap(), Stream::from_values([1, 2])])
                .unwrap(),
        )
        .unwrap(),
    );

    let (tx, rx) = crossbeam::channel::bounded(1);
    let reader = {
        let out = out.clone();
        thread::spawn(move || tx.send(out.get_all_in_order().map(|values| values.len())))
    };
    let err = out.start_computations().unwrap_err();

    assert!(matches!(err, GraphError::SizeMismatch { .. }));
    let read = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert!(matches!(read, Err(GraphError::SizeMismatch { .. })));
    assert!(out.is_ready());
    assert!(matches!(out.try_get_all_in_order(), Err(GraphError::SizeMismatch { .. })));
    reader.join().unwrap().unwrap();
}

#[test]
fn zip_without_inputs_runs_once() {
    let engine = pooled();
    let answer = engine.apply("answer", |args: &[i64]| Ok(42 + args.len() as i64));
    let node = answer.call(iter::empty::<Stream<i64>>()).unwrap();
    assert_eq!(node.try_size(), Some(1));

    let out = output(node).unwrap();
    out.start_computations().unwrap();

    assert_eq!(out.try_get_all_in_order().unwrap(), vec![42]);
}

#[test]
fn join_without_inputs_runs_once() {
    let engine = pooled();
    let answer = engine.join("answer", |args: &[i64]| Ok(42 + args.len() as i64));
    let node = answer.call(iter::empty::<Stream<i64>>()).unwrap();
    assert_eq!(node.try_size(), Some(1));

    let out = output(node).unwrap();
    out.start_computations().unwrap();

    assert_eq!(out.try_get_all_in_order().unwrap(), vec![42]);
}

#[test]
fn join_variants_agree() {
    let engine = pooled();
    let pair = |args: &[i64]| -> Result<i64, BoxError> { Ok(args[0] * 10 + args[1]) };
    let expected = vec![13, 14, 23, 24];

    for join in [
        engine.join("pair", pair),
        engine.join_local("pair", pair),
        engine.join_debug("pair", pair),
    ] {
        let out = output(join.call([vec![1, 2], vec![3, 4]]).unwrap()).unwrap();
        out.start_computations().unwrap();
        assert_eq!(out.try_get_all_in_order().unwrap(), expected, "{}", join.mode());
    }
}

#[test]
fn summarize_variants_agree() {
    let engine = pooled();
    let total = |items: &[i64], params: &[i64]| -> Result<i64, BoxError> {
        Ok(items.iter().sum::<i64>() + params.iter().sum::<i64>())
    };

    for summarize in [
        engine.summarize("total", total),
        engine.summarize_local("total", total),
        engine.summarize_debug("total", total),
    ] {
        let out = output(summarize.call([vec![1, 2, 3], vec![100]]).unwrap()).unwrap();
        out.start_computations().unwrap();
        assert_eq!(out.try_get_all_in_order().unwrap(), vec![106], "{}", summarize.mode());
    }
}

#[test]
fn fullstream_variants_agree() {
    let engine = pooled();
    let evens = |items: &[i64], _: &[i64]| -> Result<Vec<i64>, BoxError> {
        Ok(items.iter().copied().filter(|x| x % 2 == 0).collect())
    };

    for fullstream in [
        engine.fullstream("evens", evens),
        engine.fullstream_local("evens", evens),
        engine.fullstream_debug("evens", evens),
    ] {
        let node = fullstream.call([vec![1, 2, 3, 4, 6]]).unwrap();
        let out = output(&node).unwrap();
        out.start_computations().unwrap();
        assert_eq!(out.try_get_all_in_order().unwrap(), vec![2, 4, 6], "{}", fullstream.mode());
        assert_eq!(node.size().unwrap(), 3);
    }
}

#[test]
fn bare_values_become_single_item_streams() {
    let engine = pooled();
    let add = engine.apply("add", |args: &[i64]| Ok(args[0] + args[1]));
    let node = add.call([Const(2), Const(3)]).unwrap();
    assert_eq!(node.try_size(), Some(1));

    let sum = output(node).unwrap();
    let bare = output(Const("lonely")).unwrap();
    sum.start_computations().unwrap();
    bare.start_computations().unwrap();

    assert_eq!(sum.try_get_all_in_order().unwrap(), vec![5]);
    assert_eq!(bare.try_get_all_in_order().unwrap(), vec!["lonely"]);
}
