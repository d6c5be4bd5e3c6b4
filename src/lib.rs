//! Concurrent dataflow graph engine with deterministic result ordering.
//!
//! This crate lets a caller wire pure functions into a directed graph of
//! producer/consumer nodes, run the graph with item-level parallelism on a
//! worker pool (or inline, for debugging), and read the results back in a
//! deterministic order no matter in which order the parallel work finished.
//! It:
//! - Tags every item with its logical position at dispatch time and sorts by
//!   position at the output, so completion order never leaks into results.
//! - Captures every failure of a unit of work (returned error or panic) as a
//!   [`DelayedException`] that travels through the graph as ordinary data
//!   until a consumer asks for it to be re-raised.
//! - Keeps one FIFO queue per edge, so fan-out delivers a copy of each item
//!   to every downstream node.
//!
//! Key modules:
//! - `engine`: the [`Engine`] dispatcher and its rayon worker pool.
//! - `stream`: the [`Stream`] node handle and the data stream protocol.
//! - `builder`: graph-building entry points (`apply`, `join`, `summarize`,
//!   `fullstream`, `source`, [`output`]).
//! - `output`: the terminal [`OutputNode`].
//! - `exception`: [`DelayedException`].
//!
//! Quick start:
//! 1. Build an [`Engine`] with the number of workers you want.
//! 2. Wrap input data in streams and functions in operators, and call the
//!    operators on the streams to build nodes.
//! 3. Wrap the last node in an [`OutputNode`], start it, and read the
//!    results.
//!
//! ```
//! use cdg::{Engine, Stream, output};
//!
//! let engine = Engine::with_workers(2)?;
//! let plus_one = engine.apply("plus_one", |args: &[i64]| Ok(args[0] + 1));
//! let out = output(plus_one.call([Stream::from_values([0, 1, 2])])?)?;
//! out.start_computations()?;
//! assert_eq!(out.try_get_all_in_order()?, vec![1, 2, 3]);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

/// Graph-building entry points.
///
/// Wraps user functions into [`builder::Operator`]s that build the right
/// node kind with the right execution policy, and accepts plain values
/// wherever a stream is expected via [`builder::IntoStream`].
pub mod builder;
/// Engine configuration: worker counts, thread names, environment override.
pub mod config;
/// Dispatch of units of work, inline or on a worker pool.
pub mod engine;
/// Structural errors of graphs and engines.
pub mod error;
/// Failures captured inside units of work.
pub mod exception;
/// The terminal node that drives a graph and orders its results.
pub mod output;
/// Graph nodes and the data stream protocol they share.
pub mod stream;
mod sync;
/// Unit-of-work descriptors.
pub mod task;
/// Core types: items, positions, node ids, and the `WriteOnce` cell.
pub mod types;
mod utils;

pub use crate::{
    builder::{Const, IntoStream, Operator, output},
    config::EngineConfig,
    engine::{Engine, ExecutionMode},
    error::{EngineError, GraphError},
    exception::{BoxError, DelayedException, FailureKind},
    output::OutputNode,
    stream::Stream,
    types::{EnumeratedItem, NodeId, Outcome, Position, Value},
};
