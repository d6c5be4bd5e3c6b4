use crate::{
    engine::{Engine, ExecutionMode},
    error::GraphError,
    exception::BoxError,
    output::OutputNode,
    stream::{ComputedSource, FullStream, Join, NodeKind, Stream, Summarize, Zip},
    task::{Routine, TaskFn},
    types::Value,
};
use derive_more::Debug;
use std::sync::Arc;

/// Anything that can stand where a stream is expected.
///
/// A `Vec` becomes a source stream of its elements; a single bare value is
/// passed as [`Const`], which becomes a one-item stream.
pub trait IntoStream<V: Value> {
    fn into_stream(self) -> Stream<V>;
}

impl<V: Value> IntoStream<V> for Stream<V> {
    fn into_stream(self) -> Stream<V> {
        self
    }
}

impl<V: Value> IntoStream<V> for &Stream<V> {
    fn into_stream(self) -> Stream<V> {
        self.clone()
    }
}

impl<V: Value> IntoStream<V> for Vec<V> {
    fn into_stream(self) -> Stream<V> {
        Stream::from_values(self)
    }
}

/// A bare value used as a stream input: a single item, broadcast by zips.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Const<V>(pub V);

impl<V: Value> IntoStream<V> for Const<V> {
    fn into_stream(self) -> Stream<V> {
        Stream::constant(self.0)
    }
}

#[derive(Debug)]
enum Body<V> {
    #[debug("Source")]
    Source(TaskFn<Vec<V>, Vec<V>>),
    #[debug("Zip")]
    Zip(TaskFn<Vec<V>, V>),
    #[debug("Join")]
    Join(TaskFn<Vec<V>, V>),
    #[debug("Summarize")]
    Summarize(TaskFn<(Vec<V>, Vec<V>), V>),
    #[debug("FullStream")]
    FullStream(TaskFn<(Vec<V>, Vec<V>), Vec<V>>),
}

/// A user function wrapped with the node kind and execution policy it
/// should be built into. Calling it on input streams builds the node; the
/// function itself only runs once the graph is started.
#[derive(Debug)]
pub struct Operator<V: Value> {
    name: Arc<str>,
    mode: ExecutionMode,
    engine: Arc<Engine>,
    body: Body<V>,
}

impl<V: Value> Operator<V> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    /// Build a node over `inputs`, in argument order.
    ///
    /// # Errors
    /// On structural errors detectable from the inputs: repeated inputs,
    /// mismatched zip sizes, parameters that are not single items, and so on.
    pub fn call<I>(&self, inputs: I) -> Result<Stream<V>, GraphError>
    where
        I: IntoIterator,
        I::Item: IntoStream<V>,
    {
        let inputs = inputs.into_iter().map(IntoStream::into_stream).collect();
        let kind = match &self.body {
            Body::Source(func) => NodeKind::ComputedSource(ComputedSource::new(self.routine(func))),
            Body::Zip(func) => NodeKind::Zip(Zip::new(self.routine(func))),
            Body::Join(func) => NodeKind::Join(Join::new(self.routine(func))),
            Body::Summarize(func) => NodeKind::Summarize(Summarize::new(self.routine(func))),
            Body::FullStream(func) => NodeKind::FullStream(FullStream::new(self.routine(func))),
        };
        Stream::new(self.name.clone(), kind, inputs)
    }

    fn routine<A, R>(&self, func: &TaskFn<A, R>) -> Routine<A, R> {
        Routine {
            name: self.name.clone(),
            func: func.clone(),
            mode: self.mode,
            engine: self.engine.clone(),
        }
    }
}

/// Graph-building entry points. Each returns an [`Operator`] that builds
/// nodes dispatched through this engine.
///
/// The `_local` variants always run inline in the node's driver thread;
/// the `_debug` variants run inline through the job object a pool worker
/// would receive.
impl Engine {
    fn operator<V: Value>(self: &Arc<Self>, name: &str, mode: ExecutionMode, body: Body<V>) -> Operator<V> {
        Operator {
            name: name.into(),
            mode,
            engine: self.clone(),
            body,
        }
    }

    /// A generator run once, inline, when the graph starts; every element it
    /// returns becomes an item. Arguments must be single-item streams.
    pub fn source<V, F>(self: &Arc<Self>, name: &str, func: F) -> Operator<V>
    where
        V: Value,
        F: Fn(&[V]) -> Result<Vec<V>, BoxError> + Send + Sync + 'static,
    {
        let func: TaskFn<Vec<V>, Vec<V>> = Arc::new(move |args: Vec<V>| func(&args));
        self.operator(name, ExecutionMode::Local, Body::Source(func))
    }

    /// Position-aligned application; single-item inputs are broadcast.
    pub fn apply<V, F>(self: &Arc<Self>, name: &str, func: F) -> Operator<V>
    where
        V: Value,
        F: Fn(&[V]) -> Result<V, BoxError> + Send + Sync + 'static,
    {
        self.operator(name, ExecutionMode::Pool, Body::Zip(positional(func)))
    }

    pub fn apply_local<V, F>(self: &Arc<Self>, name: &str, func: F) -> Operator<V>
    where
        V: Value,
        F: Fn(&[V]) -> Result<V, BoxError> + Send + Sync + 'static,
    {
        self.operator(name, ExecutionMode::Local, Body::Zip(positional(func)))
    }

    pub fn apply_debug<V, F>(self: &Arc<Self>, name: &str, func: F) -> Operator<V>
    where
        V: Value,
        F: Fn(&[V]) -> Result<V, BoxError> + Send + Sync + 'static,
    {
        self.operator(name, ExecutionMode::Debug, Body::Zip(positional(func)))
    }

    /// Application over the full cross product of the inputs.
    pub fn join<V, F>(self: &Arc<Self>, name: &str, func: F) -> Operator<V>
    where
        V: Value,
        F: Fn(&[V]) -> Result<V, BoxError> + Send + Sync + 'static,
    {
        self.operator(name, ExecutionMode::Pool, Body::Join(positional(func)))
    }

    pub fn join_local<V, F>(self: &Arc<Self>, name: &str, func: F) -> Operator<V>
    where
        V: Value,
        F: Fn(&[V]) -> Result<V, BoxError> + Send + Sync + 'static,
    {
        self.operator(name, ExecutionMode::Local, Body::Join(positional(func)))
    }

    pub fn join_debug<V, F>(self: &Arc<Self>, name: &str, func: F) -> Operator<V>
    where
        V: Value,
        F: Fn(&[V]) -> Result<V, BoxError> + Send + Sync + 'static,
    {
        self.operator(name, ExecutionMode::Debug, Body::Join(positional(func)))
    }

    /// Reduction of a whole stream to one item. `func` receives the items in
    /// position order and the values of any further (single-item) inputs.
    pub fn summarize<V, F>(self: &Arc<Self>, name: &str, func: F) -> Operator<V>
    where
        V: Value,
        F: Fn(&[V], &[V]) -> Result<V, BoxError> + Send + Sync + 'static,
    {
        self.operator(name, ExecutionMode::Pool, Body::Summarize(collected(func)))
    }

    pub fn summarize_local<V, F>(self: &Arc<Self>, name: &str, func: F) -> Operator<V>
    where
        V: Value,
        F: Fn(&[V], &[V]) -> Result<V, BoxError> + Send + Sync + 'static,
    {
        self.operator(name, ExecutionMode::Local, Body::Summarize(collected(func)))
    }

    pub fn summarize_debug<V, F>(self: &Arc<Self>, name: &str, func: F) -> Operator<V>
    where
        V: Value,
        F: Fn(&[V], &[V]) -> Result<V, BoxError> + Send + Sync + 'static,
    {
        self.operator(name, ExecutionMode::Debug, Body::Summarize(collected(func)))
    }

    /// Reduction of a whole stream to a new stream: each element `func`
    /// returns becomes an item.
    pub fn fullstream<V, F>(self: &Arc<Self>, name: &str, func: F) -> Operator<V>
    where
        V: Value,
        F: Fn(&[V], &[V]) -> Result<Vec<V>, BoxError> + Send + Sync + 'static,
    {
        self.operator(name, ExecutionMode::Pool, Body::FullStream(collected(func)))
    }

    pub fn fullstream_local<V, F>(self: &Arc<Self>, name: &str, func: F) -> Operator<V>
    where
        V: Value,
        F: Fn(&[V], &[V]) -> Result<Vec<V>, BoxError> + Send + Sync + 'static,
    {
        self.operator(name, ExecutionMode::Local, Body::FullStream(collected(func)))
    }

    pub fn fullstream_debug<V, F>(self: &Arc<Self>, name: &str, func: F) -> Operator<V>
    where
        V: Value,
        F: Fn(&[V], &[V]) -> Result<Vec<V>, BoxError> + Send + Sync + 'static,
    {
        self.operator(name, ExecutionMode::Debug, Body::FullStream(collected(func)))
    }
}

fn positional<V, F>(func: F) -> TaskFn<Vec<V>, V>
where
    V: Value,
    F: Fn(&[V]) -> Result<V, BoxError> + Send + Sync + 'static,
{
    Arc::new(move |args: Vec<V>| func(&args))
}

fn collected<V, R, F>(func: F) -> TaskFn<(Vec<V>, Vec<V>), R>
where
    V: Value,
    F: Fn(&[V], &[V]) -> Result<R, BoxError> + Send + Sync + 'static,
{
    Arc::new(move |(items, params): (Vec<V>, Vec<V>)| func(&items, &params))
}

/// Terminal node over `input`; see [`OutputNode`].
///
/// # Errors
/// If `input` has already started.
pub fn output<V: Value>(input: impl IntoStream<V>) -> Result<OutputNode<V>, GraphError> {
    OutputNode::new(input)
}
