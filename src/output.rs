use crate::{
    builder::IntoStream,
    error::GraphError,
    stream::Stream,
    sync::{AtomicBool, Ordering},
    types::{NodeId, Outcome, Value, WriteOnce, next_node_id},
};
use derive_more::Debug;

#[derive(Debug, Clone)]
enum Collected<V> {
    Complete(Vec<Outcome<V>>),
    /// The start failed, or a strict start stopped at a captured failure.
    Failed(GraphError),
}

/// Terminal node that drives a graph and hands back its results in order.
///
/// Results always come back sorted by position, however the units of work
/// that produced them were interleaved.
#[derive(Debug)]
pub struct OutputNode<V: Value> {
    id: NodeId,
    input: Stream<V>,
    started: AtomicBool,
    #[debug(skip)]
    results: WriteOnce<Collected<V>>,
}

impl<V: Value> OutputNode<V> {
    /// Wrap `input`, registering this node as one of its listeners.
    ///
    /// # Errors
    /// If `input` has already started.
    pub fn new(input: impl IntoStream<V>) -> Result<Self, GraphError> {
        let input = input.into_stream();
        let id = next_node_id();
        input.register_listener(id)?;
        Ok(Self {
            id,
            input,
            started: AtomicBool::new(false),
            results: WriteOnce::new(),
        })
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn input(&self) -> &Stream<V> {
        &self.input
    }

    /// Run the graph and collect every result, keeping captured failures as
    /// values. Blocks until all items have arrived.
    ///
    /// # Errors
    /// On structural errors, or if this node was already started.
    pub fn start_computations(&self) -> Result<(), GraphError> {
        self.collect(false)
    }

    /// Like [`Self::start_computations`], but stops at the first captured
    /// failure and re-raises it.
    ///
    /// # Errors
    /// As [`Self::start_computations`], plus [`GraphError::Task`] for the
    /// first captured failure that arrives.
    pub fn start_computations_strict(&self) -> Result<(), GraphError> {
        self.collect(true)
    }

    fn collect(&self, reraise: bool) -> Result<(), GraphError> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(GraphError::AlreadyStarted { node: self.id });
        }
        let (collected, result) = match self.gather(reraise) {
            Ok(values) => (Collected::Complete(values), Ok(())),
            Err(err) => (Collected::Failed(err.clone()), Err(err)),
        };
        let _ = self.results.set(collected);
        result
    }

    fn gather(&self, reraise: bool) -> Result<Vec<Outcome<V>>, GraphError> {
        self.input.start_computations()?;
        let size = self.input.size()?;
        tracing::debug!(node = %self.id, input = %self.input.id(), size, "collecting results");
        let mut items = Vec::with_capacity(size);
        for _ in 0..size {
            let item = self.input.get(self.id)?;
            if reraise {
                if let Err(exc) = &item.value {
                    return exc.reraise();
                }
            }
            items.push(item);
        }
        items.sort_unstable_by_key(|item| item.position);
        Ok(items.into_iter().map(|item| item.value).collect())
    }

    /// Whether results are available without blocking.
    pub fn is_ready(&self) -> bool {
        self.results.is_set()
    }

    /// Results in position order, captured failures included as values.
    ///
    /// Blocks until [`Self::start_computations`] (possibly on another thread)
    /// has collected everything.
    ///
    /// # Errors
    /// If the start failed, the error it failed with; if a strict start
    /// aborted, the failure that aborted it.
    pub fn get_all_in_order(&self) -> Result<Vec<Outcome<V>>, GraphError> {
        match self.results.wait() {
            Collected::Complete(values) => Ok(values),
            Collected::Failed(err) => Err(err),
        }
    }

    /// Results in position order, re-raising the first captured failure.
    ///
    /// # Errors
    /// [`GraphError::Task`] with the first captured failure by position.
    pub fn try_get_all_in_order(&self) -> Result<Vec<V>, GraphError> {
        self.get_all_in_order()?
            .into_iter()
            .collect::<Result<Vec<_>, _>>()
            .map_err(GraphError::Task)
    }
}
