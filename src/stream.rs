mod join;
mod source;
mod summarize;
mod zip;

pub(crate) use self::{
    join::Join,
    source::{ComputedSource, Source},
    summarize::{FullStream, Summarize},
    zip::Zip,
};
use crate::{
    error::GraphError,
    exception::DelayedException,
    sync::{AtomicBool, Mutex, MutexGuard, Ordering},
    task::Routine,
    types::{
        EnumeratedItem, HashSet, IndexMap, NodeId, Outcome, Position, Value, WriteOnce,
        next_node_id,
    },
};
use core::fmt::{self, Formatter};
use crossbeam::channel::{Receiver, Select, Sender, unbounded};
use std::{sync::Arc, thread};

/// Handle to a node of a dataflow graph.
///
/// Every node is a data stream: it owns one FIFO queue per registered
/// listener and delivers a copy of each item it produces to every queue
/// (fan-out). Starting a stream first starts its inputs, depth first, and
/// then the node's own computation, which eventually puts exactly one item
/// for every position in `0..size`.
///
/// Handles are cheap to clone and can be shared between threads.
pub struct Stream<V: Value> {
    node: Arc<Node<V>>,
}

struct Node<V: Value> {
    id: NodeId,
    name: Arc<str>,
    inputs: Vec<Stream<V>>,
    queues: Mutex<IndexMap<NodeId, Queue<V>>>,
    started: AtomicBool,
    /// Result of the first start, replayed to every later caller.
    launched: WriteOnce<Result<(), GraphError>>,
    /// A failed start resolves the size to its error so waiters wake up.
    size: WriteOnce<Result<usize, GraphError>>,
    kind: NodeKind<V>,
}

/// One edge of the graph: single producer, single consumer.
struct Queue<V> {
    tx: Sender<EnumeratedItem<V>>,
    rx: Receiver<EnumeratedItem<V>>,
}

/// Closed set of node kinds.
pub(crate) enum NodeKind<V: Value> {
    Source(Source<V>),
    ComputedSource(ComputedSource<V>),
    Zip(Zip<V>),
    Join(Join<V>),
    Summarize(Summarize<V>),
    FullStream(FullStream<V>),
}

/// Behaviour every node kind provides.
pub(crate) trait Computation<V: Value> {
    /// Short label used in logs and driver thread names.
    fn kind(&self) -> &'static str;
    /// Size derivable from the inputs before anything runs, if any.
    ///
    /// Also the place to reject structurally invalid inputs early.
    fn planned_size(&self, node: NodeId, inputs: &[Stream<V>])
    -> Result<Option<usize>, GraphError>;
    /// Start producing items. Inputs are already started.
    fn start(&self, stream: &Stream<V>) -> Result<(), GraphError>;
}

impl<V: Value> NodeKind<V> {
    fn as_computation(&self) -> &dyn Computation<V> {
        match self {
            Self::Source(kind) => kind,
            Self::ComputedSource(kind) => kind,
            Self::Zip(kind) => kind,
            Self::Join(kind) => kind,
            Self::Summarize(kind) => kind,
            Self::FullStream(kind) => kind,
        }
    }
}

impl<V: Value> Clone for Stream<V> {
    fn clone(&self) -> Self {
        Self {
            node: self.node.clone(),
        }
    }
}

impl<V: Value> fmt::Debug for Stream<V> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stream")
            .field("id", &self.id())
            .field("name", &self.name())
            .field("kind", &self.kind())
            .field("size", &self.try_size())
            .field("inputs", &self.node.inputs.iter().map(Self::id).collect::<Vec<_>>())
            .finish()
    }
}

impl<V: Value> Stream<V> {
    /// A stream that emits `values` in order.
    pub fn from_values(values: impl IntoIterator<Item = V>) -> Self {
        let values: Vec<V> = values.into_iter().collect();
        let size = values.len();
        Self::assemble(
            next_node_id(),
            "source".into(),
            NodeKind::Source(Source::new(values)),
            vec![],
            Some(size),
        )
    }

    /// A single-item stream. Zip broadcasts such streams to every position.
    pub fn constant(value: V) -> Self {
        Self::from_values([value])
    }

    /// Build a node over `inputs` and register it as a listener on each.
    pub(crate) fn new(
        name: Arc<str>,
        kind: NodeKind<V>,
        inputs: Vec<Self>,
    ) -> Result<Self, GraphError> {
        let id = next_node_id();
        let mut distinct = HashSet::default();
        for input in &inputs {
            if !distinct.insert(input.id()) {
                return Err(GraphError::DuplicateListener {
                    stream: input.id(),
                    listener: id,
                });
            }
        }
        let planned = kind.as_computation().planned_size(id, &inputs)?;
        for input in &inputs {
            input.register_listener(id)?;
        }
        Ok(Self::assemble(id, name, kind, inputs, planned))
    }

    fn assemble(
        id: NodeId,
        name: Arc<str>,
        kind: NodeKind<V>,
        inputs: Vec<Self>,
        planned: Option<usize>,
    ) -> Self {
        Self {
            node: Arc::new(Node {
                id,
                name,
                inputs,
                queues: Mutex::new(IndexMap::default()),
                started: AtomicBool::new(false),
                launched: WriteOnce::new(),
                size: planned.map_or_else(WriteOnce::new, |size| WriteOnce::filled(Ok(size))),
                kind,
            }),
        }
    }

    pub fn id(&self) -> NodeId {
        self.node.id
    }

    /// Name of the function this node runs, or `"source"`.
    pub fn name(&self) -> &str {
        &self.node.name
    }

    /// Node kind label, e.g. `"zip"` or `"join"`.
    pub fn kind(&self) -> &'static str {
        self.node.kind.as_computation().kind()
    }

    /// Upstream dependencies, in argument order.
    pub fn inputs(&self) -> &[Self] {
        &self.node.inputs
    }

    pub fn is_started(&self) -> bool {
        self.node.started.load(Ordering::Acquire)
    }

    /// Allocate a queue for `listener`.
    ///
    /// # Errors
    /// If `listener` is already registered, or this stream has already
    /// started emitting (the listener would miss items).
    pub fn register_listener(&self, listener: NodeId) -> Result<(), GraphError> {
        let mut queues = self.lock_queues();
        if self.is_started() {
            return Err(GraphError::LateListener {
                stream: self.id(),
                listener,
            });
        }
        if queues.contains_key(&listener) {
            return Err(GraphError::DuplicateListener {
                stream: self.id(),
                listener,
            });
        }
        let (tx, rx) = unbounded();
        queues.insert(listener, Queue { tx, rx });
        Ok(())
    }

    /// Push a copy of `item` into every listener's queue.
    pub fn put(&self, item: EnumeratedItem<V>) {
        tracing::trace!(node = %self.id(), position = item.position, ok = item.value.is_ok(), "put");
        let queues = self.lock_queues();
        for queue in queues.values() {
            // The receiving end lives in the same map, so the channel is open.
            queue
                .tx
                .send(item.clone())
                .expect("Stream::put: queue disconnected");
        }
    }

    /// Blocking pop from `listener`'s queue.
    ///
    /// # Errors
    /// If `listener` is not registered on this stream.
    pub fn get(&self, listener: NodeId) -> Result<EnumeratedItem<V>, GraphError> {
        Ok(recv(&self.receiver(listener)?))
    }

    /// Whether `listener`'s queue is currently empty.
    ///
    /// # Errors
    /// If `listener` is not registered on this stream.
    pub fn empty(&self, listener: NodeId) -> Result<bool, GraphError> {
        Ok(self.receiver(listener)?.is_empty())
    }

    /// Number of items this stream emits.
    ///
    /// Sizes that follow from the input sizes are known as soon as the node
    /// is built. Nodes whose size depends on a function result (computed
    /// sources, full-stream reductions) only know it after they ran: before
    /// the stream is started this returns [`GraphError::SizeUnknown`], after
    /// that it blocks until the size is published.
    ///
    /// # Errors
    /// See above. If starting the stream failed before its size was known,
    /// the error that failed the start.
    pub fn size(&self) -> Result<usize, GraphError> {
        if let Some(size) = self.node.size.get() {
            return size;
        }
        if !self.is_started() {
            return Err(GraphError::SizeUnknown { stream: self.id() });
        }
        self.node.size.wait()
    }

    /// Non-blocking variant of [`Self::size`].
    pub fn try_size(&self) -> Option<usize> {
        self.node.size.get().and_then(Result::ok)
    }

    /// Start this stream and, first, everything upstream of it.
    ///
    /// Idempotent; a node reachable along several paths starts once, and
    /// every call returns the outcome of that one start. Returns without
    /// waiting for results, except that nodes whose size depends on an
    /// upstream function result wait for that size.
    ///
    /// # Errors
    /// On structural errors in this node or upstream, on every call.
    pub fn start_computations(&self) -> Result<(), GraphError> {
        if self.node.started.swap(true, Ordering::AcqRel) {
            return self.node.launched.wait();
        }
        let launched = self.launch();
        if let Err(err) = &launched {
            tracing::warn!(node = %self.id(), %err, "failed to start computation");
            let _ = self.node.size.set(Err(err.clone()));
        }
        let _ = self.node.launched.set(launched.clone());
        launched
    }

    fn launch(&self) -> Result<(), GraphError> {
        for input in &self.node.inputs {
            input.start_computations()?;
        }
        let computation = self.node.kind.as_computation();
        tracing::debug!(
            node = %self.id(),
            name = %self.name(),
            kind = computation.kind(),
            size = ?self.try_size(),
            "starting computation"
        );
        computation.start(self)
    }

    fn lock_queues(&self) -> MutexGuard<'_, IndexMap<NodeId, Queue<V>>> {
        self.node.queues.lock().expect("Stream::lock_queues: poisoned")
    }

    pub(crate) fn receiver(
        &self,
        listener: NodeId,
    ) -> Result<Receiver<EnumeratedItem<V>>, GraphError> {
        self.lock_queues()
            .get(&listener)
            .map(|queue| queue.rx.clone())
            .ok_or_else(|| GraphError::UnknownListener {
                stream: self.id(),
                listener,
            })
    }

    /// Sizes of all inputs, waiting for the ones that are still pending.
    pub(crate) fn input_sizes(&self) -> Result<Vec<usize>, GraphError> {
        self.node.inputs.iter().map(Self::size).collect()
    }

    /// This node's queue on each input, in argument order.
    pub(crate) fn input_receivers(&self) -> Result<Vec<Receiver<EnumeratedItem<V>>>, GraphError> {
        self.node
            .inputs
            .iter()
            .map(|input| input.receiver(self.id()))
            .collect()
    }

    pub(crate) fn publish_size(&self, size: usize) -> Result<(), GraphError> {
        if self.node.size.set(Ok(size)).is_ok() {
            return Ok(());
        }
        match self.node.size.get() {
            Some(Ok(current)) if current != size => Err(GraphError::SizeConflict {
                stream: self.id(),
                current,
                proposed: size,
            }),
            _ => Ok(()),
        }
    }

    /// Forward a captured failure at `position` without running anything.
    pub(crate) fn forward(&self, position: Position, exc: DelayedException) {
        tracing::trace!(node = %self.id(), position, task = exc.task(), "forwarding captured failure");
        self.put(EnumeratedItem::new(position, Err(exc)));
    }

    /// Publish the size of a whole-collection result and emit its elements.
    ///
    /// A failed result becomes a single failure item at position 0.
    pub(crate) fn emit_all(&self, outcome: Outcome<Vec<V>>) -> Result<(), GraphError> {
        match outcome {
            Ok(values) => {
                self.publish_size(values.len())?;
                for (position, value) in values.into_iter().enumerate() {
                    self.put(EnumeratedItem::new(position, Ok(value)));
                }
            }
            Err(exc) => {
                self.publish_size(1)?;
                self.forward(0, exc);
            }
        }
        Ok(())
    }

    /// [`Self::emit_all`] for contexts with no caller to report to.
    pub(crate) fn emit_all_logged(&self, outcome: Outcome<Vec<V>>) {
        if let Err(err) = self.emit_all(outcome) {
            tracing::error!(node = %self.id(), %err, "failed to emit results");
        }
    }

    pub(crate) fn spawn_driver(
        &self,
        driver: impl FnOnce() + Send + 'static,
    ) -> Result<(), GraphError> {
        thread::Builder::new()
            .name(format!("cdg-{}-{}", self.kind(), self.id()))
            .spawn(driver)
            .map(drop)
            .map_err(|err| GraphError::Spawn {
                node: self.id(),
                message: err.to_string(),
            })
    }
}

/// Run `routine` on `args` and emit the result at `position`; if any
/// argument is a captured failure, forward the first one instead.
pub(crate) fn dispatch<V: Value>(
    stream: &Stream<V>,
    routine: &Routine<Vec<V>, V>,
    position: Position,
    args: Vec<Outcome<V>>,
) {
    match args.into_iter().collect::<Result<Vec<_>, _>>() {
        Ok(values) => {
            let out = stream.clone();
            routine.launch(values, move |outcome| {
                out.put(EnumeratedItem::new(position, outcome));
            });
        }
        Err(exc) => stream.forward(position, exc),
    }
}

/// Reject any input whose size is known and is not one.
///
/// `sizes` yields `(argument index, size if known)`.
pub(crate) fn check_constant(
    node: NodeId,
    sizes: impl IntoIterator<Item = (usize, Option<usize>)>,
) -> Result<(), GraphError> {
    for (index, size) in sizes {
        match size {
            Some(size) if size != 1 => {
                return Err(GraphError::NotConstant { node, index, size });
            }
            _ => {}
        }
    }
    Ok(())
}

/// Blocking receive from an upstream queue.
///
/// The upstream keeps the sending end alive for as long as a downstream
/// handle to it exists, so a disconnect is an internal bug.
pub(crate) fn recv<V>(rx: &Receiver<EnumeratedItem<V>>) -> EnumeratedItem<V> {
    rx.recv().expect("recv: upstream queue disconnected")
}

/// Receives from several input queues at once, in arrival order.
pub(crate) struct Inbox<V> {
    receivers: Vec<Receiver<EnumeratedItem<V>>>,
    remaining: Vec<usize>,
}

impl<V> Inbox<V> {
    /// `expected[k]` items will be taken from `receivers[k]`.
    pub(crate) fn new(receivers: Vec<Receiver<EnumeratedItem<V>>>, expected: Vec<usize>) -> Self {
        assert_eq!(receivers.len(), expected.len(), "Inbox::new");
        Self {
            receivers,
            remaining: expected,
        }
    }

    /// Next item from whichever input has one, with that input's index.
    /// `None` once every input delivered everything expected from it.
    pub(crate) fn next(&mut self) -> Option<(usize, EnumeratedItem<V>)> {
        let active: Vec<usize> = (0..self.receivers.len())
            .filter(|&k| self.remaining[k] > 0)
            .collect();
        let input = match active.as_slice() {
            [] => return None,
            &[input] => input,
            _ => {
                let mut select = Select::new();
                for &k in &active {
                    select.recv(&self.receivers[k]);
                }
                let op = select.select();
                let input = active[op.index()];
                let item = op
                    .recv(&self.receivers[input])
                    .expect("Inbox::next: upstream queue disconnected");
                self.remaining[input] -= 1;
                return Some((input, item));
            }
        };
        let item = recv(&self.receivers[input]);
        self.remaining[input] -= 1;
        Some((input, item))
    }
}
