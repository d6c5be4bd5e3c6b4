use crate::{
    error::GraphError,
    exception::DelayedException,
    stream::{Computation, Stream, check_constant, recv},
    task::Routine,
    types::{EnumeratedItem, NodeId, Value},
};
use crossbeam::channel::Receiver;

/// Arguments of a whole-stream reduction: the collected items in position
/// order, then the extra single-item parameters.
type Collected<V> = (Vec<V>, Vec<V>);

/// Reduces its entire first input to a single item.
pub(crate) struct Summarize<V> {
    routine: Routine<Collected<V>, V>,
}

/// Reduces its entire first input to a collection, each element of which is
/// emitted as its own item. The size is known only after the reduction ran.
pub(crate) struct FullStream<V> {
    routine: Routine<Collected<V>, Vec<V>>,
}

impl<V> Summarize<V> {
    pub(crate) fn new(routine: Routine<Collected<V>, V>) -> Self {
        Self { routine }
    }
}

impl<V> FullStream<V> {
    pub(crate) fn new(routine: Routine<Collected<V>, Vec<V>>) -> Self {
        Self { routine }
    }
}

/// The first input is the stream to reduce; every further input is a
/// parameter and must hold exactly one item.
fn check_inputs<V: Value>(node: NodeId, inputs: &[Stream<V>]) -> Result<(), GraphError> {
    if inputs.is_empty() {
        return Err(GraphError::MissingInput { node });
    }
    check_constant(node, inputs.iter().map(Stream::try_size).enumerate().skip(1))
}

/// Size of the reduced stream and this node's queues on every input.
fn resolve<V: Value>(
    stream: &Stream<V>,
) -> Result<(usize, Vec<Receiver<EnumeratedItem<V>>>), GraphError> {
    let sizes = stream.input_sizes()?;
    check_constant(stream.id(), sizes.iter().copied().map(Some).enumerate().skip(1))?;
    Ok((sizes[0], stream.input_receivers()?))
}

/// Drain every input. The first captured failure, in position order, wins.
fn collect<V: Value>(
    size: usize,
    receivers: &[Receiver<EnumeratedItem<V>>],
) -> Result<Collected<V>, DelayedException> {
    let mut items: Vec<_> = (0..size).map(|_| recv(&receivers[0])).collect();
    items.sort_unstable_by_key(|item| item.position);
    let params: Vec<_> = receivers[1..].iter().map(|rx| recv(rx).value).collect();
    let values = items
        .into_iter()
        .map(|item| item.value)
        .collect::<Result<Vec<_>, _>>()?;
    let params = params.into_iter().collect::<Result<Vec<_>, _>>()?;
    Ok((values, params))
}

impl<V: Value> Computation<V> for Summarize<V> {
    fn kind(&self) -> &'static str {
        "summarize"
    }

    fn planned_size(
        &self,
        node: NodeId,
        inputs: &[Stream<V>],
    ) -> Result<Option<usize>, GraphError> {
        check_inputs(node, inputs)?;
        Ok(Some(1))
    }

    fn start(&self, stream: &Stream<V>) -> Result<(), GraphError> {
        let (size, receivers) = resolve(stream)?;
        let routine = self.routine.clone();
        let out = stream.clone();
        stream.spawn_driver(move || match collect(size, &receivers) {
            Ok(args) => {
                let emit = out.clone();
                routine.launch(args, move |outcome| {
                    emit.put(EnumeratedItem::new(0, outcome));
                });
            }
            Err(exc) => out.forward(0, exc),
        })
    }
}

impl<V: Value> Computation<V> for FullStream<V> {
    fn kind(&self) -> &'static str {
        "fullstream"
    }

    fn planned_size(
        &self,
        node: NodeId,
        inputs: &[Stream<V>],
    ) -> Result<Option<usize>, GraphError> {
        check_inputs(node, inputs)?;
        Ok(None)
    }

    fn start(&self, stream: &Stream<V>) -> Result<(), GraphError> {
        let (size, receivers) = resolve(stream)?;
        let routine = self.routine.clone();
        let out = stream.clone();
        stream.spawn_driver(move || match collect(size, &receivers) {
            Ok(args) => {
                let emit = out.clone();
                routine.launch(args, move |outcome| emit.emit_all_logged(outcome));
            }
            Err(exc) => out.emit_all_logged(Err(exc)),
        })
    }
}
