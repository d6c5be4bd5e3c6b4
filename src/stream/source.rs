use crate::{
    error::GraphError,
    stream::{Computation, Stream, check_constant, recv},
    task::Routine,
    types::{EnumeratedItem, NodeId, Value},
};

/// Emits a fixed list of values, each tagged with its index.
pub(crate) struct Source<V> {
    values: Vec<V>,
}

impl<V> Source<V> {
    pub(crate) fn new(values: Vec<V>) -> Self {
        Self { values }
    }
}

impl<V: Value> Computation<V> for Source<V> {
    fn kind(&self) -> &'static str {
        "source"
    }

    fn planned_size(&self, _: NodeId, _: &[Stream<V>]) -> Result<Option<usize>, GraphError> {
        Ok(Some(self.values.len()))
    }

    fn start(&self, stream: &Stream<V>) -> Result<(), GraphError> {
        for (position, value) in self.values.iter().enumerate() {
            stream.put(EnumeratedItem::new(position, Ok(value.clone())));
        }
        Ok(())
    }
}

/// Runs a generator once and emits every element of the returned
/// collection as its own item.
///
/// The generator runs synchronously while the node starts, so the size of
/// the stream is known once [`Stream::start_computations`] returns. Every
/// argument stream must hold exactly one item.
pub(crate) struct ComputedSource<V> {
    routine: Routine<Vec<V>, Vec<V>>,
}

impl<V> ComputedSource<V> {
    pub(crate) fn new(routine: Routine<Vec<V>, Vec<V>>) -> Self {
        Self { routine }
    }
}

impl<V: Value> Computation<V> for ComputedSource<V> {
    fn kind(&self) -> &'static str {
        "computed-source"
    }

    fn planned_size(
        &self,
        node: NodeId,
        inputs: &[Stream<V>],
    ) -> Result<Option<usize>, GraphError> {
        check_constant(node, inputs.iter().map(Stream::try_size).enumerate())?;
        Ok(None)
    }

    fn start(&self, stream: &Stream<V>) -> Result<(), GraphError> {
        check_constant(stream.id(), stream.input_sizes()?.into_iter().map(Some).enumerate())?;
        let args = stream
            .input_receivers()?
            .iter()
            .map(|rx| recv(rx).value)
            .collect::<Result<Vec<_>, _>>();
        let values = match args {
            Ok(values) => values,
            Err(exc) => return stream.emit_all(Err(exc)),
        };
        let (tx, rx) = crossbeam::channel::bounded(1);
        self.routine.launch(values, move |outcome| {
            // Capacity one and a single send: never blocks, never fails.
            let _ = tx.send(outcome);
        });
        let outcome = rx
            .recv()
            .expect("ComputedSource::start: generator did not report back");
        stream.emit_all(outcome)
    }
}
