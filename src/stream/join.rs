use crate::{
    error::GraphError,
    stream::{Computation, Inbox, Stream, dispatch},
    task::Routine,
    types::{EnumeratedItem, NodeId, Outcome, Position, Value},
    utils::{Odometer, checked_product, flat_position},
};
use crossbeam::channel::Receiver;

/// Full cross product of its inputs, computed as items arrive.
///
/// Whenever an item arrives on one input, every combination of it with the
/// items already seen on the other inputs is launched. The output position
/// of a combination is its row-major index over the input sizes.
///
/// Combinations that include a captured failure forward it instead of
/// calling the function, so the node still emits one item per position.
pub(crate) struct Join<V> {
    routine: Routine<Vec<V>, V>,
}

impl<V> Join<V> {
    pub(crate) fn new(routine: Routine<Vec<V>, V>) -> Self {
        Self { routine }
    }
}

fn join_size(node: NodeId, sizes: &[usize]) -> Result<usize, GraphError> {
    checked_product(sizes).ok_or_else(|| GraphError::SizeOverflow {
        node,
        sizes: sizes.to_vec(),
    })
}

impl<V: Value> Computation<V> for Join<V> {
    fn kind(&self) -> &'static str {
        "join"
    }

    fn planned_size(
        &self,
        node: NodeId,
        inputs: &[Stream<V>],
    ) -> Result<Option<usize>, GraphError> {
        let Some(sizes) = inputs.iter().map(Stream::try_size).collect::<Option<Vec<_>>>() else {
            return Ok(None);
        };
        join_size(node, &sizes).map(Some)
    }

    fn start(&self, stream: &Stream<V>) -> Result<(), GraphError> {
        let sizes = stream.input_sizes()?;
        stream.publish_size(join_size(stream.id(), &sizes)?)?;
        let receivers = stream.input_receivers()?;
        let routine = self.routine.clone();
        let out = stream.clone();
        stream.spawn_driver(move || drive(&out, &routine, &sizes, receivers))
    }
}

fn drive<V: Value>(
    stream: &Stream<V>,
    routine: &Routine<Vec<V>, V>,
    sizes: &[usize],
    receivers: Vec<Receiver<EnumeratedItem<V>>>,
) {
    if sizes.is_empty() {
        dispatch(stream, routine, 0, vec![]);
        return;
    }
    let width = sizes.len();
    let mut inbox = Inbox::new(receivers, sizes.to_vec());
    let mut seen: Vec<Vec<(Position, Outcome<V>)>> = vec![vec![]; width];
    while let Some((input, item)) = inbox.next() {
        seen[input].push(item.into_parts());
        let newest = seen[input].len() - 1;
        // The new item is pinned; every other input ranges over what it has so far.
        let lens: Vec<usize> = seen
            .iter()
            .enumerate()
            .map(|(k, items)| if k == input { 1 } else { items.len() })
            .collect();
        for combo in Odometer::new(&lens) {
            let mut coords = Vec::with_capacity(width);
            let mut args = Vec::with_capacity(width);
            for (k, &idx) in combo.iter().enumerate() {
                let idx = if k == input { newest } else { idx };
                let (position, value) = &seen[k][idx];
                coords.push(*position);
                args.push(value.clone());
            }
            dispatch(stream, routine, flat_position(&coords, sizes), args);
        }
    }
}
