use crate::{
    error::GraphError,
    stream::{Computation, Inbox, Stream, dispatch, recv},
    task::Routine,
    types::{EnumeratedItem, HashSet, NodeId, Outcome, Value},
};
use crossbeam::channel::Receiver;
use std::mem;

/// Position-for-position combination of its inputs.
///
/// Inputs of size one are constants, broadcast to every position. All other
/// inputs must share one size, which is the size of the node; if every
/// input is constant the node emits a single item.
///
/// A captured failure among the arguments of a position is forwarded at that
/// position and the function is not called for it.
pub(crate) struct Zip<V> {
    routine: Routine<Vec<V>, V>,
}

impl<V> Zip<V> {
    pub(crate) fn new(routine: Routine<Vec<V>, V>) -> Self {
        Self { routine }
    }
}

fn zip_size(node: NodeId, sizes: &[usize]) -> Result<usize, GraphError> {
    let mut common = None;
    for &size in sizes.iter().filter(|&&size| size != 1) {
        match common {
            None => common = Some(size),
            Some(common) if common == size => {}
            Some(_) => {
                return Err(GraphError::SizeMismatch {
                    node,
                    sizes: sizes.to_vec(),
                });
            }
        }
    }
    Ok(common.unwrap_or(1))
}

impl<V: Value> Computation<V> for Zip<V> {
    fn kind(&self) -> &'static str {
        "zip"
    }

    fn planned_size(
        &self,
        node: NodeId,
        inputs: &[Stream<V>],
    ) -> Result<Option<usize>, GraphError> {
        let Some(sizes) = inputs.iter().map(Stream::try_size).collect::<Option<Vec<_>>>() else {
            return Ok(None);
        };
        zip_size(node, &sizes).map(Some)
    }

    fn start(&self, stream: &Stream<V>) -> Result<(), GraphError> {
        let sizes = stream.input_sizes()?;
        let size = zip_size(stream.id(), &sizes)?;
        stream.publish_size(size)?;
        let receivers = stream.input_receivers()?;
        let routine = self.routine.clone();
        let out = stream.clone();
        stream.spawn_driver(move || drive(&out, &routine, &sizes, size, receivers))
    }
}

fn drive<V: Value>(
    stream: &Stream<V>,
    routine: &Routine<Vec<V>, V>,
    sizes: &[usize],
    size: usize,
    receivers: Vec<Receiver<EnumeratedItem<V>>>,
) {
    let width = sizes.len();
    let constants: Vec<Option<Outcome<V>>> = sizes
        .iter()
        .zip(&receivers)
        .map(|(&len, rx)| (len == 1).then(|| recv(rx).value))
        .collect();
    let required = constants.iter().filter(|c| c.is_none()).count();
    let assemble = |row: Vec<Option<Outcome<V>>>| -> Vec<Outcome<V>> {
        row.into_iter()
            .zip(&constants)
            .map(|(slot, constant)| {
                slot.or_else(|| constant.clone())
                    .expect("zip::drive: row assembled before all arguments arrived")
            })
            .collect()
    };

    if required == 0 {
        dispatch(stream, routine, 0, assemble(vec![None; width]));
        return;
    }

    let expected = sizes
        .iter()
        .zip(&constants)
        .map(|(&len, constant)| if constant.is_some() { 0 } else { len })
        .collect();
    let mut inbox = Inbox::new(receivers, expected);
    let mut rows: Vec<Vec<Option<Outcome<V>>>> = vec![vec![None; width]; size];
    let mut filled = vec![0usize; size];
    let mut seen = HashSet::default();
    while let Some((input, item)) = inbox.next() {
        let (position, value) = item.into_parts();
        rows[position][input] = Some(value);
        filled[position] += 1;
        if filled[position] == required && seen.insert(position) {
            let row = mem::take(&mut rows[position]);
            dispatch(stream, routine, position, assemble(row));
        }
    }
}
