use crate::{
    exception::DelayedException,
    sync::{Condvar, Mutex, MutexGuard},
};
use core::{
    fmt::Debug,
    num::NonZeroU32,
    sync::atomic::{AtomicU32, Ordering},
};
use indexmap::IndexMap as _IndexMap;
use rustc_hash::FxBuildHasher;
use std::collections::HashSet as _HashSet;

/// Anything that can travel along the edges of a graph.
///
/// Items are cloned once per listener on fan-out and moved across worker
/// threads, hence the bounds.
pub trait Value: Clone + Debug + Send + Sync + 'static {}

impl<T: Clone + Debug + Send + Sync + 'static> Value for T {}

/// Unique identifier of a graph node. Also used as listener identity.
pub type NodeId = NonZeroU32;

/// Logical index of an item within its stream.
pub type Position = usize;

/// Payload of an item: either a computed value or a captured failure.
pub type Outcome<V> = Result<V, DelayedException>;

pub(crate) type HashSet<T> = _HashSet<T, FxBuildHasher>;
pub(crate) type IndexMap<K, V> = _IndexMap<K, V, FxBuildHasher>;

static NEXT_NODE_ID: AtomicU32 = AtomicU32::new(1);

/// Allocate a fresh process-wide unique [`NodeId`].
///
/// Nodes allocate their own ids; this is exposed for callers that want to
/// drain a stream by hand through [`crate::stream::Stream::register_listener`].
///
/// # Panics
/// If more than `u32::MAX - 1` ids are requested by the process.
#[must_use]
pub fn next_node_id() -> NodeId {
    let raw = NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed);
    NodeId::new(raw).expect("next_node_id: id space exhausted")
}

/// A value tagged with the position it occupies in its stream.
///
/// Positions are assigned when work is dispatched, so items may arrive in
/// any order and still be put back in logical order by the consumer.
#[derive(Debug, Clone)]
pub struct EnumeratedItem<V> {
    /// Logical index within the producing stream.
    pub position: Position,
    /// Computed value or captured failure.
    pub value: Outcome<V>,
}

impl<V> EnumeratedItem<V> {
    pub fn new(position: Position, value: Outcome<V>) -> Self {
        Self { position, value }
    }

    pub fn into_parts(self) -> (Position, Outcome<V>) {
        let Self { position, value } = self;
        (position, value)
    }
}

impl<V> From<EnumeratedItem<V>> for (Position, Outcome<V>) {
    fn from(item: EnumeratedItem<V>) -> Self {
        item.into_parts()
    }
}

/// A cell that is written at most once and can be waited on.
///
/// Readers block on a condition variable until the single write happens.
/// Used for sizes that are only known at run time and for the collected
/// results of an [`crate::output::OutputNode`].
#[derive(Debug)]
pub struct WriteOnce<T> {
    value: Mutex<Option<T>>,
    ready: Condvar,
}

impl<T> Default for WriteOnce<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> WriteOnce<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            value: Mutex::new(None),
            ready: Condvar::new(),
        }
    }

    /// A cell that is already written.
    #[must_use]
    pub fn filled(value: T) -> Self {
        Self {
            value: Mutex::new(Some(value)),
            ready: Condvar::new(),
        }
    }

    /// Store `value` and wake every waiter.
    ///
    /// # Errors
    /// Hands `value` back if the cell was already written.
    pub fn set(&self, value: T) -> Result<(), T> {
        let mut slot = self.lock();
        if slot.is_some() {
            return Err(value);
        }
        *slot = Some(value);
        drop(slot);
        self.ready.notify_all();
        Ok(())
    }

    /// Whether the cell has been written.
    pub fn is_set(&self) -> bool {
        self.lock().is_some()
    }

    fn lock(&self) -> MutexGuard<'_, Option<T>> {
        self.value.lock().expect("WriteOnce::lock: poisoned")
    }
}

impl<T: Clone> WriteOnce<T> {
    /// Non-blocking read.
    pub fn get(&self) -> Option<T> {
        self.lock().clone()
    }

    /// Block until the cell is written and return a copy of its value.
    pub fn wait(&self) -> T {
        let mut slot = self.lock();
        loop {
            if let Some(value) = slot.as_ref() {
                return value.clone();
            }
            slot = self.ready.wait(slot).expect("WriteOnce::wait: poisoned");
        }
    }
}
