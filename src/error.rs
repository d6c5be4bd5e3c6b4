use crate::{exception::DelayedException, types::NodeId};
use thiserror::Error;

/// Structural error in a graph.
///
/// These are raised synchronously while a graph is being built or started
/// and are never transported as data. The one exception is
/// [`GraphError::Task`], which is how a captured unit-of-work failure is
/// re-raised by a consumer that asked for it.
#[derive(Debug, Error, Clone)]
#[non_exhaustive]
pub enum GraphError {
    /// The same listener was registered twice on one stream.
    #[error("listener {listener} is already registered on stream {stream}")]
    DuplicateListener { stream: NodeId, listener: NodeId },
    /// A queue was requested for a listener that never registered.
    #[error("listener {listener} is not registered on stream {stream}")]
    UnknownListener { stream: NodeId, listener: NodeId },
    /// A listener tried to register after the stream started emitting.
    #[error("stream {stream} has already started; listener {listener} would miss items")]
    LateListener { stream: NodeId, listener: NodeId },
    /// The size of a stream was queried before it could be known.
    #[error("size of stream {stream} is unknown until its computations start")]
    SizeUnknown { stream: NodeId },
    /// Two different sizes were published for one stream.
    #[error("stream {stream} already has size {current}, refusing {proposed}")]
    SizeConflict {
        stream: NodeId,
        current: usize,
        proposed: usize,
    },
    /// Non-constant inputs of a zip have different sizes.
    #[error("zip node {node} has inputs of mismatched sizes {sizes:?}")]
    SizeMismatch { node: NodeId, sizes: Vec<usize> },
    /// The cross product of a join does not fit in `usize`.
    #[error("join node {node} overflows for input sizes {sizes:?}")]
    SizeOverflow { node: NodeId, sizes: Vec<usize> },
    /// An argument or parameter stream that must hold a single item does not.
    #[error("input {index} of node {node} must hold exactly one item, found {size}")]
    NotConstant {
        node: NodeId,
        index: usize,
        size: usize,
    },
    /// A node that reduces a stream was given no stream to reduce.
    #[error("node {node} requires at least one input stream")]
    MissingInput { node: NodeId },
    /// An output node was started a second time.
    #[error("output node {node} has already been started")]
    AlreadyStarted { node: NodeId },
    /// The driver thread of a node could not be spawned.
    #[error("failed to spawn driver thread for node {node}: {message}")]
    Spawn { node: NodeId, message: String },
    /// A captured unit-of-work failure, re-raised on request.
    #[error(transparent)]
    Task(#[from] DelayedException),
}

/// Error returned when an [`crate::engine::Engine`] cannot be configured.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EngineError {
    /// The worker pool could not be built.
    #[error("failed to build worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
    /// A worker count override could not be parsed.
    #[error("invalid worker count {value:?} in {variable}")]
    InvalidWorkerCount {
        variable: &'static str,
        value: String,
    },
}
