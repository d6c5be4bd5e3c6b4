use crate::error::GraphError;
use core::{
    any::Any,
    error::Error,
    fmt::{self, Display, Formatter, Write as _},
    panic::Location,
};
use derive_more::Debug;
use std::{
    backtrace::{Backtrace, BacktraceStatus},
    sync::Arc,
};

/// Error type user functions return.
pub type BoxError = Box<dyn Error + Send + Sync + 'static>;

/// How a unit of work failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum FailureKind {
    /// The function returned an error.
    #[display("error")]
    Error,
    /// The function panicked.
    #[display("panic")]
    Panic,
}

/// A failure captured inside a unit of work and carried as ordinary data.
///
/// A `DelayedException` travels through queues and argument assembly like
/// any other item payload until a consumer decides to re-raise it. It keeps
/// a structured cause chain instead of a foreign call stack: the failing
/// task, the message, where it was captured, the nested `source()` chain of
/// the original error and a backtrace snapshot taken at capture time.
///
/// Cloning is cheap; all clones share the same capture.
#[derive(Debug, Clone)]
pub struct DelayedException(Arc<Captured>);

#[derive(Debug)]
struct Captured {
    task: Arc<str>,
    kind: FailureKind,
    message: String,
    location: &'static Location<'static>,
    #[debug(skip)]
    error: Option<Arc<dyn Error + Send + Sync + 'static>>,
    cause: Option<DelayedException>,
    #[debug(skip)]
    backtrace: Backtrace,
}

impl DelayedException {
    /// Capture a failure described only by a message.
    #[track_caller]
    pub fn new(task: impl Into<Arc<str>>, message: impl Into<String>) -> Self {
        Self::capture(task.into(), FailureKind::Error, message.into(), None, None)
    }

    /// Capture an error returned by a unit of work.
    ///
    /// The `source()` chain of `error` is flattened into nested causes; the
    /// error itself stays reachable through [`Self::downcast_ref`].
    #[track_caller]
    pub fn from_error(task: impl Into<Arc<str>>, error: BoxError) -> Self {
        let task = task.into();
        let location = Location::caller();
        let mut messages = vec![];
        let mut source = error.source();
        while let Some(err) = source {
            messages.push(err.to_string());
            source = err.source();
        }
        let cause = messages.into_iter().rev().fold(None, |cause, message| {
            Some(Self(Arc::new(Captured {
                task: task.clone(),
                kind: FailureKind::Error,
                message,
                location,
                error: None,
                cause,
                backtrace: Backtrace::disabled(),
            })))
        });
        let message = error.to_string();
        Self::capture(task, FailureKind::Error, message, Some(error.into()), cause)
    }

    /// Capture the payload of a caught panic.
    #[track_caller]
    pub fn from_panic(task: impl Into<Arc<str>>, payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_owned()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "panicked with a non-string payload".to_owned()
        };
        Self::capture(task.into(), FailureKind::Panic, message, None, None)
    }

    #[track_caller]
    fn capture(
        task: Arc<str>,
        kind: FailureKind,
        message: String,
        error: Option<Arc<dyn Error + Send + Sync + 'static>>,
        cause: Option<Self>,
    ) -> Self {
        Self(Arc::new(Captured {
            task,
            kind,
            message,
            location: Location::caller(),
            error,
            cause,
            backtrace: Backtrace::capture(),
        }))
    }

    /// Name of the unit of work that failed.
    pub fn task(&self) -> &str {
        &self.0.task
    }

    pub fn kind(&self) -> FailureKind {
        self.0.kind
    }

    pub fn message(&self) -> &str {
        &self.0.message
    }

    /// Where the failure was captured.
    pub fn location(&self) -> &'static Location<'static> {
        self.0.location
    }

    pub fn cause(&self) -> Option<&Self> {
        self.0.cause.as_ref()
    }

    /// This failure followed by its nested causes, outermost first.
    pub fn causes(&self) -> impl Iterator<Item = &Self> {
        core::iter::successors(Some(self), |exc| Self::cause(exc))
    }

    pub fn backtrace(&self) -> &Backtrace {
        &self.0.backtrace
    }

    /// The original error, if it was captured from one and is an `E`.
    pub fn downcast_ref<E: Error + 'static>(&self) -> Option<&E> {
        self.0.error.as_deref()?.downcast_ref::<E>()
    }

    /// Whether two handles refer to the same capture.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Re-raise the captured failure in the consuming context.
    ///
    /// # Errors
    /// Always; the error wraps this failure.
    pub fn reraise<T>(&self) -> Result<T, GraphError> {
        Err(GraphError::Task(self.clone()))
    }

    /// Render a human readable report without raising.
    pub fn describe(&self) -> String {
        let mut out = String::new();
        let _ = write!(
            out,
            "unit of work `{}` failed ({}): {}\n    captured at {}",
            self.task(),
            self.kind(),
            self.message(),
            self.location()
        );
        for cause in self.causes().skip(1) {
            let _ = write!(out, "\ncaused by: {}", cause.message());
        }
        if self.backtrace().status() == BacktraceStatus::Captured {
            let _ = write!(out, "\nbacktrace:\n{}", self.backtrace());
        }
        out
    }
}

impl Display for DelayedException {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "unit of work `{}` failed: {}", self.task(), self.message())
    }
}

impl Error for DelayedException {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.0.cause.as_ref().map(|cause| cause as &(dyn Error + 'static))
    }
}
