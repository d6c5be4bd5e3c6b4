use crate::{
    engine::{Engine, ExecutionMode},
    exception::{BoxError, DelayedException},
    types::Outcome,
    utils::{ABBREVIATE_LIMIT, abbreviate},
};
use core::{fmt, panic::AssertUnwindSafe};
use derive_more::Debug;
use std::{panic, sync::Arc};

/// Shared, thread-safe reference to a user function.
pub type TaskFn<A, R> = Arc<dyn Fn(A) -> Result<R, BoxError> + Send + Sync>;

/// A single unit of work: a named function reference plus its arguments.
///
/// A `Task` is plain data that can be moved to a worker thread as is, so
/// the same descriptor is used for pooled, local and debug execution.
#[must_use]
#[derive(Debug)]
pub struct Task<A, R> {
    name: Arc<str>,
    #[debug(skip)]
    func: TaskFn<A, R>,
    args: A,
}

impl<A, R> Task<A, R>
where
    A: fmt::Debug,
    R: fmt::Debug,
{
    pub fn new(name: impl Into<Arc<str>>, func: TaskFn<A, R>, args: A) -> Self {
        Self {
            name: name.into(),
            func,
            args,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn args(&self) -> &A {
        &self.args
    }

    /// Call the function, turning both returned errors and panics into a
    /// [`DelayedException`]. Never panics itself.
    pub(crate) fn execute(self, mode: ExecutionMode) -> Outcome<R> {
        let Self { name, func, args } = self;
        tracing::debug!(
            task = %name,
            %mode,
            args = %abbreviate(&args, ABBREVIATE_LIMIT),
            "unit of work started"
        );
        let outcome = match panic::catch_unwind(AssertUnwindSafe(|| func(args))) {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(error)) => Err(DelayedException::from_error(name.clone(), error)),
            Err(payload) => Err(DelayedException::from_panic(name.clone(), payload)),
        };
        match &outcome {
            Ok(result) => tracing::debug!(
                task = %name,
                result = %abbreviate(result, ABBREVIATE_LIMIT),
                "unit of work finished"
            ),
            Err(exc) => tracing::warn!(task = %name, failure = %exc.describe(), "unit of work failed"),
        }
        outcome
    }
}

/// A user function bound to the engine and execution policy that run it.
///
/// Graph nodes hold a `Routine` and turn it into one [`Task`] per set of
/// assembled arguments.
#[derive(Debug)]
pub(crate) struct Routine<A, R> {
    pub(crate) name: Arc<str>,
    #[debug(skip)]
    pub(crate) func: TaskFn<A, R>,
    pub(crate) mode: ExecutionMode,
    pub(crate) engine: Arc<Engine>,
}

impl<A, R> Clone for Routine<A, R> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            func: self.func.clone(),
            mode: self.mode,
            engine: self.engine.clone(),
        }
    }
}

impl<A, R> Routine<A, R>
where
    A: fmt::Debug + Send + 'static,
    R: fmt::Debug + Send + 'static,
{
    /// Dispatch one invocation with `args`; `callback` receives the outcome.
    pub(crate) fn launch(&self, args: A, callback: impl FnOnce(Outcome<R>) + Send + 'static) {
        let task = Task::new(self.name.clone(), self.func.clone(), args);
        self.engine.run(task, self.mode, callback);
    }
}
