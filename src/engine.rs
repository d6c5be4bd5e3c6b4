use crate::{
    config::EngineConfig,
    error::EngineError,
    sync::RwLock,
    task::Task,
    types::Outcome,
};
use core::fmt;
use derive_more::Debug;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::sync::Arc;

/// Where a unit of work is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, derive_more::Display)]
pub enum ExecutionMode {
    /// On the worker pool, or inline when the engine has no pool.
    #[default]
    #[display("pool")]
    Pool,
    /// Inline, in the thread that dispatches the work.
    #[display("local")]
    Local,
    /// Inline, but through exactly the job object that would be shipped to a
    /// pool worker, so a debugger can follow the pooled code path.
    #[display("debug")]
    Debug,
}

/// Dispatcher of units of work.
///
/// An engine owns an optional rayon worker pool. Every graph node holds a
/// handle to the engine it was built with, so several independently
/// configured engines can coexist in one process.
///
/// Failures of a unit of work never escape [`Engine::run`]: errors and panics
/// are captured as [`crate::exception::DelayedException`] and delivered
/// through the callback like any other result.
#[derive(Debug)]
pub struct Engine {
    thread_name: String,
    workers: RwLock<Workers>,
}

/// Worker count and the pool it describes, swapped together.
#[derive(Debug)]
struct Workers {
    count: usize,
    pool: Option<Arc<ThreadPool>>,
}

type Job = Box<dyn FnOnce() + Send + 'static>;

impl Engine {
    /// Build an engine from `config`.
    ///
    /// # Errors
    /// If the worker pool cannot be built.
    pub fn new(config: EngineConfig) -> Result<Arc<Self>, EngineError> {
        let count = config.resolved_workers();
        let pool = build_pool(count, &config.thread_name)?;
        tracing::info!(workers = count, "engine configured");
        Ok(Arc::new(Self {
            thread_name: config.thread_name,
            workers: RwLock::new(Workers { count, pool }),
        }))
    }

    /// An engine without a pool; everything runs in the calling thread.
    #[must_use]
    pub fn local() -> Arc<Self> {
        let EngineConfig { thread_name, .. } = EngineConfig::local();
        Arc::new(Self {
            thread_name,
            workers: RwLock::new(Workers {
                count: 0,
                pool: None,
            }),
        })
    }

    /// Shorthand for [`Engine::new`] with only the worker count set.
    ///
    /// # Errors
    /// If the worker pool cannot be built.
    pub fn with_workers(worker_count: isize) -> Result<Arc<Self>, EngineError> {
        Self::new(EngineConfig::with_workers(worker_count))
    }

    /// Replace the worker pool.
    ///
    /// `0` disables the pool; a negative count means "all cores minus
    /// `|worker_count|`". Work already submitted to the previous pool still
    /// runs to completion there, but nothing waits for it.
    ///
    /// # Errors
    /// If the new pool cannot be built; the old pool is kept in that case.
    pub fn configure(&self, worker_count: isize) -> Result<(), EngineError> {
        let count = EngineConfig::with_workers(worker_count).resolved_workers();
        let pool = build_pool(count, &self.thread_name)?;
        *self.workers.write().expect("Engine::configure") = Workers { count, pool };
        tracing::info!(workers = count, "engine reconfigured");
        Ok(())
    }

    /// Number of pool workers; zero when running locally.
    pub fn workers(&self) -> usize {
        self.workers.read().expect("Engine::workers").count
    }

    /// Run `task` according to `mode` and hand its outcome to `callback`.
    ///
    /// - [`ExecutionMode::Debug`] runs the job inline, through the same boxed
    ///   `Send + 'static` job the pool would receive;
    /// - [`ExecutionMode::Local`], or [`ExecutionMode::Pool`] without a pool,
    ///   runs inline;
    /// - [`ExecutionMode::Pool`] submits the job to the pool, and `callback`
    ///   is called on the worker that ran it.
    ///
    /// Inline modes call `callback` before returning.
    pub fn run<A, R>(
        &self,
        task: Task<A, R>,
        mode: ExecutionMode,
        callback: impl FnOnce(Outcome<R>) + Send + 'static,
    ) where
        A: fmt::Debug + Send + 'static,
        R: fmt::Debug + Send + 'static,
    {
        match mode {
            ExecutionMode::Debug => {
                let job: Job = Box::new(move || callback(task.execute(mode)));
                tracing::trace!("running transportable job inline");
                job();
            }
            ExecutionMode::Local => callback(task.execute(mode)),
            ExecutionMode::Pool => {
                let pool = self.workers.read().expect("Engine::run").pool.clone();
                match pool {
                    Some(pool) => {
                        let job: Job = Box::new(move || callback(task.execute(mode)));
                        pool.spawn(job);
                    }
                    None => callback(task.execute(ExecutionMode::Local)),
                }
            }
        }
    }
}

fn build_pool(workers: usize, thread_name: &str) -> Result<Option<Arc<ThreadPool>>, EngineError> {
    if workers == 0 {
        return Ok(None);
    }
    let prefix = thread_name.to_owned();
    let pool = ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(move |idx| format!("{prefix}-{idx}"))
        .build()?;
    Ok(Some(Arc::new(pool)))
}
