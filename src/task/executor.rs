//! Shared worker pool and task handles.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crossbeam::channel::{self, Receiver};

use super::Task;
use crate::{EngineError, Result};

/// Runs tasks on one rayon pool reused across invocations.
///
/// Work below `threshold` elements runs inline in the calling thread. Work
/// submitted from a worker of this pool also runs inline, so a coordinator
/// running on the pool never blocks a worker on its own sub-tasks.
#[derive(Clone)]
pub struct TaskExecutor {
    pool: Arc<rayon::ThreadPool>,
    threshold: usize,
}

impl TaskExecutor {
    pub fn new(num_threads: Option<usize>, threshold: usize) -> Result<Self> {
        let mut builder = rayon::ThreadPoolBuilder::new()
            .thread_name(|i| format!("ndengine-worker-{i}"));
        if let Some(n) = num_threads {
            builder = builder.num_threads(n);
        }
        let pool = builder.build()?;
        tracing::debug!(
            threads = pool.current_num_threads(),
            threshold,
            "worker pool started"
        );
        Ok(Self {
            pool: Arc::new(pool),
            threshold,
        })
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn num_threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Whether the calling thread is a worker of this pool.
    pub fn on_worker(&self) -> bool {
        self.pool.current_thread_index().is_some()
    }

    /// Whether work over `elements` elements should be dispatched asynchronously.
    pub fn should_dispatch(&self, elements: usize) -> bool {
        elements >= self.threshold && !self.on_worker()
    }

    /// Queues `task` on the pool.
    ///
    /// Panics inside the task surface as [`EngineError::TaskFailed`] when the
    /// handle is awaited.
    pub fn execute_async<T: Task>(&self, mut task: T) -> TaskHandle<T::Output> {
        if self.on_worker() {
            return TaskHandle::ready(run_guarded(&mut task));
        }
        let (tx, rx) = channel::bounded(1);
        self.pool.spawn(move || {
            // The receiver may be gone if a sibling failed first.
            let _ = tx.send(run_guarded(&mut task));
        });
        TaskHandle {
            state: HandleState::Pending(rx),
        }
    }

    /// Dispatches `task` when `elements` reaches the threshold, otherwise runs
    /// it to completion before returning.
    pub fn execute<T: Task>(&self, mut task: T, elements: usize) -> TaskHandle<T::Output> {
        if self.should_dispatch(elements) {
            tracing::trace!(elements, "dispatching task");
            self.execute_async(task)
        } else {
            TaskHandle::ready(task.call())
        }
    }

    /// Runs `f` inside the pool, so rayon parallel iterators use its workers.
    pub fn install<R, F>(&self, f: F) -> R
    where
        F: FnOnce() -> R + Send,
        R: Send,
    {
        self.pool.install(f)
    }
}

impl fmt::Debug for TaskExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskExecutor")
            .field("threads", &self.pool.current_num_threads())
            .field("threshold", &self.threshold)
            .finish()
    }
}

fn run_guarded<T: Task>(task: &mut T) -> Result<T::Output> {
    match panic::catch_unwind(AssertUnwindSafe(|| task.call())) {
        Ok(result) => result,
        Err(payload) => Err(EngineError::TaskFailed(panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "task panicked".to_string()
    }
}

/// Pending or completed result of a task.
pub struct TaskHandle<O> {
    state: HandleState<O>,
}

enum HandleState<O> {
    Ready(Result<O>),
    Pending(Receiver<Result<O>>),
}

impl<O> TaskHandle<O> {
    pub fn ready(result: Result<O>) -> Self {
        Self {
            state: HandleState::Ready(result),
        }
    }

    pub fn is_complete(&self) -> bool {
        match &self.state {
            HandleState::Ready(_) => true,
            HandleState::Pending(rx) => !rx.is_empty(),
        }
    }

    /// Waits for the task and returns its result.
    pub fn block_until_complete(self) -> Result<O> {
        match self.state {
            HandleState::Ready(result) => result,
            HandleState::Pending(rx) => rx.recv().map_err(|_| EngineError::TaskDisconnected)?,
        }
    }
}

impl<O> fmt::Debug for TaskHandle<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("complete", &self.is_complete())
            .finish()
    }
}

/// Awaits every handle in order.
///
/// The first error is returned as soon as it is observed; the remaining tasks
/// still run to completion but their results are discarded.
pub fn join_all<O>(handles: Vec<TaskHandle<O>>) -> Result<Vec<O>> {
    let mut out = Vec::with_capacity(handles.len());
    for handle in handles {
        out.push(handle.block_until_complete()?);
    }
    Ok(out)
}
