//! Bounded background task dispatcher
//!
//! An [`AsyncDispatcher`] owns a fixed number of worker loops spawned on a
//! [`Spawner`]. Work submitted through [`AsyncDispatcher::run_as_async`] is
//! queued on an unbounded channel and picked up by the next idle worker, so
//! at most `workers` units of work are in flight at any time.

use crate::{BoxedTask, Spawner};
use futures::FutureExt;
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use tracing::{debug, error};

/// Outcome of a background task that did not produce a value
#[derive(Debug, thiserror::Error)]
pub enum DispatchError<E> {
    /// The task returned an error
    #[error("{0}")]
    Task(E),

    /// The task panicked
    #[error("Background task panicked: {0}")]
    Panicked(String),

    /// The task was dropped before it reported an outcome
    #[error("Background task was dropped before it completed")]
    Dropped,
}

impl<E> DispatchError<E> {
    /// The task's own error, if that is what failed
    pub fn task_error(&self) -> Option<&E> {
        match self {
            DispatchError::Task(err) => Some(err),
            _ => None,
        }
    }
}

/// Errors raised when building a dispatcher
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// A pool needs at least one worker
    #[error("Dispatcher '{0}' needs at least one worker")]
    NoWorkers(String),
}

type SuccessCallback<T> = Box<dyn FnOnce(&T) + Send>;
type ErrorCallback<E> = Box<dyn FnOnce(&DispatchError<E>) + Send>;
type CompleteCallback = Box<dyn FnOnce() + Send>;

/// Optional hooks invoked when a background task finishes
///
/// `on_success` or `on_error` runs first, then `on_complete`.
pub struct TaskCallbacks<T, E> {
    on_success: Option<SuccessCallback<T>>,
    on_error: Option<ErrorCallback<E>>,
    on_complete: Option<CompleteCallback>,
}

impl<T, E> TaskCallbacks<T, E> {
    /// Callbacks that do nothing
    pub fn new() -> Self {
        Self {
            on_success: None,
            on_error: None,
            on_complete: None,
        }
    }

    /// Invoked with the task's value when it succeeds
    pub fn on_success(mut self, callback: impl FnOnce(&T) + Send + 'static) -> Self {
        self.on_success = Some(Box::new(callback));
        self
    }

    /// Invoked with the failure when the task errors or panics
    pub fn on_error(mut self, callback: impl FnOnce(&DispatchError<E>) + Send + 'static) -> Self {
        self.on_error = Some(Box::new(callback));
        self
    }

    /// Invoked after every outcome
    pub fn on_complete(mut self, callback: impl FnOnce() + Send + 'static) -> Self {
        self.on_complete = Some(Box::new(callback));
        self
    }
}

impl<T, E> Default for TaskCallbacks<T, E> {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to work scheduled on an [`AsyncDispatcher`]
pub struct ScheduledTask<T, E> {
    label: String,
    outcome: async_channel::Receiver<Result<T, DispatchError<E>>>,
}

impl<T, E> ScheduledTask<T, E> {
    /// Label the task was scheduled with
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Whether the task has already reported its outcome
    pub fn is_finished(&self) -> bool {
        !self.outcome.is_empty() || self.outcome.is_closed()
    }

    /// Wait for the task to finish and take its outcome
    pub async fn get_result(self) -> Result<T, DispatchError<E>> {
        match self.outcome.recv().await {
            Ok(outcome) => outcome,
            Err(_) => Err(DispatchError::Dropped),
        }
    }

    /// Block the current thread until the task finishes
    ///
    /// Intended for synchronous callers. Calling this from a dispatcher
    /// worker of the same pool can deadlock.
    pub fn wait(self) -> Result<T, DispatchError<E>> {
        futures::executor::block_on(self.get_result())
    }
}

impl<T, E> fmt::Debug for ScheduledTask<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduledTask")
            .field("label", &self.label)
            .field("finished", &self.is_finished())
            .finish()
    }
}

/// Fixed-size pool of workers running background tasks
pub struct AsyncDispatcher {
    name: String,
    workers: usize,
    queue: async_channel::Sender<BoxedTask>,
}

impl AsyncDispatcher {
    /// Create a dispatcher with `workers` worker loops spawned on `spawner`
    pub fn new(
        name: impl Into<String>,
        workers: usize,
        spawner: &dyn Spawner,
    ) -> Result<Self, PoolError> {
        let name = name.into();
        if workers == 0 {
            return Err(PoolError::NoWorkers(name));
        }

        let (queue, backlog) = async_channel::unbounded::<BoxedTask>();

        for index in 0..workers {
            let backlog = backlog.clone();
            let pool = name.clone();
            spawner.spawn(Box::pin(async move {
                debug!("Dispatcher {} worker {} started", pool, index);
                while let Ok(job) = backlog.recv().await {
                    job.await;
                }
                debug!("Dispatcher {} worker {} stopped", pool, index);
            }));
        }

        Ok(Self {
            name,
            workers,
            queue,
        })
    }

    /// Name used in log output
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of workers in the pool
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Number of tasks waiting for a free worker
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Stop accepting work; workers exit once the backlog drains
    pub fn close(&self) {
        self.queue.close();
    }

    /// Schedule `task` to run exactly once on a worker
    ///
    /// Returns immediately. Failures are logged before the callbacks run.
    pub fn run_as_async<T, E, F>(
        &self,
        label: impl Into<String>,
        task: F,
        callbacks: TaskCallbacks<T, E>,
    ) -> ScheduledTask<T, E>
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: fmt::Display + fmt::Debug + Send + 'static,
    {
        let label = label.into();
        let (report, outcome) = async_channel::bounded(1);
        let pool = self.name.clone();
        let task_label = label.clone();

        let job = async move {
            let result = match AssertUnwindSafe(task).catch_unwind().await {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(err)) => {
                    error!(
                        "Task '{}' on dispatcher {} failed: {} ({:?})",
                        task_label, pool, err, err
                    );
                    Err(DispatchError::Task(err))
                }
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    error!(
                        "Task '{}' on dispatcher {} panicked: {}",
                        task_label, pool, message
                    );
                    Err(DispatchError::Panicked(message))
                }
            };

            let TaskCallbacks {
                on_success,
                on_error,
                on_complete,
            } = callbacks;
            match &result {
                Ok(value) => {
                    if let Some(callback) = on_success {
                        callback(value);
                    }
                }
                Err(err) => {
                    if let Some(callback) = on_error {
                        callback(err);
                    }
                }
            }
            if let Some(callback) = on_complete {
                callback();
            }

            // The caller may have dropped the handle
            let _ = report.send(result).await;
        };

        if let Err(rejected) = self.queue.try_send(Box::pin(job)) {
            error!(
                "Dispatcher {} is closed, task '{}' was not scheduled",
                self.name, label
            );
            drop(rejected);
        }

        ScheduledTask { label, outcome }
    }
}

impl fmt::Debug for AsyncDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncDispatcher")
            .field("name", &self.name)
            .field("workers", &self.workers)
            .field("queued", &self.queued())
            .finish()
    }
}

/// Message carried by a panic payload
pub fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
