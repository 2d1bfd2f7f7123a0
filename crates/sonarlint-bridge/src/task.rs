//! Cancellable background tasks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError};
use parking_lot::Mutex;
use smol_str::SmolStr;
use tracing::debug;

use crate::error::BridgeError;

const IDLE_POLL: Duration = Duration::from_millis(10);

/// Cooperative cancellation flag shared between a task and its owner.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Fresh, not cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether `cancel` has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// The task ended without producing a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskError {
    /// The task body panicked or was dropped.
    Aborted,
    /// `wait_timeout` gave up.
    TimedOut,
}

/// Owner side of a background task: cancellation plus a completion future.
#[derive(Debug)]
pub struct TaskHandle<T> {
    name: SmolStr,
    token: CancellationToken,
    finished: Arc<AtomicBool>,
    done: Receiver<T>,
}

impl<T> TaskHandle<T> {
    /// Thread name the task runs under.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Token observed by the task body.
    #[must_use]
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Ask the task to stop at its next checkpoint.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether the task body has returned (or unwound).
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    /// Block until the task produces its value.
    pub fn wait(self) -> Result<T, TaskError> {
        self.done.recv().map_err(|_| TaskError::Aborted)
    }

    /// Block at most `timeout` for the task's value.
    pub fn wait_timeout(self, timeout: Duration) -> Result<T, TaskError> {
        self.done.recv_timeout(timeout).map_err(|err| match err {
            RecvTimeoutError::Timeout => TaskError::TimedOut,
            RecvTimeoutError::Disconnected => TaskError::Aborted,
        })
    }
}

impl<T: Send + 'static> TaskHandle<T> {
    /// A handle that is already complete, for collaborators that finish
    /// synchronously.
    #[must_use]
    pub fn ready(name: &str, value: T) -> Self {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let _ = tx.send(value);
        Self {
            name: name.into(),
            token: CancellationToken::new(),
            finished: Arc::new(AtomicBool::new(true)),
            done: rx,
        }
    }
}

struct FinishGuard(Arc<AtomicBool>);

impl Drop for FinishGuard {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Run `body` on a new named thread.
pub fn spawn<T, F>(name: &str, body: F) -> Result<TaskHandle<T>, BridgeError>
where
    T: Send + 'static,
    F: FnOnce(&CancellationToken) -> T + Send + 'static,
{
    let token = CancellationToken::new();
    let finished = Arc::new(AtomicBool::new(false));
    let (tx, rx) = crossbeam_channel::bounded(1);
    let task_token = token.clone();
    let guard = FinishGuard(finished.clone());
    thread::Builder::new()
        .name(name.to_string())
        .spawn(move || {
            let _guard = guard;
            let value = body(&task_token);
            let _ = tx.send(value);
        })
        .map_err(|err| BridgeError::Spawn {
            name: name.into(),
            reason: err.to_string().into(),
        })?;
    Ok(TaskHandle {
        name: name.into(),
        token,
        finished,
        done: rx,
    })
}

/// Tasks started on behalf of the listener.
#[derive(Debug, Default)]
pub struct BackgroundTasks {
    tasks: Mutex<Vec<TaskHandle<()>>>,
}

impl BackgroundTasks {
    /// Empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep `handle` for later cancellation; forgets tasks that already ended.
    pub fn track(&self, handle: TaskHandle<()>) {
        let mut tasks = self.tasks.lock();
        tasks.retain(|task| !task.is_finished());
        tasks.push(handle);
    }

    /// Number of tracked tasks still running.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.tasks
            .lock()
            .iter()
            .filter(|task| !task.is_finished())
            .count()
    }

    /// Signal every running task to stop. Does not wait for them.
    pub fn cancel_all(&self) {
        let tasks = self.tasks.lock();
        for task in tasks.iter().filter(|task| !task.is_finished()) {
            debug!(task = task.name(), "cancelling background task");
            task.cancel();
        }
    }

    /// Wait until no tracked task is running; `false` on timeout.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.in_flight() == 0 {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(IDLE_POLL);
        }
    }
}
