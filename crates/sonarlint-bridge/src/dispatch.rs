//! UI-thread dispatch primitives.
//!
//! Presentation state (markers, editors, dialogs) belongs to a single UI thread.
//! Other threads never touch it directly: they hand closures to a
//! [`UiDispatcher`], and whichever thread drives the matching [`UiLoop`] runs them
//! in submission order.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use parking_lot::Mutex;
use tracing::{debug, error};

use crate::error::{BridgeError, DispatchError};

type UiJob = Box<dyn FnOnce() + Send + 'static>;

/// Create a connected dispatcher/loop pair.
#[must_use]
pub fn ui_channel() -> (UiDispatcher, UiLoop) {
    let (tx, rx) = crossbeam_channel::unbounded();
    let owner = Arc::new(Mutex::new(None));
    (
        UiDispatcher {
            tx,
            owner: owner.clone(),
        },
        UiLoop { rx, owner },
    )
}

/// Handle used by non-UI threads to run work on the UI thread.
#[derive(Clone)]
pub struct UiDispatcher {
    tx: Sender<UiJob>,
    owner: Arc<Mutex<Option<ThreadId>>>,
}

impl std::fmt::Debug for UiDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UiDispatcher")
            .field("owner", &*self.owner.lock())
            .field("pending", &self.tx.len())
            .finish()
    }
}

impl UiDispatcher {
    /// Whether the calling thread is the one driving the UI loop.
    #[must_use]
    pub fn is_ui_thread(&self) -> bool {
        *self.owner.lock() == Some(thread::current().id())
    }

    /// Run `job` on the UI thread and wait for its result.
    ///
    /// Waits as long as the UI thread is alive; interactive prompts go through
    /// here and may take as long as the user needs.
    pub fn run_blocking<R, F>(&self, job: F) -> Result<R, DispatchError>
    where
        R: Send + 'static,
        F: FnOnce() -> R + Send + 'static,
    {
        let rx = self.submit_for_result(job)?;
        rx.recv().map_err(|_| DispatchError::Unavailable)
    }

    /// Run `job` on the UI thread and wait at most `timeout` for its result.
    ///
    /// On timeout the job stays queued and still runs later; its result is
    /// discarded.
    pub fn run_blocking_timeout<R, F>(&self, job: F, timeout: Duration) -> Result<R, DispatchError>
    where
        R: Send + 'static,
        F: FnOnce() -> R + Send + 'static,
    {
        let rx = self.submit_for_result(job)?;
        rx.recv_timeout(timeout).map_err(|err| match err {
            RecvTimeoutError::Timeout => DispatchError::TimedOut,
            RecvTimeoutError::Disconnected => DispatchError::Unavailable,
        })
    }

    /// Queue `job` on the UI thread without waiting.
    pub fn run_async<F>(&self, job: F) -> Result<(), DispatchError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.tx
            .send(Box::new(job))
            .map_err(|_| DispatchError::Unavailable)
    }

    fn submit_for_result<R, F>(&self, job: F) -> Result<Receiver<R>, DispatchError>
    where
        R: Send + 'static,
        F: FnOnce() -> R + Send + 'static,
    {
        if self.is_ui_thread() {
            return Err(DispatchError::Reentrant);
        }
        let (result_tx, result_rx) = crossbeam_channel::bounded(1);
        self.run_async(move || {
            let _ = result_tx.send(job());
        })?;
        Ok(result_rx)
    }
}

/// Receiving end of the dispatch bridge, driven by the UI thread.
pub struct UiLoop {
    rx: Receiver<UiJob>,
    owner: Arc<Mutex<Option<ThreadId>>>,
}

impl std::fmt::Debug for UiLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UiLoop")
            .field("pending", &self.rx.len())
            .finish()
    }
}

impl UiLoop {
    /// Run jobs on the current thread until every dispatcher is dropped.
    pub fn run(self) {
        self.claim();
        while let Ok(job) = self.rx.recv() {
            run_job(job);
        }
        debug!("UI loop finished");
        *self.owner.lock() = None;
    }

    /// Run the jobs queued right now without blocking; returns how many ran.
    ///
    /// For hosts that already own an event loop and pump the bridge from it.
    pub fn pump(&self) -> usize {
        self.claim();
        let mut ran = 0;
        loop {
            match self.rx.try_recv() {
                Ok(job) => {
                    run_job(job);
                    ran += 1;
                }
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => return ran,
            }
        }
    }

    /// Drive the loop on a dedicated, named thread.
    pub fn spawn(self, name: &str) -> Result<JoinHandle<()>, BridgeError> {
        thread::Builder::new()
            .name(name.to_string())
            .spawn(move || self.run())
            .map_err(|err| BridgeError::Spawn {
                name: name.into(),
                reason: err.to_string().into(),
            })
    }

    fn claim(&self) {
        let mut owner = self.owner.lock();
        let current = thread::current().id();
        if owner.is_some_and(|id| id != current) {
            debug!("UI loop moved to another thread");
        }
        *owner = Some(current);
    }
}

fn run_job(job: UiJob) {
    if catch_unwind(AssertUnwindSafe(job)).is_err() {
        error!("UI job panicked");
    }
}
