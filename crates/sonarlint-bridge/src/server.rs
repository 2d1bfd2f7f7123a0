//! Listener lifecycle.
//!
//! [`BridgeServer::start`] negotiates a port and starts a small pool of worker
//! threads that share the listener. Startup never fails: when no port is free
//! the server comes up disabled and reports no port.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tiny_http::Server;
use tracing::{debug, info, warn};

use crate::config::BridgeConfig;
use crate::dispatch::UiDispatcher;
use crate::model::ShowFindingRequest;
use crate::ports::bind_first_available;
use crate::resolve::FindingResolver;
use crate::services::Services;
use crate::task::{self, BackgroundTasks};
use crate::web;

const POLL_INTERVAL: Duration = Duration::from_millis(200);
const SHOW_TASK: &str = "show-finding";

/// Everything request handlers need, shared by every worker.
#[derive(Debug)]
pub struct BridgeState {
    /// Listener settings.
    pub config: BridgeConfig,
    /// Injected collaborators.
    pub services: Services,
    /// Route to the UI thread.
    pub ui: UiDispatcher,
    resolver: Arc<FindingResolver>,
    tasks: BackgroundTasks,
}

impl BridgeState {
    /// Shared state; the resolver is built from `services` and `ui`.
    #[must_use]
    pub fn new(config: BridgeConfig, services: Services, ui: UiDispatcher) -> Arc<Self> {
        let resolver = Arc::new(FindingResolver::new(services.clone(), ui.clone()));
        Arc::new(Self {
            config,
            services,
            ui,
            resolver,
            tasks: BackgroundTasks::new(),
        })
    }

    /// Resolver shared by every show-finding task.
    #[must_use]
    pub fn resolver(&self) -> &Arc<FindingResolver> {
        &self.resolver
    }

    /// Show-finding tasks started so far.
    #[must_use]
    pub fn tasks(&self) -> &BackgroundTasks {
        &self.tasks
    }

    /// Resolve `request` on its own background task.
    pub(crate) fn schedule(&self, request: ShowFindingRequest) {
        let resolver = self.resolver.clone();
        let finding = request.finding_key.clone();
        match task::spawn(SHOW_TASK, move |cancel| resolver.run(&request, cancel)) {
            Ok(handle) => self.tasks.track(handle),
            Err(err) => warn!(%finding, "cannot start show-finding task: {err}"),
        }
    }
}

/// The running (or disabled) loopback listener.
pub struct BridgeServer {
    state: Arc<BridgeState>,
    listener: Option<Arc<Server>>,
    port: Option<u16>,
    stop: Arc<AtomicBool>,
    workers: Vec<JoinHandle<()>>,
}

impl std::fmt::Debug for BridgeServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeServer")
            .field("port", &self.port)
            .field("workers", &self.workers.len())
            .finish_non_exhaustive()
    }
}

impl BridgeServer {
    /// Bind the first free port of the configured window and start serving.
    #[must_use]
    pub fn start(state: Arc<BridgeState>) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let Some(bound) = bind_first_available(state.config.ports) else {
            return Self {
                state,
                listener: None,
                port: None,
                stop,
                workers: Vec::new(),
            };
        };
        let port = bound.port();
        let listener = Arc::new(bound.server);

        let mut workers = Vec::with_capacity(state.config.workers);
        for index in 0..state.config.workers {
            let server = listener.clone();
            let worker_state = state.clone();
            let worker_stop = stop.clone();
            let spawned = thread::Builder::new()
                .name(format!("bridge-http-{index}"))
                .spawn(move || serve(&server, &worker_state, &worker_stop));
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(err) => warn!(index, "failed to start bridge worker: {err}"),
            }
        }
        if workers.is_empty() {
            warn!(port, "no bridge worker could start, local bridge disabled");
            return Self {
                state,
                listener: None,
                port: None,
                stop,
                workers,
            };
        }

        info!(port, workers = workers.len(), "local bridge listening on 127.0.0.1");
        Self {
            state,
            listener: Some(listener),
            port: Some(port),
            stop,
            workers,
        }
    }

    /// Whether a port was bound and the listener is still open.
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.listener.is_some()
    }

    /// Bound port, `None` when disabled or shut down.
    #[must_use]
    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// State shared with the workers.
    #[must_use]
    pub fn state(&self) -> &Arc<BridgeState> {
        &self.state
    }

    /// Close the listener right away. In-flight requests and show-finding
    /// tasks are abandoned, not drained.
    pub fn shutdown(&mut self) {
        let Some(listener) = self.listener.take() else {
            return;
        };
        self.stop.store(true, Ordering::SeqCst);
        for _ in &self.workers {
            listener.unblock();
        }
        self.state.tasks.cancel_all();
        self.workers.clear();
        self.port = None;
        info!("local bridge stopped");
    }
}

impl Drop for BridgeServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn serve(server: &Server, state: &BridgeState, stop: &AtomicBool) {
    while !stop.load(Ordering::SeqCst) {
        match server.recv_timeout(POLL_INTERVAL) {
            Ok(Some(request)) => web::handle_request(request, state),
            Ok(None) => {}
            Err(err) => {
                debug!("bridge accept failed: {err}");
                thread::sleep(POLL_INTERVAL);
            }
        }
    }
    debug!("bridge worker exiting");
}
