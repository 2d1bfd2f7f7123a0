#![allow(dead_code)]

use std::collections::HashMap;
use std::fs;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use sonarlint_bridge::model::{
    BoundProject, Connection, FetchedFinding, LocalFile, Marker, MarkerId, MarkerOffsets,
    Notification, ProjectBinding, ProjectRef, ShowFindingRequest, TextRange,
};
use sonarlint_bridge::ports::PORT_RANGE_LEN;
use sonarlint_bridge::services::{
    BindingService, ConnectionRegistry, FileResolver, FindingFetcher, Presenter, Prompts,
    WorkspaceIdentity,
};
use sonarlint_bridge::task::TaskHandle;
use sonarlint_bridge::{
    ui_channel, BridgeConfig, BridgeServer, BridgeState, FetchError, PresentationError, Services,
    UiDispatcher,
};

pub const SERVER_URL: &str = "https://sonar.example.com";
pub const PROJECT_KEY: &str = "org:app";
pub const FINDING_KEY: &str = "AXhotspot1";
pub const FILE_PATH: &str = "src/Main.java";
pub const WORKSPACE_TOKEN: &str = "workspace-7f3a";
pub const UI_THREAD: &str = "ui";

pub const SOURCE: &str = "class Main {\n    String password = \"hunter2\";\n}\n";

pub fn password_range() -> TextRange {
    TextRange::new(2, 11, 2, 19)
}

// ---------------------------------------------------------------------------
// Fake collaborators
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeRegistry {
    connections: Mutex<Vec<Connection>>,
}

impl FakeRegistry {
    pub fn with(connections: Vec<Connection>) -> Self {
        Self {
            connections: Mutex::new(connections),
        }
    }

    pub fn add(&self, connection: Connection) {
        self.connections.lock().push(connection);
    }
}

impl ConnectionRegistry for FakeRegistry {
    fn find_by_url(&self, url: &str) -> Vec<Connection> {
        self.connections
            .lock()
            .iter()
            .filter(|connection| connection.matches_url(url))
            .cloned()
            .collect()
    }

    fn all(&self) -> Vec<Connection> {
        self.connections.lock().clone()
    }
}

/// Answers per connection id; unknown connections report the finding missing.
#[derive(Default)]
pub struct FakeFetcher {
    outcomes: Mutex<HashMap<String, Result<FetchedFinding, FetchError>>>,
    calls: Mutex<Vec<String>>,
}

impl FakeFetcher {
    pub fn answer(&self, connection_id: &str, outcome: Result<FetchedFinding, FetchError>) {
        self.outcomes
            .lock()
            .insert(connection_id.to_string(), outcome);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

impl FindingFetcher for FakeFetcher {
    fn fetch_finding(
        &self,
        connection: &Connection,
        finding_key: &str,
        _project_key: &str,
    ) -> Result<FetchedFinding, FetchError> {
        self.calls.lock().push(connection.id.clone());
        match self.outcomes.lock().get(&connection.id) {
            Some(Ok(template)) => Ok(FetchedFinding {
                origin: connection.clone(),
                key: finding_key.to_string(),
                ..template.clone()
            }),
            Some(Err(err)) => Err(err.clone()),
            None => Err(FetchError::NotFound(finding_key.to_string())),
        }
    }
}

#[derive(Default)]
pub struct FakeBindings {
    bound: Mutex<Vec<BoundProject>>,
    created: Mutex<Vec<(String, ProjectRef, String)>>,
    failure: Mutex<Option<String>>,
}

impl FakeBindings {
    pub fn bind(&self, connection_id: &str, project: ProjectRef, project_key: &str) {
        self.bound.lock().push(BoundProject {
            project,
            binding: ProjectBinding::new(connection_id, project_key),
        });
    }

    pub fn fail_with(&self, reason: &str) {
        *self.failure.lock() = Some(reason.to_string());
    }

    pub fn created(&self) -> Vec<(String, ProjectRef, String)> {
        self.created.lock().clone()
    }
}

impl BindingService for FakeBindings {
    fn find_bound_projects(&self, connection_id: &str, project_key: &str) -> Vec<BoundProject> {
        self.bound
            .lock()
            .iter()
            .filter(|bound| {
                bound.binding.connection_id == connection_id
                    && bound.binding.project_key == project_key
            })
            .cloned()
            .collect()
    }

    fn create_binding(
        &self,
        connection_id: &str,
        projects: &[ProjectRef],
        project_key: &str,
    ) -> TaskHandle<Result<(), String>> {
        if let Some(reason) = self.failure.lock().clone() {
            return TaskHandle::ready("bind", Err(reason));
        }
        for project in projects {
            self.created.lock().push((
                connection_id.to_string(),
                project.clone(),
                project_key.to_string(),
            ));
            self.bind(connection_id, project.clone(), project_key);
        }
        TaskHandle::ready("bind", Ok(()))
    }
}

/// Server paths are relative to the project root.
#[derive(Default)]
pub struct FakeFiles;

impl FileResolver for FakeFiles {
    fn resolve_server_path(&self, bound: &BoundProject, server_path: &str) -> Option<LocalFile> {
        let path = bound.project.root.join(server_path);
        path.is_file().then(|| LocalFile {
            project: bound.project.clone(),
            path,
        })
    }
}

#[derive(Default)]
pub struct FakePrompts {
    connection: Mutex<Option<Connection>>,
    project: Mutex<Option<ProjectRef>>,
    calls: Mutex<Vec<(String, Option<String>)>>,
}

impl FakePrompts {
    pub fn accept_connection(&self, connection: Connection) {
        *self.connection.lock() = Some(connection);
    }

    pub fn pick(&self, project: ProjectRef) {
        *self.project.lock() = Some(project);
    }

    /// Prompt name together with the name of the thread it ran on.
    pub fn calls(&self) -> Vec<(String, Option<String>)> {
        self.calls.lock().clone()
    }

    fn record(&self, name: &str) {
        self.calls
            .lock()
            .push((name.to_string(), thread::current().name().map(str::to_owned)));
    }
}

impl Prompts for FakePrompts {
    fn create_connection(&self, _server_url: &str) -> Option<Connection> {
        self.record("create_connection");
        self.connection.lock().clone()
    }

    fn pick_project(&self, _connection: &Connection, _project_key: &str) -> Option<ProjectRef> {
        self.record("pick_project");
        self.project.lock().clone()
    }
}

#[derive(Default)]
pub struct FakePresenter {
    next_id: AtomicU64,
    live: Mutex<Vec<Marker>>,
    events: Mutex<Vec<String>>,
    details: Mutex<Vec<(String, Option<MarkerId>)>>,
    notifications: Mutex<Vec<Notification>>,
    fail_markers: AtomicBool,
    off_ui_calls: AtomicUsize,
}

impl FakePresenter {
    pub fn fail_markers(&self) {
        self.fail_markers.store(true, Ordering::SeqCst);
    }

    pub fn live_markers(&self) -> Vec<Marker> {
        self.live.lock().clone()
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    pub fn details(&self) -> Vec<(String, Option<MarkerId>)> {
        self.details.lock().clone()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.notifications.lock().clone()
    }

    /// Presenter calls made from any thread other than the UI thread.
    pub fn off_ui_calls(&self) -> usize {
        self.off_ui_calls.load(Ordering::SeqCst)
    }

    fn record(&self, event: String) {
        if thread::current().name() != Some(UI_THREAD) {
            self.off_ui_calls.fetch_add(1, Ordering::SeqCst);
        }
        self.events.lock().push(event);
    }
}

impl Presenter for FakePresenter {
    fn bring_to_front(&self) {
        self.record("bring_to_front".to_string());
    }

    fn create_marker(
        &self,
        file: &LocalFile,
        message: &str,
        line: Option<u32>,
        offsets: Option<MarkerOffsets>,
    ) -> Result<Marker, PresentationError> {
        self.record("create_marker".to_string());
        if self.fail_markers.load(Ordering::SeqCst) {
            return Err(PresentationError::new("marker storage is read-only"));
        }
        let marker = Marker {
            id: MarkerId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1),
            file: file.clone(),
            message: message.to_string(),
            line,
            offsets,
        };
        self.live.lock().push(marker.clone());
        Ok(marker)
    }

    fn delete_marker(&self, marker: &Marker) -> Result<(), PresentationError> {
        self.record(format!("delete_marker {}", marker.id.0));
        let mut live = self.live.lock();
        let before = live.len();
        live.retain(|existing| existing.id != marker.id);
        if live.len() == before {
            return Err(PresentationError::new("unknown marker"));
        }
        Ok(())
    }

    fn open_editor_at(&self, marker: &Marker) -> Result<(), PresentationError> {
        self.record(format!("open_editor {}", marker.id.0));
        Ok(())
    }

    fn show_details(&self, finding: &FetchedFinding, marker: Option<&Marker>) {
        self.record("show_details".to_string());
        self.details
            .lock()
            .push((finding.key.clone(), marker.map(|marker| marker.id)));
    }

    fn notify(&self, notification: Notification) {
        self.record("notify".to_string());
        self.notifications.lock().push(notification);
    }
}

pub struct FakeWorkspace;

impl WorkspaceIdentity for FakeWorkspace {
    fn workspace_token(&self) -> String {
        WORKSPACE_TOKEN.to_string()
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub registry: Arc<FakeRegistry>,
    pub fetcher: Arc<FakeFetcher>,
    pub bindings: Arc<FakeBindings>,
    pub prompts: Arc<FakePrompts>,
    pub presenter: Arc<FakePresenter>,
    pub ui: UiDispatcher,
}

impl Harness {
    /// Fakes plus a UI loop running on its own thread.
    pub fn new(connections: Vec<Connection>) -> Self {
        let (ui, ui_loop) = ui_channel();
        ui_loop.spawn(UI_THREAD).expect("spawn ui loop");
        Self::with_dispatcher(connections, ui)
    }

    /// Fakes wired to `ui`; the caller decides who drives the loop.
    pub fn with_dispatcher(connections: Vec<Connection>, ui: UiDispatcher) -> Self {
        Self {
            registry: Arc::new(FakeRegistry::with(connections)),
            fetcher: Arc::new(FakeFetcher::default()),
            bindings: Arc::new(FakeBindings::default()),
            prompts: Arc::new(FakePrompts::default()),
            presenter: Arc::new(FakePresenter::default()),
            ui,
        }
    }

    pub fn services(&self) -> Services {
        Services {
            connections: self.registry.clone(),
            fetcher: self.fetcher.clone(),
            bindings: self.bindings.clone(),
            files: Arc::new(FakeFiles),
            prompts: self.prompts.clone(),
            presenter: self.presenter.clone(),
            workspace: Arc::new(FakeWorkspace),
        }
    }

    /// Wait until every job queued on the UI thread so far has run.
    pub fn flush_ui(&self) {
        self.ui.run_blocking(|| ()).expect("flush ui queue");
    }

    pub fn start_bridge(&self, config: BridgeConfig) -> BridgeServer {
        let state = BridgeState::new(config, self.services(), self.ui.clone());
        BridgeServer::start(state)
    }
}

pub fn sonar(id: &str) -> Connection {
    Connection::new(id, format!("{SERVER_URL}/"))
}

pub fn finding(snippet: Option<&str>) -> FetchedFinding {
    FetchedFinding {
        origin: Connection::new("", ""),
        key: String::new(),
        file_path: FILE_PATH.to_string(),
        message: "Make sure this password is not hard-coded.".to_string(),
        text_range: Some(password_range()),
        code_snippet: snippet.map(str::to_owned),
        rule_key: Some("java:S2068".to_string()),
        rule_name: Some("Hard-coded credentials are security-sensitive".to_string()),
        status: Some("TO_REVIEW".to_string()),
        vulnerability_probability: Some("HIGH".to_string()),
    }
}

pub fn show_request() -> ShowFindingRequest {
    ShowFindingRequest {
        project_key: PROJECT_KEY.to_string(),
        finding_key: FINDING_KEY.to_string(),
        server_url: SERVER_URL.to_string(),
    }
}

/// A local project whose `src/Main.java` holds `contents`.
pub fn project_with_source(name: &str, contents: &str) -> ProjectRef {
    let root = temp_dir(name);
    let file = root.join(FILE_PATH);
    fs::create_dir_all(file.parent().expect("source dir")).expect("create source dir");
    fs::write(&file, contents).expect("write source file");
    ProjectRef::new(name, root)
}

pub fn temp_dir(prefix: &str) -> PathBuf {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let unique = COUNTER.fetch_add(1, Ordering::SeqCst);
    let root = std::env::temp_dir().join(format!(
        "sonarlint-bridge-{prefix}-{}-{stamp}-{unique}",
        std::process::id()
    ));
    fs::create_dir_all(&root).expect("create temp dir");
    root
}

pub fn remove_dir(path: &Path) {
    let _ = fs::remove_dir_all(path);
}

// ---------------------------------------------------------------------------
// Ports and raw HTTP
// ---------------------------------------------------------------------------

/// First port of a window of consecutive free loopback ports.
pub fn free_port_window() -> u16 {
    for _ in 0..64 {
        let probe = TcpListener::bind("127.0.0.1:0").expect("bind probe port");
        let base = probe.local_addr().expect("probe addr").port();
        drop(probe);
        let Some(last) = base.checked_add(PORT_RANGE_LEN - 1) else {
            continue;
        };
        if (base..=last).all(|port| TcpListener::bind(("127.0.0.1", port)).is_ok()) {
            return base;
        }
    }
    panic!("no window of {PORT_RANGE_LEN} free loopback ports");
}

pub fn occupy(port: u16) -> TcpListener {
    TcpListener::bind(("127.0.0.1", port)).expect("occupy port")
}

#[derive(Debug)]
pub struct HttpReply {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl HttpReply {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

pub fn get(port: u16, target: &str, origin: Option<&str>) -> HttpReply {
    send(port, "GET", target, origin)
}

pub fn send(port: u16, method: &str, target: &str, origin: Option<&str>) -> HttpReply {
    let mut stream = TcpStream::connect(("127.0.0.1", port)).expect("connect to bridge");
    stream
        .set_read_timeout(Some(Duration::from_secs(30)))
        .expect("set read timeout");
    let mut request = format!(
        "{method} {target} HTTP/1.1\r\nHost: 127.0.0.1:{port}\r\nConnection: close\r\n"
    );
    if let Some(origin) = origin {
        request.push_str(&format!("Origin: {origin}\r\n"));
    }
    if method != "GET" {
        request.push_str("Content-Length: 0\r\n");
    }
    request.push_str("\r\n");
    stream
        .write_all(request.as_bytes())
        .expect("write request");
    let mut raw = String::new();
    stream.read_to_string(&mut raw).expect("read response");
    parse_reply(&raw)
}

fn parse_reply(raw: &str) -> HttpReply {
    let (head, body) = raw.split_once("\r\n\r\n").expect("response head");
    let mut lines = head.split("\r\n");
    let status = lines
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|code| code.parse().ok())
        .expect("status line");
    let headers = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
        .collect();
    HttpReply {
        status,
        headers,
        body: body.to_string(),
    }
}

pub fn show_target(project: &str, hotspot: &str, server: &str) -> String {
    format!(
        "/sonarlint/api/hotspots/show?project={}&hotspot={}&server={}",
        urlencoding::encode(project),
        urlencoding::encode(hotspot),
        urlencoding::encode(server)
    )
}
