//! Terminal-hosted IDE companion for the SonarLint loopback bridge.

mod cli;
mod fetch;
mod files;
mod presenter;
mod prompt;
mod registry;
mod settings;
mod style;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::bail;
use clap::Parser;
use serde::Deserialize;
use sonarlint_bridge::model::Credentials;
use sonarlint_bridge::web::STATUS_PATH;
use sonarlint_bridge::{ui_channel, BridgeServer, BridgeState, Services};
use tracing::{debug, info};

use cli::{Cli, Command};
use fetch::ServerClient;
use files::WorkspaceFiles;
use presenter::TerminalPresenter;
use prompt::TerminalPrompts;
use registry::ConfigRegistry;
use settings::Settings;

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);
const PROBE_GRACE: Duration = Duration::from_secs(1);

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    if let Err(err) = run(cli) {
        eprintln!("{}", style::error(format!("Error: {err:#}")));
        std::process::exit(1);
    }
    Ok(())
}

fn init_tracing(verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(&cli.config),
        Command::Probe { origin } => probe(&cli.config, origin.as_deref()),
        Command::Check => check(&cli.config),
    }
}

fn serve(config: &Path) -> anyhow::Result<()> {
    let settings = Settings::load(config)?;
    let bridge = settings.bridge.clone();
    let ports = bridge.ports;
    let presenter = Arc::new(TerminalPresenter::new(
        settings.workspace_name.clone(),
        settings.editor.clone(),
    ));
    let registry = Arc::new(ConfigRegistry::new(settings));
    let services = Services {
        connections: registry.clone(),
        fetcher: Arc::new(ServerClient::new(FETCH_TIMEOUT)),
        bindings: registry.clone(),
        files: Arc::new(WorkspaceFiles),
        prompts: Arc::new(TerminalPrompts::new(registry)),
        presenter: presenter.clone(),
        workspace: presenter,
    };

    let (ui, ui_loop) = ui_channel();
    let server = BridgeServer::start(BridgeState::new(bridge, services, ui));
    match server.port() {
        Some(port) => println!(
            "{} {}",
            style::success("Waiting for findings on"),
            style::accent(format!("http://127.0.0.1:{port}"))
        ),
        None => println!(
            "{}",
            style::warning(format!(
                "Local bridge disabled: ports {}-{} are all in use",
                ports.first(),
                ports.last()
            ))
        ),
    }
    info!(config = %config.display(), "companion running, press Ctrl+C to stop");
    ui_loop.run();
    drop(server);
    Ok(())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProbeStatus {
    ide_name: String,
    #[serde(default)]
    description: String,
}

fn probe(config: &Path, origin: Option<&str>) -> anyhow::Result<()> {
    let settings = Settings::load(config)?;
    let ports = settings.bridge.ports;
    let agent: ureq::Agent = ureq::Agent::config_builder()
        .timeout_global(Some(settings.bridge.status_timeout + PROBE_GRACE))
        .http_status_as_error(false)
        .build()
        .into();
    for port in ports.iter() {
        let url = format!("http://127.0.0.1:{port}{STATUS_PATH}");
        let mut request = agent.get(&url);
        if let Some(origin) = origin {
            request = request.header("Origin", origin);
        }
        let mut response = match request.call() {
            Ok(response) => response,
            Err(err) => {
                debug!(port, "no answer: {err}");
                continue;
            }
        };
        if response.status().as_u16() != 200 {
            debug!(port, status = response.status().as_u16(), "status probe rejected");
            continue;
        }
        let status = response
            .body_mut()
            .read_to_string()
            .ok()
            .and_then(|body| serde_json::from_str::<ProbeStatus>(&body).ok());
        let Some(status) = status else {
            debug!(port, "not a companion status document");
            continue;
        };
        println!(
            "{} {} {}",
            style::success("Found"),
            style::accent(&status.ide_name),
            style::dim(format!("on port {port}"))
        );
        if status.description.is_empty() {
            println!("  {}", style::dim("origin not trusted, no workspace disclosed"));
        } else {
            println!("  workspace: {}", status.description);
        }
        return Ok(());
    }
    bail!(
        "no companion answered on ports {}-{}",
        ports.first(),
        ports.last()
    )
}

fn check(config: &Path) -> anyhow::Result<()> {
    let settings = Settings::load(config)?;
    println!("{} {}", style::success("Config OK:"), settings.path().display());
    println!(
        "  bridge:     {} (ports {}-{}, {} workers, status wait {}ms)",
        settings.bridge.ide_name,
        settings.bridge.ports.first(),
        settings.bridge.ports.last(),
        settings.bridge.workers,
        settings.bridge.status_timeout.as_millis()
    );
    println!("  workspace:  {}", settings.workspace_name);
    if let Some(editor) = &settings.editor {
        println!("  editor:     {editor}");
    }
    for project in &settings.projects {
        println!(
            "  project:    {} {}",
            style::accent(&project.name),
            style::dim(project.root.display().to_string())
        );
    }
    for connection in &settings.connections {
        let auth = match connection.credentials {
            Credentials::Token(_) => "token",
            Credentials::None => "anonymous",
        };
        println!(
            "  connection: {} {} {}",
            style::accent(&connection.id),
            connection.host,
            style::dim(auth)
        );
    }
    for bound in &settings.bindings {
        println!(
            "  binding:    {} -> {} via {}",
            style::accent(&bound.binding.project_key),
            bound.project.name,
            bound.binding.connection_id
        );
    }
    if settings.connections.is_empty() {
        println!(
            "{}",
            style::warning("No connections yet; they are created when the browser asks.")
        );
    }
    Ok(())
}
