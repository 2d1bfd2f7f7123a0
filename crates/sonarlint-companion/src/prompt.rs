//! Interactive prompts raised by show-finding requests.

use std::io::IsTerminal;
use std::sync::Arc;

use dialoguer::{theme::ColorfulTheme, Confirm, Input, Select};
use sonarlint_bridge::model::{Connection, ProjectRef};
use sonarlint_bridge::services::Prompts;
use tracing::{info, warn};

use crate::registry::ConfigRegistry;
use crate::style;

/// Credentials are opt-in: the token variable answer starts empty.
const DEFAULT_TOKEN_ENV: &str = "";

fn use_dialoguer() -> bool {
    std::io::stdin().is_terminal() && std::io::stdout().is_terminal()
}

/// Terminal prompts; declined outright when there is no terminal to ask on.
#[derive(Debug)]
pub struct TerminalPrompts {
    registry: Arc<ConfigRegistry>,
}

impl TerminalPrompts {
    #[must_use]
    pub fn new(registry: Arc<ConfigRegistry>) -> Self {
        Self { registry }
    }

    fn ask_connection(&self, server_url: &str) -> anyhow::Result<Option<Connection>> {
        let theme = ColorfulTheme::default();
        let create = Confirm::with_theme(&theme)
            .with_prompt(format!(
                "No connection is configured for {}. Create one?",
                style::accent(server_url)
            ))
            .default(true)
            .interact()?;
        if !create {
            return Ok(None);
        }
        let id = Input::<String>::with_theme(&theme)
            .with_prompt("Connection name")
            .default(default_connection_id(server_url))
            .interact_text()?;
        let token_env = Input::<String>::with_theme(&theme)
            .with_prompt("Environment variable holding the token (empty for none)")
            .default(DEFAULT_TOKEN_ENV.to_string())
            .allow_empty(true)
            .interact_text()?;
        let send_token = match token_env_answer(&token_env) {
            Some(name) => Confirm::with_theme(&theme)
                .with_prompt(format!(
                    "Send the token from ${name} to {}?",
                    style::accent(server_url)
                ))
                .default(false)
                .interact()?,
            None => false,
        };
        let token_env = credential_choice(&token_env, send_token);
        let connection = self
            .registry
            .add_connection(id.trim(), server_url, token_env)?;
        println!("{}", style::success(format!("Saved connection '{}'", connection.id)));
        Ok(Some(connection))
    }

    fn ask_project(
        &self,
        connection: &Connection,
        project_key: &str,
    ) -> anyhow::Result<Option<ProjectRef>> {
        let projects = self.registry.projects();
        if projects.is_empty() {
            println!(
                "{}",
                style::warning("No workspace projects are configured; add [[workspace.projects]] first.")
            );
            return Ok(None);
        }
        let items: Vec<String> = projects
            .iter()
            .map(|project| format!("{} ({})", project.name, project.root.display()))
            .collect();
        let theme = ColorfulTheme::default();
        let selection = Select::with_theme(&theme)
            .with_prompt(format!(
                "Bind which project to '{}' on {}? (Esc to cancel)",
                style::accent(project_key),
                connection.id
            ))
            .items(&items)
            .default(0)
            .interact_opt()?;
        Ok(selection.and_then(|index| projects.get(index).cloned()))
    }
}

impl Prompts for TerminalPrompts {
    fn create_connection(&self, server_url: &str) -> Option<Connection> {
        if !use_dialoguer() {
            info!(server_url, "no terminal attached, declining connection prompt");
            return None;
        }
        self.ask_connection(server_url).unwrap_or_else(|err| {
            warn!("connection prompt failed: {err:#}");
            None
        })
    }

    fn pick_project(&self, connection: &Connection, project_key: &str) -> Option<ProjectRef> {
        if !use_dialoguer() {
            info!(project_key, "no terminal attached, declining binding prompt");
            return None;
        }
        self.ask_project(connection, project_key)
            .unwrap_or_else(|err| {
                warn!("binding prompt failed: {err:#}");
                None
            })
    }
}

fn token_env_answer(answer: &str) -> Option<&str> {
    Some(answer.trim()).filter(|name| !name.is_empty())
}

/// Token variable to store, only when one was named and sending it was confirmed.
fn credential_choice(answer: &str, send_token: bool) -> Option<&str> {
    token_env_answer(answer).filter(|_| send_token)
}

/// Connection name suggested for `server_url`: its host, without the port.
fn default_connection_id(server_url: &str) -> String {
    let without_scheme = server_url
        .split_once("://")
        .map_or(server_url, |(_, rest)| rest);
    let host = without_scheme
        .split(['/', ':'])
        .next()
        .unwrap_or_default();
    if host.is_empty() {
        "sonarqube".to_string()
    } else {
        host.to_string()
    }
}
