//! CLI definitions for sonarlint-companion.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::settings::DEFAULT_CONFIG_FILE;

#[derive(Debug, Parser)]
#[command(
    name = "sonarlint-companion",
    version,
    about = "Terminal IDE companion that opens server findings from the browser",
    infer_subcommands = true,
    after_help = "Examples:\n  sonarlint-companion                      # serve with ./sonarlint-companion.toml\n  sonarlint-companion --config ws.toml     # serve another workspace\n  sonarlint-companion probe                # find a running companion\n  sonarlint-companion check                # validate the config file"
)]
pub struct Cli {
    /// Workspace config file.
    #[arg(long, short, global = true, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,
    /// Show debug logs.
    #[arg(long, short, global = true)]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Start the loopback bridge and wait for requests (default).
    Serve,
    /// Look for a running companion on the bridge port range.
    Probe {
        /// Origin header to send, e.g. the server URL, to check trust.
        #[arg(long)]
        origin: Option<String>,
    },
    /// Validate the config file and print the workspace.
    Check,
}
