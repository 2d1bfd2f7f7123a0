//! Bridge configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::error::BridgeError;
use crate::ports::{PortRange, DEFAULT_FIRST_PORT, PORT_RANGE_LEN};

/// Product identifier reported by the status endpoint.
pub const DEFAULT_IDE_NAME: &str = "SonarLint Companion";

/// Bounded wait for the UI thread when answering a status probe.
pub const DEFAULT_STATUS_TIMEOUT: Duration = Duration::from_secs(15);

const DEFAULT_WORKERS: usize = 4;

/// Runtime settings of the loopback bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Static product identifier returned as `ideName`.
    pub ide_name: SmolStr,
    /// Candidate ports, tried in ascending order.
    pub ports: PortRange,
    /// How long the status endpoint waits for the UI thread.
    pub status_timeout: Duration,
    /// Number of request-handling threads.
    pub workers: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            ide_name: SmolStr::new(DEFAULT_IDE_NAME),
            ports: PortRange::new(DEFAULT_FIRST_PORT),
            status_timeout: DEFAULT_STATUS_TIMEOUT,
            workers: DEFAULT_WORKERS,
        }
    }
}

/// `[bridge]` table as written in TOML. Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BridgeSection {
    /// Overrides the reported `ideName`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ide_name: Option<String>,
    /// First port of the candidate window.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_port: Option<u16>,
    /// Status endpoint wait for the UI thread, in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_timeout_ms: Option<u64>,
    /// Request-handling threads.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct BridgeToml {
    #[serde(default)]
    bridge: BridgeSection,
}

impl BridgeSection {
    /// Validate the raw table and fill in defaults.
    pub fn into_config(self) -> Result<BridgeConfig, BridgeError> {
        let defaults = BridgeConfig::default();
        let ide_name = match self.ide_name {
            Some(name) if name.trim().is_empty() => {
                return Err(BridgeError::InvalidConfig(
                    "bridge.ide_name must not be empty".into(),
                ))
            }
            Some(name) => SmolStr::new(name.trim()),
            None => defaults.ide_name,
        };
        let ports = match self.first_port {
            Some(first) => PortRange::checked(first).ok_or_else(|| {
                BridgeError::InvalidConfig(
                    format!(
                        "bridge.first_port {first} leaves no room for {PORT_RANGE_LEN} ports"
                    )
                    .into(),
                )
            })?,
            None => defaults.ports,
        };
        let status_timeout = match self.status_timeout_ms {
            Some(0) => {
                return Err(BridgeError::InvalidConfig(
                    "bridge.status_timeout_ms must be positive".into(),
                ))
            }
            Some(ms) => Duration::from_millis(ms),
            None => defaults.status_timeout,
        };
        let workers = match self.workers {
            Some(0) => {
                return Err(BridgeError::InvalidConfig(
                    "bridge.workers must be at least 1".into(),
                ))
            }
            Some(workers) => workers,
            None => defaults.workers,
        };
        Ok(BridgeConfig {
            ide_name,
            ports,
            status_timeout,
            workers,
        })
    }
}

impl BridgeConfig {
    /// Parse the `[bridge]` table out of a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self, BridgeError> {
        let raw: BridgeToml = toml::from_str(text)
            .map_err(|err| BridgeError::InvalidConfig(format!("bridge: {err}").into()))?;
        raw.bridge.into_config()
    }

    /// Same configuration with a different first candidate port.
    #[must_use]
    pub fn with_first_port(mut self, first: u16) -> Self {
        self.ports = PortRange::new(first);
        self
    }

    /// Same configuration with a different status wait.
    #[must_use]
    pub fn with_status_timeout(mut self, timeout: Duration) -> Self {
        self.status_timeout = timeout;
        self
    }
}
