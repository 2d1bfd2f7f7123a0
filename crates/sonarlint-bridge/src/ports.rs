//! Loopback port negotiation.
//!
//! The web UI scans a fixed, well-known window of ports to find running IDEs, so
//! the bridge never binds an ephemeral port: it walks the window in ascending
//! order and keeps the first port it can bind.

use std::net::{Ipv4Addr, SocketAddr};

use tiny_http::Server;
use tracing::{debug, warn};

/// First port of the window scanned by the web UI.
pub const DEFAULT_FIRST_PORT: u16 = 64120;

/// Number of candidate ports.
pub const PORT_RANGE_LEN: u16 = 11;

/// Contiguous window of `PORT_RANGE_LEN` candidate ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortRange {
    first: u16,
}

impl PortRange {
    /// Window starting at `first`, clamped so that it never runs past `u16::MAX`.
    #[must_use]
    pub fn new(first: u16) -> Self {
        Self::checked(first).unwrap_or(Self {
            first: u16::MAX - (PORT_RANGE_LEN - 1),
        })
    }

    /// Window starting at `first`, or `None` when it would overflow.
    #[must_use]
    pub fn checked(first: u16) -> Option<Self> {
        if first == 0 {
            return None;
        }
        first.checked_add(PORT_RANGE_LEN - 1)?;
        Some(Self { first })
    }

    /// Lowest candidate port.
    #[must_use]
    pub fn first(&self) -> u16 {
        self.first
    }

    /// Highest candidate port.
    #[must_use]
    pub fn last(&self) -> u16 {
        self.first + (PORT_RANGE_LEN - 1)
    }

    /// Candidate ports in the order they are tried.
    pub fn iter(&self) -> impl Iterator<Item = u16> {
        self.first..=self.last()
    }
}

/// Loopback listener on the lowest bindable port of the window.
pub struct BoundListener {
    pub(crate) server: Server,
    pub(crate) port: u16,
}

impl std::fmt::Debug for BoundListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundListener")
            .field("port", &self.port)
            .finish_non_exhaustive()
    }
}

impl BoundListener {
    /// Port the listener is bound to.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }
}

/// Try each port of `range` on the loopback interface, first success wins.
///
/// Returns `None` when every candidate is taken; the caller treats that as the
/// disabled state rather than an error.
#[must_use]
pub fn bind_first_available(range: PortRange) -> Option<BoundListener> {
    for port in range.iter() {
        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
        match Server::http(addr) {
            Ok(server) => {
                debug!(port, "bound loopback listener");
                return Some(BoundListener { server, port });
            }
            Err(err) => debug!(port, "port unavailable: {err}"),
        }
    }
    warn!(
        first = range.first(),
        last = range.last(),
        "no free port in range, local bridge disabled"
    );
    None
}
