//! `sonarlint-bridge` - loopback control plane that lets the analysis server's web
//! UI open findings in the IDE.
//!
//! The bridge binds one port out of a small loopback range, answers the status
//! probe used by the web UI to discover IDEs, and turns "open this hotspot"
//! requests into a background resolution that ends with a marker in an editor.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![allow(clippy::module_name_repetitions)]

/// Bridge configuration.
pub mod config;
/// UI-thread dispatch primitives.
pub mod dispatch;
/// Bridge errors.
pub mod error;
/// Active marker slot and text range helpers.
pub mod marker;
/// Requests, connections, findings and bindings.
pub mod model;
/// Loopback port negotiation.
pub mod ports;
/// Finding resolution pipeline.
pub mod resolve;
/// Listener lifecycle.
pub mod server;
/// Collaborator interfaces consumed by the bridge.
pub mod services;
/// Cancellable background tasks.
pub mod task;
/// Origin trust checks.
pub mod trust;
/// HTTP routing, CORS and endpoints.
pub mod web;

pub use config::BridgeConfig;
pub use dispatch::{ui_channel, UiDispatcher, UiLoop};
pub use error::{BridgeError, DispatchError, FetchError, PresentationError, ResolutionError};
pub use resolve::FindingResolver;
pub use server::{BridgeServer, BridgeState};
pub use services::Services;
