//! # Notifier Core - Persistent-Connection Session Client
//!
//! The session core of a site notifier: one persistent command-link
//! connection multiplexing presence, message, and statistics streams, with
//! automatic reconnection and a cryptographically-verified self-update
//! pipeline.
//!
//! ## Features
//!
//! - **Session state machine**: four-state lifecycle with snapshot and
//!   status observers driving an injected presentation backend
//! - **Reconnect policy**: per-error-class retry (exponential backoff,
//!   bounded immediate retry, update diversion)
//! - **Command interpreter**: typed interpretation of three multiplexed
//!   channels; unknown tags are logged, never fatal
//! - **Async fetch**: minimal cancellable HTTP/1.0 GET pipeline against a
//!   single controlled origin
//! - **Self-update**: detached-signature verification gating an external
//!   install callback
//!
//! ## Architecture
//!
//! ```text
//!            ┌────────────────────────────────────┐
//!            │              Session               │
//!            │  state machine · reconnect policy  │
//!            │        command interpreter         │
//!            └───┬───────────▲──────────────┬─────┘
//!   OutboundCommand│        │LinkEvent      │ update URL
//!                ▼          │               ▼
//!        ┌──────────────────┴───┐   ┌───────────────┐
//!        │ Connector/LinkHandle │   │ UpdateManager │
//!        │      (external)      │   │  fetch+verify │
//!        └──────────────────────┘   └───────┬───────┘
//!                                           │ verified buffer
//!                                           ▼
//!                                ┌─────────────────────┐
//!                                │    Presentation     │
//!                                │ notify/icon/tooltip │
//!                                │ config/install      │
//!                                └─────────────────────┘
//! ```
//!
//! Everything runs on one single-threaded run loop: socket I/O, timers,
//! and command dispatch interleave as continuations, never in parallel.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use notifier::{Config, Session};
//!
//! let config = Config::load(None)?;
//! let session = Session::new(config, connector, presentation);
//! let handle = session.handle();
//!
//! handle.set_enabled(true, false);
//! tokio::runtime::Builder::new_current_thread()
//!     .enable_all()
//!     .build()?
//!     .block_on(session.run());
//! ```
//!
//! ## Modules
//!
//! - [`protocol`]: session lifecycle, command interpretation, retry policy
//! - [`transport`]: narrow seam to the external framed command link
//! - [`presentation`]: injected capability set for UI/config backends
//! - [`fetch`]: minimal async HTTP/1.0 GET pipeline
//! - [`update`]: signature-verified self-update pipeline
//! - [`config`]: configuration management
//! - [`error`]: error types and result alias

pub mod config;
pub mod error;
pub mod fetch;
pub mod presentation;
pub mod protocol;
pub mod transport;
pub mod update;

// Re-exports for convenience
pub use config::Config;
pub use error::{NotifierError, Result};
pub use presentation::Presentation;
pub use protocol::{
    ConnectionState, IconState, ReconnectPolicy, Session, SessionCommand, SessionHandle,
    SiteStats, User, PROTOCOL_VERSION,
};
pub use transport::{
    Channel, Connector, LinkError, LinkEvent, LinkHandle, OutboundCommand, Severity,
    TaggedCommand,
};
pub use update::{UpdateManager, UpdateOutcome, Verification};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
