//! Narrow seam to the external framed command link.
//!
//! The framed transport and its tokenizer are external collaborators; the
//! session reaches them only through the small surface defined here:
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │                 Session                  │
//! └────────┬──────────────────────▲──────────┘
//!          │ OutboundCommand      │ LinkEvent
//!          ▼                      │
//! ┌──────────────────────────────────────────┐
//! │    Connector / LinkHandle (external)     │
//! └──────────────────────────────────────────┘
//! ```
//!
//! A [`Connector`] starts one connection attempt and hands back a
//! [`LinkHandle`] for outbound commands plus an event receiver. Inbound
//! commands arrive demultiplexed per [`Channel`], already split into a tag
//! and argument list; framing and tokenization never cross this boundary.
//!
//! # Error classes
//!
//! A failed link reports exactly one [`LinkError`], and the class selects
//! the retry policy applied by the session:
//!
//! | Class     | Meaning                          | Recovery               |
//! |-----------|----------------------------------|------------------------|
//! | `Network` | transport-level failure          | exponential backoff    |
//! | `Framing` | malformed command stream         | bounded immediate retry|
//! | `Version` | peer requires a newer client     | self-update, no retry  |

use thiserror::Error;
use tokio::sync::mpsc;

/// Logical inbound channels multiplexed over one link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    /// Registration reply and server pushes
    Control,
    /// Per-user presence/message events (subscribed while enabled)
    Presence,
    /// Site-wide statistics (subscribed whenever connected)
    Stats,
}

impl Channel {
    /// Get descriptive name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Control => "control",
            Self::Presence => "presence",
            Self::Stats => "stats",
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// One tokenized inbound command: a tag plus its textual arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedCommand {
    /// Command tag, e.g. `"auth"` or `"stats"`
    pub tag: String,
    /// Positional arguments, still unparsed
    pub args: Vec<String>,
}

impl TaggedCommand {
    /// Build a command from a tag and argument list.
    pub fn new(tag: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            tag: tag.into(),
            args,
        }
    }
}

/// Terminal failure classes reported by a link.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LinkError {
    /// Transport-level failure (connect, read, write, close by peer).
    #[error("network error: {0}")]
    Network(String),

    /// Malformed command stream.
    #[error("framing error: {0}")]
    Framing(String),

    /// Peer requires a newer client; carries the update URL.
    #[error("protocol version mismatch")]
    Version {
        /// Where the replacement binary lives.
        update_url: String,
    },
}

/// Events emitted by a live link, in arrival order per channel.
#[derive(Debug, Clone)]
pub enum LinkEvent {
    /// Transport is connected and ready for registration.
    Ready,
    /// An inbound command on one of the logical channels.
    Command(Channel, TaggedCommand),
    /// The link failed; no further events follow.
    Failed(LinkError),
}

/// Severity of a remote log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Informational.
    Info,
    /// Error.
    Error,
}

impl Severity {
    /// Wire encoding (0 = info, 1 = error).
    pub fn code(self) -> u8 {
        match self {
            Self::Info => 0,
            Self::Error => 1,
        }
    }
}

/// Commands the session issues to the link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundCommand {
    /// Register this client; the control channel answers with `auth`.
    Register {
        /// Session cookie from a previous run, empty if none.
        cookie: String,
        /// Client identification string.
        user_agent: String,
        /// Client protocol revision.
        protocol_version: u32,
    },
    /// Open the presence channel for the authenticated user.
    SubscribePresence,
    /// Cancel a live presence subscription.
    CancelPresence,
    /// Open the site statistics channel.
    SubscribeStats,
    /// Mirror a client log line to the server.
    Log {
        /// Log message.
        message: String,
        /// Log severity.
        severity: Severity,
    },
}

/// Outbound half of a live link.
///
/// Both methods are fire-and-forget: failures surface asynchronously as a
/// [`LinkEvent::Failed`] on the event stream. `close` is idempotent.
pub trait LinkHandle {
    /// Queue an outbound command.
    fn send(&self, command: OutboundCommand);

    /// Tear the connection down. Closing twice is a no-op.
    fn close(&self);
}

/// Factory for connection attempts.
///
/// Each call starts one fresh connection attempt; the returned receiver
/// yields [`LinkEvent::Ready`] once the transport is usable, or
/// [`LinkEvent::Failed`] if the attempt dies first.
pub trait Connector {
    /// Start a connection attempt.
    fn connect(&mut self) -> (Box<dyn LinkHandle>, mpsc::UnboundedReceiver<LinkEvent>);
}
