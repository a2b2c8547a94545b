//! Session protocol: command interpretation, state machine, retry policy.
//!
//! The notifier keeps one persistent connection to the site's command link
//! and multiplexes three logical channels over it.
//!
//! # Message Flow
//!
//! ```text
//! Notifier                              Server
//!    |                                    |
//!    |-- register (cookie, agent, ver) -->|   control channel
//!    |<------ auth (cookie, userId) ------|
//!    |-- subscribe stats ---------------->|   stats channel, always on
//!    |<------ stats (online, m, f) -------|
//!    |-- subscribe presence ------------->|   presence channel, when enabled
//!    |<------ welcome (unread, name) -----|
//!    |<------ online / offline / msg -----|
//!    |                                    |
//!    |<------ popup / reload / update ----|   pushes, any time
//! ```
//!
//! # Channels
//!
//! | Channel  | Subscribed          | Commands                                        |
//! |----------|---------------------|-------------------------------------------------|
//! | control  | implicit            | `auth`, `popup`, `reload`, `update`             |
//! | presence | enabled + user-bound| `welcome`, `online`, `offline`, `msg`, `smsg`, `read`, `popup` |
//! | stats    | whenever connected  | `stats`                                         |
//!
//! The stats channel stays subscribed regardless of the enable preference;
//! only the presence channel is enable-gated.
//!
//! # Connection States
//!
//! | State          | Meaning                              | Leaves via                |
//! |----------------|--------------------------------------|---------------------------|
//! | `Disconnected` | link down, nothing in flight         | any connect attempt       |
//! | `Connecting`   | attempt or pre-auth in flight        | `auth` reply, link error  |
//! | `Connected`    | authenticated, no user binding       | `welcome`, link error     |
//! | `Enabled`      | authenticated, presence subscription | disable, link error       |
//!
//! Every transition out of `Enabled` clears the presence set and the unread
//! counter before observers run.

pub mod command;
pub mod retry;
pub mod session;
pub mod state;

pub use command::{
    CommandError, ControlCommand, PopupArgs, PresenceCommand, StatsCommand,
};
pub use retry::{FramingDecision, ReconnectPolicy, RetryState};
pub use session::{Session, SessionCommand, SessionHandle, SiteStats, User};
pub use state::{ConnectionState, IconState};

/// Protocol revision reported during registration.
pub const PROTOCOL_VERSION: u32 = 8;
