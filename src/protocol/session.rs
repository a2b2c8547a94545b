//! Session lifecycle and protocol handling.
//!
//! One [`Session`] value owns all live session data and drives everything
//! from a single-threaded run loop: inbound link events, the reconnect
//! timer, user commands, and the in-flight update attempt are the only
//! wake-up sources, polled by one `select!`. There is no parallelism, only
//! interleaved continuations, so no locking anywhere.
//!
//! Commands on one logical channel are handled strictly in arrival order;
//! no ordering exists across channels. At most one link and one reconnect
//! timer are live at any time: starting a connect tears both down first.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;

use tokio::sync::mpsc;
use tokio::time::Sleep;
use tokio_util::sync::CancellationToken;

use super::command::{ControlCommand, PopupArgs, PresenceCommand, StatsCommand};
use super::retry::{FramingDecision, ReconnectPolicy};
use super::state::{ConnectionState, IconState};
use super::PROTOCOL_VERSION;
use crate::config::Config;
use crate::presentation::Presentation;
use crate::transport::{
    Channel, Connector, LinkError, LinkEvent, LinkHandle, OutboundCommand, Severity,
    TaggedCommand,
};
use crate::update::{UpdateManager, UpdateOutcome};

/// A contact visible on the presence channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    /// Contact id.
    pub id: i64,
    /// Contact display name.
    pub name: String,
}

/// Site-wide user statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SiteStats {
    /// Users currently online.
    pub online: u32,
    /// Registered male users.
    pub male: u32,
    /// Registered female users.
    pub female: u32,
}

impl SiteStats {
    /// Total registered users.
    pub fn members(&self) -> u32 {
        self.male + self.female
    }
}

/// Commands accepted by a running session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    /// Switch the enable preference; `user_action` marks a direct user
    /// request (affects how a missing login is surfaced).
    SetEnabled {
        /// Desired enable state.
        enabled: bool,
        /// Whether the user asked for this directly.
        user_action: bool,
    },
    /// Cancel any pending retry, reset the retry state, connect now.
    Reconnect,
    /// Open the site chat page in the browser.
    OpenSite,
    /// Show an about notification.
    About,
    /// Externally-triggered update check against the configured URL.
    CheckUpdate,
    /// Tear everything down and end the run loop.
    Quit,
}

/// Cloneable handle for feeding commands to a running session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    tx: mpsc::UnboundedSender<SessionCommand>,
}

impl SessionHandle {
    /// Send a command; dropped silently if the session is gone.
    pub fn send(&self, command: SessionCommand) {
        let _ = self.tx.send(command);
    }

    /// Switch the enable preference.
    pub fn set_enabled(&self, enabled: bool, user_action: bool) {
        self.send(SessionCommand::SetEnabled {
            enabled,
            user_action,
        });
    }

    /// Reconnect now.
    pub fn reconnect(&self) {
        self.send(SessionCommand::Reconnect);
    }

    /// End the session.
    pub fn quit(&self) {
        self.send(SessionCommand::Quit);
    }
}

enum Wake {
    Command(Option<SessionCommand>),
    Link(Option<LinkEvent>),
    Timer,
    Update(UpdateOutcome),
}

/// The notifier session: state machine, protocol handler, and run loop.
pub struct Session {
    config: Config,
    connector: Box<dyn Connector>,
    presentation: Box<dyn Presentation>,
    updater: Rc<UpdateManager>,
    policy: ReconnectPolicy,
    shutdown_token: CancellationToken,

    state: ConnectionState,
    connect_error: String,
    cookie: String,
    user_id: i64,
    user_name: String,
    unread: u32,
    users: BTreeMap<i64, User>,
    stats: SiteStats,
    enabled: bool,

    link: Option<Box<dyn LinkHandle>>,
    link_events: Option<mpsc::UnboundedReceiver<LinkEvent>>,
    link_was_ready: bool,
    presence_active: bool,

    reconnect_timer: Option<Pin<Box<Sleep>>>,
    update_task: Option<Pin<Box<dyn Future<Output = UpdateOutcome>>>>,

    commands: mpsc::UnboundedReceiver<SessionCommand>,
    commands_tx: mpsc::UnboundedSender<SessionCommand>,
    running: bool,
}

impl Session {
    /// Create a session over the given link connector and presentation
    /// backend. Nothing happens until [`Session::run`] is awaited.
    pub fn new(
        config: Config,
        connector: Box<dyn Connector>,
        presentation: Box<dyn Presentation>,
    ) -> Self {
        let (commands_tx, commands) = mpsc::unbounded_channel();
        let updater = Rc::new(UpdateManager::new(&config.update));
        let policy = ReconnectPolicy::new(&config.retry);
        Self {
            config,
            connector,
            presentation,
            updater,
            policy,
            shutdown_token: CancellationToken::new(),
            state: ConnectionState::Disconnected,
            connect_error: String::new(),
            cookie: String::new(),
            user_id: 0,
            user_name: String::new(),
            unread: 0,
            users: BTreeMap::new(),
            stats: SiteStats::default(),
            enabled: true,
            link: None,
            link_events: None,
            link_was_ready: false,
            presence_active: false,
            reconnect_timer: None,
            update_task: None,
            commands,
            commands_tx,
            running: true,
        }
    }

    /// Handle for feeding commands to this session.
    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            tx: self.commands_tx.clone(),
        }
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Current enable preference.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Unread message count.
    pub fn unread(&self) -> u32 {
        self.unread
    }

    /// Number of contacts currently online.
    pub fn contacts_online(&self) -> usize {
        self.users.len()
    }

    /// Drive the session until [`SessionCommand::Quit`].
    ///
    /// Connects immediately; the enable preference only controls the
    /// presence subscription, the stats channel is served regardless.
    pub async fn run(mut self) {
        self.connect();
        while self.running {
            let wake = tokio::select! {
                command = self.commands.recv() => Wake::Command(command),
                event = poll_link(&mut self.link_events) => Wake::Link(event),
                () = poll_timer(&mut self.reconnect_timer) => Wake::Timer,
                outcome = poll_update(&mut self.update_task) => Wake::Update(outcome),
            };
            match wake {
                Wake::Command(Some(command)) => self.handle_command(command),
                Wake::Command(None) => self.shutdown(),
                Wake::Link(Some(event)) => self.handle_link_event(event),
                Wake::Link(None) => {
                    // Link task went away without a terminal event.
                    self.on_link_failed(LinkError::Network("link closed".to_string()));
                }
                Wake::Timer => {
                    self.reconnect_timer = None;
                    self.connect();
                }
                Wake::Update(outcome) => {
                    self.update_task = None;
                    self.finish_update(outcome);
                }
            }
        }
    }

    // ---- command handling -------------------------------------------------

    fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::SetEnabled {
                enabled,
                user_action,
            } => self.set_enabled(enabled, user_action),
            SessionCommand::Reconnect => self.reconnect(),
            SessionCommand::OpenSite => {
                let url = self.config.site.chat_url();
                self.presentation.open_url(&url);
            }
            SessionCommand::About => self.about(),
            SessionCommand::CheckUpdate => self.start_update(String::new()),
            SessionCommand::Quit => self.shutdown(),
        }
    }

    fn set_enabled(&mut self, enabled: bool, user_action: bool) {
        tracing::debug!("set_enabled {enabled}");
        self.enabled = enabled;
        match self.state {
            ConnectionState::Disconnected => self.reconnect(),
            ConnectionState::Connecting => {}
            _ => self.apply_enabled(user_action),
        }
    }

    /// Align the presence subscription and state with the enable flag;
    /// only meaningful once authenticated.
    fn apply_enabled(&mut self, user_action: bool) {
        let site = self.config.site.name.clone();

        // Cancel a live subscription before emitting the logout
        // notification, never after: a later re-enable must not find a
        // stale subscription.
        if !(self.enabled && self.user_id != 0) && self.presence_active {
            self.cancel_presence();
            self.presentation
                .notify(&site, "The notifier is now logged out", "", false, true);
        }

        if self.enabled && self.user_id == 0 {
            let login_url = self.config.site.authorize_url(&self.cookie);
            if user_action {
                self.presentation.open_url(&login_url);
            } else {
                self.presentation.notify(
                    &site,
                    "The notifier is logged out, click here to log in",
                    &login_url,
                    true,
                    true,
                );
            }
        } else if self.enabled && !self.presence_active {
            self.send(OutboundCommand::SubscribePresence);
            self.presence_active = true;
        }

        if !self.enabled {
            // Enabled -> Connected; the reverse edge runs through the
            // server's welcome event.
            self.to_state(ConnectionState::Connected);
        }
    }

    fn cancel_presence(&mut self) {
        if self.presence_active {
            self.send(OutboundCommand::CancelPresence);
            self.presence_active = false;
        }
    }

    fn reconnect(&mut self) {
        self.policy.reset();
        self.connect();
    }

    fn connect(&mut self) {
        self.reconnect_timer = None;
        if let Some(link) = self.link.take() {
            link.close();
        }
        self.link_events = None;
        self.presence_active = false;
        self.link_was_ready = false;

        self.to_state(ConnectionState::Connecting);

        let (link, events) = self.connector.connect();
        self.link = Some(link);
        self.link_events = Some(events);
    }

    fn shutdown(&mut self) {
        self.running = false;
        self.reconnect_timer = None;
        self.update_task = None;
        self.shutdown_token.cancel();
        if let Some(link) = self.link.take() {
            link.close();
        }
        self.link_events = None;
        self.to_state(ConnectionState::Disconnected);
    }

    fn about(&mut self) {
        let site = self.config.site.name.clone();
        let text = format!(
            "{} Notifier\nUser-Agent \"{}\"\nVersion {}",
            site,
            self.config.connection.user_agent,
            env!("CARGO_PKG_VERSION"),
        );
        self.presentation.notify(&site, &text, "", false, true);
    }

    // ---- link events ------------------------------------------------------

    fn handle_link_event(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::Ready => self.on_link_ready(),
            LinkEvent::Command(channel, command) => self.dispatch(channel, &command),
            LinkEvent::Failed(error) => self.on_link_failed(error),
        }
    }

    fn on_link_ready(&mut self) {
        self.link_was_ready = true;
        self.cookie = self.presentation.read_config("cookie");
        self.send(OutboundCommand::Register {
            cookie: self.cookie.clone(),
            user_agent: self.config.connection.user_agent.clone(),
            protocol_version: PROTOCOL_VERSION,
        });
        self.send(OutboundCommand::SubscribeStats);
    }

    fn dispatch(&mut self, channel: Channel, command: &TaggedCommand) {
        match channel {
            Channel::Control => match ControlCommand::parse(command) {
                Ok(command) => self.handle_control(command),
                Err(e) => tracing::warn!("control channel: {e}"),
            },
            Channel::Presence => match PresenceCommand::parse(command) {
                Ok(command) => self.handle_presence(command),
                Err(e) => tracing::warn!("presence channel: {e}"),
            },
            Channel::Stats => match StatsCommand::parse(command) {
                Ok(command) => self.handle_stats(command),
                Err(e) => tracing::warn!("stats channel: {e}"),
            },
        }
    }

    fn on_link_failed(&mut self, error: LinkError) {
        if let Some(link) = self.link.take() {
            link.close();
        }
        self.link_events = None;
        self.presence_active = false;

        self.to_state(ConnectionState::Disconnected);

        match error {
            LinkError::Version { update_url } => {
                tracing::warn!("link requires a newer client");
                self.start_update(update_url);
            }
            LinkError::Framing(message) => match self.policy.framing_retry() {
                FramingDecision::RetryNow { left } => {
                    tracing::warn!(
                        "protocol error: {message}; retrying immediately, {left} tries left"
                    );
                    self.connect();
                }
                FramingDecision::GiveUp => {
                    tracing::error!("protocol error: {message}; giving up on this session");
                    self.connect_error = format!("Protocol error: {message}");
                    self.data_changed();
                }
            },
            LinkError::Network(message) => {
                let delay = self.policy.network_delay(self.link_was_ready);
                tracing::warn!(
                    "link error: {message}; reconnecting in {} seconds",
                    delay.as_secs()
                );
                self.connect_error = format!("Connection failed: {message}");
                self.data_changed();
                self.reconnect_timer = Some(Box::pin(tokio::time::sleep(delay)));
            }
        }
    }

    // ---- control channel --------------------------------------------------

    fn handle_control(&mut self, command: ControlCommand) {
        match command {
            ControlCommand::Auth {
                cookie,
                user_id,
                challenge: _,
            } => {
                self.cookie = cookie;
                self.user_id = user_id;
                let cookie = self.cookie.clone();
                if !self.presentation.write_config("cookie", &cookie) {
                    tracing::debug!("session cookie not persisted");
                }
                self.connect_error.clear();
                self.policy.reset();
                self.to_state(ConnectionState::Connected);

                // Depending on whether we are user-bound now and want to be
                // enabled, open the authorization page or subscribe to the
                // presence channel.
                self.apply_enabled(false);
            }
            ControlCommand::Popup(args) => self.show_popup(&args),
            ControlCommand::Reload => {
                tracing::info!("got 'reload' command; scheduling reconnect");
                let site = self.config.site.name.clone();
                self.presentation
                    .notify(&site, "Session closed by the server", "", false, true);
                self.presentation.write_config("enabled", "false");
                // The server already tore the subscription down; drop the
                // handle without cancelling and reconnect outside this
                // dispatch frame.
                self.presence_active = false;
                let _ = self.commands_tx.send(SessionCommand::Reconnect);
            }
            ControlCommand::Update { url } => self.start_update(url),
        }
    }

    fn show_popup(&mut self, args: &PopupArgs) {
        let title = if args.message.is_empty() {
            String::new()
        } else if args.title.is_empty() {
            self.config.site.name.clone()
        } else {
            args.title.clone()
        };
        self.presentation
            .notify(&title, &args.message, &args.url, args.sticky, args.priority);
    }

    // ---- presence channel -------------------------------------------------

    fn handle_presence(&mut self, command: PresenceCommand) {
        let had_users = !self.users.is_empty();
        let had_msgs = self.unread > 0;
        let site = self.config.site.name.clone();
        let chat_url = self.config.site.chat_url();

        match command {
            PresenceCommand::Welcome { unread, user_name } => {
                self.unread = unread;
                self.user_name = user_name;
                self.presentation
                    .notify(&site, "The notifier is now online", &chat_url, false, true);
                // The state change fires both hooks itself.
                self.to_state(ConnectionState::Enabled);
                return;
            }
            PresenceCommand::Online { name, id } => {
                let was_online = self.users.contains_key(&id);
                self.users.insert(id, User {
                    id,
                    name: name.clone(),
                });
                if !was_online {
                    self.presentation.notify(
                        &site,
                        &format!("{name} is now online"),
                        &chat_url,
                        false,
                        false,
                    );
                }
            }
            PresenceCommand::Offline { id } => {
                self.users.remove(&id);
            }
            PresenceCommand::Msg { name } => {
                self.unread += 1;
                self.presentation.notify(
                    &site,
                    &format!("New message from {name}"),
                    &chat_url,
                    false,
                    false,
                );
            }
            PresenceCommand::Smsg => {
                self.unread += 1;
            }
            PresenceCommand::Read { count } => {
                self.unread = self.unread.saturating_sub(count);
            }
            PresenceCommand::Popup(args) => self.show_popup(&args),
        }

        self.data_changed();

        // The status hook only fires when a derived boolean flips; pure
        // count changes stay snapshot-only.
        if had_users != !self.users.is_empty() || had_msgs != (self.unread > 0) {
            self.status_changed();
        }
    }

    // ---- stats channel ----------------------------------------------------

    fn handle_stats(&mut self, command: StatsCommand) {
        match command {
            StatsCommand::Stats {
                online,
                male,
                female,
            } => {
                self.stats = SiteStats {
                    online,
                    male,
                    female,
                };
                self.data_changed();
            }
        }
    }

    // ---- update pipeline --------------------------------------------------

    fn start_update(&mut self, url: String) {
        if self.update_task.is_some() || self.updater.is_updating() {
            tracing::debug!("updater: attempt already in flight");
            return;
        }
        if !self.presentation.needs_update(&url) {
            tracing::info!("updater: backend declined update from '{url}'");
            return;
        }

        let updater = Rc::clone(&self.updater);
        let cancel = self.shutdown_token.child_token();
        self.update_task = Some(Box::pin(async move {
            updater.run(&url, &cancel).await
        }));
        self.data_changed();
    }

    fn finish_update(&mut self, outcome: UpdateOutcome) {
        match outcome {
            UpdateOutcome::Verified(binary) => {
                if self.presentation.install_update(&binary) {
                    self.log_remote("update installed, effective on restart", Severity::Info);
                } else {
                    self.log_remote("update install failed", Severity::Error);
                }
            }
            UpdateOutcome::Failed => {} // reason already logged by the manager
        }
        self.data_changed();
    }

    // ---- observers --------------------------------------------------------

    fn to_state(&mut self, next: ConnectionState) {
        let prev = self.state;
        self.state = next;
        if prev != next {
            if next != ConnectionState::Enabled {
                // Leaving the enabled world clears live presence data,
                // atomically with the transition and before observers run.
                self.users.clear();
                self.unread = 0;
            }
            self.data_changed();
            self.status_changed();
        }
    }

    /// Snapshot hook: render session data as ordered tooltip lines.
    fn data_changed(&mut self) {
        let lines = self.tooltip_lines();
        self.presentation.set_tooltip_lines(&lines);
    }

    /// Status hook: derive the icon state by strict priority.
    fn status_changed(&mut self) {
        let icon = IconState::derive(self.state, !self.users.is_empty(), self.unread > 0);
        self.presentation.set_icon_state(icon);
    }

    fn tooltip_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();

        if self.updater.is_updating() || self.update_task.is_some() {
            lines.push("Updating...".to_string());
        }

        let site = &self.config.site.name;
        let status = if self.state == ConnectionState::Enabled {
            format!("{site} notifier: online ({})", self.user_name)
        } else {
            format!("{site} notifier: {}", self.state.label())
        };
        lines.push(status);

        if !self.connect_error.is_empty() {
            lines.push(self.connect_error.clone());
        }

        if self.unread > 0 {
            let word = if self.unread == 1 {
                "new message"
            } else {
                "new messages"
            };
            lines.push(format!("{} {word}", self.unread));
        }

        if !self.users.is_empty() {
            let names: Vec<&str> = self.users.values().map(|u| u.name.as_str()).collect();
            let word = if self.users.len() == 1 {
                "contact online"
            } else {
                "contacts online"
            };
            lines.push(format!("{} {word} ({})", self.users.len(), names.join(", ")));
        }

        if self.state == ConnectionState::Connected
            || (self.state == ConnectionState::Enabled && lines.len() <= 1)
        {
            lines.push(format!(
                "{} members, {} online",
                self.stats.members(),
                self.stats.online
            ));
        }

        lines
    }

    // ---- outbound ---------------------------------------------------------

    fn send(&self, command: OutboundCommand) {
        if let Some(link) = &self.link {
            link.send(command);
        }
    }

    /// Log locally and mirror the line to the server when connected.
    fn log_remote(&mut self, message: &str, severity: Severity) {
        match severity {
            Severity::Info => tracing::info!("{message}"),
            Severity::Error => tracing::error!("{message}"),
        }
        self.send(OutboundCommand::Log {
            message: message.to_string(),
            severity,
        });
    }
}

async fn poll_link(
    events: &mut Option<mpsc::UnboundedReceiver<LinkEvent>>,
) -> Option<LinkEvent> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn poll_timer(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer {
        Some(sleep) => sleep.as_mut().await,
        None => std::future::pending().await,
    }
}

async fn poll_update(
    task: &mut Option<Pin<Box<dyn Future<Output = UpdateOutcome>>>>,
) -> UpdateOutcome {
    match task {
        Some(fut) => fut.as_mut().await,
        None => std::future::pending().await,
    }
}
