//! Typed interpretation of inbound tagged commands.
//!
//! The link delivers commands as a tag plus positional string arguments;
//! this module turns them into typed values per channel. Unknown tags and
//! malformed arguments are reported as [`CommandError`]; the session logs
//! and ignores them, they are never fatal.

use std::str::FromStr;

use thiserror::Error;

use crate::transport::TaggedCommand;

/// Command interpretation failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CommandError {
    /// Tag not known on this channel.
    #[error("unknown command tag '{0}'")]
    UnknownTag(String),

    /// Required argument missing.
    #[error("command '{tag}' missing argument {index}")]
    MissingArg {
        /// Command tag.
        tag: String,
        /// Zero-based argument position.
        index: usize,
    },

    /// Argument present but unparsable.
    #[error("command '{tag}' has bad argument {index}: '{value}'")]
    BadArg {
        /// Command tag.
        tag: String,
        /// Zero-based argument position.
        index: usize,
        /// Offending argument text.
        value: String,
    },
}

/// Positional argument cursor over a tagged command.
struct ArgWalker<'a> {
    tag: &'a str,
    args: &'a [String],
    pos: usize,
}

impl<'a> ArgWalker<'a> {
    fn new(command: &'a TaggedCommand) -> Self {
        Self {
            tag: &command.tag,
            args: &command.args,
            pos: 0,
        }
    }

    /// Consume the next argument, required.
    fn next_str(&mut self) -> Result<&'a str, CommandError> {
        let arg = self.args.get(self.pos).ok_or(CommandError::MissingArg {
            tag: self.tag.to_string(),
            index: self.pos,
        })?;
        self.pos += 1;
        Ok(arg)
    }

    /// Consume and parse the next argument, required.
    fn next<T: FromStr>(&mut self) -> Result<T, CommandError> {
        let index = self.pos;
        let arg = self.next_str()?;
        arg.parse().map_err(|_| CommandError::BadArg {
            tag: self.tag.to_string(),
            index,
            value: arg.to_string(),
        })
    }

    /// Consume the next argument if present, defaulting otherwise.
    fn try_next_str(&mut self, default: &str) -> String {
        match self.args.get(self.pos) {
            Some(arg) => {
                self.pos += 1;
                arg.clone()
            }
            None => default.to_string(),
        }
    }

    /// Consume the next integer flag if present; absent or unparsable is 0.
    fn try_next_flag(&mut self) -> bool {
        match self.args.get(self.pos) {
            Some(arg) => {
                self.pos += 1;
                arg.parse::<i64>().map(|v| v != 0).unwrap_or(false)
            }
            None => false,
        }
    }

    /// Skip one argument if present.
    fn skip(&mut self) {
        if self.pos < self.args.len() {
            self.pos += 1;
        }
    }
}

/// Arguments of a `popup` push (control and presence channels).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PopupArgs {
    /// Body text; an empty message suppresses the title.
    pub message: String,
    /// URL opened on activation, may be empty.
    pub url: String,
    /// Title; empty means "use the site name".
    pub title: String,
    /// Keep visible until dismissed.
    pub sticky: bool,
    /// Intrusive notification.
    pub priority: bool,
}

impl PopupArgs {
    fn parse(walker: &mut ArgWalker<'_>) -> Self {
        Self {
            message: walker.try_next_str(""),
            url: walker.try_next_str(""),
            title: walker.try_next_str(""),
            sticky: walker.try_next_flag(),
            priority: walker.try_next_flag(),
        }
    }
}

/// Control-channel commands: the one-shot auth reply and server pushes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    /// Registration reply.
    Auth {
        /// Session cookie to persist for the next registration.
        cookie: String,
        /// Bound user id; 0 means not user-bound yet.
        user_id: i64,
        /// Server challenge (unused by this client, carried for parity).
        challenge: String,
    },
    /// Notification push.
    Popup(PopupArgs),
    /// Forced server-side logout.
    Reload,
    /// In-band update push; empty URL means "use the configured default".
    Update {
        /// Update URL, possibly empty.
        url: String,
    },
}

impl ControlCommand {
    /// Interpret a control-channel command.
    pub fn parse(command: &TaggedCommand) -> Result<Self, CommandError> {
        let mut walker = ArgWalker::new(command);
        match command.tag.as_str() {
            "auth" => Ok(Self::Auth {
                cookie: walker.next_str()?.to_string(),
                user_id: walker.next()?,
                challenge: walker.next_str()?.to_string(),
            }),
            "popup" => Ok(Self::Popup(PopupArgs::parse(&mut walker))),
            "reload" => Ok(Self::Reload),
            "update" => Ok(Self::Update {
                url: walker.try_next_str(""),
            }),
            tag => Err(CommandError::UnknownTag(tag.to_string())),
        }
    }
}

/// Presence-channel commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenceCommand {
    /// Subscription confirmed; session is fully enabled.
    Welcome {
        /// Unread message count at subscription time.
        unread: u32,
        /// Display name of the bound user.
        user_name: String,
    },
    /// A contact came online.
    Online {
        /// Contact display name.
        name: String,
        /// Contact id.
        id: i64,
    },
    /// A contact went offline.
    Offline {
        /// Contact id.
        id: i64,
    },
    /// New message from a contact.
    Msg {
        /// Sender display name.
        name: String,
    },
    /// New message, no notification.
    Smsg,
    /// Messages were read elsewhere.
    Read {
        /// How many messages were read.
        count: u32,
    },
    /// Notification push.
    Popup(PopupArgs),
}

impl PresenceCommand {
    /// Interpret a presence-channel command.
    pub fn parse(command: &TaggedCommand) -> Result<Self, CommandError> {
        let mut walker = ArgWalker::new(command);
        match command.tag.as_str() {
            "welcome" => {
                walker.skip(); // historical: online user count
                let unread = walker.next()?;
                walker.skip(); // historical: stealth state
                Ok(Self::Welcome {
                    unread,
                    user_name: walker.next_str()?.to_string(),
                })
            }
            "online" => Ok(Self::Online {
                name: walker.next_str()?.to_string(),
                id: walker.next()?,
            }),
            "offline" => Ok(Self::Offline {
                id: walker.next()?,
            }),
            "msg" => Ok(Self::Msg {
                name: walker.next_str()?.to_string(),
            }),
            "smsg" => Ok(Self::Smsg),
            "read" => Ok(Self::Read {
                count: walker.next()?,
            }),
            "popup" => Ok(Self::Popup(PopupArgs::parse(&mut walker))),
            tag => Err(CommandError::UnknownTag(tag.to_string())),
        }
    }
}

/// Stats-channel commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatsCommand {
    /// Site-wide user counts.
    Stats {
        /// Users currently online.
        online: u32,
        /// Registered male users.
        male: u32,
        /// Registered female users.
        female: u32,
    },
}

impl StatsCommand {
    /// Interpret a stats-channel command.
    pub fn parse(command: &TaggedCommand) -> Result<Self, CommandError> {
        let mut walker = ArgWalker::new(command);
        match command.tag.as_str() {
            "stats" => Ok(Self::Stats {
                online: walker.next()?,
                male: walker.next()?,
                female: walker.next()?,
            }),
            tag => Err(CommandError::UnknownTag(tag.to_string())),
        }
    }
}
