//! Connection lifecycle states and the derived icon state.

/// Connection state machine
///
/// ```text
///                     connect()
///  [Disconnected] ──────────────> [Connecting]
///        ▲                             │ auth reply
///        │  link error / shutdown      ▼
///        └───────────────────── [Connected] ◄──┐
///        (from any state)              │       │ disable
///                        welcome event ▼       │
///                                 [Enabled] ───┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Link down, no attempt in flight
    Disconnected,
    /// Attempting to connect or waiting for the auth reply
    Connecting,
    /// Authenticated, no user binding
    Connected,
    /// Authenticated with a live presence subscription
    Enabled,
}

impl ConnectionState {
    /// Whether the link is up and the auth reply has been processed.
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Connected | Self::Enabled)
    }

    /// Status word used in the tooltip line.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Disconnected => "offline",
            Self::Connecting => "connecting",
            Self::Connected => "logged out",
            Self::Enabled => "online",
        }
    }
}

/// Derived state rendered by the tray icon.
///
/// Ordered by display priority: unread messages trump online contacts,
/// which trump the plain enabled/disabled distinction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IconState {
    /// Unread messages waiting
    Messages,
    /// Contacts online, nothing unread
    Contacts,
    /// Enabled and idle
    Online,
    /// Disabled or not connected
    Offline,
}

impl IconState {
    /// Derive the icon from the session's observable state.
    pub fn derive(state: ConnectionState, contacts_online: bool, unread: bool) -> Self {
        if unread {
            Self::Messages
        } else if contacts_online {
            Self::Contacts
        } else if state == ConnectionState::Enabled {
            Self::Online
        } else {
            Self::Offline
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_labels() {
        assert_eq!(ConnectionState::Disconnected.label(), "offline");
        assert_eq!(ConnectionState::Connecting.label(), "connecting");
        assert_eq!(ConnectionState::Connected.label(), "logged out");
        assert_eq!(ConnectionState::Enabled.label(), "online");
    }

    #[test]
    fn test_is_authenticated() {
        assert!(!ConnectionState::Disconnected.is_authenticated());
        assert!(!ConnectionState::Connecting.is_authenticated());
        assert!(ConnectionState::Connected.is_authenticated());
        assert!(ConnectionState::Enabled.is_authenticated());
    }

    #[test]
    fn test_icon_priority_unread_first() {
        // Unread messages win regardless of anything else
        let icon = IconState::derive(ConnectionState::Enabled, true, true);
        assert_eq!(icon, IconState::Messages);
        let icon = IconState::derive(ConnectionState::Disconnected, false, true);
        assert_eq!(icon, IconState::Messages);
    }

    #[test]
    fn test_icon_priority_contacts_second() {
        let icon = IconState::derive(ConnectionState::Enabled, true, false);
        assert_eq!(icon, IconState::Contacts);
    }

    #[test]
    fn test_icon_enabled_idle() {
        let icon = IconState::derive(ConnectionState::Enabled, false, false);
        assert_eq!(icon, IconState::Online);
    }

    #[test]
    fn test_icon_offline_otherwise() {
        for state in [
            ConnectionState::Disconnected,
            ConnectionState::Connecting,
            ConnectionState::Connected,
        ] {
            assert_eq!(IconState::derive(state, false, false), IconState::Offline);
        }
    }
}
