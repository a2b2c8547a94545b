//! Presentation capability set.
//!
//! Everything user-facing or OS-specific lives behind this injected trait:
//! balloon/tray rendering, browser launching, config persistence, and the
//! install step of a verified update. The session core calls these hooks and
//! never renders anything itself. Backends are plugged in as trait objects
//! at construction, not by subclassing.

pub use crate::protocol::state::IconState;

/// Capability set implemented by a presentation/config backend.
///
/// Implementations must not block: they run on the session's single-threaded
/// run loop. The default methods make every capability optional, so a
/// minimal backend can override nothing.
pub trait Presentation {
    /// Show a notification to the user.
    ///
    /// `sticky` asks the backend to keep the notification visible until
    /// dismissed; `priority` marks it as more intrusive. `url` is opened
    /// when the user activates the notification, if non-empty.
    fn notify(&mut self, title: &str, text: &str, url: &str, sticky: bool, priority: bool) {
        let _ = (title, text, url, sticky, priority);
    }

    /// Open a URL in the user's browser.
    fn open_url(&mut self, url: &str) {
        let _ = url;
    }

    /// Reflect the derived session state in the tray icon.
    fn set_icon_state(&mut self, state: IconState) {
        let _ = state;
    }

    /// Replace the tooltip with an ordered list of display lines.
    fn set_tooltip_lines(&mut self, lines: &[String]) {
        let _ = lines;
    }

    /// A newer client is available at `url`.
    ///
    /// The backend prepares whatever staging it needs (directories,
    /// permission checks) and returns whether the update attempt should
    /// proceed. Returning `false` skips the attempt entirely.
    fn needs_update(&mut self, url: &str) -> bool {
        let _ = url;
        false
    }

    /// Install a verified update binary.
    ///
    /// Only invoked with a buffer whose signature checked out. A `false`
    /// return is terminal for this update cycle.
    fn install_update(&mut self, binary: &[u8]) -> bool {
        let _ = binary;
        false
    }

    /// Read a persisted config value; empty string when unset.
    fn read_config(&mut self, key: &str) -> String {
        let _ = key;
        String::new()
    }

    /// Persist a config value. Returns whether the write succeeded.
    fn write_config(&mut self, key: &str, value: &str) -> bool {
        let _ = (key, value);
        false
    }
}
