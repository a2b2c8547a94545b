//! Cryptographically-verified self-update pipeline.
//!
//! Given an update URL, fetch the detached signature (`<path>.sig`) first,
//! then the binary, both through the minimal [`crate::fetch`] pipeline over
//! an independent connection. Only an explicitly valid signature releases
//! the downloaded buffer to the caller; everything else aborts the attempt
//! with one log line. There is no internal retry; a failed attempt waits
//! for the next externally-triggered update check.

mod verify;

use std::cell::Cell;

use ed25519_dalek::VerifyingKey;
use tokio_util::sync::CancellationToken;

pub use verify::{parse_public_key, parse_signature_fields, verify_detached, Verification};

use crate::config::UpdateConfig;
use crate::error::{NotifierError, Result};
use crate::fetch;

/// Suffix appended to the binary path to locate the detached signature.
pub const SIGNATURE_SUFFIX: &str = ".sig";

/// Outcome of one update attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Signature checked out; the buffer is ready for the installer.
    Verified(Vec<u8>),
    /// Attempt aborted; the reason has been logged.
    Failed,
}

/// A parsed `http://host[:port]/path` update location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateUrl {
    /// Host to fetch from.
    pub host: String,
    /// Port, 80 unless given.
    pub port: u16,
    /// Absolute path of the binary.
    pub path: String,
}

impl UpdateUrl {
    /// Parse an absolute http URL. Only the `http` scheme is accepted and
    /// the path must be non-empty.
    pub fn parse(url: &str) -> Result<Self> {
        let rest = url
            .strip_prefix("http://")
            .ok_or_else(|| NotifierError::UpdateUrl(format!("scheme must be http: {url}")))?;

        let (host_port, path) = match rest.find('/') {
            Some(slash) => rest.split_at(slash),
            None => (rest, ""),
        };
        if path.is_empty() || path == "/" {
            return Err(NotifierError::UpdateUrl(format!("path seems empty: {url}")));
        }

        let (host, port) = match host_port.split_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse()
                    .map_err(|_| NotifierError::UpdateUrl(format!("bad port: {url}")))?;
                (host, port)
            }
            None => (host_port, 80),
        };
        if host.is_empty() {
            return Err(NotifierError::UpdateUrl(format!("host seems empty: {url}")));
        }

        Ok(Self {
            host: host.to_string(),
            port,
            path: path.to_string(),
        })
    }

    /// Path of the detached signature artifact.
    pub fn signature_path(&self) -> String {
        format!("{}{}", self.path, SIGNATURE_SUFFIX)
    }
}

/// Fetches, verifies, and hands over update binaries.
pub struct UpdateManager {
    key: Option<VerifyingKey>,
    default_url: String,
    in_progress: Cell<bool>,
}

impl UpdateManager {
    /// Create a manager from config. An unparsable public key is treated as
    /// absent (every verification then reports an error outcome).
    pub fn new(config: &UpdateConfig) -> Self {
        let key = if config.public_key.is_empty() {
            None
        } else {
            match parse_public_key(&config.public_key) {
                Ok(key) => Some(key),
                Err(e) => {
                    tracing::warn!("updater: ignoring configured public key: {e}");
                    None
                }
            }
        };
        Self {
            key,
            default_url: config.url.clone(),
            in_progress: Cell::new(false),
        }
    }

    /// Create a manager with an explicit key and no default URL.
    pub fn with_key(key: VerifyingKey) -> Self {
        Self {
            key: Some(key),
            default_url: String::new(),
            in_progress: Cell::new(false),
        }
    }

    /// Whether an update attempt is in flight (read by the snapshot hook).
    pub fn is_updating(&self) -> bool {
        self.in_progress.get()
    }

    /// Run one update attempt against `url` (empty falls back to the
    /// configured default). Returns the verified binary or a logged failure.
    pub async fn run(&self, url: &str, cancel: &CancellationToken) -> UpdateOutcome {
        let url = if url.is_empty() {
            self.default_url.as_str()
        } else {
            url
        };
        if url.is_empty() {
            tracing::debug!("updater: no update URL available, skipping");
            return UpdateOutcome::Failed;
        }

        let location = match UpdateUrl::parse(url) {
            Ok(location) => location,
            Err(e) => {
                tracing::warn!("updater: {e}");
                return UpdateOutcome::Failed;
            }
        };

        tracing::info!("updater: fetching update from {url}");
        self.in_progress.set(true);
        let outcome = self.fetch_and_verify(&location, cancel).await;
        self.in_progress.set(false);
        outcome
    }

    async fn fetch_and_verify(
        &self,
        location: &UpdateUrl,
        cancel: &CancellationToken,
    ) -> UpdateOutcome {
        let sig_path = location.signature_path();
        let Some(sig_body) =
            fetch::fetch(&location.host, location.port, &sig_path, cancel).await
        else {
            tracing::warn!("updater: unable to download signature file");
            return UpdateOutcome::Failed;
        };

        let Some((sig_s, sig_r)) = parse_signature_fields(&sig_body) else {
            tracing::warn!("updater: signature file unparsable");
            return UpdateOutcome::Failed;
        };
        tracing::info!("updater: got signature [s={sig_s} r={sig_r}]");

        let Some(binary) =
            fetch::fetch(&location.host, location.port, &location.path, cancel).await
        else {
            tracing::warn!("updater: unable to download binary");
            return UpdateOutcome::Failed;
        };
        tracing::info!("updater: got binary, length={}", binary.len());

        match verify_detached(&binary, &sig_s, &sig_r, self.key.as_ref()) {
            Verification::Valid => {
                tracing::info!("updater: signature checks out");
                UpdateOutcome::Verified(binary)
            }
            Verification::Invalid => {
                tracing::warn!("updater: verification failed, discarding binary");
                UpdateOutcome::Failed
            }
            Verification::Error(e) => {
                tracing::warn!("updater: unable to verify: {e}");
                UpdateOutcome::Failed
            }
        }
    }
}
