//! Client configuration.
//!
//! # Example
//!
//! ```
//! use wahlplakat_client::config::ClientConfig;
//! use std::time::Duration;
//!
//! let config = ClientConfig::new("https://example.org")
//!     .unwrap()
//!     .with_event_channel_capacity(512)
//!     .with_shutdown_timeout(Duration::from_secs(5));
//! assert_eq!(
//!     config.api_url("/api/auth/login").unwrap().as_str(),
//!     "https://example.org/wahlplakatgame/api/auth/login"
//! );
//! ```

use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::error::Result;

/// Default mount point of the game on the server.
pub const DEFAULT_BASE_PATH: &str = "/wahlplakatgame";

/// Default server used when `WAHLPLAKAT_URL` is not set.
pub const DEFAULT_SERVER_URL: &str = "http://localhost:5001";

const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

// ── Reconnect policy ────────────────────────────────────────────────

/// Exponential backoff used by the event channel after a transport drop.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    /// Consecutive failed attempts before the channel gives up.
    /// `0` disables reconnection.
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(1_000),
            max_delay: Duration::from_millis(30_000),
            multiplier: 2.0,
            max_attempts: 10,
        }
    }
}

impl ReconnectPolicy {
    /// A policy that never reconnects.
    pub fn disabled() -> Self {
        Self {
            max_attempts: 0,
            ..Self::default()
        }
    }
}

/// Backoff progress for one reconnect sequence.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: ReconnectPolicy,
    attempts: u32,
    delay: Duration,
}

impl Backoff {
    pub fn new(policy: ReconnectPolicy) -> Self {
        let delay = policy.initial_delay;
        Self {
            policy,
            attempts: 0,
            delay,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
        self.delay = self.policy.initial_delay;
    }

    /// Advance to the next attempt and return the delay to wait before it,
    /// or `None` once the policy is exhausted.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempts >= self.policy.max_attempts {
            return None;
        }
        let current = self.delay;
        self.attempts += 1;
        self.delay = current
            .mul_f64(self.policy.multiplier.max(1.0))
            .min(self.policy.max_delay);
        Some(current)
    }
}

// ── Configuration ───────────────────────────────────────────────────

/// Configuration for the game client.
///
/// The only required value is the server URL; everything else defaults to
/// what the production deployment uses.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Scheme, host and port of the game server.
    pub server_url: Url,
    /// Path prefix the game is mounted under. Defaults to `/wahlplakatgame`.
    pub base_path: String,
    /// Capacity of the bounded channel-event queue.
    ///
    /// Defaults to **256**. Values below 1 are clamped to 1.
    pub event_channel_capacity: usize,
    /// How long [`EventChannel::disconnect`](crate::channel::EventChannel::disconnect)
    /// waits for the transport loop before aborting it.
    pub shutdown_timeout: Duration,
    /// Timeout for opening one transport.
    pub connect_timeout: Duration,
    /// Try a WebSocket before falling back to long-polling.
    pub prefer_websocket: bool,
    pub reconnect: ReconnectPolicy,
    /// Where the file-backed session store lives. `None` picks the platform
    /// config directory.
    pub storage_path: Option<PathBuf>,
}

impl ClientConfig {
    /// Create a configuration for the given server.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Http`](crate::ClientError::Http) if `server_url`
    /// is not a valid URL.
    pub fn new(server_url: &str) -> Result<Self> {
        Ok(Self {
            server_url: Url::parse(server_url)?,
            base_path: DEFAULT_BASE_PATH.to_string(),
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            prefer_websocket: true,
            reconnect: ReconnectPolicy::default(),
            storage_path: None,
        })
    }

    /// Build a configuration from `WAHLPLAKAT_URL`, `WAHLPLAKAT_BASE_PATH`
    /// and `WAHLPLAKAT_STORAGE`, falling back to defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if `WAHLPLAKAT_URL` is not a valid URL.
    pub fn from_env() -> Result<Self> {
        let url = std::env::var("WAHLPLAKAT_URL").unwrap_or_else(|_| DEFAULT_SERVER_URL.into());
        let mut config = Self::new(&url)?;
        if let Ok(base_path) = std::env::var("WAHLPLAKAT_BASE_PATH") {
            config = config.with_base_path(base_path);
        }
        if let Ok(path) = std::env::var("WAHLPLAKAT_STORAGE") {
            config = config.with_storage_path(path);
        }
        tracing::debug!(server = %config.server_url, base_path = %config.base_path, "configuration loaded");
        Ok(config)
    }

    /// Set the path prefix. Leading and trailing slashes are normalized.
    #[must_use]
    pub fn with_base_path(mut self, base_path: impl Into<String>) -> Self {
        let trimmed = base_path.into().trim_matches('/').to_string();
        self.base_path = if trimmed.is_empty() {
            String::new()
        } else {
            format!("/{trimmed}")
        };
        self
    }

    /// Defaults to **256**. Values below 1 are clamped to 1.
    #[must_use]
    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity.max(1);
        self
    }

    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    /// Skip the WebSocket attempt and go straight to long-polling.
    #[must_use]
    pub fn with_polling_only(mut self) -> Self {
        self.prefer_websocket = false;
        self
    }

    #[must_use]
    pub fn with_storage_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.storage_path = Some(path.into());
        self
    }

    /// Absolute URL of an HTTP endpoint such as `/api/auth/login`.
    ///
    /// # Errors
    ///
    /// Fails if the joined path does not form a valid URL.
    pub fn api_url(&self, path: &str) -> Result<Url> {
        let path = format!("{}/{}", self.base_path, path.trim_start_matches('/'));
        Ok(self.server_url.join(&path)?)
    }

    /// HTTP URL of the Socket.IO endpoint, without query parameters.
    ///
    /// # Errors
    ///
    /// Fails if the joined path does not form a valid URL.
    pub fn socket_url(&self) -> Result<Url> {
        self.api_url("/socket.io/")
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = ClientConfig::new("http://localhost:5001").unwrap();
        assert_eq!(config.base_path, "/wahlplakatgame");
        assert_eq!(config.event_channel_capacity, 256);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(1));
        assert!(config.prefer_websocket);
        assert!(config.storage_path.is_none());
        assert_eq!(config.reconnect.max_attempts, 10);
    }

    #[test]
    fn invalid_url_is_rejected() {
        assert!(ClientConfig::new("not a url").is_err());
    }

    #[test]
    fn base_path_is_normalized() {
        let config = ClientConfig::new("http://h").unwrap().with_base_path("game/");
        assert_eq!(config.base_path, "/game");
        let config = ClientConfig::new("http://h").unwrap().with_base_path("/");
        assert_eq!(config.base_path, "");
        assert_eq!(
            config.api_url("api/game/parteien").unwrap().as_str(),
            "http://h/api/game/parteien"
        );
    }

    #[test]
    fn socket_url_points_at_socket_io() {
        let config = ClientConfig::new("https://example.org:8443").unwrap();
        assert_eq!(
            config.socket_url().unwrap().as_str(),
            "https://example.org:8443/wahlplakatgame/socket.io/"
        );
    }

    #[test]
    fn event_channel_capacity_is_clamped_to_one() {
        let config = ClientConfig::new("http://h")
            .unwrap()
            .with_event_channel_capacity(0);
        assert_eq!(config.event_channel_capacity, 1);
    }

    #[test]
    fn backoff_doubles_until_capped_then_exhausts() {
        let mut backoff = Backoff::new(ReconnectPolicy {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(300),
            multiplier: 2.0,
            max_attempts: 4,
        });
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(100)));
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(200)));
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(300)));
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(300)));
        assert_eq!(backoff.next_delay(), None);
        assert_eq!(backoff.attempts(), 4);

        backoff.reset();
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(100)));
    }

    #[test]
    fn disabled_policy_never_retries() {
        let mut backoff = Backoff::new(ReconnectPolicy::disabled());
        assert_eq!(backoff.next_delay(), None);
    }
}
