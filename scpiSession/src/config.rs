//! Configuration applied to a session when it is opened.

use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Settings that a [`crate::Session`] applies to its transport when it is opened.
///
/// Every field has a sensible default, so you only need to set what differs for your
/// instrument. With the `serde` feature enabled, the configuration can be loaded from your
/// application's configuration file; durations are written in human readable form, e.g.,
/// `timeout = "20s"`.
///
/// # Example
///
/// ```
/// use std::time::Duration;
///
/// use scpisession::SessionConfig;
///
/// let config = SessionConfig::default()
///     .with_timeout(Duration::from_secs(20))
///     .with_clear_on_open(true);
/// assert_eq!(config.timeout, Some(Duration::from_secs(20)));
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SessionConfig {
    /// I/O timeout of the transport. `None` keeps the transport's own timeout.
    #[cfg_attr(feature = "serde", serde(with = "humantime_serde"))]
    pub timeout: Option<Duration>,
    /// Line terminator. `None` keeps the transport's own terminator.
    pub terminator: Option<String>,
    /// Timeout for draining the optional terminator after a binary block.
    #[cfg_attr(feature = "serde", serde(with = "humantime_serde"))]
    pub drain_timeout: Duration,
    /// Send a device clear right after opening the session.
    pub clear_on_open: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout: None,
            terminator: None,
            drain_timeout: Duration::from_millis(100),
            clear_on_open: false,
        }
    }
}

impl SessionConfig {
    /// Set the I/O timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the line terminator.
    pub fn with_terminator(mut self, terminator: &str) -> Self {
        self.terminator = Some(terminator.to_string());
        self
    }

    /// Set the timeout for draining a block terminator.
    pub fn with_drain_timeout(mut self, drain_timeout: Duration) -> Self {
        self.drain_timeout = drain_timeout;
        self
    }

    /// Send a device clear when the session is opened.
    pub fn with_clear_on_open(mut self, clear_on_open: bool) -> Self {
        self.clear_on_open = clear_on_open;
        self
    }
}
