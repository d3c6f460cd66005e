//! Protocol-wide configuration for **xfer-core**.
//!
//! The [`Config`] struct centralises tunable parameters such as the chunk
//! size and default deadline windows. It is constructed via the
//! [`ConfigBuilder`] using the fluent builder pattern, enabling callers to
//! customise only the fields they care about while keeping sensible
//! defaults.
//!
//! All fields are `pub` so read-only access is ergonomic, however mutation
//! should occur through the builder to preserve validation invariants.
//!
//! ```
//! use xfer_core::config::Config;
//!
//! let cfg = Config::default();
//! assert_eq!(cfg.chunk_size, 8192);
//! ```

use serde::{Deserialize, Serialize};

/// Runtime configuration shared across the crate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    /// Plaintext chunk size in bytes; the final chunk of a file may be
    /// shorter (§3).
    pub chunk_size: usize,

    /// Default window, in milliseconds, between a proposal's acceptance
    /// and its `RevealDeadline`.
    pub reveal_window_ms: u64,

    /// Default window, in milliseconds, between `RevealDeadline` and
    /// `RefundDeadline`.
    pub refund_window_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chunk_size: crate::chunk::DEFAULT_CHUNK_SIZE,
            reveal_window_ms: 10 * 60 * 1000,
            refund_window_ms: 20 * 60 * 1000,
        }
    }
}

/// Fluent builder for [`Config`].
pub struct ConfigBuilder {
    inner: Config,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigBuilder {
    /// Starts a new builder pre-populated with [`Config::default`].
    pub fn new() -> Self {
        Self {
            inner: Config::default(),
        }
    }

    pub fn chunk_size(mut self, size: usize) -> Self {
        self.inner.chunk_size = size;
        self
    }

    pub fn reveal_window_ms(mut self, ms: u64) -> Self {
        self.inner.reveal_window_ms = ms;
        self
    }

    pub fn refund_window_ms(mut self, ms: u64) -> Self {
        self.inner.refund_window_ms = ms;
        self
    }

    /// Consumes the builder returning an immutable configuration value.
    pub fn finish(self) -> Config {
        self.inner
    }
}
