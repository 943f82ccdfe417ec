//! Relay configuration loaded from YAML.
//!
//! Every key is optional; missing keys take their defaults.
//!
//! ```rust
//! use gpsrelay::RelayConfig;
//!
//! let config = RelayConfig::from_yaml_str(
//!     "line:\n  baud_rate: 4800\nstrict_checksum: true\nrestart:\n  max_consecutive_failures: 3\n",
//! )
//! .unwrap();
//! assert_eq!(config.line.baud_rate, 4800);
//! assert!(config.strict_checksum);
//! assert_eq!(config.restart.max_consecutive_failures, 3);
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::sentence::DEFAULT_MAX_SENTENCE_LEN;
use crate::types::LineSettings;
use crate::{RelayError, Result};

/// Top-level relay configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RelayConfig {
    /// Serial framing applied when a session opens its transport.
    pub line: LineSettings,

    /// Bytes buffered without a terminator before the buffer resets.
    pub max_sentence_len: usize,

    /// Reject sentences that carry no checksum suffix.
    pub strict_checksum: bool,

    /// Drop fixes older than the last one forwarded.
    pub suppress_stale_fixes: bool,

    /// Capacity of the channel between the session task and the emitter.
    pub fix_channel_capacity: usize,

    pub restart: RestartPolicy,

    pub replay: ReplaySettings,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            line: LineSettings::default(),
            max_sentence_len: DEFAULT_MAX_SENTENCE_LEN,
            strict_checksum: false,
            suppress_stale_fixes: false,
            fix_channel_capacity: 64,
            restart: RestartPolicy::default(),
            replay: ReplaySettings::default(),
        }
    }
}

impl RelayConfig {
    /// Parse and validate a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: RelayConfig = serde_yaml_ng::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a YAML file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| RelayError::config_file(path.to_path_buf(), e))?;
        Self::from_yaml_str(&yaml)
    }

    pub fn to_yaml_string(&self) -> Result<String> {
        Ok(serde_yaml_ng::to_string(self)?)
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.line.baud_rate == 0 {
            return Err(RelayError::config("line.baud_rate must be positive"));
        }
        if self.max_sentence_len < 16 {
            return Err(RelayError::config(format!(
                "max_sentence_len {} is too small to hold a sentence",
                self.max_sentence_len
            )));
        }
        if self.fix_channel_capacity == 0 {
            return Err(RelayError::config("fix_channel_capacity must be positive"));
        }
        self.restart.validate()?;
        self.replay.validate()
    }
}

/// How a session recovers from read failures while the device stays attached.
///
/// Delays grow exponentially from `initial_backoff_ms` up to
/// `max_backoff_ms`. After `max_consecutive_failures` failed reads without a
/// successful read in between the session gives up. Zero disables the limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RestartPolicy {
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub max_consecutive_failures: u32,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self { initial_backoff_ms: 50, max_backoff_ms: 1600, max_consecutive_failures: 10 }
    }
}

impl RestartPolicy {
    /// Delay before restart number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        let millis = self.initial_backoff_ms.saturating_mul(1 << shift);
        Duration::from_millis(millis.min(self.max_backoff_ms))
    }

    /// Whether `failures` consecutive read errors exhaust the policy.
    pub fn is_exhausted(&self, failures: u32) -> bool {
        self.max_consecutive_failures != 0 && failures >= self.max_consecutive_failures
    }

    fn validate(&self) -> Result<()> {
        if self.max_backoff_ms < self.initial_backoff_ms {
            return Err(RelayError::config(format!(
                "restart.max_backoff_ms ({}) is below restart.initial_backoff_ms ({})",
                self.max_backoff_ms, self.initial_backoff_ms
            )));
        }
        Ok(())
    }
}

/// Playback parameters for [`ReplayTransport`](crate::transport::ReplayTransport).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReplaySettings {
    /// Bytes handed out per read.
    pub chunk_size: usize,

    /// Delay between reads; zero plays back as fast as possible.
    pub chunk_interval_ms: u64,
}

impl Default for ReplaySettings {
    fn default() -> Self {
        Self { chunk_size: 64, chunk_interval_ms: 0 }
    }
}

impl ReplaySettings {
    pub fn chunk_interval(&self) -> Option<Duration> {
        (self.chunk_interval_ms > 0).then(|| Duration::from_millis(self.chunk_interval_ms))
    }

    fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(RelayError::config("replay.chunk_size must be positive"));
        }
        Ok(())
    }
}
