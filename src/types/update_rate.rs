//! Update rate control for fix subscriptions

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Update rate for fix subscriptions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateRate {
    /// Every fix the receiver produces
    Native,

    /// At most this many fixes per second, latest wins
    Max(u32),
}

impl UpdateRate {
    /// Normalize against the receiver's nominal fix rate.
    ///
    /// A cap at or above the source rate, or a cap of zero, is treated as
    /// [`UpdateRate::Native`].
    pub fn normalize(self, source_hz: f64) -> Self {
        match self {
            UpdateRate::Native => UpdateRate::Native,
            UpdateRate::Max(0) => UpdateRate::Native,
            UpdateRate::Max(hz) if hz as f64 >= source_hz => UpdateRate::Native,
            UpdateRate::Max(hz) => UpdateRate::Max(hz),
        }
    }

    /// Minimum spacing between delivered fixes, if throttling applies.
    pub fn throttle_interval(self, source_hz: f64) -> Option<Duration> {
        match self.normalize(source_hz) {
            UpdateRate::Native => None,
            UpdateRate::Max(hz) => Some(Duration::from_secs_f64(1.0 / hz as f64)),
        }
    }
}
