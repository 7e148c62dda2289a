//! Tunables for the self-protection controller.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{GuardError, GuardResult};
use crate::procfs::DEFAULT_CLOCK_TICKS_PER_SEC;

/// Self-protection configuration, supplied by the configuration provider and
/// re-read on every tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardConfig {
    /// Run the CPU check at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Share of each allowed core the host may use before hooks are
    /// suspended, in [0, 1].
    #[serde(default = "default_usage_fraction")]
    pub usage_fraction: f64,

    /// Seconds between ticks.
    #[serde(default = "default_sample_interval")]
    pub sample_interval_secs: u64,

    /// Operator override of the protection switch. Applied as soon as the
    /// configuration changes; the next tick recomputes the switch.
    #[serde(default)]
    pub force_hooks_enabled: Option<bool>,

    /// Kernel `USER_HZ`, the unit of `/proc/<pid>/stat` CPU times. Read
    /// once when the controller is built.
    #[serde(default = "default_clock_ticks")]
    pub clock_ticks_per_sec: u64,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            usage_fraction: default_usage_fraction(),
            sample_interval_secs: default_sample_interval(),
            force_hooks_enabled: None,
            clock_ticks_per_sec: default_clock_ticks(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_usage_fraction() -> f64 {
    0.9
}

fn default_sample_interval() -> u64 {
    5
}

fn default_clock_ticks() -> u64 {
    DEFAULT_CLOCK_TICKS_PER_SEC
}

impl GuardConfig {
    pub fn sample_interval(&self) -> Duration {
        Duration::from_secs(self.sample_interval_secs)
    }

    pub fn validate(&self) -> GuardResult<()> {
        if !(0.0..=1.0).contains(&self.usage_fraction) {
            return Err(GuardError::InvalidConfig(format!(
                "usage_fraction must be within [0, 1], got {}",
                self.usage_fraction
            )));
        }
        if self.sample_interval_secs == 0 {
            return Err(GuardError::InvalidConfig(
                "sample_interval_secs must be positive".into(),
            ));
        }
        if self.clock_ticks_per_sec == 0 {
            return Err(GuardError::InvalidConfig(
                "clock_ticks_per_sec must be positive".into(),
            ));
        }
        Ok(())
    }
}
