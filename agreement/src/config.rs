//! Configuration for the [crate::Router].

use crate::events::ThresholdKind;
use thiserror::Error;

/// Errors that can occur during configuration validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("soft threshold must be greater than zero")]
    ZeroSoftThreshold,
    #[error("cert threshold must be greater than zero")]
    ZeroCertThreshold,
    #[error("next threshold must be greater than zero")]
    ZeroNextThreshold,
    #[error("it must be possible to track at least one sender")]
    ZeroMaxSenders,
    #[error("it must be possible to track at least one period per round")]
    ZeroMaxTrackedPeriods,
    #[error("it must be possible to track at least one step per period")]
    ZeroMaxTrackedSteps,
}

/// Configuration for the [crate::Router].
#[derive(Clone, Debug)]
pub struct Config {
    /// Weight of soft-votes for a value required to stage it.
    pub soft_threshold: u64,

    /// Weight of cert-votes for a value required to certify it.
    pub cert_threshold: u64,

    /// Weight of next-votes for a value required to move to the next period.
    pub next_threshold: u64,

    /// Maximum number of distinct senders a single state machine may have seen.
    ///
    /// Only used to bound the decoding of checkpoints.
    pub max_senders: usize,

    /// Maximum number of periods of a single round tracked at once.
    ///
    /// Events that would start tracking another period are dropped.
    pub max_tracked_periods: usize,

    /// Maximum number of steps of a single period with vote trackers at once.
    ///
    /// Votes that would start tracking another step are dropped.
    pub max_tracked_steps: usize,
}

impl Config {
    /// Returns an error if any configuration value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.soft_threshold == 0 {
            return Err(ConfigError::ZeroSoftThreshold);
        }
        if self.cert_threshold == 0 {
            return Err(ConfigError::ZeroCertThreshold);
        }
        if self.next_threshold == 0 {
            return Err(ConfigError::ZeroNextThreshold);
        }
        if self.max_senders == 0 {
            return Err(ConfigError::ZeroMaxSenders);
        }
        if self.max_tracked_periods == 0 {
            return Err(ConfigError::ZeroMaxTrackedPeriods);
        }
        if self.max_tracked_steps == 0 {
            return Err(ConfigError::ZeroMaxTrackedSteps);
        }
        Ok(())
    }

    /// Returns the weight required to reach a threshold of `kind`.
    pub const fn threshold(&self, kind: ThresholdKind) -> u64 {
        match kind {
            ThresholdKind::Soft => self.soft_threshold,
            ThresholdKind::Cert => self.cert_threshold,
            ThresholdKind::Next => self.next_threshold,
        }
    }
}
