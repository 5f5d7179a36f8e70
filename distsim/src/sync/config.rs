use std::error::Error;
use std::fmt;
use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Conservative synchronization algorithm.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum SyncAlgorithm {
    /// Point-to-point null messages exchanged with neighboring logical
    /// processes only.
    #[default]
    NullMessage,
    /// Global rounds computing a lower bound on time stamp with an all-gather
    /// collective.
    GrantedTimeWindow,
}

const PPM: u128 = 1_000_000;
const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Pacing factor of null messages.
///
/// A bundle with delay `d` sends a null message every `tune * d` time units.
/// Valid values lie in the half-open interval (0.01, 1.0].
#[derive(Copy, Clone, Debug, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "f64", into = "f64"))]
pub struct SchedulerTune(f64);

impl SchedulerTune {
    /// Smallest excluded value.
    pub const LOWER_BOUND: f64 = 0.01;

    /// Creates a validated tuning factor.
    pub fn new(value: f64) -> Result<Self, ConfigError> {
        if value > Self::LOWER_BOUND && value <= 1.0 {
            Ok(Self(value))
        } else {
            Err(ConfigError::SchedulerTuneOutOfRange(value))
        }
    }

    /// Returns the factor.
    pub fn get(self) -> f64 {
        self.0
    }

    /// Returns the null-message period of a bundle with the specified delay.
    ///
    /// The period is computed in integer time steps with the factor rounded
    /// to parts per million, truncated, and never shorter than one time step.
    pub(crate) fn scale(self, delay: Duration) -> Duration {
        if delay == Duration::MAX {
            return Duration::MAX;
        }

        let ppm = (self.0 * PPM as f64).round() as u128;
        let period = (delay.as_nanos() * ppm / PPM).max(1);

        // The factor is at most 1, so the seconds fit the original delay.
        Duration::new(
            (period / NANOS_PER_SEC) as u64,
            (period % NANOS_PER_SEC) as u32,
        )
    }
}

impl Default for SchedulerTune {
    fn default() -> Self {
        Self(1.0)
    }
}

impl TryFrom<f64> for SchedulerTune {
    type Error = ConfigError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<SchedulerTune> for f64 {
    fn from(tune: SchedulerTune) -> Self {
        tune.0
    }
}

/// Configuration of the synchronization engine.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use distsim::sync::{SchedulerTune, SyncAlgorithm, SyncConfig};
///
/// let config = SyncConfig {
///     algorithm: SyncAlgorithm::GrantedTimeWindow,
///     scheduler_tune: SchedulerTune::new(0.5).unwrap(),
///     max_lookahead: Some(Duration::from_millis(1)),
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Copy, Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SyncConfig {
    /// Synchronization algorithm.
    pub algorithm: SyncAlgorithm,
    /// Null-message pacing; only used by [`SyncAlgorithm::NullMessage`].
    pub scheduler_tune: SchedulerTune,
    /// Upper bound on the global lookahead; only used by
    /// [`SyncAlgorithm::GrantedTimeWindow`].
    pub max_lookahead: Option<Duration>,
}

impl SyncConfig {
    /// Checks the consistency of the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_lookahead == Some(Duration::ZERO) {
            return Err(ConfigError::NonPositiveLookahead);
        }

        Ok(())
    }
}

/// Error returned when the configuration is invalid.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum ConfigError {
    /// The scheduler tune lies outside (0.01, 1.0].
    SchedulerTuneOutOfRange(f64),
    /// The maximum lookahead is zero.
    NonPositiveLookahead,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SchedulerTuneOutOfRange(value) => write!(
                fmt,
                "scheduler tune {} is not in the interval (0.01, 1.0]",
                value
            ),
            Self::NonPositiveLookahead => write!(fmt, "the maximum lookahead must be positive"),
        }
    }
}

impl Error for ConfigError {}
