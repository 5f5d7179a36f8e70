//! Integer simulation timestamp.

use std::fmt;
use std::ops::{Add, AddAssign};
use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

const NANOS_PER_SEC: u64 = 1_000_000_000;

/// An absolute simulation timestamp.
///
/// A `SimTime` counts time steps of one nanosecond since the simulation epoch.
/// All arithmetic with [`Duration`] saturates: adding any duration to
/// [`SimTime::MAX`] yields `SimTime::MAX`, which is used throughout the crate
/// as the "unbounded" horizon.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SimTime(u64);

impl SimTime {
    /// The simulation epoch.
    ///
    /// On the wire, a delivery time equal to `ZERO` identifies a null message.
    pub const ZERO: Self = Self(0);

    /// The maximum representable simulation time.
    pub const MAX: Self = Self(u64::MAX);

    /// Creates a timestamp from a number of time steps since the epoch.
    pub const fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    /// Creates a timestamp from a number of seconds since the epoch,
    /// saturating at [`SimTime::MAX`].
    pub const fn from_secs(secs: u64) -> Self {
        Self(secs.saturating_mul(NANOS_PER_SEC))
    }

    /// Returns the number of time steps since the epoch.
    pub const fn as_nanos(self) -> u64 {
        self.0
    }

    /// Returns the duration elapsed since `earlier`, or `None` if `earlier` is
    /// later than `self`.
    pub fn checked_duration_since(self, earlier: SimTime) -> Option<Duration> {
        self.0.checked_sub(earlier.0).map(Duration::from_nanos)
    }

    /// Returns the duration elapsed since `earlier`, or a null duration if
    /// `earlier` is later than `self`.
    pub fn saturating_duration_since(self, earlier: SimTime) -> Duration {
        Duration::from_nanos(self.0.saturating_sub(earlier.0))
    }

    /// Adds a duration, saturating at [`SimTime::MAX`].
    pub fn saturating_add(self, duration: Duration) -> Self {
        let nanos = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);

        Self(self.0.saturating_add(nanos))
    }
}

impl Add<Duration> for SimTime {
    type Output = SimTime;

    #[inline]
    fn add(self, rhs: Duration) -> Self::Output {
        self.saturating_add(rhs)
    }
}

impl AddAssign<Duration> for SimTime {
    #[inline]
    fn add_assign(&mut self, rhs: Duration) {
        *self = self.saturating_add(rhs);
    }
}

impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::MAX {
            return f.write_str("+inf");
        }
        write!(
            f,
            "{}.{:09}s",
            self.0 / NANOS_PER_SEC,
            self.0 % NANOS_PER_SEC
        )
    }
}
