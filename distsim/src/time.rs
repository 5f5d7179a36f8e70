//! Simulation time.
//!
//! This module provides:
//!
//! * [`SimTime`]: an absolute timestamp measured in integer time steps
//!   (nanoseconds) since the simulation epoch,
//! * [`Deadline`]: a trait for types that can be converted to an absolute
//!   timestamp, implemented by [`SimTime`] and by [`Duration`] (interpreted
//!   relative to the current simulation time).
//!
//! The timestamp is a plain 64-bit integer which travels as-is
//! inside inter-process message headers, and `SimTime::ZERO` doubles as the
//! sentinel delivery time of null messages.
//!
//! # Examples
//!
//! ```
//! use std::time::Duration;
//!
//! use distsim::time::{Deadline, SimTime};
//!
//! let now = SimTime::from_nanos(5);
//!
//! assert_eq!(Duration::from_nanos(10).into_time(now), SimTime::from_nanos(15));
//! assert_eq!(SimTime::from_nanos(7).into_time(now), SimTime::from_nanos(7));
//!
//! // Additions saturate at the maximum representable time.
//! assert_eq!(SimTime::MAX + Duration::from_secs(1), SimTime::MAX);
//! ```

mod sim_time;

use std::time::Duration;

pub use sim_time::SimTime;

/// A type that can be used as a scheduling deadline.
///
/// Deadlines can be specified as an absolute [`SimTime`] or as a [`Duration`]
/// counted from the current simulation time.
pub trait Deadline {
    /// Make this deadline into an absolute timestamp, using the provided
    /// current time as a reference.
    fn into_time(self, now: SimTime) -> SimTime;
}

impl Deadline for Duration {
    #[inline(always)]
    fn into_time(self, now: SimTime) -> SimTime {
        now + self
    }
}

impl Deadline for SimTime {
    #[inline(always)]
    fn into_time(self, _: SimTime) -> SimTime {
        self
    }
}
