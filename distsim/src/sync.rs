//! Conservative synchronization of logical processes.
//!
//! A logical process may only process an event once it is certain that no
//! message with an earlier timestamp can still arrive from another logical
//! process. Two algorithms are available, selected with [`SyncAlgorithm`]:
//!
//! * the *null message* algorithm, where each logical process periodically
//!   promises its neighbors, by means of null messages, that it will not send
//!   them anything timestamped earlier than a *guarantee time*; the local
//!   *safe time* is the minimum guarantee over all neighbors,
//! * the *granted time window* algorithm, where all logical processes
//!   periodically agree through an all-gather collective on a lower bound on
//!   the timestamp of any future event, which extended by the global lookahead
//!   gives the *granted time*.
//!
//! Both algorithms drive the same local event queue and differ only in how
//! the horizon is computed and how the run loop waits for it to advance.

mod bundle;
mod bundle_manager;
mod config;
mod granted_time_window;
mod null_message;

use crate::simulation::{ExecutionError, LogicalProcess};
use crate::time::SimTime;

pub use bundle_manager::BundleError;
pub use config::{ConfigError, SchedulerTune, SyncAlgorithm, SyncConfig};
pub(crate) use granted_time_window::GrantedTimeWindowSync;
pub(crate) use null_message::NullMessageSync;

/// A synchronization algorithm driving the event loop of a logical process.
pub(crate) trait SynchronizationStrategy {
    /// Performs the one-time setup, exchanging initial messages if needed.
    fn initialize(&mut self, lp: &mut LogicalProcess) -> Result<(), ExecutionError>;

    /// Processes events until the run ends.
    fn run(&mut self, lp: &mut LogicalProcess) -> Result<(), ExecutionError>;

    /// Returns the time up to which events may be processed.
    fn safe_time(&self) -> SimTime;

    /// Returns the guarantee time advertised by a remote logical process, if
    /// it is tracked.
    fn guarantee_time(&self, rank: u32) -> Option<SimTime>;

    /// Returns the earliest delivery time of a packet sent now to a remote
    /// logical process.
    fn min_delivery_time(&self, lp: &LogicalProcess, rank: u32) -> Result<SimTime, ExecutionError>;

    /// Returns the guarantee time to piggyback on a packet sent to a remote
    /// logical process.
    fn packet_guarantee(&self, lp: &LogicalProcess, rank: u32) -> Result<SimTime, ExecutionError>;

    /// Notifies the strategy that a packet was sent to a remote logical
    /// process.
    fn on_packet_sent(&mut self, lp: &mut LogicalProcess, rank: u32)
        -> Result<(), ExecutionError>;

    /// Handles the firing of the null-message timer of a bundle.
    fn on_null_message_timer(
        &mut self,
        lp: &mut LogicalProcess,
        rank: u32,
    ) -> Result<(), ExecutionError>;

    /// Releases the synchronization state.
    fn destroy(&mut self);
}

/// Creates the strategy implementing the configured algorithm.
pub(crate) fn strategy(config: &SyncConfig, local_rank: u32) -> Box<dyn SynchronizationStrategy> {
    match config.algorithm {
        SyncAlgorithm::NullMessage => {
            Box::new(NullMessageSync::new(local_rank, config.scheduler_tune))
        }
        SyncAlgorithm::GrantedTimeWindow => {
            Box::new(GrantedTimeWindowSync::new(config.max_lookahead))
        }
    }
}
