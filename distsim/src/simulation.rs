//! Distributed discrete-event simulation management.
//!
//! This module contains most notably the [`Simulation`] environment, the
//! [`SimInit`] simulation builder and the [`Context`] handed to event
//! callbacks.
//!
//! # Simulation lifecycle
//!
//! Each logical process of a distributed simulation typically goes through
//! the following stages:
//!
//! 1. construction of the [`Topology`](crate::topology::Topology), which must
//!    be identical on all logical processes,
//! 2. instantiation of a [`SimInit`] builder, selection of the synchronization
//!    algorithm and registration of the handler of packets received from other
//!    logical processes,
//! 3. initialization of a [`Simulation`] with [`SimInit::init()`], which takes
//!    ownership of an already enabled [`Transport`](crate::transport::Transport),
//! 4. scheduling of the initial events,
//! 5. one or more calls to [`Simulation::run()`], and finally
//! 6. [`Simulation::destroy()`], which runs the destroy events and shuts the
//!    transport down.
//!
//! # Events and contexts
//!
//! Events are callbacks scheduled at a simulation time. Events scheduled for
//! the same time run in scheduling order. Each event runs in a *context*,
//! which is by convention the index of the node it concerns or [`NO_CONTEXT`].
//! Events scheduled from a callback inherit the context of that callback
//! unless they are scheduled with an explicit context.
//!
//! Packets sent with [`Context::send_packet()`] to a node owned by another
//! logical process are delivered to the packet handler of that logical
//! process, in the context of the destination node.
//!
//! # Termination
//!
//! With the null message algorithm, null-message timers keep the event queue
//! busy, so a run normally ends with [`Simulation::stop_after()`] or a call
//! to [`Context::stop()`]. With the granted time window algorithm, a run ends
//! once all logical processes are simultaneously finished.

mod context;
mod event_queue;
mod logical_process;
mod sim_init;

use std::error::Error;
use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, info, warn};

use crate::sync::{BundleError, SynchronizationStrategy};
use crate::time::{Deadline, SimTime};
use crate::topology::NodeId;
use crate::transport::{DecodeError, TransportError};

pub use context::Context;
pub(crate) use event_queue::Action;
pub use event_queue::{EventId, SchedulingError, NO_CONTEXT};
pub(crate) use logical_process::LogicalProcess;
pub use sim_init::SimInit;

/// A packet received from another logical process.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemotePacket {
    /// Destination node.
    pub node: NodeId,
    /// Destination device on the node.
    pub device: u32,
    /// Serialized packet.
    pub payload: Bytes,
}

/// Simulation environment of one logical process.
///
/// A `Simulation` is created by calling [`SimInit::init()`] on a simulation
/// builder. It owns the local event queue, the transport and the state of the
/// synchronization algorithm.
///
/// Events can be scheduled before the simulation runs, as well as from event
/// callbacks through their [`Context`]. A call to [`run()`](Simulation::run)
/// processes events in chronological order, never beyond the safe time
/// derived from the promises of the other logical processes.
pub struct Simulation {
    lp: LogicalProcess,
    sync: Box<dyn SynchronizationStrategy>,
    is_initialized: bool,
}

impl Simulation {
    /// Creates a new `Simulation`.
    pub(crate) fn new(lp: LogicalProcess, sync: Box<dyn SynchronizationStrategy>) -> Self {
        Self {
            lp,
            sync,
            is_initialized: false,
        }
    }

    /// Processes events until the run ends.
    ///
    /// The synchronization state is initialized on the first call, which
    /// exchanges initial messages with the other logical processes.
    ///
    /// A run ends when a stop is requested or, depending on the
    /// synchronization algorithm, when no event is left to process. A new
    /// run can be started afterwards.
    pub fn run(&mut self) -> Result<(), ExecutionError> {
        self.lp.queue.clear_stop();
        if !self.is_initialized {
            self.is_initialized = true;
            self.sync.initialize(&mut self.lp)?;
        }

        info!(rank = self.lp.system_id(), time = %self.lp.now(), "run started");
        self.sync.run(&mut self.lp)?;
        info!(rank = self.lp.system_id(), time = %self.lp.now(), "run ended");

        debug_assert!(
            !self.lp.queue.is_empty() || self.lp.queue.unscheduled() == 0,
            "internal simulation error: events were lost"
        );

        Ok(())
    }

    /// Runs the destroy events, releases all pending events and shuts down
    /// the transport.
    ///
    /// Destroy events run regardless of the safe time. This must be called
    /// once all logical processes have completed their runs.
    pub fn destroy(mut self) {
        debug!(rank = self.lp.system_id(), "destroying simulation");

        while let Some(callback) = self.lp.queue.pop_destroy_event() {
            let mut cx = Context::new(&mut self.lp, &mut *self.sync);
            callback(&mut cx);
        }
        if let Some(e) = self.lp.take_failure() {
            warn!(rank = self.lp.system_id(), error = %e, "destroy event failed");
        }
        self.lp.queue.clear();
        self.sync.destroy();

        debug!(
            rank = self.lp.system_id(),
            pending_sends = self.lp.messenger.pending_sends(),
            "disabling transport"
        );
        self.lp.messenger.disable();
    }

    /// Requests the current run to stop after the event being processed.
    pub fn stop(&mut self) {
        self.lp.queue.request_stop();
    }

    /// Schedules a stop request.
    pub fn stop_after(&mut self, deadline: impl Deadline) -> Result<EventId, SchedulingError> {
        let time = deadline.into_time(self.lp.now());

        self.lp.queue.schedule(time, Action::Stop)
    }

    /// Returns the current simulation time.
    pub fn time(&self) -> SimTime {
        self.lp.now()
    }

    /// Returns the current context.
    pub fn context(&self) -> u32 {
        self.lp.queue.context()
    }

    /// Returns the rank of the local logical process.
    pub fn system_id(&self) -> u32 {
        self.lp.system_id()
    }

    /// Returns the number of logical processes.
    pub fn system_count(&self) -> u32 {
        self.lp.messenger.size()
    }

    /// Returns the time up to which events may be processed.
    ///
    /// This is [`SimTime::MAX`] for a logical process without remote
    /// channels.
    pub fn safe_time(&self) -> SimTime {
        self.sync.safe_time()
    }

    /// Returns the latest guarantee time received from a remote logical
    /// process.
    ///
    /// `None` is returned if no bundle connects to that logical process or if
    /// the algorithm does not track guarantees.
    pub fn guarantee_time(&self, rank: u32) -> Option<SimTime> {
        self.sync.guarantee_time(rank)
    }

    /// Schedules an event in the current context.
    ///
    /// An error is returned if the specified time lies in the past of the
    /// current simulation time.
    pub fn schedule<F>(
        &mut self,
        deadline: impl Deadline,
        callback: F,
    ) -> Result<EventId, SchedulingError>
    where
        F: FnOnce(&mut Context<'_>) + 'static,
    {
        let time = deadline.into_time(self.lp.now());

        self.lp.queue.schedule(time, Action::Call(Box::new(callback)))
    }

    /// Schedules an event in the specified context.
    pub fn schedule_with_context<F>(
        &mut self,
        context: u32,
        deadline: impl Deadline,
        callback: F,
    ) -> Result<EventId, SchedulingError>
    where
        F: FnOnce(&mut Context<'_>) + 'static,
    {
        let time = deadline.into_time(self.lp.now());

        self.lp
            .queue
            .schedule_with_context(context, time, Action::Call(Box::new(callback)))
    }

    /// Schedules an event at the current time.
    pub fn schedule_now<F>(&mut self, callback: F) -> EventId
    where
        F: FnOnce(&mut Context<'_>) + 'static,
    {
        self.lp.schedule_now(Action::Call(Box::new(callback)))
    }

    /// Registers an event to be run by [`Simulation::destroy()`].
    pub fn schedule_destroy<F>(&mut self, callback: F) -> EventId
    where
        F: FnOnce(&mut Context<'_>) + 'static,
    {
        self.lp.queue.schedule_destroy(Box::new(callback))
    }

    /// Flags an event so that it is not invoked.
    ///
    /// This is a no-op if the event has already fired or was cancelled.
    pub fn cancel(&mut self, id: &EventId) {
        self.lp.queue.cancel(id);
    }

    /// Removes an event from the queue.
    ///
    /// This is a no-op if the event has already fired or was cancelled.
    pub fn remove(&mut self, id: &EventId) {
        self.lp.queue.remove(id);
    }

    /// Checks whether an event has fired or was cancelled.
    pub fn is_expired(&self, id: &EventId) -> bool {
        self.lp.queue.is_expired(id)
    }

    /// Returns the time left before an event fires, or zero if it has
    /// expired.
    pub fn delay_left(&self, id: &EventId) -> Duration {
        self.lp.queue.delay_left(id)
    }

    /// Returns the total number of messages sent to other logical processes.
    pub fn tx_count(&self) -> u64 {
        self.lp.messenger.tx_count()
    }

    /// Returns the total number of messages received from other logical
    /// processes.
    pub fn rx_count(&self) -> u64 {
        self.lp.messenger.rx_count()
    }

    #[cfg(test)]
    pub(crate) fn parts_mut(
        &mut self,
    ) -> (&mut LogicalProcess, &mut (dyn SynchronizationStrategy + 'static)) {
        (&mut self.lp, &mut *self.sync)
    }
}

impl fmt::Debug for Simulation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Simulation")
            .field("system_id", &self.lp.system_id())
            .field("time", &self.lp.now())
            .field("safe_time", &self.sync.safe_time())
            .finish_non_exhaustive()
    }
}

/// Error returned when a simulation run fails.
///
/// All such errors are fatal for the distributed simulation.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum ExecutionError {
    /// The transport failed.
    Transport(TransportError),
    /// A malformed frame was received.
    Decode(DecodeError),
    /// A channel bundle could not be registered.
    Bundle(BundleError),
    /// An event could not be scheduled.
    Scheduling(SchedulingError),
    /// A packet targets a node that does not exist.
    UnknownNode(u32),
    /// A message involves a logical process that shares no channel with the
    /// local one.
    UnknownPeer(u32),
    /// A packet was received after its delivery time.
    CausalityViolation {
        /// Delivery time of the packet.
        delivery_time: SimTime,
        /// Local time at reception.
        now: SimTime,
    },
    /// A packet to a remote logical process was sent with a delivery time
    /// shorter than the lookahead.
    LookaheadViolation {
        /// Requested delivery time.
        delivery_time: SimTime,
        /// Earliest admissible delivery time.
        earliest: SimTime,
    },
    /// A channel to a remote logical process has a null delay.
    ZeroLookahead {
        /// Rank of the remote logical process.
        rank: u32,
    },
}

impl fmt::Display for ExecutionError {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(_) => write!(fmt, "transport failure"),
            Self::Decode(_) => write!(fmt, "malformed message"),
            Self::Bundle(_) => write!(fmt, "invalid channel bundle"),
            Self::Scheduling(_) => write!(fmt, "invalid event scheduling"),
            Self::UnknownNode(node) => write!(fmt, "node {} does not exist", node),
            Self::UnknownPeer(rank) => write!(
                fmt,
                "no channel connects to the logical process of rank {}",
                rank
            ),
            Self::CausalityViolation {
                delivery_time,
                now,
            } => write!(
                fmt,
                "a packet with delivery time {} was received at time {}",
                delivery_time, now
            ),
            Self::LookaheadViolation {
                delivery_time,
                earliest,
            } => write!(
                fmt,
                "a remote packet was sent with delivery time {} but cannot be delivered before {}",
                delivery_time, earliest
            ),
            Self::ZeroLookahead { rank } => write!(
                fmt,
                "a channel to the logical process of rank {} has a null delay",
                rank
            ),
        }
    }
}

impl Error for ExecutionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Transport(e) => Some(e),
            Self::Decode(e) => Some(e),
            Self::Bundle(e) => Some(e),
            Self::Scheduling(e) => Some(e),
            _ => None,
        }
    }
}

impl From<TransportError> for ExecutionError {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

impl From<DecodeError> for ExecutionError {
    fn from(e: DecodeError) -> Self {
        Self::Decode(e)
    }
}

impl From<BundleError> for ExecutionError {
    fn from(e: BundleError) -> Self {
        Self::Bundle(e)
    }
}

impl From<SchedulingError> for ExecutionError {
    fn from(e: SchedulingError) -> Self {
        Self::Scheduling(e)
    }
}
