use std::fmt;
use std::time::Duration;

use bytes::Bytes;

use super::event_queue::{Action, EventId};
use super::{LogicalProcess, SchedulingError};
use crate::sync::SynchronizationStrategy;
use crate::time::{Deadline, SimTime};
use crate::topology::NodeId;

/// Handle to the simulation passed to event callbacks.
///
/// A `Context` gives access to the current time and context, lets callbacks
/// schedule or cancel events and send packets to other nodes.
///
/// # Examples
///
/// A callback that re-schedules itself every second until t=3s:
///
/// ```
/// use std::time::Duration;
///
/// use distsim::simulation::{Context, SimInit};
/// use distsim::time::SimTime;
/// use distsim::transport::LocalTransport;
///
/// fn tick(cx: &mut Context<'_>) {
///     if cx.time() < SimTime::from_secs(3) {
///         cx.schedule(Duration::from_secs(1), tick).unwrap();
///     }
/// }
///
/// let transport = LocalTransport::cluster(1).pop().unwrap();
/// let mut simulation = SimInit::new().init(transport).unwrap();
/// simulation.schedule(Duration::from_secs(1), tick).unwrap();
/// simulation.run().unwrap();
///
/// assert_eq!(simulation.time(), SimTime::from_secs(3));
/// ```
pub struct Context<'a> {
    lp: &'a mut LogicalProcess,
    sync: &'a mut (dyn SynchronizationStrategy + 'static),
}

impl<'a> Context<'a> {
    pub(crate) fn new(
        lp: &'a mut LogicalProcess,
        sync: &'a mut (dyn SynchronizationStrategy + 'static),
    ) -> Self {
        Self { lp, sync }
    }

    /// Returns the current simulation time.
    pub fn time(&self) -> SimTime {
        self.lp.now()
    }

    /// Returns the context of the running event.
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
    pub fn safe_time(&self) -> SimTime {
        self.sync.safe_time()
    }

    /// Returns the latest guarantee time received from a remote logical
    /// process, if tracked.
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

    /// Schedules an event at the current time, after all events already
    /// scheduled for that time.
    pub fn schedule_now<F>(&mut self, callback: F) -> EventId
    where
        F: FnOnce(&mut Context<'_>) + 'static,
    {
        self.lp.schedule_now(Action::Call(Box::new(callback)))
    }

    /// Registers an event to be run when the simulation is destroyed.
    pub fn schedule_destroy<F>(&mut self, callback: F) -> EventId
    where
        F: FnOnce(&mut Context<'_>) + 'static,
    {
        self.lp.queue.schedule_destroy(Box::new(callback))
    }

    /// Flags an event so that it is not invoked.
    pub fn cancel(&mut self, id: &EventId) {
        self.lp.queue.cancel(id);
    }

    /// Removes an event from the queue.
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

    /// Requests the current run to stop once this callback returns.
    pub fn stop(&mut self) {
        self.lp.queue.request_stop();
    }

    /// Schedules a stop request.
    pub fn stop_after(&mut self, deadline: impl Deadline) -> Result<EventId, SchedulingError> {
        let time = deadline.into_time(self.lp.now());

        self.lp.queue.schedule(time, Action::Stop)
    }

    /// Sends a packet to a device of a node.
    ///
    /// If the node is owned by another logical process, the packet is sent
    /// over the transport together with the guarantee time of the local
    /// logical process. Its delivery time must then be at least the current
    /// time plus the lookahead: the bundle delay with null messages, the
    /// global lookahead with granted time windows.
    /// Otherwise it is delivered locally to the packet handler.
    ///
    /// A failure aborts the current run: [`Simulation::run()`] returns the
    /// error once this callback returns.
    ///
    /// [`Simulation::run()`]: super::Simulation::run
    pub fn send_packet(
        &mut self,
        payload: impl Into<Bytes>,
        delivery: impl Deadline,
        node: NodeId,
        device: u32,
    ) {
        let delivery_time = delivery.into_time(self.lp.now());
        if let Err(e) = self.lp.send_packet(
            &mut *self.sync,
            payload.into(),
            delivery_time,
            node,
            device,
        ) {
            self.lp.fail(e);
        }
    }
}

impl fmt::Debug for Context<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("time", &self.time())
            .field("context", &self.context())
            .field("system_id", &self.system_id())
            .finish_non_exhaustive()
    }
}
