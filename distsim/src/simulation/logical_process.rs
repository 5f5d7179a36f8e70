use std::fmt;

use bytes::Bytes;
use tracing::{trace, warn};

use super::event_queue::{Action, EventId, EventQueue};
use super::{Context, ExecutionError, RemotePacket, SchedulingError};
use crate::sync::SynchronizationStrategy;
use crate::time::SimTime;
use crate::topology::{NodeId, Topology};
use crate::transport::codec::Message;
use crate::transport::messenger::Messenger;

/// Handler of packets received from other logical processes.
pub(crate) type PacketHandler = Box<dyn FnMut(&mut Context<'_>, RemotePacket)>;

/// State of the local logical process shared by all synchronization
/// algorithms.
pub(crate) struct LogicalProcess {
    pub(crate) queue: EventQueue,
    pub(crate) messenger: Messenger,
    pub(crate) topology: Topology,
    packet_handler: Option<PacketHandler>,
    // First error raised from within an event callback.
    failure: Option<ExecutionError>,
}

impl LogicalProcess {
    pub(crate) fn new(
        messenger: Messenger,
        topology: Topology,
        packet_handler: Option<PacketHandler>,
    ) -> Self {
        Self {
            queue: EventQueue::new(),
            messenger,
            topology,
            packet_handler,
            failure: None,
        }
    }

    pub(crate) fn system_id(&self) -> u32 {
        self.messenger.system_id()
    }

    pub(crate) fn now(&self) -> SimTime {
        self.queue.time()
    }

    /// Timestamp of the earliest pending event.
    pub(crate) fn next_time(&self) -> SimTime {
        self.queue.next_time()
    }

    pub(crate) fn schedule_now(&mut self, action: Action) -> EventId {
        match self.queue.schedule(self.queue.time(), action) {
            Ok(id) => id,
            Err(SchedulingError::InvalidScheduledTime) => {
                unreachable!("internal simulation error: the current time lies in its own past")
            }
        }
    }

    /// Pulls and invokes the earliest event.
    ///
    /// Cancelled events advance the current time but are otherwise dropped.
    pub(crate) fn process_one_event(
        &mut self,
        sync: &mut (dyn SynchronizationStrategy + 'static),
    ) -> Result<(), ExecutionError> {
        let Some(event) = self.queue.pull_next() else {
            return Ok(());
        };
        if event.is_cancelled {
            return Ok(());
        }

        match event.action {
            Action::Call(callback) => {
                let mut cx = Context::new(self, sync);
                callback(&mut cx);
            }
            Action::Deliver(packet) => match self.packet_handler.take() {
                Some(mut handler) => {
                    let mut cx = Context::new(self, sync);
                    handler(&mut cx, packet);
                    self.packet_handler = Some(handler);
                }
                None => warn!(
                    rank = self.system_id(),
                    node = packet.node.as_u32(),
                    "remote packet dropped: no packet handler"
                ),
            },
            Action::NullMessage(rank) => sync.on_null_message_timer(self, rank)?,
            Action::Stop => self.queue.request_stop(),
        }

        match self.take_failure() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Records an error raised within an event callback.
    ///
    /// Only the first error is kept.
    pub(crate) fn fail(&mut self, error: ExecutionError) {
        if self.failure.is_none() {
            self.failure = Some(error);
        }
    }

    pub(crate) fn take_failure(&mut self) -> Option<ExecutionError> {
        self.failure.take()
    }

    /// Processes arrived messages.
    ///
    /// The guarantee time of every message is passed to `on_guarantee`
    /// together with the sender rank and the current time. Packets are
    /// scheduled for delivery in the context of their destination node.
    ///
    /// In blocking mode, waits for one message, then processes all other
    /// messages that have already arrived.
    pub(crate) fn receive_messages<F>(
        &mut self,
        blocking: bool,
        mut on_guarantee: F,
    ) -> Result<usize, ExecutionError>
    where
        F: FnMut(u32, SimTime, SimTime) -> Result<(), ExecutionError>,
    {
        let mut count = 0;

        if blocking {
            let (source, message) = self.messenger.receive_blocking()?;
            self.accept(source, message, &mut on_guarantee)?;
            count += 1;
        }
        while let Some((source, message)) = self.messenger.try_receive()? {
            self.accept(source, message, &mut on_guarantee)?;
            count += 1;
        }

        Ok(count)
    }

    fn accept<F>(
        &mut self,
        source: u32,
        message: Message,
        on_guarantee: &mut F,
    ) -> Result<(), ExecutionError>
    where
        F: FnMut(u32, SimTime, SimTime) -> Result<(), ExecutionError>,
    {
        let now = self.now();
        on_guarantee(source, message.guarantee_time, now)?;
        if message.is_null() {
            return Ok(());
        }

        if message.delivery_time < now {
            return Err(ExecutionError::CausalityViolation {
                delivery_time: message.delivery_time,
                now,
            });
        }
        let node = self
            .topology
            .node(message.dest_node)
            .ok_or(ExecutionError::UnknownNode(message.dest_node))?;

        trace!(
            rank = self.system_id(),
            source,
            node = message.dest_node,
            delivery_time = %message.delivery_time,
            "packet received"
        );
        self.queue.schedule_with_context(
            message.dest_node,
            message.delivery_time,
            Action::Deliver(RemotePacket {
                node,
                device: message.dest_device,
                payload: message.payload,
            }),
        )?;

        Ok(())
    }

    /// Sends a packet to a node, which may be owned by the local logical
    /// process.
    pub(crate) fn send_packet(
        &mut self,
        sync: &mut (dyn SynchronizationStrategy + 'static),
        payload: Bytes,
        delivery_time: SimTime,
        node: NodeId,
        device: u32,
    ) -> Result<(), ExecutionError> {
        let rank = self
            .topology
            .system_id(node)
            .ok_or(ExecutionError::UnknownNode(node.as_u32()))?;
        let packet = RemotePacket {
            node,
            device,
            payload,
        };

        if rank == self.system_id() {
            self.queue
                .schedule_with_context(node.as_u32(), delivery_time, Action::Deliver(packet))?;

            return Ok(());
        }

        // Earlier deliveries could precede promises already made to the
        // remote side. A null delivery time is reserved for null messages.
        let earliest = sync.min_delivery_time(self, rank)?;
        if delivery_time < earliest || delivery_time <= self.now() {
            return Err(ExecutionError::LookaheadViolation {
                delivery_time,
                earliest,
            });
        }
        let guarantee_time = sync.packet_guarantee(self, rank)?;
        let message = Message::packet(
            delivery_time,
            guarantee_time,
            node.as_u32(),
            device,
            packet.payload,
        );
        self.messenger.send(rank, &message)?;

        sync.on_packet_sent(self, rank)
    }
}

impl fmt::Debug for LogicalProcess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogicalProcess")
            .field("queue", &self.queue)
            .field("messenger", &self.messenger)
            .field("failure", &self.failure)
            .finish_non_exhaustive()
    }
}
