//! Local event queue of a logical process.

use std::error::Error;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ptr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::simulation::{Context, RemotePacket};
use crate::time::SimTime;
use crate::util::priority_queue::{InsertKey, PriorityQueue};

/// Context of events that are not attached to a simulated node.
pub const NO_CONTEXT: u32 = u32::MAX;

/// UID shared by all destroy events.
const DESTROY_UID: u64 = 2;

/// First UID handed out to regular events.
const FIRST_UID: u64 = 4;

/// A user callback.
pub(crate) type Callback = Box<dyn FnOnce(&mut Context<'_>)>;

/// What happens when an event fires.
pub(crate) enum Action {
    /// Invoke a user callback.
    Call(Callback),
    /// Hand a packet received from another logical process to the packet
    /// handler.
    Deliver(RemotePacket),
    /// Fire the null-message timer of the bundle with the specified remote
    /// rank.
    NullMessage(u32),
    /// Request the run loop to stop.
    Stop,
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Call(_) => f.write_str("Call"),
            Self::Deliver(packet) => f.debug_tuple("Deliver").field(packet).finish(),
            Self::NullMessage(rank) => f.debug_tuple("NullMessage").field(rank).finish(),
            Self::Stop => f.write_str("Stop"),
        }
    }
}

/// An event owned by the queue.
struct ScheduledEvent {
    action: Action,
    context: u32,
    is_cancelled: Arc<AtomicBool>,
}

/// A destroy-phase event.
struct DestroyEvent {
    callback: Callback,
    is_cancelled: Arc<AtomicBool>,
}

/// An event pulled from the queue, ready to be invoked.
#[derive(Debug)]
pub(crate) struct PulledEvent {
    pub(crate) action: Action,
    pub(crate) is_cancelled: bool,
}

/// Time-ordered queue of pending events.
///
/// Events are ordered by timestamp, then by UID, which is assigned in
/// scheduling order. The queue also tracks the current time, context and UID,
/// which are those of the last pulled event.
pub(crate) struct EventQueue {
    current_time: SimTime,
    current_context: u32,
    current_uid: u64,
    next_uid: u64,
    // Events scheduled but neither pulled nor removed.
    unscheduled: u64,
    stop_requested: bool,
    events: PriorityQueue<(SimTime, u64), ScheduledEvent>,
    destroy_events: Vec<DestroyEvent>,
}

impl EventQueue {
    pub(crate) fn new() -> Self {
        Self {
            current_time: SimTime::ZERO,
            current_context: NO_CONTEXT,
            current_uid: 0,
            next_uid: FIRST_UID,
            unscheduled: 0,
            stop_requested: false,
            events: PriorityQueue::new(),
            destroy_events: Vec::new(),
        }
    }

    pub(crate) fn time(&self) -> SimTime {
        self.current_time
    }

    pub(crate) fn context(&self) -> u32 {
        self.current_context
    }

    /// Number of events scheduled but neither processed nor removed.
    pub(crate) fn unscheduled(&self) -> u64 {
        self.unscheduled
    }

    /// Schedules an event at an absolute time in the current context.
    pub(crate) fn schedule(
        &mut self,
        time: SimTime,
        action: Action,
    ) -> Result<EventId, SchedulingError> {
        self.schedule_with_context(self.current_context, time, action)
    }

    /// Schedules an event at an absolute time in the specified context.
    ///
    /// Events may be scheduled for the current time but not in its past.
    pub(crate) fn schedule_with_context(
        &mut self,
        context: u32,
        time: SimTime,
        action: Action,
    ) -> Result<EventId, SchedulingError> {
        if time < self.current_time {
            return Err(SchedulingError::InvalidScheduledTime);
        }
        let uid = self.next_uid;
        self.next_uid += 1;
        self.unscheduled += 1;

        let is_cancelled = Arc::new(AtomicBool::new(false));
        let insert_key = self.events.insert(
            (time, uid),
            ScheduledEvent {
                action,
                context,
                is_cancelled: is_cancelled.clone(),
            },
        );

        Ok(EventId {
            time,
            context,
            uid,
            insert_key: Some(insert_key),
            is_cancelled,
        })
    }

    /// Registers an event to be run when the simulation is destroyed.
    pub(crate) fn schedule_destroy(&mut self, callback: Callback) -> EventId {
        let is_cancelled = Arc::new(AtomicBool::new(false));
        self.destroy_events.push(DestroyEvent {
            callback,
            is_cancelled: is_cancelled.clone(),
        });

        EventId {
            time: self.current_time,
            context: NO_CONTEXT,
            uid: DESTROY_UID,
            insert_key: None,
            is_cancelled,
        }
    }

    /// Flags an event so that it is skipped when pulled.
    ///
    /// Destroy events are removed from the destroy list instead. This is a
    /// no-op for expired events.
    pub(crate) fn cancel(&mut self, id: &EventId) {
        if id.uid == DESTROY_UID {
            self.remove_destroy_event(id);
            return;
        }
        if !self.is_expired(id) {
            id.is_cancelled.store(true, Ordering::Relaxed);
        }
    }

    /// Removes an event from the queue and releases it.
    ///
    /// This is a no-op for expired events.
    pub(crate) fn remove(&mut self, id: &EventId) {
        if id.uid == DESTROY_UID {
            self.remove_destroy_event(id);
            return;
        }
        if self.is_expired(id) {
            return;
        }
        if let Some(insert_key) = id.insert_key {
            if self.events.delete(insert_key).is_some() {
                self.unscheduled -= 1;
            }
        }
        id.is_cancelled.store(true, Ordering::Relaxed);
    }

    fn remove_destroy_event(&mut self, id: &EventId) {
        self.destroy_events
            .retain(|event| !Arc::ptr_eq(&event.is_cancelled, &id.is_cancelled));
        id.is_cancelled.store(true, Ordering::Relaxed);
    }

    /// Checks whether an event has already fired or was cancelled.
    pub(crate) fn is_expired(&self, id: &EventId) -> bool {
        if id.is_cancelled.load(Ordering::Relaxed) {
            return true;
        }
        if id.uid == DESTROY_UID {
            return !self
                .destroy_events
                .iter()
                .any(|event| Arc::ptr_eq(&event.is_cancelled, &id.is_cancelled));
        }

        id.time < self.current_time
            || (id.time == self.current_time && id.uid <= self.current_uid)
    }

    /// Returns the time left before an event fires, or zero if it has
    /// expired.
    pub(crate) fn delay_left(&self, id: &EventId) -> Duration {
        if self.is_expired(id) {
            return Duration::ZERO;
        }

        id.time.saturating_duration_since(self.current_time)
    }

    /// Returns the timestamp of the earliest pending event, or
    /// [`SimTime::MAX`] if the queue is empty.
    pub(crate) fn next_time(&self) -> SimTime {
        self.events
            .peek_key()
            .map(|&(time, _)| time)
            .unwrap_or(SimTime::MAX)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Checks whether the local event loop has nothing left to do.
    pub(crate) fn is_local_finished(&self) -> bool {
        self.stop_requested || self.events.is_empty()
    }

    /// Pulls the earliest event and makes its timestamp, context and UID
    /// current.
    pub(crate) fn pull_next(&mut self) -> Option<PulledEvent> {
        let ((time, uid), event) = self.events.pull()?;

        assert!(
            time >= self.current_time,
            "internal simulation error: event timestamp {} precedes the current time {}",
            time,
            self.current_time
        );
        self.unscheduled -= 1;
        self.current_time = time;
        self.current_context = event.context;
        self.current_uid = uid;

        Some(PulledEvent {
            action: event.action,
            is_cancelled: event.is_cancelled.load(Ordering::Relaxed),
        })
    }

    /// Takes the oldest non-cancelled destroy event, if any.
    pub(crate) fn pop_destroy_event(&mut self) -> Option<Callback> {
        while !self.destroy_events.is_empty() {
            let event = self.destroy_events.remove(0);
            if !event.is_cancelled.swap(true, Ordering::Relaxed) {
                return Some(event.callback);
            }
        }

        None
    }

    pub(crate) fn request_stop(&mut self) {
        self.stop_requested = true;
    }

    pub(crate) fn clear_stop(&mut self) {
        self.stop_requested = false;
    }

    pub(crate) fn is_stop_requested(&self) -> bool {
        self.stop_requested
    }

    /// Releases all pending events without invoking them.
    pub(crate) fn clear(&mut self) {
        self.events.clear();
        self.unscheduled = 0;
    }
}

impl fmt::Debug for EventQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventQueue")
            .field("current_time", &self.current_time)
            .field("current_context", &self.current_context)
            .field("pending", &self.events.len())
            .field("destroy_events", &self.destroy_events.len())
            .finish_non_exhaustive()
    }
}

/// Handle to a scheduled event.
///
/// An `EventId` can be used to cancel or remove an event and to query whether
/// it has expired.
#[derive(Clone, Debug)]
pub struct EventId {
    time: SimTime,
    context: u32,
    uid: u64,
    insert_key: Option<InsertKey>,
    is_cancelled: Arc<AtomicBool>,
}

impl EventId {
    /// Returns the time at which the event is scheduled.
    ///
    /// For destroy events, this is the time at which the event was
    /// registered.
    pub fn time(&self) -> SimTime {
        self.time
    }

    /// Returns the context in which the event runs.
    pub fn context(&self) -> u32 {
        self.context
    }

    /// Returns the unique, scheduling-ordered event identifier.
    ///
    /// All destroy events share the same UID.
    pub fn uid(&self) -> u64 {
        self.uid
    }

    /// Checks whether the event was cancelled or removed.
    pub fn is_cancelled(&self) -> bool {
        self.is_cancelled.load(Ordering::Relaxed)
    }
}

impl PartialEq for EventId {
    /// Implements equality by considering clones to be equivalent.
    fn eq(&self, other: &Self) -> bool {
        ptr::eq(&*self.is_cancelled, &*other.is_cancelled)
    }
}

impl Eq for EventId {}

impl Hash for EventId {
    fn hash<H>(&self, state: &mut H)
    where
        H: Hasher,
    {
        ptr::hash(&*self.is_cancelled, state)
    }
}

/// Error returned when the scheduled time is invalid.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum SchedulingError {
    /// The scheduled time lies in the past of the current simulation time.
    InvalidScheduledTime,
}

impl fmt::Display for SchedulingError {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidScheduledTime => write!(
                fmt,
                "the scheduled time should not lie in the past of the current simulation time"
            ),
        }
    }
}

impl Error for SchedulingError {}
