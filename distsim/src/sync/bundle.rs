use std::time::Duration;

use tracing::debug;

use crate::simulation::EventId;
use crate::time::SimTime;
use crate::topology::ChannelId;
use crate::transport::codec::Message;
use crate::transport::messenger::Messenger;
use crate::transport::TransportError;

/// All channels connecting the local logical process to one remote logical
/// process.
#[derive(Debug)]
pub(crate) struct RemoteChannelBundle {
    remote_rank: u32,
    channels: Vec<ChannelId>,
    // Smallest delay of all channels, `Duration::MAX` until one is added.
    delay: Duration,
    // Latest guarantee time advertised by the remote logical process.
    guarantee_time: SimTime,
    null_message_timer: Option<EventId>,
}

impl RemoteChannelBundle {
    pub(crate) fn new(remote_rank: u32) -> Self {
        Self {
            remote_rank,
            channels: Vec::new(),
            delay: Duration::MAX,
            guarantee_time: SimTime::ZERO,
            null_message_timer: None,
        }
    }

    pub(crate) fn remote_rank(&self) -> u32 {
        self.remote_rank
    }

    /// Registers a channel, lowering the bundle delay if needed.
    pub(crate) fn add_channel(&mut self, channel: ChannelId, delay: Duration) {
        self.channels.push(channel);
        self.delay = self.delay.min(delay);
    }

    /// Returns the number of registered channels.
    pub(crate) fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Returns the smallest delay of all channels of the bundle.
    pub(crate) fn delay(&self) -> Duration {
        self.delay
    }

    pub(crate) fn guarantee_time(&self) -> SimTime {
        self.guarantee_time
    }

    /// Records a new guarantee time advertised by the remote logical process.
    ///
    /// # Panics
    ///
    /// This method panics if the guarantee time lies in the past of `now` or
    /// regresses, which means that the remote logical process does not honor
    /// its previous promises.
    pub(crate) fn set_guarantee_time(&mut self, time: SimTime, now: SimTime) {
        assert!(
            time >= now,
            "internal simulation error: guarantee time {} from rank {} precedes the current time {}",
            time,
            self.remote_rank,
            now
        );
        assert!(
            time >= self.guarantee_time,
            "internal simulation error: guarantee time from rank {} regressed from {} to {}",
            self.remote_rank,
            self.guarantee_time,
            time
        );

        if time != self.guarantee_time {
            debug!(rank = self.remote_rank, guarantee = %time, "guarantee time updated");
        }
        self.guarantee_time = time;
    }

    /// Sends a null message promising the remote logical process that
    /// nothing will be sent with a timestamp earlier than `now + lead_time`.
    pub(crate) fn send(
        &self,
        lead_time: Duration,
        now: SimTime,
        messenger: &mut Messenger,
    ) -> Result<(), TransportError> {
        self.send_guarantee(now + lead_time, messenger)
    }

    /// Sends a null message advertising the specified guarantee time.
    pub(crate) fn send_guarantee(
        &self,
        guarantee_time: SimTime,
        messenger: &mut Messenger,
    ) -> Result<(), TransportError> {
        debug!(rank = self.remote_rank, guarantee = %guarantee_time, "null message sent");

        messenger.send(self.remote_rank, &Message::null(guarantee_time))
    }

    /// Returns the pending null-message timer.
    pub(crate) fn null_message_timer(&self) -> Option<&EventId> {
        self.null_message_timer.as_ref()
    }

    /// Replaces the null-message timer, returning the previous one.
    pub(crate) fn set_null_message_timer(&mut self, timer: EventId) -> Option<EventId> {
        self.null_message_timer.replace(timer)
    }
}
