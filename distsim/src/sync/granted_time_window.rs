use std::time::Duration;

use tracing::{debug, trace};

use super::SynchronizationStrategy;
use crate::simulation::{ExecutionError, LogicalProcess};
use crate::time::SimTime;
use crate::transport::codec::{self, LbtsMessage};
use crate::transport::TransportError;

/// The granted time window algorithm.
///
/// All logical processes share a single lookahead, the smallest delay of all
/// channels crossing logical processes. Whenever the next local event lies
/// beyond the granted time, or the local event loop has nothing left to do,
/// the logical process joins a collective round exchanging its earliest event
/// time and message counters. If no message is in flight, the new granted
/// time is the earliest event time of all logical processes extended by the
/// lookahead.
///
/// The run ends once all logical processes report being finished in the same
/// round while no message is in flight.
#[derive(Debug)]
pub(crate) struct GrantedTimeWindowSync {
    max_lookahead: Option<Duration>,
    lookahead: Duration,
    granted_time: SimTime,
    is_global_finished: bool,
}

impl GrantedTimeWindowSync {
    pub(crate) fn new(max_lookahead: Option<Duration>) -> Self {
        Self {
            max_lookahead,
            lookahead: Duration::ZERO,
            granted_time: SimTime::ZERO,
            is_global_finished: false,
        }
    }

    /// Runs one collective round and updates the granted time.
    fn synchronize(&mut self, lp: &mut LogicalProcess, next_time: SimTime) -> Result<(), ExecutionError> {
        let contribution = LbtsMessage {
            smallest_time: next_time,
            tx_count: lp.messenger.tx_count(),
            rx_count: lp.messenger.rx_count(),
            system_id: lp.system_id(),
            is_finished: lp.queue.is_local_finished(),
        };
        let round = lp
            .messenger
            .all_gather(contribution.encode())?
            .into_iter()
            .map(LbtsMessage::decode)
            .collect::<Result<Vec<_>, _>>()?;

        let summary = LbtsSummary::reduce(&round);
        self.is_global_finished = summary.is_global_finished();
        match summary.granted_time(self.lookahead) {
            Some(granted_time) => {
                trace!(
                    rank = lp.system_id(),
                    granted_time = %granted_time,
                    "time window granted"
                );
                self.granted_time = granted_time;
            }
            None => trace!(
                rank = lp.system_id(),
                tx_count = summary.tx_count,
                rx_count = summary.rx_count,
                "messages in flight, time window unchanged"
            ),
        }

        Ok(())
    }
}

impl SynchronizationStrategy for GrantedTimeWindowSync {
    fn initialize(&mut self, lp: &mut LogicalProcess) -> Result<(), ExecutionError> {
        let local_rank = lp.system_id();
        let size = lp.messenger.size();

        if size <= 1 {
            self.lookahead = Duration::ZERO;
        } else {
            let mut local_lookahead = self.max_lookahead.unwrap_or(Duration::MAX);
            for (rank, channel) in lp.topology.remote_channels(local_rank) {
                if rank >= size {
                    return Err(TransportError::InvalidRank { rank }.into());
                }
                if channel.delay().is_zero() {
                    return Err(ExecutionError::ZeroLookahead { rank });
                }
                local_lookahead = local_lookahead.min(channel.delay());
            }

            // Logical processes without remote channels contribute an
            // unbounded lookahead.
            self.lookahead = lp
                .messenger
                .all_gather(codec::encode_lookahead(local_lookahead))?
                .into_iter()
                .map(codec::decode_lookahead)
                .try_fold(Duration::MAX, |lookahead, contribution| {
                    contribution.map(|c| lookahead.min(c))
                })?;
        }
        self.granted_time = SimTime::ZERO + self.lookahead;

        debug!(
            rank = local_rank,
            lookahead = ?self.lookahead,
            "granted time window synchronization initialized"
        );

        Ok(())
    }

    fn run(&mut self, lp: &mut LogicalProcess) -> Result<(), ExecutionError> {
        self.is_global_finished = false;

        while !self.is_global_finished {
            let mut next_time = lp.next_time();

            if next_time > self.granted_time || lp.queue.is_local_finished() {
                lp.receive_messages(false, |_, _, _| Ok(()))?;
                next_time = lp.next_time();
                lp.messenger.test_send_complete();

                self.synchronize(lp, next_time)?;
            }

            if next_time <= self.granted_time && !lp.queue.is_local_finished() {
                lp.process_one_event(self)?;
            }
        }

        Ok(())
    }

    fn safe_time(&self) -> SimTime {
        self.granted_time
    }

    fn guarantee_time(&self, _rank: u32) -> Option<SimTime> {
        None
    }

    fn min_delivery_time(&self, lp: &LogicalProcess, _rank: u32) -> Result<SimTime, ExecutionError> {
        Ok(lp.now() + self.lookahead)
    }

    fn packet_guarantee(&self, lp: &LogicalProcess, _rank: u32) -> Result<SimTime, ExecutionError> {
        Ok(lp.now())
    }

    fn on_packet_sent(&mut self, _lp: &mut LogicalProcess, _rank: u32) -> Result<(), ExecutionError> {
        Ok(())
    }

    fn on_null_message_timer(
        &mut self,
        _lp: &mut LogicalProcess,
        rank: u32,
    ) -> Result<(), ExecutionError> {
        Err(ExecutionError::UnknownPeer(rank))
    }

    fn destroy(&mut self) {
        self.granted_time = SimTime::ZERO;
    }
}

/// Reduction of the contributions of one collective round.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
struct LbtsSummary {
    smallest_time: SimTime,
    tx_count: u64,
    rx_count: u64,
    is_finished: bool,
}

impl LbtsSummary {
    fn reduce(round: &[LbtsMessage]) -> Self {
        round.iter().fold(
            Self {
                smallest_time: SimTime::MAX,
                tx_count: 0,
                rx_count: 0,
                is_finished: true,
            },
            |summary, message| Self {
                smallest_time: summary.smallest_time.min(message.smallest_time),
                tx_count: summary.tx_count + message.tx_count,
                rx_count: summary.rx_count + message.rx_count,
                is_finished: summary.is_finished && message.is_finished,
            },
        )
    }

    /// Checks whether all logical processes are finished with no message in
    /// flight.
    fn is_global_finished(&self) -> bool {
        self.is_finished && self.tx_count == self.rx_count
    }

    /// Returns the new granted time, or `None` if messages are in flight.
    fn granted_time(&self, lookahead: Duration) -> Option<SimTime> {
        if self.tx_count != self.rx_count {
            return None;
        }

        Some(self.smallest_time + lookahead)
    }
}
