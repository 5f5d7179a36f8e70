use tracing::{debug, trace};

use super::bundle_manager::RemoteChannelBundleManager;
use super::config::SchedulerTune;
use super::SynchronizationStrategy;
use crate::simulation::{Action, ExecutionError, LogicalProcess, NO_CONTEXT};
use crate::time::SimTime;
use crate::transport::TransportError;

/// The null message algorithm.
///
/// Each remote logical process connected to the local one by at least one
/// channel gets a [bundle](super::bundle::RemoteChannelBundle). Every bundle
/// has a recurring timer which, when it fires, promises the remote side that
/// nothing will be sent before the earliest of the next local event and the
/// local safe time, extended by the bundle delay. Packets sent to the remote
/// side carry the same kind of promise and postpone the timer.
///
/// The local safe time is the earliest guarantee received from any remote
/// side. The run loop processes events up to the safe time and blocks on the
/// transport whenever the next event lies beyond it.
#[derive(Debug)]
pub(crate) struct NullMessageSync {
    bundles: RemoteChannelBundleManager,
    scheduler_tune: SchedulerTune,
    safe_time: SimTime,
}

impl NullMessageSync {
    pub(crate) fn new(local_rank: u32, scheduler_tune: SchedulerTune) -> Self {
        Self {
            bundles: RemoteChannelBundleManager::new(local_rank),
            scheduler_tune,
            safe_time: SimTime::ZERO,
        }
    }

    /// Processes arrived messages and recomputes the safe time.
    ///
    /// In blocking mode, waits for at least one message.
    fn receive_messages(
        &mut self,
        lp: &mut LogicalProcess,
        blocking: bool,
    ) -> Result<(), ExecutionError> {
        let bundles = &mut self.bundles;
        lp.receive_messages(blocking, |rank, time, now| {
            bundles.update_guarantee(rank, time, now)
        })?;
        lp.messenger.test_send_complete();

        let safe_time = self.bundles.safe_time();
        if safe_time != self.safe_time {
            trace!(rank = lp.system_id(), safe_time = %safe_time, "safe time updated");
        }
        self.safe_time = safe_time;

        Ok(())
    }

    /// Schedules the next null-message timer of a bundle and cancels the
    /// pending one.
    fn reschedule_timer(&mut self, lp: &mut LogicalProcess, rank: u32) -> Result<(), ExecutionError> {
        let bundle = self
            .bundles
            .find_mut(rank)
            .ok_or(ExecutionError::UnknownPeer(rank))?;

        let timer = lp.queue.schedule_with_context(
            NO_CONTEXT,
            lp.now() + self.scheduler_tune.scale(bundle.delay()),
            Action::NullMessage(rank),
        )?;
        if let Some(previous) = bundle.set_null_message_timer(timer) {
            lp.queue.remove(&previous);
        }

        Ok(())
    }
}

impl SynchronizationStrategy for NullMessageSync {
    fn initialize(&mut self, lp: &mut LogicalProcess) -> Result<(), ExecutionError> {
        let local_rank = lp.system_id();
        let size = lp.messenger.size();

        for (rank, channel) in lp.topology.remote_channels(local_rank) {
            if rank >= size {
                return Err(TransportError::InvalidRank { rank }.into());
            }
            if channel.delay().is_zero() {
                return Err(ExecutionError::ZeroLookahead { rank });
            }
            self.bundles
                .add(rank)?
                .add_channel(channel.id(), channel.delay());
        }

        debug!(
            rank = local_rank,
            bundles = self.bundles.size(),
            "null message synchronization initialized"
        );
        for bundle in self.bundles.iter() {
            trace!(
                rank = local_rank,
                remote = bundle.remote_rank(),
                channels = bundle.channel_count(),
                delay = ?bundle.delay(),
                "channel bundle"
            );
        }

        self.bundles
            .initialize_null_message_events(lp, self.scheduler_tune)?;
        self.safe_time = self.bundles.safe_time();

        Ok(())
    }

    fn run(&mut self, lp: &mut LogicalProcess) -> Result<(), ExecutionError> {
        while !lp.queue.is_stop_requested() && !lp.queue.is_empty() {
            if lp.next_time() <= self.safe_time {
                lp.process_one_event(self)?;
                self.receive_messages(lp, false)?;
            } else {
                trace!(
                    rank = lp.system_id(),
                    next_time = %lp.next_time(),
                    safe_time = %self.safe_time,
                    "waiting for remote guarantees"
                );
                self.receive_messages(lp, true)?;
            }
        }

        Ok(())
    }

    fn safe_time(&self) -> SimTime {
        self.safe_time
    }

    fn guarantee_time(&self, rank: u32) -> Option<SimTime> {
        self.bundles.find(rank).map(|bundle| bundle.guarantee_time())
    }

    fn min_delivery_time(&self, lp: &LogicalProcess, rank: u32) -> Result<SimTime, ExecutionError> {
        let bundle = self
            .bundles
            .find(rank)
            .ok_or(ExecutionError::UnknownPeer(rank))?;

        Ok(lp.now() + bundle.delay())
    }

    fn packet_guarantee(&self, lp: &LogicalProcess, rank: u32) -> Result<SimTime, ExecutionError> {
        let bundle = self
            .bundles
            .find(rank)
            .ok_or(ExecutionError::UnknownPeer(rank))?;

        // The running event may still schedule events at the current time.
        Ok(lp.now().min(self.safe_time) + bundle.delay())
    }

    fn on_packet_sent(&mut self, lp: &mut LogicalProcess, rank: u32) -> Result<(), ExecutionError> {
        self.reschedule_timer(lp, rank)
    }

    fn on_null_message_timer(
        &mut self,
        lp: &mut LogicalProcess,
        rank: u32,
    ) -> Result<(), ExecutionError> {
        let bundle = self
            .bundles
            .find(rank)
            .ok_or(ExecutionError::UnknownPeer(rank))?;

        let guarantee = lp.next_time().min(self.safe_time) + bundle.delay();
        bundle.send_guarantee(guarantee, &mut lp.messenger)?;

        self.reschedule_timer(lp, rank)
    }

    fn destroy(&mut self) {
        self.bundles.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::simulation::SimInit;
    use crate::sync::{BundleError, SchedulerTune};
    use crate::topology::Topology;
    use crate::transport::codec::Message;
    use crate::transport::{LocalTransport, Transport};

    use super::*;

    fn two_node_topology(delay: Duration) -> Topology {
        let mut topology = Topology::new();
        let a = topology.add_node(0);
        let b = topology.add_node(1);
        topology.connect(a, b, delay);

        topology
    }

    #[test]
    fn null_message_pacing() {
        let mut cluster = LocalTransport::cluster(2);
        let mut peer = cluster.pop().unwrap();
        let local = cluster.pop().unwrap();

        // The peer promises not to send anything before t=100.
        let _ = peer
            .send(0, Message::null(SimTime::from_nanos(100)).encode())
            .unwrap();

        let mut simulation = SimInit::new()
            .set_topology(two_node_topology(Duration::from_nanos(10)))
            .set_scheduler_tune(SchedulerTune::new(0.5).unwrap())
            .init(local)
            .unwrap();
        simulation.stop_after(Duration::from_nanos(30)).unwrap();
        simulation.run().unwrap();

        assert_eq!(simulation.time(), SimTime::from_nanos(30));
        assert_eq!(simulation.guarantee_time(1), Some(SimTime::from_nanos(100)));

        let guarantees = null_guarantees(&mut peer);

        // Initial message with a lead time equal to the delay, then one
        // message every 5 time units until the stop at t=30.
        assert_eq!(guarantees, vec![10, 40, 40, 40, 40, 40]);
    }

    fn null_guarantees(peer: &mut LocalTransport) -> Vec<u64> {
        std::iter::from_fn(|| peer.try_recv().unwrap())
            .map(|incoming| {
                let message = Message::decode(incoming.frame).unwrap();
                assert!(message.is_null());
                message.guarantee_time.as_nanos()
            })
            .collect()
    }

    #[test]
    fn null_message_sub_step_period() {
        let mut cluster = LocalTransport::cluster(2);
        let mut peer = cluster.pop().unwrap();
        let local = cluster.pop().unwrap();

        let _ = peer
            .send(0, Message::null(SimTime::from_nanos(100)).encode())
            .unwrap();

        // 0.04 * 10 is shorter than one time step.
        let mut simulation = SimInit::new()
            .set_topology(two_node_topology(Duration::from_nanos(10)))
            .set_scheduler_tune(SchedulerTune::new(0.04).unwrap())
            .init(local)
            .unwrap();
        simulation.stop_after(Duration::from_nanos(30)).unwrap();
        simulation.run().unwrap();

        assert_eq!(simulation.time(), SimTime::from_nanos(30));

        // The initial message, then one per time step from t=1 to t=29.
        let guarantees = null_guarantees(&mut peer);
        assert_eq!(guarantees.len(), 30);
        assert_eq!(guarantees[0], 10);
        assert!(guarantees[1..].iter().all(|&g| g == 40));
    }

    #[test]
    fn null_message_rejects_delivery_within_delay() {
        let mut cluster = LocalTransport::cluster(2);
        let mut peer = cluster.pop().unwrap();
        let local = cluster.pop().unwrap();

        let _ = peer
            .send(0, Message::null(SimTime::from_nanos(100)).encode())
            .unwrap();

        let mut topology = Topology::new();
        let a = topology.add_node(0);
        let b = topology.add_node(1);
        topology.connect(a, b, Duration::from_nanos(10));

        let mut simulation = SimInit::new().set_topology(topology).init(local).unwrap();
        simulation
            .schedule(SimTime::from_nanos(5), move |cx| {
                cx.send_packet(&b"early"[..], Duration::from_nanos(1), b, 0)
            })
            .unwrap();

        assert_eq!(
            simulation.run(),
            Err(ExecutionError::LookaheadViolation {
                delivery_time: SimTime::from_nanos(6),
                earliest: SimTime::from_nanos(15),
            })
        );

        // Only the initial null message went out.
        assert_eq!(null_guarantees(&mut peer), vec![10]);
    }

    #[test]
    fn null_message_rejects_zero_delay() {
        let mut cluster = LocalTransport::cluster(2);
        let _peer = cluster.pop().unwrap();
        let local = cluster.pop().unwrap();

        let mut simulation = SimInit::new()
            .set_topology(two_node_topology(Duration::ZERO))
            .init(local)
            .unwrap();

        assert_eq!(
            simulation.run(),
            Err(ExecutionError::ZeroLookahead { rank: 1 })
        );
    }

    #[test]
    fn null_message_registry_closes() {
        let mut cluster = LocalTransport::cluster(2);
        let _peer = cluster.pop().unwrap();
        let local = cluster.pop().unwrap();

        let mut simulation = SimInit::new()
            .set_topology(two_node_topology(Duration::from_nanos(10)))
            .init(local)
            .unwrap();
        let (lp, _) = simulation.parts_mut();

        let mut sync = NullMessageSync::new(0, SchedulerTune::default());
        sync.initialize(lp).unwrap();
        assert_eq!(
            sync.bundles.add(1).unwrap_err(),
            BundleError::RegistryClosed { rank: 1 }
        );
        assert_eq!(sync.safe_time(), SimTime::ZERO);

        let timer = sync.bundles.find(1).unwrap().null_message_timer().unwrap();
        assert_eq!(timer.time(), SimTime::from_nanos(10));
    }
}
