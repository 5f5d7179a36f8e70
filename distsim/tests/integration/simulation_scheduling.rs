//! Event scheduling within a single logical process.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use distsim::simulation::{SchedulingError, SimInit, Simulation, NO_CONTEXT};
use distsim::sync::{ConfigError, SyncAlgorithm};
use distsim::time::SimTime;
use distsim::topology::Topology;
use distsim::transport::LocalTransport;
use proptest::prelude::*;

use crate::support::init_logging;

fn standalone(algorithm: SyncAlgorithm) -> Simulation {
    init_logging();

    let transport = LocalTransport::cluster(1).pop().unwrap();

    SimInit::new()
        .set_algorithm(algorithm)
        .init(transport)
        .unwrap()
}

fn at(nanos: u64) -> SimTime {
    SimTime::from_nanos(nanos)
}

type Log<T> = Rc<RefCell<Vec<T>>>;

fn schedule_logged(simulation: &mut Simulation, log: &Log<(SimTime, char)>, time: u64, tag: char) {
    let log = log.clone();
    simulation
        .schedule(at(time), move |cx| log.borrow_mut().push((cx.time(), tag)))
        .unwrap();
}

fn event_ordering(algorithm: SyncAlgorithm) {
    let mut simulation = standalone(algorithm);
    let log = Log::default();

    schedule_logged(&mut simulation, &log, 3, 'a');
    schedule_logged(&mut simulation, &log, 1, 'b');
    schedule_logged(&mut simulation, &log, 2, 'c');
    schedule_logged(&mut simulation, &log, 2, 'd');
    schedule_logged(&mut simulation, &log, 1, 'e');

    simulation.run().unwrap();

    assert_eq!(
        *log.borrow(),
        vec![
            (at(1), 'b'),
            (at(1), 'e'),
            (at(2), 'c'),
            (at(2), 'd'),
            (at(3), 'a')
        ]
    );
    assert_eq!(simulation.time(), at(3));
}

#[test]
fn event_ordering_null_message() {
    event_ordering(SyncAlgorithm::NullMessage);
}

#[test]
fn event_ordering_granted_time_window() {
    event_ordering(SyncAlgorithm::GrantedTimeWindow);
}

#[test]
fn standalone_safe_time_is_unbounded() {
    let mut simulation = standalone(SyncAlgorithm::NullMessage);
    simulation.run().unwrap();

    assert_eq!(simulation.safe_time(), SimTime::MAX);
    assert_eq!(simulation.system_id(), 0);
    assert_eq!(simulation.system_count(), 1);
    assert_eq!(simulation.guarantee_time(1), None);
    assert_eq!((simulation.tx_count(), simulation.rx_count()), (0, 0));
}

#[test]
fn cancel_is_idempotent() {
    let mut simulation = standalone(SyncAlgorithm::NullMessage);
    let log = Log::default();

    let cancelled = {
        let log = log.clone();
        simulation
            .schedule(at(5), move |_| log.borrow_mut().push('x'))
            .unwrap()
    };
    schedule_logged_char(&mut simulation, &log, 6, 'y');

    assert!(!simulation.is_expired(&cancelled));
    simulation.cancel(&cancelled);
    simulation.cancel(&cancelled);
    assert!(simulation.is_expired(&cancelled));
    assert_eq!(simulation.delay_left(&cancelled), Duration::ZERO);

    simulation.run().unwrap();
    assert_eq!(*log.borrow(), vec!['y']);
}

fn schedule_logged_char(simulation: &mut Simulation, log: &Log<char>, time: u64, tag: char) {
    let log = log.clone();
    simulation
        .schedule(at(time), move |_| log.borrow_mut().push(tag))
        .unwrap();
}

#[test]
fn remove_event() {
    let mut simulation = standalone(SyncAlgorithm::NullMessage);
    let log = Log::default();

    schedule_logged_char(&mut simulation, &log, 2, 'a');
    let removed = {
        let log = log.clone();
        simulation
            .schedule(Duration::from_nanos(10), move |_| log.borrow_mut().push('b'))
            .unwrap()
    };
    assert_eq!(simulation.delay_left(&removed), Duration::from_nanos(10));
    assert_eq!(removed.time(), at(10));

    simulation.remove(&removed);
    simulation.remove(&removed);
    assert!(simulation.is_expired(&removed));

    simulation.run().unwrap();
    assert_eq!(*log.borrow(), vec!['a']);
    assert_eq!(simulation.time(), at(2));
}

#[test]
fn expiry_and_delay_left_from_callbacks() {
    let mut simulation = standalone(SyncAlgorithm::NullMessage);
    let observed = Log::default();

    let later = simulation.schedule(at(8), |_| {}).unwrap();
    {
        let observed = observed.clone();
        let later = later.clone();
        simulation
            .schedule(at(3), move |cx| {
                observed
                    .borrow_mut()
                    .push((cx.is_expired(&later), cx.delay_left(&later)));
            })
            .unwrap();
    }
    simulation.run().unwrap();

    assert_eq!(*observed.borrow(), vec![(false, Duration::from_nanos(5))]);
    assert!(simulation.is_expired(&later));
}

#[test]
fn scheduling_from_callbacks() {
    let mut simulation = standalone(SyncAlgorithm::NullMessage);
    let log = Log::default();

    {
        let log = log.clone();
        simulation
            .schedule_with_context(7, at(4), move |cx| {
                assert_eq!(cx.context(), 7);
                assert_eq!(
                    cx.schedule(at(3), |_| {}).unwrap_err(),
                    SchedulingError::InvalidScheduledTime
                );

                let now_log = log.clone();
                cx.schedule_now(move |cx| now_log.borrow_mut().push((cx.time(), cx.context())));

                let later_log = log.clone();
                cx.schedule(Duration::from_nanos(2), move |cx| {
                    later_log.borrow_mut().push((cx.time(), cx.context()))
                })
                .unwrap();

                let other_log = log.clone();
                cx.schedule_with_context(NO_CONTEXT, Duration::from_nanos(1), move |cx| {
                    other_log.borrow_mut().push((cx.time(), cx.context()))
                })
                .unwrap();
            })
            .unwrap();
    }
    simulation.run().unwrap();

    assert_eq!(
        *log.borrow(),
        vec![(at(4), 7), (at(5), NO_CONTEXT), (at(6), 7)]
    );
}

#[test]
fn stop_after_and_resume() {
    let mut simulation = standalone(SyncAlgorithm::NullMessage);
    let log = Log::default();

    for t in 1..=6 {
        schedule_logged_char(&mut simulation, &log, t, char::from(b'a' + t as u8));
    }
    simulation.stop_after(at(3)).unwrap();

    simulation.run().unwrap();
    assert_eq!(simulation.time(), at(3));
    assert_eq!(*log.borrow(), vec!['b', 'c', 'd']);

    simulation.run().unwrap();
    assert_eq!(simulation.time(), at(6));
    assert_eq!(log.borrow().len(), 6);
}

#[test]
fn stop_from_callback() {
    let mut simulation = standalone(SyncAlgorithm::GrantedTimeWindow);
    let log = Log::default();

    schedule_logged_char(&mut simulation, &log, 1, 'a');
    simulation.schedule(at(2), |cx| cx.stop()).unwrap();
    schedule_logged_char(&mut simulation, &log, 3, 'b');

    simulation.run().unwrap();
    assert_eq!(simulation.time(), at(2));
    assert_eq!(*log.borrow(), vec!['a']);
}

#[test]
fn destroy_events() {
    let mut simulation = standalone(SyncAlgorithm::NullMessage);
    let log = Log::default();

    {
        let log = log.clone();
        simulation.schedule_destroy(move |_| log.borrow_mut().push('a'));
    }
    let cancelled = {
        let log = log.clone();
        simulation.schedule_destroy(move |_| log.borrow_mut().push('b'))
    };
    {
        let log = log.clone();
        simulation
            .schedule(at(1), move |cx| {
                let log = log.clone();
                cx.schedule_destroy(move |_| log.borrow_mut().push('c'));
            })
            .unwrap();
    }
    // Events left in the queue are released without being invoked.
    schedule_logged_char(&mut simulation, &log, 5, 'x');
    simulation.stop_after(at(2)).unwrap();

    assert!(!simulation.is_expired(&cancelled));
    simulation.cancel(&cancelled);
    assert!(simulation.is_expired(&cancelled));

    simulation.run().unwrap();
    assert!(log.borrow().is_empty());

    simulation.destroy();
    assert_eq!(*log.borrow(), vec!['a', 'c']);
}

#[test]
fn local_packet_delivery() {
    init_logging();

    let mut topology = Topology::new();
    let a = topology.add_node(0);
    let b = topology.add_node(0);
    topology.connect(a, b, Duration::from_nanos(3));

    let received = Log::default();
    let transport = LocalTransport::cluster(1).pop().unwrap();
    let mut simulation = {
        let received = received.clone();
        SimInit::new()
            .set_topology(topology)
            .set_packet_handler(move |cx, packet| {
                received
                    .borrow_mut()
                    .push((cx.time(), cx.context(), packet.node, packet.device, packet.payload))
            })
            .init(transport)
            .unwrap()
    };

    simulation
        .schedule(at(1), move |cx| {
            cx.send_packet(&b"hello"[..], Duration::from_nanos(3), b, 2)
        })
        .unwrap();
    simulation.run().unwrap();

    let received = received.borrow();
    assert_eq!(received.len(), 1);
    let (time, context, node, device, payload) = &received[0];
    assert_eq!(*time, at(4));
    assert_eq!(*context, b.as_u32());
    assert_eq!((*node, *device), (b, 2));
    assert_eq!(&payload[..], b"hello");
    assert_eq!(simulation.tx_count(), 0);
}

#[test]
fn invalid_configuration() {
    let transport = LocalTransport::cluster(1).pop().unwrap();

    assert_eq!(
        SimInit::new()
            .set_algorithm(SyncAlgorithm::GrantedTimeWindow)
            .set_max_lookahead(Duration::ZERO)
            .init(transport)
            .unwrap_err(),
        ConfigError::NonPositiveLookahead
    );
}

proptest! {
    #[test]
    fn events_run_in_time_then_scheduling_order(times in prop::collection::vec(0u64..20, 0..50)) {
        let mut simulation = standalone(SyncAlgorithm::NullMessage);
        let log = Log::default();

        for (idx, &t) in times.iter().enumerate() {
            let log = log.clone();
            simulation
                .schedule(at(t), move |cx| log.borrow_mut().push((cx.time(), idx)))
                .unwrap();
        }
        simulation.run().unwrap();

        let mut expected: Vec<_> = times.iter().enumerate().map(|(idx, &t)| (at(t), idx)).collect();
        expected.sort();
        prop_assert_eq!(log.borrow().clone(), expected);
    }
}
