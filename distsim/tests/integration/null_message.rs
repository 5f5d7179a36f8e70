//! Logical processes synchronized with null messages.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use distsim::simulation::{Context, SimInit};
use distsim::sync::{SchedulerTune, SyncAlgorithm};
use distsim::time::SimTime;
use distsim::topology::{NodeId, Topology};

use crate::support::run_cluster;

fn at(nanos: u64) -> SimTime {
    SimTime::from_nanos(nanos)
}

/// Two nodes, one per logical process, joined by a single channel.
fn pair(delay: Duration) -> (Topology, NodeId, NodeId) {
    let mut topology = Topology::new();
    let a = topology.add_node(0);
    let b = topology.add_node(1);
    topology.connect(a, b, delay);

    (topology, a, b)
}

#[derive(Debug)]
struct Observed {
    // Time, guarantee of the sender, safe time and context at reception.
    received: Vec<(SimTime, Option<SimTime>, SimTime, u32)>,
    // Time and safe time of periodic local events.
    ticks: Vec<(SimTime, SimTime)>,
    final_time: SimTime,
}

#[test]
fn packet_crosses_logical_processes() {
    let results = run_cluster(2, |transport| {
        let (topology, _, b) = pair(Duration::from_nanos(10));
        let received = Rc::new(RefCell::new(Vec::new()));
        let ticks = Rc::new(RefCell::new(Vec::new()));

        let mut simulation = {
            let received = received.clone();
            SimInit::new()
                .set_topology(topology)
                .set_algorithm(SyncAlgorithm::NullMessage)
                .set_scheduler_tune(SchedulerTune::new(1.0).unwrap())
                .set_packet_handler(move |cx, packet| {
                    assert_eq!(&packet.payload[..], b"ping");
                    received.borrow_mut().push((
                        cx.time(),
                        cx.guarantee_time(0),
                        cx.safe_time(),
                        cx.context(),
                    ));
                })
                .init(transport)
                .unwrap()
        };

        if simulation.system_id() == 0 {
            simulation
                .schedule(at(5), move |cx| {
                    cx.send_packet(&b"ping"[..], Duration::from_nanos(10), b, 0)
                })
                .unwrap();
        }
        {
            let ticks = ticks.clone();
            simulation
                .schedule(at(3), move |cx| tick(cx, ticks))
                .unwrap();
        }
        simulation.stop_after(at(40)).unwrap();
        simulation.run().unwrap();

        let observed = Observed {
            received: received.borrow().clone(),
            ticks: ticks.borrow().clone(),
            final_time: simulation.time(),
        };

        (simulation, observed)
    });

    for observed in &results {
        assert_eq!(observed.final_time, at(40));
        assert_eq!(observed.ticks.len(), 13);
        for &(time, safe_time) in &observed.ticks {
            assert!(time <= safe_time);
        }
    }

    assert!(results[0].received.is_empty());
    assert_eq!(results[1].received.len(), 1);
    let (time, guarantee, safe_time, context) = results[1].received[0];
    assert_eq!(time, at(15));
    assert!(guarantee.unwrap() >= at(15));
    assert!(time <= safe_time);
    assert_eq!(context, 1);
}

fn tick(cx: &mut Context<'_>, log: Rc<RefCell<Vec<(SimTime, SimTime)>>>) {
    log.borrow_mut().push((cx.time(), cx.safe_time()));
    if cx.time() < at(39) {
        cx.schedule(Duration::from_nanos(3), move |cx| tick(cx, log))
            .unwrap();
    }
}

#[test]
fn ping_pong() {
    let results = run_cluster(2, |transport| {
        let (topology, a, b) = pair(Duration::from_nanos(10));
        let received = Rc::new(RefCell::new(Vec::new()));

        let mut simulation = {
            let received = received.clone();
            SimInit::new()
                .set_topology(topology)
                .set_packet_handler(move |cx, packet| {
                    received.borrow_mut().push(cx.time().as_nanos());
                    let peer = if packet.node == a { b } else { a };
                    cx.send_packet(packet.payload, Duration::from_nanos(10), peer, packet.device);
                })
                .init(transport)
                .unwrap()
        };

        if simulation.system_id() == 0 {
            simulation
                .schedule(at(1), move |cx| {
                    cx.send_packet(&b"ball"[..], Duration::from_nanos(10), b, 0)
                })
                .unwrap();
        }
        simulation.stop_after(at(120)).unwrap();
        simulation.run().unwrap();

        let received = received.borrow().clone();
        let counts = (simulation.tx_count(), simulation.rx_count());

        (simulation, (received, counts))
    });

    let (received_0, (tx_0, _)) = &results[0];
    let (received_1, (_, rx_1)) = &results[1];
    assert_eq!(*received_0, vec![21, 41, 61, 81, 101]);
    assert_eq!(*received_1, vec![11, 31, 51, 71, 91, 111]);

    // Null messages are counted along with packets.
    assert!(*tx_0 >= 6);
    assert!(*rx_1 >= 6);
}

#[test]
fn unconnected_logical_processes_run_independently() {
    let results = run_cluster(3, |transport| {
        let mut topology = Topology::new();
        for rank in 0..3 {
            topology.add_node(rank);
        }

        let mut simulation = SimInit::new()
            .set_topology(topology)
            .init(transport)
            .unwrap();
        let rank = u64::from(simulation.system_id());
        simulation.schedule(at(10 * (rank + 1)), |_| {}).unwrap();
        simulation.run().unwrap();

        let observed = (simulation.time(), simulation.safe_time());
        (simulation, observed)
    });

    assert_eq!(
        results,
        vec![
            (at(10), SimTime::MAX),
            (at(20), SimTime::MAX),
            (at(30), SimTime::MAX)
        ]
    );
}
