//! Logical processes synchronized with granted time windows.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use distsim::simulation::SimInit;
use distsim::sync::SyncAlgorithm;
use distsim::time::SimTime;
use distsim::topology::Topology;

use crate::support::run_cluster;

fn at(nanos: u64) -> SimTime {
    SimTime::from_nanos(nanos)
}

#[test]
fn window_is_granted_from_earliest_event() {
    let results = run_cluster(3, |transport| {
        let mut topology = Topology::new();
        let nodes: Vec<_> = (0..3).map(|rank| topology.add_node(rank)).collect();
        topology.connect(nodes[0], nodes[1], Duration::from_nanos(2));
        topology.connect(nodes[1], nodes[2], Duration::from_nanos(2));
        topology.connect(nodes[2], nodes[0], Duration::from_nanos(2));

        let mut simulation = SimInit::new()
            .set_topology(topology)
            .set_algorithm(SyncAlgorithm::GrantedTimeWindow)
            .init(transport)
            .unwrap();

        let observed = Rc::new(RefCell::new(Vec::new()));
        let time = [10, 12, 9][simulation.system_id() as usize];
        {
            let observed = observed.clone();
            simulation
                .schedule(at(time), move |cx| {
                    observed.borrow_mut().push((cx.time(), cx.safe_time()))
                })
                .unwrap();
        }
        simulation.run().unwrap();

        let observed = observed.borrow().clone();
        (simulation, observed)
    });

    assert_eq!(
        results,
        vec![
            vec![(at(10), at(11))],
            vec![(at(12), at(14))],
            vec![(at(9), at(11))],
        ]
    );
}

#[test]
fn packet_round_trip() {
    let results = run_cluster(2, |transport| {
        let mut topology = Topology::new();
        let a = topology.add_node(0);
        let b = topology.add_node(1);
        topology.connect(a, b, Duration::from_nanos(5));

        let received = Rc::new(RefCell::new(Vec::new()));
        let mut simulation = {
            let received = received.clone();
            SimInit::new()
                .set_topology(topology)
                .set_algorithm(SyncAlgorithm::GrantedTimeWindow)
                .set_packet_handler(move |cx, packet| {
                    received
                        .borrow_mut()
                        .push((cx.time(), cx.context(), packet.node));
                    if packet.node == b {
                        cx.send_packet(packet.payload, Duration::from_nanos(5), a, 0);
                    }
                })
                .init(transport)
                .unwrap()
        };

        if simulation.system_id() == 0 {
            simulation
                .schedule(at(1), move |cx| {
                    cx.send_packet(&b"data"[..], Duration::from_nanos(5), b, 0)
                })
                .unwrap();
        }
        simulation.run().unwrap();

        let observed = (
            received.borrow().clone(),
            simulation.time(),
            simulation.tx_count(),
            simulation.rx_count(),
        );
        (simulation, (observed, a, b))
    });

    let ((received_0, time_0, tx_0, rx_0), a, _) = &results[0];
    let ((received_1, time_1, tx_1, rx_1), _, b) = &results[1];

    assert_eq!(*received_1, vec![(at(6), 1, *b)]);
    assert_eq!(*received_0, vec![(at(11), 0, *a)]);
    assert_eq!((*time_0, *time_1), (at(11), at(6)));
    assert_eq!((*tx_0, *rx_0, *tx_1, *rx_1), (1, 1, 1, 1));
}

#[test]
fn unconnected_logical_processes_finish() {
    let results = run_cluster(3, |transport| {
        let mut topology = Topology::new();
        for rank in 0..3 {
            topology.add_node(rank);
        }

        let mut simulation = SimInit::new()
            .set_topology(topology)
            .set_algorithm(SyncAlgorithm::GrantedTimeWindow)
            .init(transport)
            .unwrap();
        let rank = u64::from(simulation.system_id());
        for i in 1..=3 {
            simulation.schedule(at(rank * 100 + i), |_| {}).unwrap();
        }
        simulation.run().unwrap();

        let observed = (simulation.time(), simulation.safe_time());
        (simulation, observed)
    });

    assert_eq!(
        results,
        vec![
            (at(3), SimTime::MAX),
            (at(103), SimTime::MAX),
            (at(203), SimTime::MAX)
        ]
    );
}

#[test]
fn stop_ends_the_run_of_all_logical_processes() {
    let results = run_cluster(2, |transport| {
        let mut topology = Topology::new();
        let a = topology.add_node(0);
        let b = topology.add_node(1);
        topology.connect(a, b, Duration::from_nanos(4));

        let mut simulation = SimInit::new()
            .set_topology(topology)
            .set_algorithm(SyncAlgorithm::GrantedTimeWindow)
            .init(transport)
            .unwrap();
        simulation.schedule(at(3), |_| {}).unwrap();
        simulation.schedule(at(50), |_| {}).unwrap();
        simulation.stop_after(at(20)).unwrap();
        simulation.run().unwrap();

        let observed = simulation.time();
        (simulation, observed)
    });

    assert_eq!(results, vec![at(20), at(20)]);
}
