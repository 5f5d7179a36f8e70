//! Conservative time synchronization for distributed discrete-event
//! simulation.
//!
//! A distributed simulation is split into *logical processes* (LPs), each
//! owning a subset of the simulated nodes and its own event queue. LPs exchange
//! packets through a [`Transport`](transport::Transport), and must never
//! process an event that a packet still in flight could precede.
//!
//! This crate provides the synchronization core that enforces this
//! constraint, with two interchangeable algorithms:
//!
//! * the *null message* algorithm, where each LP periodically promises its
//!   neighbors a lower bound on the timestamp of its future packets,
//! * the *granted time window* algorithm, where all LPs periodically agree on
//!   a lower bound on the timestamp of any future event through a collective
//!   exchange.
//!
//! Both rely on the *lookahead* given by the propagation delay of the
//! channels crossing LPs, as described by a [`Topology`](topology::Topology)
//! shared by all LPs.
//!
//! # A practical overview
//!
//! Each LP builds the same topology, creates a
//! [`Simulation`](simulation::Simulation) with the
//! [`SimInit`](simulation::SimInit) builder, schedules its initial events and
//! runs. Event callbacks receive a [`Context`](simulation::Context) which they
//! can use to schedule further events or to send packets to nodes owned by
//! other LPs. Packets are handed to the packet handler of the destination LP
//! at their delivery time.
//!
//! The example below runs two LPs on two threads connected by an in-process
//! [`LocalTransport`](transport::LocalTransport):
//!
//! ```
//! use std::sync::{mpsc, Arc, Barrier};
//! use std::thread;
//! use std::time::Duration;
//!
//! use distsim::simulation::SimInit;
//! use distsim::time::SimTime;
//! use distsim::topology::Topology;
//! use distsim::transport::LocalTransport;
//!
//! let mut topology = Topology::new();
//! let sender = topology.add_node(0);
//! let receiver = topology.add_node(1);
//! topology.connect(sender, receiver, Duration::from_millis(10));
//!
//! let (tx, rx) = mpsc::channel();
//! let barrier = Arc::new(Barrier::new(2));
//! let handles: Vec<_> = LocalTransport::cluster(2)
//!     .into_iter()
//!     .map(|transport| {
//!         let topology = topology.clone();
//!         let tx = tx.clone();
//!         let barrier = barrier.clone();
//!         thread::spawn(move || {
//!             let mut simulation = SimInit::new()
//!                 .set_topology(topology)
//!                 .set_packet_handler(move |cx, packet| {
//!                     tx.send((cx.time(), packet.payload)).unwrap();
//!                 })
//!                 .init(transport)
//!                 .unwrap();
//!
//!             if simulation.system_id() == 0 {
//!                 simulation
//!                     .schedule(Duration::from_millis(5), move |cx| {
//!                         cx.send_packet("ping", Duration::from_millis(10), receiver, 0);
//!                     })
//!                     .unwrap();
//!             }
//!             simulation.stop_after(Duration::from_millis(50)).unwrap();
//!             simulation.run().unwrap();
//!
//!             // Only shut down once all logical processes are done.
//!             barrier.wait();
//!             simulation.destroy();
//!         })
//!     })
//!     .collect();
//!
//! for handle in handles {
//!     handle.join().unwrap();
//! }
//!
//! let (time, payload) = rx.recv().unwrap();
//! assert_eq!(time, SimTime::from_nanos(15_000_000));
//! assert_eq!(&payload[..], b"ping");
//! ```
//!
//! # Logging
//!
//! The crate emits [`tracing`] events: `info` for the start and end of runs,
//! `debug` for setup, guarantee updates and null messages, `trace` for
//! individual messages and safe time updates. No subscriber is installed.
#![warn(missing_docs, missing_debug_implementations, unreachable_pub)]

pub mod simulation;
pub mod sync;
pub mod time;
pub mod topology;
pub mod transport;
pub(crate) mod util;
