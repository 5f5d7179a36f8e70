//! Helpers running one simulation per thread.

use std::sync::{Arc, Barrier};
use std::thread;

use distsim::simulation::Simulation;
use distsim::transport::LocalTransport;
use tracing_subscriber::EnvFilter;

/// Installs a test subscriber honoring `RUST_LOG`.
pub(crate) fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Runs `body` on one thread per logical process of an in-process cluster.
///
/// `body` builds and runs the simulation of one logical process and returns
/// it along with the data to collect. Simulations are destroyed once all
/// runs have returned. The collected data is ordered by rank.
pub(crate) fn run_cluster<F, R>(size: u32, body: F) -> Vec<R>
where
    F: Fn(LocalTransport) -> (Simulation, R) + Send + Sync + 'static,
    R: Send + 'static,
{
    init_logging();

    let body = Arc::new(body);
    let barrier = Arc::new(Barrier::new(size as usize));

    let handles: Vec<_> = LocalTransport::cluster(size)
        .into_iter()
        .map(|transport| {
            let body = body.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                let (simulation, collected) = body(transport);
                barrier.wait();
                simulation.destroy();

                collected
            })
        })
        .collect();

    handles
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .collect()
}
