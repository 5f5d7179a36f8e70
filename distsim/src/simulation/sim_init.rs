use std::fmt;
use std::time::Duration;

use tracing::debug;

use crate::sync::{self, ConfigError, SchedulerTune, SyncAlgorithm, SyncConfig};
use crate::topology::Topology;
use crate::transport::messenger::Messenger;
use crate::transport::Transport;

use super::logical_process::{LogicalProcess, PacketHandler};
use super::{Context, RemotePacket, Simulation};

/// Builder for one logical process of a distributed simulation.
pub struct SimInit {
    topology: Topology,
    config: SyncConfig,
    packet_handler: Option<PacketHandler>,
}

impl SimInit {
    /// Creates a builder with an empty topology and the default
    /// configuration.
    pub fn new() -> Self {
        Self {
            topology: Topology::new(),
            config: SyncConfig::default(),
            packet_handler: None,
        }
    }

    /// Sets the topology, which must be identical on all logical processes.
    pub fn set_topology(mut self, topology: Topology) -> Self {
        self.topology = topology;

        self
    }

    /// Sets the whole synchronization configuration.
    pub fn set_sync_config(mut self, config: SyncConfig) -> Self {
        self.config = config;

        self
    }

    /// Selects the synchronization algorithm.
    ///
    /// If not set, the null message algorithm is used.
    pub fn set_algorithm(mut self, algorithm: SyncAlgorithm) -> Self {
        self.config.algorithm = algorithm;

        self
    }

    /// Sets the null-message pacing factor.
    pub fn set_scheduler_tune(mut self, scheduler_tune: SchedulerTune) -> Self {
        self.config.scheduler_tune = scheduler_tune;

        self
    }

    /// Sets an upper bound on the lookahead of the granted time window
    /// algorithm.
    ///
    /// A null lookahead is rejected by [`SimInit::init()`].
    pub fn set_max_lookahead(mut self, max_lookahead: Duration) -> Self {
        self.config.max_lookahead = Some(max_lookahead);

        self
    }

    /// Sets the handler of packets sent to nodes owned by this logical
    /// process.
    ///
    /// The handler runs in the context of the destination node.
    pub fn set_packet_handler<F>(mut self, handler: F) -> Self
    where
        F: FnMut(&mut Context<'_>, RemotePacket) + 'static,
    {
        self.packet_handler = Some(Box::new(handler));

        self
    }

    /// Builds a simulation communicating over the specified transport.
    ///
    /// The synchronization state is initialized on the first call to
    /// [`Simulation::run()`].
    pub fn init(self, transport: impl Transport + 'static) -> Result<Simulation, ConfigError> {
        self.config.validate()?;

        let messenger = Messenger::new(Box::new(transport));
        debug!(
            rank = messenger.system_id(),
            size = messenger.size(),
            algorithm = ?self.config.algorithm,
            "simulation initialized"
        );
        let sync = sync::strategy(&self.config, messenger.system_id());
        let lp = LogicalProcess::new(messenger, self.topology, self.packet_handler);

        Ok(Simulation::new(lp, sync))
    }
}

impl Default for SimInit {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SimInit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimInit")
            .field("topology", &self.topology)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
