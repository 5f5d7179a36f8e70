//! Simulated nodes and the channels connecting them.
//!
//! Every logical process builds the same [`Topology`]. Each node is owned by
//! exactly one logical process, identified by its rank (system ID). A channel
//! whose endpoints are owned by different logical processes is a *remote*
//! channel: its propagation delay bounds how early a packet sent across it can
//! affect the other side, which is what the synchronization algorithms rely
//! on.

use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Unique identifier of a simulated node.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NodeId(u32);

impl NodeId {
    /// Returns the node index used on the wire.
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

/// Unique identifier of a channel.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChannelId(usize);

/// A point-to-point link with a fixed propagation delay.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Channel {
    id: ChannelId,
    endpoints: [NodeId; 2],
    delay: Duration,
}

impl Channel {
    /// Returns the channel identifier.
    pub fn id(&self) -> ChannelId {
        self.id
    }

    /// Returns the two nodes connected by the channel.
    pub fn endpoints(&self) -> [NodeId; 2] {
        self.endpoints
    }

    /// Returns the propagation delay.
    pub fn delay(&self) -> Duration {
        self.delay
    }
}

/// The set of simulated nodes and channels.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use distsim::topology::Topology;
///
/// let mut topology = Topology::new();
/// let a = topology.add_node(0);
/// let b = topology.add_node(1);
/// let c = topology.add_node(1);
/// topology.connect(a, b, Duration::from_millis(10));
/// topology.connect(b, c, Duration::from_millis(1));
///
/// // Only the first channel crosses logical processes.
/// let remote: Vec<_> = topology.remote_channels(0).collect();
/// assert_eq!(remote.len(), 1);
/// assert_eq!(remote[0].0, 1);
/// ```
#[derive(Clone, Debug, Default)]
pub struct Topology {
    // Owner rank of each node, indexed by node ID.
    nodes: Vec<u32>,
    channels: Vec<Channel>,
}

impl Topology {
    /// Creates an empty topology.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node owned by the logical process with the specified rank.
    pub fn add_node(&mut self, system_id: u32) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(system_id);

        id
    }

    /// Connects two nodes with a channel of the specified delay.
    ///
    /// # Panics
    ///
    /// This method panics if either node was not added to this topology.
    pub fn connect(&mut self, a: NodeId, b: NodeId, delay: Duration) -> ChannelId {
        assert!(
            self.system_id(a).is_some() && self.system_id(b).is_some(),
            "cannot connect nodes that do not belong to the topology"
        );
        let id = ChannelId(self.channels.len());
        self.channels.push(Channel {
            id,
            endpoints: [a, b],
            delay,
        });

        id
    }

    /// Returns the rank of the logical process owning a node, if the node
    /// exists.
    pub fn system_id(&self, node: NodeId) -> Option<u32> {
        self.nodes.get(node.0 as usize).copied()
    }

    /// Returns the node with the specified wire index, if it exists.
    pub fn node(&self, index: u32) -> Option<NodeId> {
        ((index as usize) < self.nodes.len()).then_some(NodeId(index))
    }

    /// Returns the number of nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Returns an iterator over all channels.
    pub fn channels(&self) -> impl Iterator<Item = &Channel> + '_ {
        self.channels.iter()
    }

    /// Returns an iterator over the channels connecting a node owned by the
    /// specified logical process to a node owned by another one, together
    /// with the rank of the remote side.
    pub fn remote_channels(&self, local_rank: u32) -> impl Iterator<Item = (u32, &Channel)> + '_ {
        self.channels.iter().filter_map(move |channel| {
            let [a, b] = channel.endpoints.map(|node| self.nodes[node.0 as usize]);
            match (a == local_rank, b == local_rank) {
                (true, false) => Some((b, channel)),
                (false, true) => Some((a, channel)),
                _ => None,
            }
        })
    }
}
