use std::collections::btree_map::{BTreeMap, Entry};
use std::error::Error;
use std::fmt;

use tracing::debug;

use super::bundle::RemoteChannelBundle;
use super::config::SchedulerTune;
use crate::simulation::{Action, ExecutionError, LogicalProcess, NO_CONTEXT};
use crate::time::SimTime;

/// Registry of the channel bundles of a logical process, indexed by remote
/// rank.
///
/// The registry is populated once during setup and closed by
/// [`initialize_null_message_events`](Self::initialize_null_message_events).
#[derive(Debug)]
pub(crate) struct RemoteChannelBundleManager {
    local_rank: u32,
    bundles: BTreeMap<u32, RemoteChannelBundle>,
    is_closed: bool,
}

impl RemoteChannelBundleManager {
    pub(crate) fn new(local_rank: u32) -> Self {
        Self {
            local_rank,
            bundles: BTreeMap::new(),
            is_closed: false,
        }
    }

    pub(crate) fn find(&self, rank: u32) -> Option<&RemoteChannelBundle> {
        self.bundles.get(&rank)
    }

    pub(crate) fn find_mut(&mut self, rank: u32) -> Option<&mut RemoteChannelBundle> {
        self.bundles.get_mut(&rank)
    }

    /// Returns the bundle for the specified remote rank, creating it if
    /// needed.
    pub(crate) fn add(&mut self, rank: u32) -> Result<&mut RemoteChannelBundle, BundleError> {
        if self.is_closed {
            return Err(BundleError::RegistryClosed { rank });
        }
        if rank == self.local_rank {
            return Err(BundleError::LocalRank { rank });
        }

        Ok(match self.bundles.entry(rank) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                debug!(rank, "channel bundle created");
                entry.insert(RemoteChannelBundle::new(rank))
            }
        })
    }

    /// Number of remote logical processes connected to this one.
    pub(crate) fn size(&self) -> usize {
        self.bundles.len()
    }

    /// Returns the minimum guarantee time over all bundles, or
    /// [`SimTime::MAX`] if there is no bundle.
    pub(crate) fn safe_time(&self) -> SimTime {
        self.bundles
            .values()
            .map(RemoteChannelBundle::guarantee_time)
            .min()
            .unwrap_or(SimTime::MAX)
    }

    /// Records a guarantee time received from a remote logical process.
    pub(crate) fn update_guarantee(
        &mut self,
        rank: u32,
        time: SimTime,
        now: SimTime,
    ) -> Result<(), ExecutionError> {
        let bundle = self
            .find_mut(rank)
            .ok_or(ExecutionError::UnknownPeer(rank))?;
        bundle.set_guarantee_time(time, now);

        Ok(())
    }

    /// Sends an initial null message on each bundle and schedules the
    /// recurring null-message timers, then closes the registry.
    ///
    /// # Panics
    ///
    /// This method panics if called more than once.
    pub(crate) fn initialize_null_message_events(
        &mut self,
        lp: &mut LogicalProcess,
        scheduler_tune: SchedulerTune,
    ) -> Result<(), ExecutionError> {
        assert!(
            !self.is_closed,
            "internal simulation error: null message events initialized twice"
        );
        self.is_closed = true;

        let now = lp.now();
        for (&rank, bundle) in self.bundles.iter_mut() {
            bundle.send(bundle.delay(), now, &mut lp.messenger)?;

            let timer = lp.queue.schedule_with_context(
                NO_CONTEXT,
                now + scheduler_tune.scale(bundle.delay()),
                Action::NullMessage(rank),
            )?;
            bundle.set_null_message_timer(timer);
        }

        Ok(())
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &RemoteChannelBundle> + '_ {
        self.bundles.values()
    }

    /// Drops all bundles.
    pub(crate) fn clear(&mut self) {
        self.bundles.clear();
    }
}

/// Error returned when a channel bundle cannot be registered.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum BundleError {
    /// The registry was closed by the initialization of null messages.
    RegistryClosed {
        /// Remote rank of the rejected bundle.
        rank: u32,
    },
    /// The rank is that of the local logical process.
    LocalRank {
        /// The local rank.
        rank: u32,
    },
}

impl fmt::Display for BundleError {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RegistryClosed { rank } => write!(
                fmt,
                "cannot add a bundle for rank {} after null message initialization",
                rank
            ),
            Self::LocalRank { rank } => write!(
                fmt,
                "rank {} is the local logical process and cannot have a bundle",
                rank
            ),
        }
    }
}

impl Error for BundleError {}
