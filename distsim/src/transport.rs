//! Message passing between logical processes.
//!
//! A [`Transport`] carries opaque byte frames between logical processes (LPs)
//! addressed by their rank. The synchronization engine only needs four
//! primitives from it:
//!
//! * a non-blocking point-to-point send, returning a [`SendRequest`] that
//!   reports when the frame buffer may be released,
//! * a non-blocking test for an arrived frame,
//! * a blocking wait for the next frame from any peer,
//! * an all-gather collective, used by the granted-time-window algorithm.
//!
//! A transport value is obtained already enabled: its rank and size are known
//! from construction onwards, which makes any use-before-enable impossible.
//! [`LocalTransport`] is an in-process implementation connecting LPs running
//! on separate threads.
//!
//! All transport failures are fatal for the simulation run.

pub(crate) mod codec;
mod local;
pub(crate) mod messenger;

use std::error::Error;
use std::fmt;

use bytes::Bytes;
use futures_channel::oneshot;

pub use codec::DecodeError;
pub use local::LocalTransport;

/// A message-passing substrate connecting logical processes.
pub trait Transport {
    /// Returns the rank of the local logical process.
    fn system_id(&self) -> u32;

    /// Returns the total number of logical processes.
    fn size(&self) -> u32;

    /// Issues a non-blocking send of a frame to the specified rank.
    ///
    /// The returned request completes once the transport no longer needs the
    /// frame buffer.
    fn send(&mut self, dest: u32, frame: Bytes) -> Result<SendRequest, TransportError>;

    /// Returns the next arrived frame, if any, without blocking.
    fn try_recv(&mut self) -> Result<Option<Incoming>, TransportError>;

    /// Blocks until a frame arrives from any peer.
    fn recv(&mut self) -> Result<Incoming, TransportError>;

    /// Exchanges one contribution with every logical process.
    ///
    /// This is a collective operation: it blocks until all logical processes
    /// have contributed. The returned vector is indexed by rank and includes
    /// the local contribution.
    fn all_gather(&mut self, contribution: Bytes) -> Result<Vec<Bytes>, TransportError>;

    /// Cancels all outstanding operations and shuts the transport down.
    fn disable(&mut self);
}

/// A frame received from a peer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Incoming {
    /// Rank of the sender.
    pub source: u32,
    /// Raw frame.
    pub frame: Bytes,
}

/// Completion handle of a non-blocking send.
#[derive(Debug)]
#[must_use = "the send buffer must be retained until the request completes"]
pub struct SendRequest {
    inner: Option<oneshot::Receiver<()>>,
}

impl SendRequest {
    /// Creates a pending request and the handle that completes it.
    pub fn pending() -> (SendCompletion, SendRequest) {
        let (sender, receiver) = oneshot::channel();

        (
            SendCompletion { inner: sender },
            SendRequest {
                inner: Some(receiver),
            },
        )
    }

    /// Creates a request that is already complete.
    pub fn completed() -> Self {
        Self { inner: None }
    }

    /// Checks without blocking whether the send has completed.
    ///
    /// A request whose completion handle was dropped is considered complete.
    pub fn test(&mut self) -> bool {
        let Some(receiver) = &mut self.inner else {
            return true;
        };
        match receiver.try_recv() {
            Ok(None) => false,
            Ok(Some(())) | Err(oneshot::Canceled) => {
                self.inner = None;
                true
            }
        }
    }
}

/// The transport side of a [`SendRequest`].
#[derive(Debug)]
pub struct SendCompletion {
    inner: oneshot::Sender<()>,
}

impl SendCompletion {
    /// Signals that the frame buffer is no longer needed.
    pub fn complete(self) {
        // The request may have been cancelled already.
        let _ = self.inner.send(());
    }
}

/// Error returned by a transport operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportError {
    /// The peer with the specified rank is no longer reachable.
    Disconnected {
        /// Rank of the peer.
        rank: u32,
    },
    /// The rank does not designate a remote logical process.
    InvalidRank {
        /// The offending rank.
        rank: u32,
    },
    /// All peers are disconnected and no frame is left to receive.
    Closed,
    /// The transport was disabled.
    Disabled,
    /// A collective operation returned an unexpected number of contributions.
    Collective {
        /// Expected number of contributions.
        expected: usize,
        /// Actual number of contributions.
        actual: usize,
    },
}

impl fmt::Display for TransportError {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected { rank } => {
                write!(fmt, "the logical process of rank {} is disconnected", rank)
            }
            Self::InvalidRank { rank } => {
                write!(fmt, "rank {} is not a valid remote logical process", rank)
            }
            Self::Closed => write!(fmt, "all peers are disconnected"),
            Self::Disabled => write!(fmt, "the transport was disabled"),
            Self::Collective { expected, actual } => write!(
                fmt,
                "the collective operation returned {} contributions instead of {}",
                actual, expected
            ),
        }
    }
}

impl Error for TransportError {}
