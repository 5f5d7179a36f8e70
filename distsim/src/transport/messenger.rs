use std::fmt;

use bytes::Bytes;
use slab::Slab;
use tracing::trace;

use super::codec::Message;
use super::{SendRequest, Transport, TransportError};
use crate::simulation::ExecutionError;

/// Synchronization-aware wrapper around a [`Transport`].
///
/// The messenger encodes outgoing messages, retains their frames until the
/// transport reports completion and keeps the send/receive counters used for
/// global termination detection.
pub(crate) struct Messenger {
    transport: Box<dyn Transport>,
    pending_sends: Slab<PendingSend>,
    tx_count: u64,
    rx_count: u64,
}

impl Messenger {
    pub(crate) fn new(transport: Box<dyn Transport>) -> Self {
        Self {
            transport,
            pending_sends: Slab::new(),
            tx_count: 0,
            rx_count: 0,
        }
    }

    pub(crate) fn system_id(&self) -> u32 {
        self.transport.system_id()
    }

    pub(crate) fn size(&self) -> u32 {
        self.transport.size()
    }

    /// Total number of messages sent, null messages included.
    pub(crate) fn tx_count(&self) -> u64 {
        self.tx_count
    }

    /// Total number of messages received, null messages included.
    pub(crate) fn rx_count(&self) -> u64 {
        self.rx_count
    }

    /// Number of sends not yet reported complete by the transport.
    pub(crate) fn pending_sends(&self) -> usize {
        self.pending_sends.len()
    }

    /// Encodes and sends a message.
    pub(crate) fn send(&mut self, dest: u32, message: &Message) -> Result<(), TransportError> {
        let frame = message.encode();
        let request = self.transport.send(dest, frame.clone())?;
        self.tx_count += 1;

        trace!(
            dest,
            null = message.is_null(),
            guarantee = %message.guarantee_time,
            "message sent"
        );

        self.pending_sends.insert(PendingSend {
            _frame: frame,
            request,
        });

        Ok(())
    }

    /// Releases the frames of all completed sends.
    pub(crate) fn test_send_complete(&mut self) {
        self.pending_sends.retain(|_, pending| !pending.request.test());
    }

    /// Returns the next arrived message, if any, without blocking.
    pub(crate) fn try_receive(&mut self) -> Result<Option<(u32, Message)>, ExecutionError> {
        match self.transport.try_recv()? {
            Some(incoming) => self.accept(incoming.source, incoming.frame).map(Some),
            None => Ok(None),
        }
    }

    /// Blocks until a message arrives.
    pub(crate) fn receive_blocking(&mut self) -> Result<(u32, Message), ExecutionError> {
        let incoming = self.transport.recv()?;

        self.accept(incoming.source, incoming.frame)
    }

    fn accept(&mut self, source: u32, frame: Bytes) -> Result<(u32, Message), ExecutionError> {
        self.rx_count += 1;
        let message = Message::decode(frame)?;

        Ok((source, message))
    }

    /// Exchanges one contribution with every logical process.
    pub(crate) fn all_gather(&mut self, contribution: Bytes) -> Result<Vec<Bytes>, TransportError> {
        let expected = self.size() as usize;
        let gathered = self.transport.all_gather(contribution)?;
        if gathered.len() != expected {
            return Err(TransportError::Collective {
                expected,
                actual: gathered.len(),
            });
        }

        Ok(gathered)
    }

    /// Cancels outstanding sends and shuts down the transport.
    pub(crate) fn disable(&mut self) {
        self.pending_sends.clear();
        self.transport.disable();
    }
}

impl fmt::Debug for Messenger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Messenger")
            .field("system_id", &self.system_id())
            .field("size", &self.size())
            .field("pending_sends", &self.pending_sends.len())
            .field("tx_count", &self.tx_count)
            .field("rx_count", &self.rx_count)
            .finish_non_exhaustive()
    }
}

/// A sent frame kept alive until its request completes.
struct PendingSend {
    _frame: Bytes,
    request: SendRequest,
}
