use std::fmt;

use bytes::Bytes;
use crossbeam_channel::{self as channel, Receiver, Sender, TryRecvError};

use super::{Incoming, SendCompletion, SendRequest, Transport, TransportError};

/// An in-process transport connecting logical processes that run on separate
/// threads.
///
/// Each transport of a cluster owns one mailbox receiving point-to-point
/// frames from all peers. Collective operations use a separate set of
/// channels so that they never interleave with point-to-point traffic.
///
/// A send completes as soon as the frame was dequeued by the receiver.
///
/// # Examples
///
/// ```
/// use std::thread;
///
/// use bytes::Bytes;
/// use distsim::transport::{LocalTransport, Transport};
///
/// let mut cluster = LocalTransport::cluster(2);
/// let mut t1 = cluster.pop().unwrap();
/// let mut t0 = cluster.pop().unwrap();
///
/// let peer = thread::spawn(move || {
///     let incoming = t1.recv().unwrap();
///     assert_eq!(incoming.source, 0);
///     t1.all_gather(Bytes::from_static(b"one")).unwrap()
/// });
///
/// let mut request = t0.send(1, Bytes::from_static(b"hello")).unwrap();
/// let gathered = t0.all_gather(Bytes::from_static(b"zero")).unwrap();
/// assert_eq!(gathered, peer.join().unwrap());
/// assert!(request.test());
/// ```
pub struct LocalTransport {
    rank: u32,
    size: u32,
    // Point-to-point senders indexed by rank; there is no sender to self.
    peers: Vec<Option<Sender<Envelope>>>,
    mailbox: Receiver<Envelope>,
    // Collective senders indexed by destination rank.
    gather_tx: Vec<Sender<Bytes>>,
    // Collective receivers indexed by source rank.
    gather_rx: Vec<Receiver<Bytes>>,
    enabled: bool,
}

impl LocalTransport {
    /// Creates a fully connected cluster of `size` transports, ordered by
    /// rank.
    ///
    /// # Panics
    ///
    /// This function panics if `size` is zero.
    pub fn cluster(size: u32) -> Vec<LocalTransport> {
        assert!(size > 0, "a cluster requires at least one logical process");

        let n = size as usize;
        let (mailbox_tx, mailbox_rx): (Vec<_>, Vec<_>) =
            (0..n).map(|_| channel::unbounded()).unzip();

        // `gather[src][dst]` carries contributions from `src` to `dst`.
        let mut gather: Vec<Vec<_>> = (0..n)
            .map(|_| (0..n).map(|_| channel::unbounded()).collect())
            .collect();
        let mut gather_rx: Vec<Vec<Receiver<Bytes>>> = (0..n).map(|_| Vec::new()).collect();
        let mut gather_tx: Vec<Vec<Sender<Bytes>>> = Vec::with_capacity(n);
        for row in gather.iter_mut() {
            let mut senders = Vec::with_capacity(n);
            for (dst, (sender, receiver)) in row.drain(..).enumerate() {
                senders.push(sender);
                gather_rx[dst].push(receiver);
            }
            gather_tx.push(senders);
        }

        mailbox_rx
            .into_iter()
            .zip(gather_tx.into_iter().zip(gather_rx))
            .enumerate()
            .map(|(rank, (mailbox, (gather_tx, gather_rx)))| {
                let peers = mailbox_tx
                    .iter()
                    .enumerate()
                    .map(|(dst, sender)| (dst != rank).then(|| sender.clone()))
                    .collect();

                LocalTransport {
                    rank: rank as u32,
                    size,
                    peers,
                    mailbox,
                    gather_tx,
                    gather_rx,
                    enabled: true,
                }
            })
            .collect()
    }

    fn check_enabled(&self) -> Result<(), TransportError> {
        if self.enabled {
            Ok(())
        } else {
            Err(TransportError::Disabled)
        }
    }

    fn open(&self, envelope: Envelope) -> Incoming {
        envelope.completion.complete();

        Incoming {
            source: envelope.source,
            frame: envelope.frame,
        }
    }
}

impl Transport for LocalTransport {
    fn system_id(&self) -> u32 {
        self.rank
    }

    fn size(&self) -> u32 {
        self.size
    }

    fn send(&mut self, dest: u32, frame: Bytes) -> Result<SendRequest, TransportError> {
        self.check_enabled()?;

        let sender = self
            .peers
            .get(dest as usize)
            .and_then(Option::as_ref)
            .ok_or(TransportError::InvalidRank { rank: dest })?;

        let (completion, request) = SendRequest::pending();
        sender
            .send(Envelope {
                source: self.rank,
                frame,
                completion,
            })
            .map_err(|_| TransportError::Disconnected { rank: dest })?;

        Ok(request)
    }

    fn try_recv(&mut self) -> Result<Option<Incoming>, TransportError> {
        self.check_enabled()?;

        match self.mailbox.try_recv() {
            Ok(envelope) => Ok(Some(self.open(envelope))),
            Err(TryRecvError::Empty) => Ok(None),
            // All peers are gone and nothing is left in the mailbox.
            Err(TryRecvError::Disconnected) => Ok(None),
        }
    }

    fn recv(&mut self) -> Result<Incoming, TransportError> {
        self.check_enabled()?;

        match self.mailbox.recv() {
            Ok(envelope) => Ok(self.open(envelope)),
            Err(_) => Err(TransportError::Closed),
        }
    }

    fn all_gather(&mut self, contribution: Bytes) -> Result<Vec<Bytes>, TransportError> {
        self.check_enabled()?;

        for (dst, sender) in self.gather_tx.iter().enumerate() {
            sender
                .send(contribution.clone())
                .map_err(|_| TransportError::Disconnected { rank: dst as u32 })?;
        }

        self.gather_rx
            .iter()
            .enumerate()
            .map(|(src, receiver)| {
                receiver
                    .recv()
                    .map_err(|_| TransportError::Disconnected { rank: src as u32 })
            })
            .collect()
    }

    fn disable(&mut self) {
        if !self.enabled {
            return;
        }
        self.enabled = false;

        // Release the senders blocked on pending requests.
        while let Ok(envelope) = self.mailbox.try_recv() {
            envelope.completion.complete();
        }
        self.peers.clear();
    }
}

impl fmt::Debug for LocalTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalTransport")
            .field("rank", &self.rank)
            .field("size", &self.size)
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}

/// A point-to-point frame in flight.
struct Envelope {
    source: u32,
    frame: Bytes,
    completion: SendCompletion,
}
