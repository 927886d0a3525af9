use super::record::CacheRecord;
use crossbeam_channel::{Receiver, Sender, unbounded};
use std::fmt::Debug;
use tracing::debug;

/// A message exchanged between cache-sync workers of different ranks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheMessage {
    /// An entry offered to every peer.
    Publish { from: usize, record: CacheRecord },
    /// A peer missed `composed_key` and asks whoever holds it to publish it.
    Request { from: usize, composed_key: String },
}

/// Best-effort transport between ranks.
///
/// Delivery is unordered across peers and may drop messages; callers never wait on a
/// reply through this interface.
pub trait Messenger: Send + Sync + Debug {
    fn rank(&self) -> usize;
    fn size(&self) -> usize;
    /// Sends `message` to every other rank.
    fn publish(&self, message: CacheMessage);
    /// Returns every message received since the last call without blocking.
    fn poll(&self) -> Vec<CacheMessage>;
}

/// The trivial transport of a process running alone.
#[derive(Debug, Default, Clone, Copy)]
pub struct SingleProcess;

impl Messenger for SingleProcess {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn publish(&self, _message: CacheMessage) {}

    fn poll(&self) -> Vec<CacheMessage> {
        Vec::new()
    }
}

/// Ranks living in the same process, connected by channels.
#[derive(Debug)]
pub struct LocalNetwork {
    rank: usize,
    peers: Vec<Sender<CacheMessage>>,
    inbox: Receiver<CacheMessage>,
}

impl LocalNetwork {
    /// Builds a fully connected network of `size` ranks; element `i` is rank `i`.
    pub fn create(size: usize) -> Vec<LocalNetwork> {
        let (senders, receivers): (Vec<_>, Vec<_>) = (0..size).map(|_| unbounded()).unzip();
        receivers
            .into_iter()
            .enumerate()
            .map(|(rank, inbox)| LocalNetwork {
                rank,
                peers: senders.clone(),
                inbox,
            })
            .collect()
    }
}

impl Messenger for LocalNetwork {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.peers.len()
    }

    fn publish(&self, message: CacheMessage) {
        for (peer, tx) in self.peers.iter().enumerate() {
            if peer == self.rank {
                continue;
            }
            if tx.send(message.clone()).is_err() {
                debug!(from = self.rank, to = peer, "Peer rank is gone; message dropped.");
            }
        }
    }

    fn poll(&self) -> Vec<CacheMessage> {
        self.inbox.try_iter().collect()
    }
}
