use super::messenger::{CacheMessage, Messenger};
use super::policy::CachePolicy;
use super::record::split_key;
use super::store::{CacheRegistry, RestoreOutcome};
use crate::core::error::{CoreException, CoreResult, ErrorKind};
use crossbeam_channel::{Receiver, Sender, select, tick, unbounded};
use parking_lot::RwLock;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, trace};

/// Counters of one synchronization round.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncStats {
    pub published: usize,
    pub requested: usize,
    pub merged: usize,
    pub stale: usize,
    pub answered: usize,
}

#[derive(Debug, Clone)]
struct FetchChannel {
    requests: Sender<String>,
    wait: Duration,
}

/// Connection between cache handles and the running sync worker, if any.
///
/// Handles use it to ask peers for a missing key and to learn how long they may wait
/// for the answer.
#[derive(Debug, Default)]
pub struct SyncLink {
    channel: RwLock<Option<FetchChannel>>,
}

impl SyncLink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.channel.read().is_some()
    }

    /// Queues a remote fetch of `composed_key` and returns how long the caller may wait.
    /// `None` when distribution is off.
    pub(crate) fn request(&self, composed_key: &str) -> Option<Duration> {
        let guard = self.channel.read();
        let channel = guard.as_ref()?;
        channel.requests.send(composed_key.to_string()).ok()?;
        Some(channel.wait)
    }

    fn attach(&self, requests: Sender<String>, wait: Duration) {
        *self.channel.write() = Some(FetchChannel { requests, wait });
    }

    fn detach(&self) {
        *self.channel.write() = None;
    }
}

/// Runs one synchronization round against the peers reachable through `messenger`.
///
/// Publishes entries newly set with [`CachePolicy::DISTRIBUTE_GLOBAL`], forwards fetch
/// requests, merges inbound entries whose option hash matches the local key and
/// answers peers asking for entries this rank holds.
pub fn sync_round(
    registry: &CacheRegistry,
    messenger: &dyn Messenger,
    requests: &[String],
) -> SyncStats {
    let rank = messenger.rank();
    let mut stats = SyncStats::default();

    for cache in registry.all() {
        for record in cache.take_outbox() {
            messenger.publish(CacheMessage::Publish { from: rank, record });
            stats.published += 1;
        }
    }
    for key in requests {
        messenger.publish(CacheMessage::Request {
            from: rank,
            composed_key: key.clone(),
        });
        stats.requested += 1;
    }

    for message in messenger.poll() {
        match message {
            CacheMessage::Publish { from, record } => {
                trace!(from, key = %record.composed_key, "Inbound cache entry.");
                match registry.restore(record) {
                    RestoreOutcome::Restored => stats.merged += 1,
                    RestoreOutcome::Stale => stats.stale += 1,
                }
            }
            CacheMessage::Request { from, composed_key } => {
                let Some((module_key, _)) = split_key(&composed_key) else {
                    continue;
                };
                let record = registry
                    .get(module_key)
                    .and_then(|cache| cache.record(&composed_key))
                    .filter(|r| {
                        r.policy()
                            .is_some_and(|p| p.contains(CachePolicy::DISTRIBUTE_GLOBAL))
                    });
                if let Some(record) = record {
                    debug!(to = from, key = %composed_key, "Answering cache fetch request.");
                    messenger.publish(CacheMessage::Publish { from: rank, record });
                    stats.answered += 1;
                }
            }
        }
    }
    stats
}

/// The background cache distribution worker.
///
/// Dropping the handle stops the worker and joins its thread.
#[derive(Debug)]
pub struct CacheSync {
    stop: Sender<()>,
    handle: Option<JoinHandle<()>>,
    link: Arc<SyncLink>,
    interval: Duration,
}

impl CacheSync {
    pub fn start(
        registry: Arc<CacheRegistry>,
        messenger: Arc<dyn Messenger>,
        link: Arc<SyncLink>,
        interval: Duration,
    ) -> CoreResult<Self> {
        let (stop_tx, stop_rx) = unbounded::<()>();
        let (req_tx, req_rx) = unbounded::<String>();
        let handle = thread::Builder::new()
            .name("pulsar-cache-sync".to_string())
            .spawn(move || worker_loop(&registry, messenger.as_ref(), &stop_rx, &req_rx, interval))
            .map_err(|e| {
                CoreException::new(ErrorKind::Internal, "Failed to start the cache sync worker")
                    .with("cause", e)
            })?;
        link.attach(req_tx, interval);
        info!(interval_ms = interval.as_millis() as u64, "Cache sync worker started.");
        Ok(Self {
            stop: stop_tx,
            handle: Some(handle),
            link,
            interval,
        })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.link.detach();
        if let Some(handle) = self.handle.take() {
            let _ = self.stop.send(());
            if handle.join().is_err() {
                tracing::error!("Cache sync worker panicked.");
            }
            info!("Cache sync worker stopped.");
        }
    }
}

impl Drop for CacheSync {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(
    registry: &CacheRegistry,
    messenger: &dyn Messenger,
    stop: &Receiver<()>,
    requests: &Receiver<String>,
    interval: Duration,
) {
    let ticker = tick(interval);
    loop {
        select! {
            recv(stop) -> _ => break,
            recv(ticker) -> _ => {
                let pending: Vec<String> = requests.try_iter().collect();
                let stats = sync_round(registry, messenger, &pending);
                trace!(?stats, "Cache sync round complete.");
            }
        }
    }
    // Flush what was set since the last tick.
    sync_round(registry, messenger, &[]);
}
