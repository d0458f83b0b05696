//! Key-based work queue.
//!
//! Watch events, resync ticks and retry timers all reduce to "reconcile this
//! key". The queue coalesces duplicate requests, never hands out a key that is
//! still being processed (a request arriving mid-pass is replayed once the pass
//! finishes), and lets distinct keys run concurrently up to a fixed limit.

use cluster_client::ObjectKey;
use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{Semaphore, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[derive(Debug, Default)]
struct QueueState {
    /// Sitting in the channel, not yet picked up
    queued: HashSet<ObjectKey>,
    /// Being reconciled right now
    active: HashSet<ObjectKey>,
    /// Requested again while active
    dirty: HashSet<ObjectKey>,
    /// Every key seen and not yet torn down; replayed on resync
    known: HashSet<ObjectKey>,
}

/// Deduplicating, per-key serialized queue of reconcile requests.
#[derive(Debug)]
pub struct WorkQueue {
    tx: mpsc::UnboundedSender<ObjectKey>,
    state: Mutex<QueueState>,
}

impl WorkQueue {
    /// Creates a queue and the receiver that [`run`] drains.
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<ObjectKey>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let queue = Arc::new(Self {
            tx,
            state: Mutex::new(QueueState::default()),
        });
        (queue, rx)
    }

    fn state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Requests a reconcile of `key`.
    pub fn enqueue(&self, key: ObjectKey) {
        let mut state = self.state();
        if state.active.contains(&key) {
            state.dirty.insert(key);
        } else if state.queued.insert(key.clone()) && self.tx.send(key).is_err() {
            debug!("Work queue closed, dropping request");
        }
    }

    /// Requests a reconcile of `key` once `delay` has elapsed.
    pub fn enqueue_after(self: &Arc<Self>, key: ObjectKey, delay: Duration) {
        let queue = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.enqueue(key);
        });
    }

    /// Records `key` as one to revisit on every resync.
    pub fn remember(&self, key: ObjectKey) {
        self.state().known.insert(key);
    }

    /// Stops revisiting `key` on resync, unless it was requested again while
    /// its pass was running (the object may have been re-created).
    pub fn forget(&self, key: &ObjectKey) {
        let mut state = self.state();
        if !state.dirty.contains(key) {
            state.known.remove(key);
        }
    }

    /// Enqueues every remembered key.
    pub fn resync(&self) {
        let keys: Vec<ObjectKey> = self.state().known.iter().cloned().collect();
        debug!("Resyncing {} key(s)", keys.len());
        for key in keys {
            self.enqueue(key);
        }
    }

    pub(crate) fn start(&self, key: &ObjectKey) {
        let mut state = self.state();
        state.queued.remove(key);
        state.active.insert(key.clone());
    }

    pub(crate) fn finish(&self, key: &ObjectKey) {
        let replay = {
            let mut state = self.state();
            state.active.remove(key);
            state.dirty.remove(key)
        };
        if replay {
            self.enqueue(key.clone());
        }
    }
}

/// Releases a key when its pass ends, including by panic.
struct ActiveKey {
    queue: Arc<WorkQueue>,
    key: ObjectKey,
}

impl Drop for ActiveKey {
    fn drop(&mut self) {
        self.queue.finish(&self.key);
    }
}

/// Drains the queue, running `handler` for each key with at most `concurrency`
/// handlers in flight. Returns when `cancel` fires or the queue closes.
pub async fn run<F, Fut>(
    queue: Arc<WorkQueue>,
    mut rx: mpsc::UnboundedReceiver<ObjectKey>,
    concurrency: usize,
    cancel: CancellationToken,
    handler: F,
) where
    F: Fn(ObjectKey) -> Fut + Clone + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(concurrency));

    loop {
        let key = tokio::select! {
            () = cancel.cancelled() => break,
            key = rx.recv() => match key {
                Some(key) => key,
                None => break,
            },
        };

        let permit = tokio::select! {
            () = cancel.cancelled() => break,
            permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_closed) => break,
            },
        };

        queue.start(&key);
        let guard = ActiveKey {
            queue: Arc::clone(&queue),
            key,
        };
        let handler = handler.clone();
        tokio::spawn(async move {
            handler(guard.key.clone()).await;
            drop(guard);
            drop(permit);
        });
    }

    info!("Work queue stopped");
}

/// Calls [`WorkQueue::resync`] every `interval` until `cancel` fires.
pub async fn resync_every(queue: Arc<WorkQueue>, interval: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    // The first tick completes immediately; watchers already cover startup.
    ticker.tick().await;
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = ticker.tick() => queue.resync(),
        }
    }
}
