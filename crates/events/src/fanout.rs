//! Per-job broadcast channels with replay-first subscription.
//!
//! Each job with at least one subscriber owns a
//! `tokio::sync::broadcast` channel. Publishing a terminal snapshot
//! closes the channel for everyone; later subscribers still get the
//! terminal snapshot as their replay element, followed by end-of-stream.

use std::collections::HashMap;
use std::sync::Arc;

use serenade_core::JobSnapshot;
use serenade_store::{JobStore, StoreError};
use tokio::sync::{broadcast, RwLock};

/// Buffer capacity per job channel. A job makes a handful of
/// transitions over its lifetime; lagging is effectively impossible.
const CHANNEL_CAPACITY: usize = 64;

/// Errors from the fan-out layer.
#[derive(Debug, thiserror::Error)]
pub enum FanoutError {
    /// No job exists for the given ID.
    #[error("Job not found: {0}")]
    NotFound(String),

    /// Reading the replay snapshot from the store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Fan-out hub shared between the reconciler (publisher) and the
/// web-facing layer (subscribers).
pub struct StatusFanout {
    store: Arc<dyn JobStore>,
    channels: RwLock<HashMap<String, broadcast::Sender<JobSnapshot>>>,
}

impl StatusFanout {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self {
            store,
            channels: RwLock::new(HashMap::new()),
        }
    }

    /// Open a live stream of snapshots for `job_id`.
    ///
    /// The current snapshot is always the first element, even if no
    /// transition happens afterwards. For a job already in a terminal
    /// state the stream consists of exactly that snapshot.
    pub async fn subscribe(&self, job_id: &str) -> Result<JobSubscription, FanoutError> {
        let job = self
            .store
            .load(job_id)
            .await?
            .ok_or_else(|| FanoutError::NotFound(job_id.to_string()))?;

        if job.state.is_terminal() {
            return Ok(JobSubscription::closed_with(job.snapshot()));
        }

        // Attach before re-reading the snapshot: a transition landing in
        // between is then present on the receiver, and the staleness
        // filter in `next` drops whichever copy arrives second.
        let rx = {
            let mut channels = self.channels.write().await;
            channels
                .entry(job_id.to_string())
                .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
                .subscribe()
        };

        let snapshot = match self.store.load(job_id).await? {
            Some(job) => job.snapshot(),
            None => job.snapshot(),
        };

        // The job may have gone terminal between the existence check and
        // the attach; its channel was already torn down, so drop the one
        // we just re-created.
        if snapshot.state.is_terminal() {
            self.channels.write().await.remove(job_id);
            return Ok(JobSubscription::closed_with(snapshot));
        }

        Ok(JobSubscription::live(snapshot, rx))
    }

    /// Publish an accepted transition's snapshot to current subscribers.
    ///
    /// Called by the reconciler only when a reconcile actually changed
    /// the job. A terminal snapshot tears the channel down; jobs with no
    /// subscribers skip the send entirely (future subscribers replay
    /// from the store).
    pub async fn publish(&self, snapshot: JobSnapshot) {
        let terminal = snapshot.state.is_terminal();
        let mut channels = self.channels.write().await;
        if let Some(sender) = channels.get(&snapshot.id) {
            // SendError only means there are zero live receivers.
            let _ = sender.send(snapshot.clone());
            if terminal {
                channels.remove(&snapshot.id);
            }
        }
    }

    /// Number of jobs with at least one attached subscriber channel.
    pub async fn channel_count(&self) -> usize {
        self.channels.read().await.len()
    }
}

// ---------------------------------------------------------------------------
// JobSubscription
// ---------------------------------------------------------------------------

/// One subscriber's view of a job's status stream.
///
/// Yields the replay snapshot first, then genuine changes, and ends
/// after a terminal snapshot. Dropping the subscription (or calling
/// [`cancel`](JobSubscription::cancel)) releases its resources without
/// affecting other subscribers or the polling loop.
#[derive(Debug)]
pub struct JobSubscription {
    pending: Option<JobSnapshot>,
    rx: Option<broadcast::Receiver<JobSnapshot>>,
    last: Option<JobSnapshot>,
    done: bool,
}

impl JobSubscription {
    fn live(first: JobSnapshot, rx: broadcast::Receiver<JobSnapshot>) -> Self {
        Self {
            pending: Some(first),
            rx: Some(rx),
            last: None,
            done: false,
        }
    }

    fn closed_with(first: JobSnapshot) -> Self {
        Self {
            pending: Some(first),
            rx: None,
            last: None,
            done: false,
        }
    }

    /// Receive the next snapshot, or `None` once the stream is over.
    pub async fn next(&mut self) -> Option<JobSnapshot> {
        if self.done {
            return None;
        }

        if let Some(snapshot) = self.pending.take() {
            return self.deliver(snapshot);
        }

        loop {
            let rx = match self.rx.as_mut() {
                Some(rx) => rx,
                None => {
                    self.done = true;
                    return None;
                }
            };

            match rx.recv().await {
                Ok(snapshot) => {
                    if self.is_stale(&snapshot) {
                        continue;
                    }
                    return self.deliver(snapshot);
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Status subscriber lagged, skipping to latest");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => {
                    self.done = true;
                    return None;
                }
            }
        }
    }

    /// Stop delivery and release resources. Idempotent; safe after the
    /// stream has already completed.
    pub fn cancel(&mut self) {
        self.done = true;
        self.pending = None;
        self.rx = None;
    }

    /// Whether the stream has ended (terminal delivered or cancelled).
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Drop anything at or before the last yielded snapshot, so the
    /// replay element and a racing publish never both surface.
    fn is_stale(&self, snapshot: &JobSnapshot) -> bool {
        match &self.last {
            Some(last) => snapshot.updated_at < last.updated_at || snapshot == last,
            None => false,
        }
    }

    fn deliver(&mut self, snapshot: JobSnapshot) -> Option<JobSnapshot> {
        if snapshot.state.is_terminal() {
            self.done = true;
            self.rx = None;
        }
        self.last = Some(snapshot.clone());
        Some(snapshot)
    }
}
