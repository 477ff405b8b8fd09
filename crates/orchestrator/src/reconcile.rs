//! The status reconciler: single writer of job state.
//!
//! Every observation, whatever its channel, goes through
//! [`Reconciler::reconcile`]. Mutations of one job are serialized by a
//! per-job async mutex, so concurrent poll/callback arrivals never
//! interleave destructively. The merge is commutative and idempotent:
//! when two observations race for the same forward transition, whichever
//! lands first wins and the second degrades to a no-op merge.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serenade_core::{Artifacts, Failure, JobState, ObservationSource};
use serenade_events::StatusFanout;
use serenade_store::{JobStore, StoreError};
use tokio::sync::Mutex;

/// Result of applying one observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// The job's state after the call.
    pub state: JobState,
    /// Whether the call actually changed the job (state advance or
    /// artifact merge). Dropped and duplicate updates report `false`.
    pub changed: bool,
}

/// Errors from the reconciler.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    /// The observation references a job that does not exist.
    #[error("Unknown job: {0}")]
    UnknownJob(String),

    /// Reading or writing the job store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Applies observations to job records and publishes accepted changes.
pub struct Reconciler {
    store: Arc<dyn JobStore>,
    fanout: Arc<StatusFanout>,
    /// Per-job critical sections. An entry is dropped once its job
    /// reaches a terminal state.
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl Reconciler {
    pub fn new(store: Arc<dyn JobStore>, fanout: Arc<StatusFanout>) -> Self {
        Self {
            store,
            fanout,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Merge an observed state and artifact delta into the job.
    ///
    /// Post-terminal and out-of-order observations are silently dropped
    /// (`changed = false`); identical re-deliveries merge to nothing and
    /// are likewise reported unchanged, keeping the operation idempotent.
    pub async fn reconcile(
        &self,
        job_id: &str,
        observed: JobState,
        delta: &Artifacts,
        source: ObservationSource,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        self.apply(job_id, Some(observed), delta, source, None).await
    }

    /// Drive the job to the terminal failure state reachable from its
    /// current state, recording why.
    ///
    /// `Failed` from `Pending`/`TextReady`, `AudioFailed` from
    /// `DraftReady`. A no-op if the job is already terminal.
    pub async fn fail(
        &self,
        job_id: &str,
        failure: Failure,
        source: ObservationSource,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        self.apply(job_id, None, &Artifacts::default(), source, Some(failure))
            .await
    }

    async fn apply(
        &self,
        job_id: &str,
        observed: Option<JobState>,
        delta: &Artifacts,
        source: ObservationSource,
        failure: Option<Failure>,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let lock = self.lock_for(job_id).await;
        let _guard = lock.lock().await;

        let mut job = self
            .store
            .load(job_id)
            .await?
            .ok_or_else(|| ReconcileError::UnknownJob(job_id.to_string()))?;

        if job.state.is_terminal() {
            tracing::debug!(
                job_id,
                state = %job.state,
                "Dropping update for terminal job",
            );
            return Ok(ReconcileOutcome {
                state: job.state,
                changed: false,
            });
        }

        let observed = observed.unwrap_or_else(|| job.state.failure_state());

        if !job.state.can_transition_to(observed) {
            tracing::debug!(
                job_id,
                current = %job.state,
                observed = %observed,
                source = source.as_str(),
                "Dropping out-of-order observation",
            );
            return Ok(ReconcileOutcome {
                state: job.state,
                changed: false,
            });
        }

        let merged = job.artifacts.merge(delta);
        let advanced = observed != job.state;
        if !merged && !advanced {
            return Ok(ReconcileOutcome {
                state: job.state,
                changed: false,
            });
        }

        let previous = job.state;
        job.state = observed;
        if let Some(failure) = failure {
            job.failure = Some(failure);
        }
        job.updated_at = Utc::now();
        job.last_observed_source = Some(source);

        self.store.save(&job).await?;

        if observed.is_terminal() {
            self.locks.lock().await.remove(job_id);
        }

        tracing::info!(
            job_id,
            from = %previous,
            to = %observed,
            source = source.as_str(),
            "Applied job transition",
        );
        self.fanout.publish(job.snapshot()).await;

        Ok(ReconcileOutcome {
            state: observed,
            changed: true,
        })
    }

    async fn lock_for(&self, job_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .lock()
            .await
            .entry(job_id.to_string())
            .or_default()
            .clone()
    }
}
