//! The job orchestrator: entry point for creation, querying,
//! subscription, and callback ingestion.
//!
//! For every non-terminal job the orchestrator keeps a polling-fallback
//! task alive until the job reaches a terminal state or its wall-clock
//! budget runs out. Callbacks and polls are symmetric inputs to the same
//! reconciler, so whichever channel reports first wins and the other
//! degrades to a no-op.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serenade_core::{Failure, Job, JobSnapshot, ObservationSource, SongRequest};
use serenade_events::{FanoutError, JobSubscription, StatusFanout};
use serenade_provider::{GenerationProvider, ProviderError};
use serenade_store::{JobStore, StoreError};
use tokio::sync::{Mutex, Semaphore};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::poll::{next_poll_interval, PollConfig};
use crate::reconcile::{ReconcileError, ReconcileOutcome, Reconciler};

/// Errors surfaced by orchestrator operations.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    /// No job exists for the given ID.
    #[error("Job not found: {0}")]
    NotFound(String),

    /// The provider adapter failed.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// Submission failed at creation time. The job still exists, in a
    /// terminal `Failed` state, so observers see a clean failure rather
    /// than a missing record.
    #[error("Provider submission failed for job {job_id}: {error}")]
    SubmitFailed {
        job_id: String,
        #[source]
        error: ProviderError,
    },

    /// The job store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The reconciler failed.
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
}

/// What happened to an ingested callback payload.
///
/// Only store/reconciler failures are errors; unusable payloads are
/// logged and dropped so provider retransmissions stay idempotent.
#[derive(Debug)]
pub enum CallbackOutcome {
    /// The payload was correlated and fed through the reconciler.
    Applied {
        job_id: String,
        outcome: ReconcileOutcome,
    },
    /// A correlation ID was found but no job matches it.
    UnknownJob { provider_job_id: String },
    /// No correlation ID or no usable status; dropped. The polling
    /// fallback remains the safety net.
    Dropped,
}

/// Handle to one job's polling-fallback task.
struct PollLoopHandle {
    task: tokio::task::JoinHandle<()>,
    cancel: CancellationToken,
}

/// Coordinates job lifecycle across store, provider, reconciler, and
/// fan-out. Created once at startup; clone the `Arc` into handlers.
pub struct Orchestrator {
    store: Arc<dyn JobStore>,
    provider: Arc<dyn GenerationProvider>,
    reconciler: Reconciler,
    fanout: Arc<StatusFanout>,
    config: PollConfig,
    /// Bounds concurrent outstanding provider polls across all jobs.
    poll_permits: Semaphore,
    /// Master cancellation token, cancelled during shutdown.
    cancel: CancellationToken,
    /// Active polling tasks indexed by job ID.
    loops: Mutex<HashMap<String, PollLoopHandle>>,
}

impl Orchestrator {
    /// Wire up an orchestrator over the given store and provider.
    pub fn new(
        store: Arc<dyn JobStore>,
        provider: Arc<dyn GenerationProvider>,
        config: PollConfig,
    ) -> Arc<Self> {
        let fanout = Arc::new(StatusFanout::new(Arc::clone(&store)));
        let reconciler = Reconciler::new(Arc::clone(&store), Arc::clone(&fanout));
        Arc::new(Self {
            store,
            provider,
            reconciler,
            fanout,
            poll_permits: Semaphore::new(config.max_concurrent_polls),
            config,
            cancel: CancellationToken::new(),
            loops: Mutex::new(HashMap::new()),
        })
    }

    /// Create a job and submit it to the provider.
    ///
    /// The job is persisted in `Pending` before submission, so a submit
    /// failure leaves a clean terminal `Failed` record behind for
    /// pollers and subscribers -- and the error is still surfaced to the
    /// caller.
    pub async fn create_job(
        self: &Arc<Self>,
        request: SongRequest,
    ) -> Result<JobSnapshot, OrchestratorError> {
        let mut job = Job::new(request);
        self.store.insert(&job).await?;
        tracing::info!(job_id = %job.id, "Job created");

        match self.provider.submit(&job.request).await {
            Ok(provider_job_id) => {
                job.provider_job_id = Some(provider_job_id.clone());
                self.store.save(&job).await?;
                self.spawn_poll_loop(job.id.clone(), provider_job_id).await;
                Ok(job.snapshot())
            }
            Err(e) => {
                tracing::warn!(job_id = %job.id, error = %e, "Provider submission failed");
                self.reconciler
                    .fail(&job.id, Failure::provider(e.to_string()), ObservationSource::Poll)
                    .await?;
                Err(OrchestratorError::SubmitFailed {
                    job_id: job.id,
                    error: e,
                })
            }
        }
    }

    /// Current snapshot of a job.
    pub async fn get_status(&self, job_id: &str) -> Result<JobSnapshot, OrchestratorError> {
        self.store
            .load(job_id)
            .await?
            .map(|job| job.snapshot())
            .ok_or_else(|| OrchestratorError::NotFound(job_id.to_string()))
    }

    /// Live stream of snapshots for a job, replaying the current state
    /// as the first element.
    pub async fn subscribe(&self, job_id: &str) -> Result<JobSubscription, OrchestratorError> {
        self.fanout.subscribe(job_id).await.map_err(|e| match e {
            FanoutError::NotFound(id) => OrchestratorError::NotFound(id),
            FanoutError::Store(e) => OrchestratorError::Store(e),
        })
    }

    /// Ingest a raw provider callback payload.
    ///
    /// Symmetric with poll results: the parsed observation goes through
    /// the same reconciler, which is what makes duplicate and
    /// out-of-order delivery safe.
    pub async fn ingest_callback(
        &self,
        raw: &serde_json::Value,
    ) -> Result<CallbackOutcome, OrchestratorError> {
        let observation = match self.provider.parse_callback(raw) {
            Ok(observation) => observation,
            Err(e) => {
                tracing::warn!(error = %e, "Dropping unusable callback payload");
                return Ok(CallbackOutcome::Dropped);
            }
        };

        let Some(job) = self
            .store
            .find_by_provider_ref(&observation.provider_job_id)
            .await?
        else {
            tracing::warn!(
                provider_job_id = %observation.provider_job_id,
                "Callback does not correlate to any job",
            );
            return Ok(CallbackOutcome::UnknownJob {
                provider_job_id: observation.provider_job_id,
            });
        };

        let outcome = self
            .reconciler
            .reconcile(
                &job.id,
                observation.state,
                &observation.artifacts,
                ObservationSource::Callback,
            )
            .await?;

        if outcome.state.is_terminal() {
            self.stop_poll_loop(&job.id).await;
        }

        Ok(CallbackOutcome::Applied {
            job_id: job.id,
            outcome,
        })
    }

    /// Restart polling for every non-terminal job in the store.
    ///
    /// Called once at startup. Jobs whose budget expired while the
    /// process was down are force-failed by the budget check on their
    /// first resumed tick. Returns the number of loops spawned.
    pub async fn resume_active(self: &Arc<Self>) -> Result<usize, OrchestratorError> {
        let jobs = self.store.list_active().await?;
        let mut resumed = 0;

        for job in jobs {
            match job.provider_job_id.clone() {
                Some(provider_job_id) => {
                    self.spawn_poll_loop(job.id.clone(), provider_job_id).await;
                    resumed += 1;
                }
                None => {
                    // Interrupted between insert and submit; there is no
                    // provider job to poll for.
                    tracing::warn!(job_id = %job.id, "Resumed job was never submitted, failing");
                    self.reconciler
                        .fail(
                            &job.id,
                            Failure::timeout("submission interrupted by restart"),
                            ObservationSource::Timeout,
                        )
                        .await?;
                }
            }
        }

        tracing::info!(resumed, "Resumed active jobs");
        Ok(resumed)
    }

    /// Gracefully stop all polling tasks.
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down orchestrator");
        self.cancel.cancel();

        let handles: Vec<(String, PollLoopHandle)> = {
            let mut loops = self.loops.lock().await;
            loops.drain().collect()
        };
        for (job_id, handle) in handles {
            handle.cancel.cancel();
            if tokio::time::timeout(Duration::from_secs(5), handle.task)
                .await
                .is_err()
            {
                tracing::warn!(job_id = %job_id, "Poll loop did not stop in time");
            }
        }

        tracing::info!("Orchestrator shut down complete");
    }

    /// Number of live polling tasks.
    pub async fn active_poll_loops(&self) -> usize {
        self.loops.lock().await.len()
    }

    // ---- private helpers ----

    async fn spawn_poll_loop(self: &Arc<Self>, job_id: String, provider_job_id: String) {
        let cancel = self.cancel.child_token();
        let orchestrator = Arc::clone(self);
        let loop_cancel = cancel.clone();
        let loop_job_id = job_id.clone();

        let task = tokio::spawn(async move {
            run_poll_loop(orchestrator, loop_job_id, provider_job_id, loop_cancel).await;
        });

        self.loops
            .lock()
            .await
            .insert(job_id, PollLoopHandle { task, cancel });
    }

    async fn stop_poll_loop(&self, job_id: &str) {
        if let Some(handle) = self.loops.lock().await.remove(job_id) {
            handle.cancel.cancel();
        }
    }
}

/// Poll the provider for one job until it reaches a terminal state, the
/// budget runs out, or the loop is cancelled.
async fn run_poll_loop(
    orchestrator: Arc<Orchestrator>,
    job_id: String,
    provider_job_id: String,
    cancel: CancellationToken,
) {
    let config = orchestrator.config.clone();

    // Anchor the budget to the job's creation time so a restart does not
    // extend it.
    let elapsed = match orchestrator.store.load(&job_id).await {
        Ok(Some(job)) => (Utc::now() - job.created_at).to_std().unwrap_or_default(),
        _ => Duration::ZERO,
    };
    let deadline = Instant::now() + config.budget.saturating_sub(elapsed);
    let mut interval = config.initial_interval;

    loop {
        let wake = (Instant::now() + interval).min(deadline);
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!(job_id = %job_id, "Poll loop cancelled");
                break;
            }
            _ = tokio::time::sleep_until(wake) => {}
        }

        if Instant::now() >= deadline {
            tracing::warn!(job_id = %job_id, "Generation budget exhausted, failing job");
            if let Err(e) = orchestrator
                .reconciler
                .fail(
                    &job_id,
                    Failure::timeout("generation timed out before completion"),
                    ObservationSource::Timeout,
                )
                .await
            {
                tracing::error!(job_id = %job_id, error = %e, "Failed to record timeout");
            }
            break;
        }

        // A callback may have finished the job while we slept; skip the
        // provider round-trip in that case.
        match orchestrator.store.load(&job_id).await {
            Ok(Some(job)) if job.state.is_terminal() => break,
            Ok(Some(_)) => {}
            Ok(None) => {
                tracing::warn!(job_id = %job_id, "Job disappeared, stopping poll loop");
                break;
            }
            Err(e) => {
                tracing::warn!(job_id = %job_id, error = %e, "Store read failed, will retry");
                interval = next_poll_interval(interval, &config);
                continue;
            }
        }

        let poll_result = {
            let _permit = match orchestrator.poll_permits.acquire().await {
                Ok(permit) => permit,
                Err(_) => break, // semaphore closed during shutdown
            };
            orchestrator.provider.poll_once(&provider_job_id).await
        };

        match poll_result {
            Ok(observation) => {
                let applied = orchestrator
                    .reconciler
                    .reconcile(
                        &job_id,
                        observation.state,
                        &observation.artifacts,
                        ObservationSource::Poll,
                    )
                    .await;
                match applied {
                    Ok(outcome) if outcome.state.is_terminal() => break,
                    Ok(_) => {}
                    Err(ReconcileError::UnknownJob(_)) => {
                        tracing::warn!(job_id = %job_id, "Job vanished mid-reconcile, stopping");
                        break;
                    }
                    Err(e) => {
                        tracing::warn!(job_id = %job_id, error = %e, "Reconcile failed, will retry");
                    }
                }
            }
            Err(ProviderError::Rejected(message)) => {
                // Permanent: drive the job to its reachable failure state.
                if let Err(e) = orchestrator
                    .reconciler
                    .fail(&job_id, Failure::provider(message), ObservationSource::Poll)
                    .await
                {
                    tracing::error!(job_id = %job_id, error = %e, "Failed to record rejection");
                }
                break;
            }
            Err(e) if e.is_transient() => {
                tracing::debug!(job_id = %job_id, error = %e, "Transient provider error, backing off");
            }
            Err(e) => {
                // UnrecognizedPayload / InvalidState: the next poll or a
                // callback will carry a usable report.
                tracing::warn!(job_id = %job_id, error = %e, "Dropping unusable poll result");
            }
        }

        interval = next_poll_interval(interval, &config);
    }

    orchestrator.loops.lock().await.remove(&job_id);
}
