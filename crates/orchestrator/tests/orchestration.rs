//! End-to-end orchestration tests over an in-memory store and a
//! scripted provider. Time-dependent cases run on a paused tokio clock.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use assert_matches::assert_matches;
use async_trait::async_trait;
use serde_json::json;
use serenade_core::{
    Artifacts, FailureKind, JobState, Observation, ObservationSource, SongRequest,
};
use serenade_orchestrator::{CallbackOutcome, Orchestrator, OrchestratorError, PollConfig};
use serenade_provider::{GenerationProvider, ProviderError};
use serenade_store::{JobStore, MemoryJobStore};

const PROVIDER_JOB_ID: &str = "prov-1";

/// Provider double: pops scripted poll results in order, then repeats a
/// fallback observation forever.
struct ScriptedProvider {
    submit_error: Mutex<Option<ProviderError>>,
    script: Mutex<VecDeque<Result<Observation, ProviderError>>>,
    fallback: Observation,
    polls: AtomicUsize,
}

impl ScriptedProvider {
    fn new(script: Vec<Result<Observation, ProviderError>>) -> Arc<Self> {
        Arc::new(Self {
            submit_error: Mutex::new(None),
            script: Mutex::new(script.into()),
            fallback: observation(JobState::Pending, Artifacts::default()),
            polls: AtomicUsize::new(0),
        })
    }

    fn failing_submit(error: ProviderError) -> Arc<Self> {
        let provider = Self::new(Vec::new());
        *provider.submit_error.lock().unwrap() = Some(error);
        provider
    }

    fn poll_count(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerationProvider for ScriptedProvider {
    async fn submit(&self, _request: &SongRequest) -> Result<String, ProviderError> {
        match self.submit_error.lock().unwrap().take() {
            Some(error) => Err(error),
            None => Ok(PROVIDER_JOB_ID.to_string()),
        }
    }

    async fn poll_once(&self, _provider_job_id: &str) -> Result<Observation, ProviderError> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(self.fallback.clone()))
    }
}

fn observation(state: JobState, artifacts: Artifacts) -> Observation {
    Observation {
        provider_job_id: PROVIDER_JOB_ID.to_string(),
        state,
        artifacts,
    }
}

fn artifacts(
    lyrics: Option<&str>,
    audio: Option<&str>,
    alt: Option<&str>,
    cover: Option<&str>,
) -> Artifacts {
    Artifacts {
        lyrics: lyrics.map(Into::into),
        audio_url: audio.map(Into::into),
        audio_url_alt: alt.map(Into::into),
        cover_url: cover.map(Into::into),
    }
}

fn request() -> SongRequest {
    SongRequest {
        recipient: "Noor".into(),
        occasion: Some("anniversary".into()),
        style: "soul".into(),
        mood: Some("tender".into()),
        details: None,
    }
}

fn fast_config() -> PollConfig {
    PollConfig {
        initial_interval: Duration::from_millis(100),
        max_interval: Duration::from_secs(2),
        multiplier: 2.0,
        budget: Duration::from_secs(60),
        max_concurrent_polls: 4,
    }
}

fn setup(
    provider: Arc<ScriptedProvider>,
    config: PollConfig,
) -> (Arc<MemoryJobStore>, Arc<Orchestrator>) {
    let store = Arc::new(MemoryJobStore::new());
    let orchestrator = Orchestrator::new(
        Arc::clone(&store) as Arc<dyn JobStore>,
        provider as Arc<dyn GenerationProvider>,
        config,
    );
    (store, orchestrator)
}

#[tokio::test(start_paused = true)]
async fn polling_drives_job_to_success() {
    let provider = ScriptedProvider::new(vec![
        Ok(observation(
            JobState::TextReady,
            artifacts(Some("verse"), None, None, None),
        )),
        Ok(observation(
            JobState::DraftReady,
            artifacts(None, Some("u1"), None, None),
        )),
        Ok(observation(
            JobState::Succeeded,
            artifacts(None, Some("u2"), Some("u1-alt"), Some("c1")),
        )),
    ]);
    let (store, orchestrator) = setup(Arc::clone(&provider), fast_config());

    let created = orchestrator.create_job(request()).await.unwrap();
    assert_eq!(created.state, JobState::Pending);

    let stored = store.load(&created.id).await.unwrap().unwrap();
    assert_eq!(stored.provider_job_id.as_deref(), Some(PROVIDER_JOB_ID));

    let mut sub = orchestrator.subscribe(&created.id).await.unwrap();
    let mut states = Vec::new();
    while let Some(snapshot) = sub.next().await {
        states.push(snapshot.state);
    }
    assert_eq!(
        states,
        vec![
            JobState::Pending,
            JobState::TextReady,
            JobState::DraftReady,
            JobState::Succeeded,
        ]
    );

    let final_job = store.load(&created.id).await.unwrap().unwrap();
    assert_eq!(final_job.artifacts.lyrics.as_deref(), Some("verse"));
    assert_eq!(final_job.artifacts.audio_url.as_deref(), Some("u2"));
    assert_eq!(final_job.artifacts.audio_url_alt.as_deref(), Some("u1-alt"));
    assert_eq!(final_job.artifacts.cover_url.as_deref(), Some("c1"));
    assert_eq!(final_job.last_observed_source, Some(ObservationSource::Poll));

    // The polling task tears itself down once the job is terminal.
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(orchestrator.active_poll_loops().await, 0);
}

#[tokio::test(start_paused = true)]
async fn submit_failure_surfaces_error_and_leaves_failed_job() {
    let provider = ScriptedProvider::failing_submit(ProviderError::Rejected("bad style".into()));
    let (store, orchestrator) = setup(provider, fast_config());

    let error = orchestrator.create_job(request()).await.unwrap_err();
    let job_id = assert_matches!(
        error,
        OrchestratorError::SubmitFailed { job_id, error: ProviderError::Rejected(_) } => job_id
    );

    let job = store.load(&job_id).await.unwrap().unwrap();
    assert_eq!(job.state, JobState::Failed);
    let failure = job.failure.unwrap();
    assert_eq!(failure.kind, FailureKind::Provider);
    assert!(failure.message.contains("bad style"));

    // A subscriber attaching afterwards sees the terminal snapshot.
    let mut sub = orchestrator.subscribe(&job_id).await.unwrap();
    assert_eq!(sub.next().await.unwrap().state, JobState::Failed);
    assert!(sub.next().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn budget_exhaustion_times_out_exactly_once() {
    let provider = ScriptedProvider::new(Vec::new()); // polls report Pending forever
    let config = PollConfig {
        initial_interval: Duration::from_millis(200),
        budget: Duration::from_secs(3),
        ..fast_config()
    };
    let (store, orchestrator) = setup(Arc::clone(&provider), config);

    let created = orchestrator.create_job(request()).await.unwrap();
    let mut sub = orchestrator.subscribe(&created.id).await.unwrap();

    let mut snapshots = Vec::new();
    while let Some(snapshot) = sub.next().await {
        snapshots.push(snapshot);
    }

    // One replay element, one terminal timeout event, nothing else: the
    // pending polls never surface as stream elements.
    assert_eq!(snapshots.len(), 2);
    assert_eq!(snapshots[0].state, JobState::Pending);
    assert_eq!(snapshots[1].state, JobState::Failed);
    assert_eq!(snapshots[1].failure.as_ref().unwrap().kind, FailureKind::Timeout);

    let job = store.load(&created.id).await.unwrap().unwrap();
    assert_eq!(job.state, JobState::Failed);
    assert_eq!(job.last_observed_source, Some(ObservationSource::Timeout));
    let failed_at = job.updated_at;

    // Nothing fires a second time after the terminal transition.
    tokio::time::sleep(Duration::from_secs(10)).await;
    let job = store.load(&created.id).await.unwrap().unwrap();
    assert_eq!(job.updated_at, failed_at);
    assert_eq!(orchestrator.active_poll_loops().await, 0);
}

#[tokio::test(start_paused = true)]
async fn timeout_from_draft_ready_is_audio_failed() {
    let provider = ScriptedProvider::new(vec![
        Ok(observation(
            JobState::TextReady,
            artifacts(Some("verse"), None, None, None),
        )),
        Ok(observation(
            JobState::DraftReady,
            artifacts(None, Some("u1"), None, None),
        )),
    ]);
    let config = PollConfig {
        initial_interval: Duration::from_millis(200),
        budget: Duration::from_secs(5),
        ..fast_config()
    };
    let (store, orchestrator) = setup(provider, config);

    let created = orchestrator.create_job(request()).await.unwrap();
    let mut sub = orchestrator.subscribe(&created.id).await.unwrap();
    let mut last = None;
    while let Some(snapshot) = sub.next().await {
        last = Some(snapshot);
    }

    let last = last.unwrap();
    assert_eq!(last.state, JobState::AudioFailed);
    assert_eq!(last.failure.as_ref().unwrap().kind, FailureKind::Timeout);
    // The draft audio produced before the timeout is preserved.
    let job = store.load(&created.id).await.unwrap().unwrap();
    assert_eq!(job.artifacts.audio_url.as_deref(), Some("u1"));
}

#[tokio::test(start_paused = true)]
async fn provider_rejection_mid_poll_fails_the_job() {
    let provider = ScriptedProvider::new(vec![
        Ok(observation(
            JobState::TextReady,
            artifacts(Some("verse"), None, None, None),
        )),
        Err(ProviderError::Rejected("content policy".into())),
    ]);
    let (store, orchestrator) = setup(provider, fast_config());

    let created = orchestrator.create_job(request()).await.unwrap();
    let mut sub = orchestrator.subscribe(&created.id).await.unwrap();
    let mut states = Vec::new();
    while let Some(snapshot) = sub.next().await {
        states.push(snapshot.state);
    }
    assert_eq!(
        states,
        vec![JobState::Pending, JobState::TextReady, JobState::Failed]
    );

    let job = store.load(&created.id).await.unwrap().unwrap();
    let failure = job.failure.unwrap();
    assert_eq!(failure.kind, FailureKind::Provider);
    assert!(failure.message.contains("content policy"));
}

#[tokio::test(start_paused = true)]
async fn transient_errors_are_invisible_to_subscribers() {
    let provider = ScriptedProvider::new(vec![
        Err(ProviderError::Unavailable("connection reset".into())),
        Err(ProviderError::RateLimited(PROVIDER_JOB_ID.into())),
        Ok(observation(
            JobState::TextReady,
            artifacts(Some("verse"), None, None, None),
        )),
        Ok(observation(
            JobState::DraftReady,
            artifacts(None, Some("u1"), None, None),
        )),
        Ok(observation(
            JobState::Succeeded,
            artifacts(None, Some("u2"), None, Some("c1")),
        )),
    ]);
    let (_, orchestrator) = setup(Arc::clone(&provider), fast_config());

    let created = orchestrator.create_job(request()).await.unwrap();
    let mut sub = orchestrator.subscribe(&created.id).await.unwrap();
    let mut states = Vec::new();
    while let Some(snapshot) = sub.next().await {
        states.push(snapshot.state);
    }

    // Retries happened, but the stream shows only forward progress.
    assert!(provider.poll_count() >= 5);
    assert_eq!(
        states,
        vec![
            JobState::Pending,
            JobState::TextReady,
            JobState::DraftReady,
            JobState::Succeeded,
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn callbacks_and_polls_feed_the_same_state_machine() {
    let provider = ScriptedProvider::new(Vec::new());
    let (_, orchestrator) = setup(provider, fast_config());

    let created = orchestrator.create_job(request()).await.unwrap();

    let raw = json!({
        "task_id": PROVIDER_JOB_ID,
        "status": "text_success",
        "lyric": "callback verse",
    });
    let outcome = orchestrator.ingest_callback(&raw).await.unwrap();
    let applied = assert_matches!(
        outcome,
        CallbackOutcome::Applied { outcome, .. } => outcome
    );
    assert_eq!(applied.state, JobState::TextReady);
    assert!(applied.changed);

    // Retransmission of the same payload is a no-op.
    let outcome = orchestrator.ingest_callback(&raw).await.unwrap();
    let applied = assert_matches!(
        outcome,
        CallbackOutcome::Applied { outcome, .. } => outcome
    );
    assert!(!applied.changed);

    let snapshot = orchestrator.get_status(&created.id).await.unwrap();
    assert_eq!(snapshot.state, JobState::TextReady);
    assert_eq!(snapshot.artifacts.lyrics.as_deref(), Some("callback verse"));
    assert_eq!(
        snapshot.updated_at,
        orchestrator.get_status(&created.id).await.unwrap().updated_at
    );
}

#[tokio::test(start_paused = true)]
async fn terminal_callback_cancels_the_poll_loop() {
    let provider = ScriptedProvider::new(vec![
        Ok(observation(
            JobState::TextReady,
            artifacts(Some("verse"), None, None, None),
        )),
        Ok(observation(
            JobState::DraftReady,
            artifacts(None, Some("u1"), None, None),
        )),
    ]);
    let (store, orchestrator) = setup(Arc::clone(&provider), fast_config());

    let created = orchestrator.create_job(request()).await.unwrap();
    let mut sub = orchestrator.subscribe(&created.id).await.unwrap();

    // Wait for the polls to reach DraftReady.
    loop {
        let snapshot = sub.next().await.unwrap();
        if snapshot.state == JobState::DraftReady {
            break;
        }
    }

    let raw = json!({
        "id": PROVIDER_JOB_ID,
        "status": "complete",
        "audio_url": "u2",
        "image_url": "c1",
    });
    let outcome = orchestrator.ingest_callback(&raw).await.unwrap();
    assert_matches!(outcome, CallbackOutcome::Applied { .. });

    assert_eq!(sub.next().await.unwrap().state, JobState::Succeeded);
    assert!(sub.next().await.is_none());

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(orchestrator.active_poll_loops().await, 0);
    assert_eq!(
        store.load(&created.id).await.unwrap().unwrap().last_observed_source,
        Some(ObservationSource::Callback)
    );
}

#[tokio::test(start_paused = true)]
async fn unusable_callbacks_are_dropped_without_effect() {
    let provider = ScriptedProvider::new(Vec::new());
    let (store, orchestrator) = setup(provider, fast_config());
    let created = orchestrator.create_job(request()).await.unwrap();

    // No correlation ID anywhere.
    let outcome = orchestrator
        .ingest_callback(&json!({"status": "complete"}))
        .await
        .unwrap();
    assert_matches!(outcome, CallbackOutcome::Dropped);

    // Correlates to nothing we know.
    let outcome = orchestrator
        .ingest_callback(&json!({"id": "someone-elses-job", "status": "complete"}))
        .await
        .unwrap();
    assert_matches!(outcome, CallbackOutcome::UnknownJob { provider_job_id }
        if provider_job_id == "someone-elses-job");

    // Unknown status vocabulary.
    let outcome = orchestrator
        .ingest_callback(&json!({"id": PROVIDER_JOB_ID, "status": "warming_up"}))
        .await
        .unwrap();
    assert_matches!(outcome, CallbackOutcome::Dropped);

    let job = store.load(&created.id).await.unwrap().unwrap();
    assert_eq!(job.state, JobState::Pending);
    assert!(job.artifacts.is_empty());
}

#[tokio::test(start_paused = true)]
async fn cancelling_a_subscriber_does_not_stop_polling() {
    let provider = ScriptedProvider::new(vec![
        Ok(observation(
            JobState::TextReady,
            artifacts(Some("verse"), None, None, None),
        )),
        Ok(observation(
            JobState::DraftReady,
            artifacts(None, Some("u1"), None, None),
        )),
        Ok(observation(
            JobState::Succeeded,
            artifacts(None, Some("u2"), None, Some("c1")),
        )),
    ]);
    let (store, orchestrator) = setup(provider, fast_config());

    let created = orchestrator.create_job(request()).await.unwrap();
    let mut sub = orchestrator.subscribe(&created.id).await.unwrap();
    sub.next().await.unwrap();
    sub.cancel();
    assert!(sub.next().await.is_none());

    // The polling loop keeps running for late re-subscribers.
    tokio::time::sleep(Duration::from_secs(5)).await;
    let job = store.load(&created.id).await.unwrap().unwrap();
    assert_eq!(job.state, JobState::Succeeded);

    let mut late = orchestrator.subscribe(&created.id).await.unwrap();
    assert_eq!(late.next().await.unwrap().state, JobState::Succeeded);
    assert!(late.next().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn resume_restarts_polling_for_active_jobs() {
    let store = Arc::new(MemoryJobStore::new());

    // A job left mid-flight by a previous process.
    let mut job = serenade_core::Job::new(request());
    job.provider_job_id = Some(PROVIDER_JOB_ID.to_string());
    store.insert(&job).await.unwrap();

    // A job that never made it to the provider.
    let orphan = serenade_core::Job::new(request());
    store.insert(&orphan).await.unwrap();

    let provider = ScriptedProvider::new(vec![
        Ok(observation(
            JobState::TextReady,
            artifacts(Some("verse"), None, None, None),
        )),
        Ok(observation(
            JobState::DraftReady,
            artifacts(None, Some("u1"), None, None),
        )),
        Ok(observation(
            JobState::Succeeded,
            artifacts(None, Some("u2"), None, Some("c1")),
        )),
    ]);
    let orchestrator = Orchestrator::new(
        Arc::clone(&store) as Arc<dyn JobStore>,
        provider as Arc<dyn GenerationProvider>,
        fast_config(),
    );

    let resumed = orchestrator.resume_active().await.unwrap();
    assert_eq!(resumed, 1);

    // The orphan is failed immediately.
    let orphan = store.load(&orphan.id).await.unwrap().unwrap();
    assert_eq!(orphan.state, JobState::Failed);
    assert_eq!(orphan.failure.unwrap().kind, FailureKind::Timeout);

    // The resumed job completes via polling.
    let mut sub = orchestrator.subscribe(&job.id).await.unwrap();
    let mut last = None;
    while let Some(snapshot) = sub.next().await {
        last = Some(snapshot);
    }
    assert_eq!(last.unwrap().state, JobState::Succeeded);
}

#[tokio::test(start_paused = true)]
async fn shutdown_stops_poll_loops() {
    let provider = ScriptedProvider::new(Vec::new());
    let (_, orchestrator) = setup(provider, fast_config());

    orchestrator.create_job(request()).await.unwrap();
    orchestrator.create_job(request()).await.unwrap();
    assert_eq!(orchestrator.active_poll_loops().await, 2);

    orchestrator.shutdown().await;
    assert_eq!(orchestrator.active_poll_loops().await, 0);
}

#[tokio::test(start_paused = true)]
async fn get_status_unknown_job_is_not_found() {
    let provider = ScriptedProvider::new(Vec::new());
    let (_, orchestrator) = setup(provider, fast_config());

    assert_matches!(
        orchestrator.get_status("missing").await,
        Err(OrchestratorError::NotFound(_))
    );
    assert_matches!(
        orchestrator.subscribe("missing").await,
        Err(OrchestratorError::NotFound(_))
    );
}
