//! Postgres-backed job store.
//!
//! One row per job in the `jobs` table; the request, artifacts, and
//! failure detail are JSONB columns so provider-side shape drift never
//! requires a schema change.

use std::str::FromStr;

use async_trait::async_trait;
use serenade_core::{Artifacts, Failure, Job, JobState, ObservationSource, SongRequest};
use serenade_core::types::Timestamp;
use sqlx::PgPool;

use crate::{JobStore, StoreError};

/// Column list for `jobs` queries.
const COLUMNS: &str = "\
    id, state, request, artifacts, provider_job_id, failure, \
    last_observed_source, created_at, updated_at";

/// Terminal state labels, excluded from the active listing.
const TERMINAL_LABELS: [&str; 3] = ["succeeded", "failed", "audio_failed"];

/// [`JobStore`] implementation over a Postgres pool.
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Raw row shape; decoded into [`Job`] via `TryFrom`.
#[derive(sqlx::FromRow)]
struct JobRow {
    id: String,
    state: String,
    request: serde_json::Value,
    artifacts: serde_json::Value,
    provider_job_id: Option<String>,
    failure: Option<serde_json::Value>,
    last_observed_source: Option<String>,
    created_at: Timestamp,
    updated_at: Timestamp,
}

impl TryFrom<JobRow> for Job {
    type Error = StoreError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let corrupt = |what: &str, detail: String| {
            StoreError::Corrupt(format!("job {}: {what}: {detail}", row.id))
        };

        let state = JobState::from_str(&row.state)
            .map_err(|e| corrupt("state", e.to_string()))?;
        let request: SongRequest = serde_json::from_value(row.request)
            .map_err(|e| corrupt("request", e.to_string()))?;
        let artifacts: Artifacts = serde_json::from_value(row.artifacts)
            .map_err(|e| corrupt("artifacts", e.to_string()))?;
        let failure: Option<Failure> = row
            .failure
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| corrupt("failure", e.to_string()))?;
        let last_observed_source = row
            .last_observed_source
            .as_deref()
            .map(ObservationSource::from_str)
            .transpose()
            .map_err(|e| corrupt("last_observed_source", e.to_string()))?;

        Ok(Job {
            id: row.id,
            state,
            request,
            artifacts,
            provider_job_id: row.provider_job_id,
            failure,
            created_at: row.created_at,
            updated_at: row.updated_at,
            last_observed_source,
        })
    }
}

/// Encode the JSONB columns of a job.
fn encode_json(job: &Job) -> Result<(serde_json::Value, serde_json::Value, Option<serde_json::Value>), StoreError> {
    let request = serde_json::to_value(&job.request)
        .map_err(|e| StoreError::Corrupt(format!("job {}: request: {e}", job.id)))?;
    let artifacts = serde_json::to_value(&job.artifacts)
        .map_err(|e| StoreError::Corrupt(format!("job {}: artifacts: {e}", job.id)))?;
    let failure = job
        .failure
        .as_ref()
        .map(serde_json::to_value)
        .transpose()
        .map_err(|e| StoreError::Corrupt(format!("job {}: failure: {e}", job.id)))?;
    Ok((request, artifacts, failure))
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn insert(&self, job: &Job) -> Result<(), StoreError> {
        let (request, artifacts, failure) = encode_json(job)?;
        let result = sqlx::query(
            "INSERT INTO jobs \
                 (id, state, request, artifacts, provider_job_id, failure, \
                  last_observed_source, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(&job.id)
        .bind(job.state.as_str())
        .bind(&request)
        .bind(&artifacts)
        .bind(&job.provider_job_id)
        .bind(&failure)
        .bind(job.last_observed_source.map(ObservationSource::as_str))
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::AlreadyExists(job.id.clone()));
        }
        Ok(())
    }

    async fn load(&self, id: &str) -> Result<Option<Job>, StoreError> {
        let query = format!("SELECT {COLUMNS} FROM jobs WHERE id = $1");
        let row = sqlx::query_as::<_, JobRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Job::try_from).transpose()
    }

    async fn save(&self, job: &Job) -> Result<(), StoreError> {
        let (request, artifacts, failure) = encode_json(job)?;
        let result = sqlx::query(
            "UPDATE jobs \
             SET state = $2, request = $3, artifacts = $4, provider_job_id = $5, \
                 failure = $6, last_observed_source = $7, updated_at = $8 \
             WHERE id = $1",
        )
        .bind(&job.id)
        .bind(job.state.as_str())
        .bind(&request)
        .bind(&artifacts)
        .bind(&job.provider_job_id)
        .bind(&failure)
        .bind(job.last_observed_source.map(ObservationSource::as_str))
        .bind(job.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(job.id.clone()));
        }
        Ok(())
    }

    async fn find_by_provider_ref(&self, provider_job_id: &str) -> Result<Option<Job>, StoreError> {
        let query = format!("SELECT {COLUMNS} FROM jobs WHERE provider_job_id = $1");
        let row = sqlx::query_as::<_, JobRow>(&query)
            .bind(provider_job_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Job::try_from).transpose()
    }

    async fn list_active(&self) -> Result<Vec<Job>, StoreError> {
        let query = format!(
            "SELECT {COLUMNS} FROM jobs \
             WHERE state NOT IN ($1, $2, $3) \
             ORDER BY created_at ASC"
        );
        let rows = sqlx::query_as::<_, JobRow>(&query)
            .bind(TERMINAL_LABELS[0])
            .bind(TERMINAL_LABELS[1])
            .bind(TERMINAL_LABELS[2])
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Job::try_from).collect()
    }
}
