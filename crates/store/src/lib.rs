//! Job Store: the single durable source of truth for job records.
//!
//! [`JobStore`] is the seam every other component goes through: the
//! reconciler writes through it, the fan-out and query surface read from
//! it, and nothing caches a job beyond the duration of one operation.
//! Two implementations are provided: [`MemoryJobStore`] for tests and
//! dev setups without a database, and [`PgJobStore`] backed by Postgres.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use serenade_core::Job;

pub use memory::MemoryJobStore;
pub use postgres::PgJobStore;

/// Errors from the job store layer.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No job exists for the given ID.
    #[error("Job not found: {0}")]
    NotFound(String),

    /// A job with this ID already exists.
    #[error("Job already exists: {0}")]
    AlreadyExists(String),

    /// A database query failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A persisted record could not be decoded back into a job.
    #[error("Corrupt job record: {0}")]
    Corrupt(String),
}

/// Durable key-value store of job records, keyed by job ID.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Persist a newly created job. Fails if the ID is already taken.
    async fn insert(&self, job: &Job) -> Result<(), StoreError>;

    /// Fetch the current record for a job, if any.
    async fn load(&self, id: &str) -> Result<Option<Job>, StoreError>;

    /// Overwrite the record for an existing job.
    async fn save(&self, job: &Job) -> Result<(), StoreError>;

    /// Look up a job by its provider-side identifier.
    ///
    /// Used to correlate webhook callbacks back to the owning job.
    async fn find_by_provider_ref(&self, provider_job_id: &str) -> Result<Option<Job>, StoreError>;

    /// All jobs not yet in a terminal state.
    ///
    /// Used to resume polling loops after a restart, and by external
    /// maintenance callers deciding what to purge.
    async fn list_active(&self) -> Result<Vec<Job>, StoreError>;
}

/// Create a Postgres connection pool.
pub async fn create_pool(database_url: &str) -> Result<sqlx::PgPool, sqlx::Error> {
    sqlx::postgres::PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
}

/// Verify the database is reachable.
pub async fn health_check(pool: &sqlx::PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Apply pending migrations from the bundled `migrations/` directory.
pub async fn run_migrations(pool: &sqlx::PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
