//! In-memory job store.
//!
//! Backs tests and database-less development setups. Thread-safe via an
//! interior `RwLock`; designed to be wrapped in `Arc` and shared.

use std::collections::HashMap;

use async_trait::async_trait;
use serenade_core::Job;
use tokio::sync::RwLock;

use crate::{JobStore, StoreError};

/// `RwLock<HashMap>`-backed implementation of [`JobStore`].
#[derive(Default)]
pub struct MemoryJobStore {
    jobs: RwLock<HashMap<String, Job>>,
}

impl MemoryJobStore {
    /// Create a new, empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records currently held.
    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    /// Whether the store holds no records.
    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn insert(&self, job: &Job) -> Result<(), StoreError> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&job.id) {
            return Err(StoreError::AlreadyExists(job.id.clone()));
        }
        jobs.insert(job.id.clone(), job.clone());
        Ok(())
    }

    async fn load(&self, id: &str) -> Result<Option<Job>, StoreError> {
        Ok(self.jobs.read().await.get(id).cloned())
    }

    async fn save(&self, job: &Job) -> Result<(), StoreError> {
        let mut jobs = self.jobs.write().await;
        if !jobs.contains_key(&job.id) {
            return Err(StoreError::NotFound(job.id.clone()));
        }
        jobs.insert(job.id.clone(), job.clone());
        Ok(())
    }

    async fn find_by_provider_ref(&self, provider_job_id: &str) -> Result<Option<Job>, StoreError> {
        Ok(self
            .jobs
            .read()
            .await
            .values()
            .find(|job| job.provider_job_id.as_deref() == Some(provider_job_id))
            .cloned())
    }

    async fn list_active(&self) -> Result<Vec<Job>, StoreError> {
        Ok(self
            .jobs
            .read()
            .await
            .values()
            .filter(|job| !job.state.is_terminal())
            .cloned()
            .collect())
    }
}
