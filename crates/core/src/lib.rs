//! Domain model for the song generation pipeline.
//!
//! This crate holds the pure, I/O-free parts of the system: the job
//! lifecycle state machine, the job record and its artifact merge rules,
//! and the observation types that the reconciler consumes. Everything
//! here is shared by the store, provider, and orchestrator crates.

pub mod error;
pub mod job;
pub mod state;
pub mod types;

pub use error::CoreError;
pub use job::{
    Artifacts, Failure, FailureKind, Job, JobSnapshot, Observation, ObservationSource, SongRequest,
};
pub use state::JobState;
