//! Job orchestration: the reconciler state machine and the entry-point
//! service that drives generation jobs to completion.
//!
//! Observations arrive from three unreliable channels (client-driven
//! polls, provider webhooks, internal timeouts). The [`Reconciler`] is
//! the single writer of job state: every channel feeds it the same
//! observation shape, which is what makes out-of-order and duplicate
//! delivery safe. The [`Orchestrator`] wires creation, querying,
//! subscription, callback ingestion, and the polling-fallback loop
//! together.

pub mod orchestrator;
pub mod poll;
pub mod reconcile;

pub use orchestrator::{CallbackOutcome, Orchestrator, OrchestratorError};
pub use poll::{next_poll_interval, PollConfig};
pub use reconcile::{ReconcileError, ReconcileOutcome, Reconciler};
