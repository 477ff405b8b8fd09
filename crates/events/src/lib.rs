//! Status fan-out: live delivery of job snapshots to subscribers.
//!
//! [`StatusFanout`] is the read-side companion of the reconciler: every
//! accepted transition is published here, and any number of clients can
//! hold an independent [`JobSubscription`] per job. A new subscription
//! replays the current snapshot immediately so a reconnecting client
//! catches up without waiting for the next transition.

pub mod fanout;

pub use fanout::{FanoutError, JobSubscription, StatusFanout};
