/// Job identifiers are opaque strings (UUID v4), assigned once at
/// creation and used as the correlation key across all update channels.
pub type JobId = String;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
