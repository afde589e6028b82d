/// Opaque identifier of a live WebSocket connection (UUID v4 string).
pub type ConnectionId = String;

/// Caller-chosen identifier of a workflow session.
pub type SessionId = String;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
