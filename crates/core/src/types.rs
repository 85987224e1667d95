/// All entity identifiers are UUIDs, generated application-side so that a
/// trigger's callback URL can embed its id before the row is inserted.
pub type Id = uuid::Uuid;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
