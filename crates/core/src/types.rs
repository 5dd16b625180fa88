/// All database primary keys are PostgreSQL BIGSERIAL.
pub type DbId = i64;

/// Projects are addressed by random v4 UUIDs so ids cannot be enumerated.
pub type ProjectId = uuid::Uuid;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Generate a fresh, non-sequential project identifier.
pub fn new_project_id() -> ProjectId {
    uuid::Uuid::new_v4()
}
