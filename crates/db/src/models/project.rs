//! Project model: one uploaded scene plus the users it is shared with.

use aat_core::types::{DbId, ProjectId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `projects` table.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Project {
    pub id: ProjectId,
    /// Blob path relative to the storage root.
    pub path: String,
    /// Original upload file name.
    pub file_name: String,
    pub owner_id: DbId,
    pub created_at: Timestamp,
}

/// DTO for creating a project. The id is generated by the caller so the
/// blob can be written under it before the row exists.
#[derive(Debug)]
pub struct CreateProject {
    pub id: ProjectId,
    pub path: String,
    pub file_name: String,
    pub owner_id: DbId,
}
