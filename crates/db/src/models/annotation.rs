//! Annotation model and DTOs.

use aat_core::annotation::AnnotationView;
use aat_core::types::{DbId, ProjectId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `annotations` table.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Annotation {
    pub id: DbId,
    pub project_id: ProjectId,
    pub user_id: DbId,
    pub note: String,
    pub coordinates: serde_json::Value,
    pub created_at: Timestamp,
}

impl From<Annotation> for AnnotationView {
    fn from(row: Annotation) -> Self {
        AnnotationView {
            id: row.id,
            note: row.note,
            coordinates: row.coordinates,
        }
    }
}

/// DTO for creating a new annotation. Project and user come from the route
/// and the authenticated caller.
#[derive(Debug, Deserialize)]
pub struct CreateAnnotation {
    pub note: String,
    pub coordinates: serde_json::Value,
}
