//! Repository for the `annotations` table.

use aat_core::types::{DbId, ProjectId};
use sqlx::PgPool;

use crate::models::annotation::{Annotation, CreateAnnotation};

/// Column list for annotation queries.
const COLUMNS: &str = "id, project_id, user_id, note, coordinates, created_at";

/// Provides CRUD operations for annotations.
///
/// Annotations are never updated in place; clients delete and re-create.
pub struct AnnotationRepo;

impl AnnotationRepo {
    /// Create a new annotation, returning the created row.
    pub async fn create(
        pool: &PgPool,
        project_id: ProjectId,
        user_id: DbId,
        input: &CreateAnnotation,
    ) -> Result<Annotation, sqlx::Error> {
        let query = format!(
            "INSERT INTO annotations (project_id, user_id, note, coordinates)
             VALUES ($1, $2, $3, $4)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Annotation>(&query)
            .bind(project_id)
            .bind(user_id)
            .bind(&input.note)
            .bind(&input.coordinates)
            .fetch_one(pool)
            .await
    }

    /// Find an annotation by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Annotation>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM annotations WHERE id = $1");
        sqlx::query_as::<_, Annotation>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List all annotations for a project, ordered by id ascending.
    pub async fn list_by_project(
        pool: &PgPool,
        project_id: ProjectId,
    ) -> Result<Vec<Annotation>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM annotations
             WHERE project_id = $1
             ORDER BY id ASC"
        );
        sqlx::query_as::<_, Annotation>(&query)
            .bind(project_id)
            .fetch_all(pool)
            .await
    }

    /// Delete an annotation by its ID, returning the deleted row if it existed.
    pub async fn delete(pool: &PgPool, id: DbId) -> Result<Option<Annotation>, sqlx::Error> {
        let query = format!("DELETE FROM annotations WHERE id = $1 RETURNING {COLUMNS}");
        sqlx::query_as::<_, Annotation>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }
}
