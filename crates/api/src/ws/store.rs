//! Read side of the annotation store used by the real-time endpoint.

use aat_core::annotation::AnnotationView;
use aat_core::types::{DbId, ProjectId};
use aat_db::repositories::{AnnotationRepo, ProjectRepo};
use aat_db::DbPool;
use async_trait::async_trait;

/// Failure to read from the store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Source of the current annotation list for a project, and of who may
/// read it.
#[async_trait]
pub trait AnnotationStore: Send + Sync {
    /// All annotations of the project, ordered by id ascending.
    ///
    /// Either the whole list is returned or an error; never a partial list.
    async fn list_for_project(
        &self,
        project_id: ProjectId,
    ) -> Result<Vec<AnnotationView>, StoreError>;

    /// Whether `user_id` owns the project or has it shared. An unknown
    /// project grants nobody access.
    async fn can_access(&self, project_id: ProjectId, user_id: DbId) -> Result<bool, StoreError>;
}

/// [`AnnotationStore`] backed by the `annotations` table.
#[derive(Clone)]
pub struct PgAnnotationStore {
    pool: DbPool,
}

impl PgAnnotationStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AnnotationStore for PgAnnotationStore {
    async fn list_for_project(
        &self,
        project_id: ProjectId,
    ) -> Result<Vec<AnnotationView>, StoreError> {
        let rows = AnnotationRepo::list_by_project(&self.pool, project_id).await?;
        Ok(rows.into_iter().map(AnnotationView::from).collect())
    }

    async fn can_access(&self, project_id: ProjectId, user_id: DbId) -> Result<bool, StoreError> {
        Ok(ProjectRepo::can_access(&self.pool, project_id, user_id).await?)
    }
}
