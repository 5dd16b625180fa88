//! Repository for the `projects` and `project_shares` tables.

use aat_core::types::{DbId, ProjectId};
use sqlx::PgPool;

use crate::models::project::{CreateProject, Project};

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "id, path, file_name, owner_id, created_at";

/// Provides CRUD and sharing operations for projects.
pub struct ProjectRepo;

impl ProjectRepo {
    /// Insert a new project, returning the created row.
    pub async fn create(pool: &PgPool, input: &CreateProject) -> Result<Project, sqlx::Error> {
        let query = format!(
            "INSERT INTO projects (id, path, file_name, owner_id)
             VALUES ($1, $2, $3, $4)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Project>(&query)
            .bind(input.id)
            .bind(&input.path)
            .bind(&input.file_name)
            .bind(input.owner_id)
            .fetch_one(pool)
            .await
    }

    /// Find a project by its ID.
    pub async fn find_by_id(
        pool: &PgPool,
        id: ProjectId,
    ) -> Result<Option<Project>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM projects WHERE id = $1");
        sqlx::query_as::<_, Project>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List projects the user owns or has been given access to, newest first.
    pub async fn list_for_user(pool: &PgPool, user_id: DbId) -> Result<Vec<Project>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM projects
             WHERE owner_id = $1
                OR id IN (SELECT project_id FROM project_shares WHERE user_id = $1)
             ORDER BY created_at DESC"
        );
        sqlx::query_as::<_, Project>(&query)
            .bind(user_id)
            .fetch_all(pool)
            .await
    }

    /// Whether the user owns the project or it has been shared with them.
    pub async fn can_access(
        pool: &PgPool,
        project_id: ProjectId,
        user_id: DbId,
    ) -> Result<bool, sqlx::Error> {
        let (allowed,): (bool,) = sqlx::query_as(
            "SELECT EXISTS (
                SELECT 1 FROM projects WHERE id = $1 AND owner_id = $2
                UNION ALL
                SELECT 1 FROM project_shares WHERE project_id = $1 AND user_id = $2
             )",
        )
        .bind(project_id)
        .bind(user_id)
        .fetch_one(pool)
        .await?;
        Ok(allowed)
    }

    /// Grant a user access to a project. Sharing twice is a no-op.
    pub async fn share(
        pool: &PgPool,
        project_id: ProjectId,
        user_id: DbId,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO project_shares (project_id, user_id)
             VALUES ($1, $2)
             ON CONFLICT (project_id, user_id) DO NOTHING",
        )
        .bind(project_id)
        .bind(user_id)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// List the ids of users the project is shared with.
    pub async fn list_shared_users(
        pool: &PgPool,
        project_id: ProjectId,
    ) -> Result<Vec<DbId>, sqlx::Error> {
        let rows: Vec<(DbId,)> = sqlx::query_as(
            "SELECT user_id FROM project_shares WHERE project_id = $1 ORDER BY user_id",
        )
        .bind(project_id)
        .fetch_all(pool)
        .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// Delete a project (annotations and shares cascade). Returns true if a row was deleted.
    pub async fn delete(pool: &PgPool, id: ProjectId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM projects WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
