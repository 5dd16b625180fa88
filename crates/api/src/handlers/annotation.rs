//! Handlers for positional annotations on a project's scene.
//!
//! These are the write path. Live clients learn about changes by sending a
//! refresh trigger over the project's WebSocket after a write succeeds.

use aat_core::annotation::{validate_coordinates, validate_note};
use aat_core::error::CoreError;
use aat_core::types::{DbId, ProjectId};
use aat_db::models::annotation::CreateAnnotation;
use aat_db::repositories::{AnnotationRepo, ProjectRepo};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;

use crate::error::{AppError, AppResult};
use crate::handlers::project::ensure_project_access;
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /api/v1/projects/{id}/annotations
pub async fn list_annotations(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(project_id): Path<ProjectId>,
) -> AppResult<impl IntoResponse> {
    ensure_project_access(&state.pool, project_id, auth.user_id).await?;
    let annotations = AnnotationRepo::list_by_project(&state.pool, project_id).await?;
    Ok(Json(DataResponse { data: annotations }))
}

/// POST /api/v1/projects/{id}/annotations
pub async fn create_annotation(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(project_id): Path<ProjectId>,
    Json(input): Json<CreateAnnotation>,
) -> AppResult<impl IntoResponse> {
    validate_note(&input.note)?;
    validate_coordinates(&input.coordinates)?;
    ensure_project_access(&state.pool, project_id, auth.user_id).await?;

    let annotation = AnnotationRepo::create(&state.pool, project_id, auth.user_id, &input).await?;

    tracing::info!(
        user_id = auth.user_id,
        project_id = %project_id,
        annotation_id = annotation.id,
        "Annotation created"
    );

    Ok((StatusCode::CREATED, Json(DataResponse { data: annotation })))
}

/// DELETE /api/v1/annotations/{id}
///
/// Allowed for the annotation's author and the project owner. Returns the
/// deleted row.
pub async fn delete_annotation(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(annotation_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let not_found = || AppError::Core(CoreError::not_found("Annotation", annotation_id));

    let annotation = AnnotationRepo::find_by_id(&state.pool, annotation_id)
        .await?
        .ok_or_else(not_found)?;

    if annotation.user_id != auth.user_id {
        let is_owner = ProjectRepo::find_by_id(&state.pool, annotation.project_id)
            .await?
            .is_some_and(|p| p.owner_id == auth.user_id);
        if !is_owner {
            return Err(AppError::Core(CoreError::Forbidden(
                "Only the author or the project owner can delete this annotation".into(),
            )));
        }
    }

    let deleted = AnnotationRepo::delete(&state.pool, annotation_id)
        .await?
        .ok_or_else(not_found)?;

    tracing::info!(
        user_id = auth.user_id,
        project_id = %deleted.project_id,
        annotation_id,
        "Annotation deleted"
    );

    Ok(Json(DataResponse { data: deleted }))
}
