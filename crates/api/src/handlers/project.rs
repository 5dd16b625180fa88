//! Handlers for uploaded scene projects and their shares.

use aat_core::error::CoreError;
use aat_core::types::{new_project_id, DbId, ProjectId};
use aat_db::models::project::{CreateProject, Project};
use aat_db::repositories::ProjectRepo;
use aat_db::DbPool;
use axum::extract::{Multipart, Path, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;
use crate::storage::{scene_extension, BlobStorage};

/* --------------------------------------------------------------------------
   Types
   -------------------------------------------------------------------------- */

/// Request body for `POST /projects/{id}/shares`.
#[derive(Debug, Deserialize)]
pub struct ShareRequest {
    pub user_id: DbId,
}

/// Project metadata plus the users it is shared with.
#[derive(Debug, Serialize)]
pub struct ProjectDetail {
    #[serde(flatten)]
    pub project: Project,
    pub shared_with: Vec<DbId>,
}

/* --------------------------------------------------------------------------
   Access helpers
   -------------------------------------------------------------------------- */

/// Load a project the caller owns or has been shared.
///
/// Missing projects are 404; projects the caller cannot see are 403.
pub async fn ensure_project_access(
    pool: &DbPool,
    project_id: ProjectId,
    user_id: DbId,
) -> AppResult<Project> {
    let project = ProjectRepo::find_by_id(pool, project_id)
        .await?
        .ok_or_else(|| AppError::Core(CoreError::not_found("Project", project_id)))?;

    if project.owner_id != user_id && !ProjectRepo::can_access(pool, project_id, user_id).await? {
        return Err(AppError::Core(CoreError::Forbidden(
            "You do not have access to this project".into(),
        )));
    }
    Ok(project)
}

/// Load a project and require that the caller owns it.
async fn ensure_project_owner(
    pool: &DbPool,
    project_id: ProjectId,
    user_id: DbId,
) -> AppResult<Project> {
    let project = ensure_project_access(pool, project_id, user_id).await?;
    if project.owner_id != user_id {
        return Err(AppError::Core(CoreError::Forbidden(
            "Only the project owner can do this".into(),
        )));
    }
    Ok(project)
}

/* --------------------------------------------------------------------------
   Handlers
   -------------------------------------------------------------------------- */

/// GET /api/v1/projects
pub async fn list_projects(
    auth: AuthUser,
    State(state): State<AppState>,
) -> AppResult<impl IntoResponse> {
    let projects = ProjectRepo::list_for_user(&state.pool, auth.user_id).await?;
    Ok(Json(DataResponse { data: projects }))
}

/// POST /api/v1/projects
///
/// Accepts a multipart form with a required `file` field holding a `.gltf`
/// or `.glb` scene. The blob is written before the row is inserted and is
/// removed again if the insert fails.
pub async fn create_project(
    auth: AuthUser,
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> AppResult<impl IntoResponse> {
    let mut file_data: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?
    {
        if field.name() == Some("file") {
            let file_name = field.file_name().unwrap_or("scene.glb").to_string();
            let data = field
                .bytes()
                .await
                .map_err(|e| AppError::BadRequest(e.to_string()))?;
            file_data = Some((file_name, data.to_vec()));
        }
    }

    let (file_name, data) =
        file_data.ok_or_else(|| AppError::BadRequest("Missing required 'file' field".into()))?;
    if data.is_empty() {
        return Err(AppError::BadRequest("Uploaded file is empty".into()));
    }
    let ext = scene_extension(&file_name).ok_or_else(|| {
        AppError::BadRequest(format!(
            "Unsupported scene format '{file_name}'. Supported: .gltf, .glb"
        ))
    })?;

    let id = new_project_id();
    let path = BlobStorage::scene_path(id, &ext);
    state.storage.write(&path, &data).await?;

    let input = CreateProject {
        id,
        path,
        file_name,
        owner_id: auth.user_id,
    };
    let project = match ProjectRepo::create(&state.pool, &input).await {
        Ok(project) => project,
        Err(e) => {
            if let Err(cleanup) = state.storage.remove_project(id).await {
                tracing::warn!(project_id = %id, error = %cleanup, "Failed to remove orphaned blob");
            }
            return Err(e.into());
        }
    };

    tracing::info!(
        user_id = auth.user_id,
        project_id = %project.id,
        bytes = data.len(),
        "Project created"
    );

    Ok((StatusCode::CREATED, Json(DataResponse { data: project })))
}

/// GET /api/v1/projects/{id}
pub async fn get_project(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(project_id): Path<ProjectId>,
) -> AppResult<impl IntoResponse> {
    let project = ensure_project_access(&state.pool, project_id, auth.user_id).await?;
    let shared_with = ProjectRepo::list_shared_users(&state.pool, project_id).await?;
    Ok(Json(DataResponse {
        data: ProjectDetail {
            project,
            shared_with,
        },
    }))
}

/// GET /api/v1/projects/{id}/data
///
/// Stream back the stored scene file.
pub async fn download_project_data(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(project_id): Path<ProjectId>,
) -> AppResult<Response> {
    let project = ensure_project_access(&state.pool, project_id, auth.user_id).await?;

    let bytes = state
        .storage
        .read(&project.path)
        .await?
        .ok_or_else(|| AppError::Core(CoreError::not_found("SceneFile", project_id)))?;

    let content_type = if project.path.ends_with(".gltf") {
        "model/gltf+json"
    } else {
        "model/gltf-binary"
    };
    let disposition = format!(
        "attachment; filename=\"{}\"",
        project.file_name.replace('"', "")
    );

    Ok((
        [(CONTENT_TYPE, content_type.to_string()), (CONTENT_DISPOSITION, disposition)],
        bytes,
    )
        .into_response())
}

/// DELETE /api/v1/projects/{id}
///
/// Owner only. Annotations and shares cascade with the row.
pub async fn delete_project(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(project_id): Path<ProjectId>,
) -> AppResult<StatusCode> {
    ensure_project_owner(&state.pool, project_id, auth.user_id).await?;

    if !ProjectRepo::delete(&state.pool, project_id).await? {
        return Err(AppError::Core(CoreError::not_found("Project", project_id)));
    }
    state.storage.remove_project(project_id).await?;

    tracing::info!(user_id = auth.user_id, project_id = %project_id, "Project deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/projects/{id}/shares
pub async fn share_project(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(project_id): Path<ProjectId>,
    Json(input): Json<ShareRequest>,
) -> AppResult<StatusCode> {
    let project = ensure_project_owner(&state.pool, project_id, auth.user_id).await?;
    if input.user_id == project.owner_id {
        return Err(AppError::Core(CoreError::Validation(
            "A project cannot be shared with its owner".into(),
        )));
    }

    ProjectRepo::share(&state.pool, project_id, input.user_id).await?;

    tracing::info!(
        project_id = %project_id,
        shared_with = input.user_id,
        "Project shared"
    );
    Ok(StatusCode::NO_CONTENT)
}
