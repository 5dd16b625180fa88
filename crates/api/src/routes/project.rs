//! Route definitions for the `/projects` resource.

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;

use crate::handlers::{annotation, project};
use crate::state::AppState;

/// Routes mounted at `/projects`.
///
/// ```text
/// GET    /                    -> list_projects
/// POST   /                    -> create_project (multipart upload)
/// GET    /{id}                -> get_project
/// DELETE /{id}                -> delete_project (owner only)
/// GET    /{id}/data           -> download_project_data
/// POST   /{id}/shares         -> share_project (owner only)
/// GET    /{id}/annotations    -> list_annotations
/// POST   /{id}/annotations    -> create_annotation
/// ```
pub fn router(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(project::list_projects)
                .post(project::create_project)
                .layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .route(
            "/{id}",
            get(project::get_project).delete(project::delete_project),
        )
        .route("/{id}/data", get(project::download_project_data))
        .route("/{id}/shares", post(project::share_project))
        .route(
            "/{id}/annotations",
            get(annotation::list_annotations).post(annotation::create_annotation),
        )
}
