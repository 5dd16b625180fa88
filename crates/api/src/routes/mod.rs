pub mod annotation;
pub mod auth;
pub mod health;
pub mod project;

use axum::routing::get;
use axum::Router;

use crate::state::AppState;
use crate::ws;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /ws/projects/{project_id}/annotations            WebSocket (annotation stream)
///
/// /auth/register                                   register (public)
/// /auth/login                                      login (public)
/// /auth/me                                         current user
///
/// /projects                                        list, upload
/// /projects/{id}                                   get, delete
/// /projects/{id}/data                              download scene file
/// /projects/{id}/shares                            share with a user
/// /projects/{id}/annotations                       list, create
///
/// /annotations/{id}                                delete
/// ```
pub fn api_routes(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        // Real-time annotation stream.
        .route(
            "/ws/projects/{project_id}/annotations",
            get(ws::project_annotations_ws),
        )
        .nest("/auth", auth::router())
        .nest("/projects", project::router(max_upload_bytes))
        .nest("/annotations", annotation::router())
}
