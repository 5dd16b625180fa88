//! Route definitions for the top-level `/annotations` resource.

use axum::routing::delete;
use axum::Router;

use crate::handlers::annotation;
use crate::state::AppState;

/// Routes mounted at `/annotations`.
///
/// ```text
/// DELETE /{id} -> delete_annotation
/// ```
pub fn router() -> Router<AppState> {
    Router::new().route("/{id}", delete(annotation::delete_annotation))
}
