use std::sync::Arc;

use aat_core::error::CoreError;
use aat_core::types::{DbId, ProjectId};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::middleware::auth::{bearer_token, user_from_token};
use crate::state::AppState;
use crate::ws::registry::ConnectionRegistry;
use crate::ws::session::Session;
use crate::ws::store::AnnotationStore;

/// Query parameters accepted on the upgrade request.
///
/// Browsers cannot set headers on a WebSocket handshake, so the access
/// token may be passed as `?token=` instead of an `Authorization` header.
#[derive(Debug, Deserialize)]
pub struct WsAuthParams {
    pub token: Option<String>,
}

/// GET /api/v1/ws/projects/{project_id}/annotations
///
/// Upgrades to a WebSocket bound to one project's annotation stream.
///
/// When `WS_REQUIRE_AUTH` is on, the caller needs a valid access token and
/// must own the project or have it shared, as for the REST annotation list.
/// Otherwise the upgrade is refused with 401 or 403 before any registration.
/// With auth off, any well-formed project id is accepted; unknown projects
/// start with no snapshot.
pub async fn project_annotations_ws(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(project_id): Path<ProjectId>,
    Query(params): Query<WsAuthParams>,
    headers: HeaderMap,
) -> AppResult<Response> {
    let user_id = if state.config.realtime.require_auth {
        let user_id = authenticate(&state, &headers, params.token.as_deref())?;
        authorize(&state, project_id, user_id).await?;
        Some(user_id)
    } else {
        None
    };

    let registry = Arc::clone(&state.registry);
    let store = Arc::clone(&state.annotation_store);
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, registry, store, project_id, user_id)))
}

/// Resolve the caller from a bearer header or `token` query parameter.
fn authenticate(state: &AppState, headers: &HeaderMap, query_token: Option<&str>) -> AppResult<DbId> {
    let token = bearer_token(headers)?.or(query_token).ok_or_else(|| {
        AppError::Core(CoreError::Unauthorized("Missing access token".into()))
    })?;
    user_from_token(token, &state.config.jwt)
}

/// Refuse callers who may not read the project's annotations.
async fn authorize(state: &AppState, project_id: ProjectId, user_id: DbId) -> AppResult<()> {
    let allowed = state
        .annotation_store
        .can_access(project_id, user_id)
        .await
        .map_err(|e| AppError::InternalError(format!("Access check failed: {e}")))?;
    if !allowed {
        tracing::info!(
            project_id = %project_id,
            user_id,
            "WebSocket upgrade refused, no project access"
        );
        return Err(AppError::Core(CoreError::Forbidden(
            "You do not have access to this project".into(),
        )));
    }
    Ok(())
}

/// Drive one connection from registration to close.
///
/// Splits the socket into a sink (outbound) and stream (inbound), then:
///   1. Opens a [`Session`], which registers and queues any replay.
///   2. Spawns a writer task that forwards the outbound queue to the sink.
///   3. Treats each inbound data frame as a refresh trigger.
///   4. Stops when the client closes, the stream errors, or the writer ends.
///
/// Deregistration happens when the session is dropped, on every exit path.
async fn handle_socket(
    socket: WebSocket,
    registry: Arc<ConnectionRegistry>,
    store: Arc<dyn AnnotationStore>,
    project_id: ProjectId,
    user_id: Option<DbId>,
) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    let (session, mut rx) = Session::open(&registry, store, project_id, conn_id.clone());
    tracing::info!(
        conn_id = %conn_id,
        project_id = %project_id,
        user_id = ?user_id,
        "WebSocket connected"
    );

    let (mut sink, mut stream) = socket.split();

    // Writer: ends when the sink fails or the queue is closed (the
    // connection was dropped from its topic).
    let writer_conn_id = conn_id.clone();
    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sink.send(msg).await.is_err() {
                tracing::debug!(conn_id = %writer_conn_id, "WebSocket sink closed");
                break;
            }
        }
    });

    loop {
        tokio::select! {
            inbound = stream.next() => match inbound {
                Some(Ok(Message::Text(_) | Message::Binary(_))) => {
                    match session.refresh().await {
                        Ok(report) => tracing::debug!(
                            conn_id = %conn_id,
                            delivered = report.delivered,
                            dropped = report.dropped,
                            "Refresh published"
                        ),
                        Err(e) => tracing::warn!(
                            conn_id = %conn_id,
                            project_id = %project_id,
                            error = %e,
                            "Refresh failed, nothing published"
                        ),
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {
                    tracing::trace!(conn_id = %conn_id, "Control frame received");
                }
                Some(Err(e)) => {
                    tracing::debug!(conn_id = %conn_id, error = %e, "WebSocket receive error");
                    break;
                }
            },
            _ = &mut send_task => {
                tracing::debug!(conn_id = %conn_id, "Outbound channel closed");
                break;
            }
        }
    }

    drop(session);
    send_task.abort();
    tracing::info!(conn_id = %conn_id, project_id = %project_id, "WebSocket disconnected");
}
