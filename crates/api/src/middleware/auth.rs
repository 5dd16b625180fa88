//! Resolving the calling user from an access token.
//!
//! REST handlers take an [`AuthUser`] parameter. The WebSocket upgrade, which
//! may also receive its token in the query string, calls [`bearer_token`] and
//! [`user_from_token`] directly.

use aat_core::error::CoreError;
use aat_core::types::DbId;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::HeaderMap;

use crate::auth::jwt::{validate_token, JwtConfig};
use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// The user behind a request's `Authorization: Bearer` token.
///
/// Project and annotation handlers scope every query by it:
///
/// ```ignore
/// async fn list_projects(
///     State(state): State<AppState>,
///     auth: AuthUser,
/// ) -> AppResult<Json<DataResponse<Vec<Project>>>> {
///     let projects = ProjectRepo::list_for_user(&state.pool, auth.user_id).await?;
///     Ok(Json(DataResponse { data: projects }))
/// }
/// ```
#[derive(Debug, Clone)]
pub struct AuthUser {
    /// Id of the account the token was issued to.
    pub user_id: DbId,
}

/// The token carried in the `Authorization` header, if the header is present.
///
/// A header that is not of the form `Bearer <token>` is rejected rather than
/// treated as absent.
pub fn bearer_token(headers: &HeaderMap) -> AppResult<Option<&str>> {
    let Some(value) = headers.get(AUTHORIZATION) else {
        return Ok(None);
    };
    value
        .to_str()
        .ok()
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(Some)
        .ok_or_else(|| {
            AppError::Core(CoreError::Unauthorized(
                "Invalid Authorization format. Expected: Bearer <token>".into(),
            ))
        })
}

/// Validate an access token and return the user it was issued to.
pub fn user_from_token(token: &str, jwt: &JwtConfig) -> AppResult<DbId> {
    let claims = validate_token(token, jwt).map_err(|_| {
        AppError::Core(CoreError::Unauthorized("Invalid or expired token".into()))
    })?;
    Ok(claims.sub)
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers)?.ok_or_else(|| {
            AppError::Core(CoreError::Unauthorized(
                "Missing Authorization header".into(),
            ))
        })?;

        Ok(AuthUser {
            user_id: user_from_token(token, &state.config.jwt)?,
        })
    }
}
