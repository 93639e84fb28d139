use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use tracing::warn;

use crate::{
    auth::extractors::CurrentUser,
    error::{ApiError, INVALID_TOKEN, NO_TOKEN},
    state::AppState,
};

/// Returns the token from `Authorization: Bearer <token>`.
pub(crate) fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))?
        .trim();
    (!token.is_empty()).then_some(token)
}

/// Gates protected routes: verifies the bearer token, loads the user and
/// attaches it as [`CurrentUser`].
///
/// Bad signature, expiry, unknown user and deactivated user all produce the
/// same 401 body.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let user_id = {
        let token = bearer_token(request.headers()).ok_or(ApiError::Unauthorized(NO_TOKEN))?;
        state.keys.verify(token).map_err(|e| {
            warn!(error = %e, "invalid or expired token");
            ApiError::Unauthorized(INVALID_TOKEN)
        })?
    };

    let user = match state.users.find_by_id(user_id).await? {
        Some(user) if user.is_active => user,
        Some(_) => {
            warn!(%user_id, "token for deactivated user");
            return Err(ApiError::Unauthorized(INVALID_TOKEN));
        }
        None => {
            warn!(%user_id, "token for unknown user");
            return Err(ApiError::Unauthorized(INVALID_TOKEN));
        }
    };

    request.extensions_mut().insert(CurrentUser(user));
    Ok(next.run(request).await)
}
