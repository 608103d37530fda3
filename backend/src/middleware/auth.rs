use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};

use crate::{
    models::user::User, repositories::auth as auth_repo, state::AppState, utils::jwt::Claims,
};

pub async fn auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let (claims, user) = authenticate_request(request.headers(), &state).await?;
    request.extensions_mut().insert(claims);
    request.extensions_mut().insert(user);

    Ok(next.run(request).await)
}

// Auth + require admin role for admin-only routes
pub async fn auth_admin(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let (claims, user) = authenticate_request(request.headers(), &state).await?;
    if !user.is_admin() {
        tracing::debug!(user_id = %user.id, "non-admin denied admin route");
        return Err(StatusCode::FORBIDDEN);
    }

    request.extensions_mut().insert(claims);
    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

fn parse_bearer_token(header: &str) -> Option<&str> {
    let (scheme, rest) = header.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = rest.trim();
    (!token.is_empty()).then_some(token)
}

async fn authenticate_request(
    headers: &HeaderMap,
    state: &AppState,
) -> Result<(Claims, User), StatusCode> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(parse_bearer_token)
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let claims = state
        .tokens
        .authenticate(token)
        .map_err(|_| StatusCode::UNAUTHORIZED)?;
    let user_id = claims.user_id().ok_or(StatusCode::UNAUTHORIZED)?;

    let user = auth_repo::find_user_by_id(&state.pool, user_id)
        .await
        .map_err(|err| {
            tracing::error!(error = %err, "failed to load authenticated user");
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .ok_or(StatusCode::UNAUTHORIZED)?;

    Ok((claims, user))
}
