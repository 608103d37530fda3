use axum::{
    extract::{Extension, State},
    http::StatusCode,
    Json,
};
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use validator::Validate;

use crate::{
    error::AppError,
    models::{
        password_reset::{RequestPasswordResetPayload, ResetPasswordPayload},
        user::{
            AuthResult, ChangePasswordRequest, LoginRequest, RefreshRequest, RegisterRequest,
            User, UserResponse, UserRole,
        },
    },
    repositories::{auth as auth_repo, password_reset as password_reset_repo},
    services::RefreshError,
    state::AppState,
    utils::{
        password::{hash_password, verify_password, verify_password_or_dummy},
        security::generate_numeric_code,
    },
    validation::rules,
};

type AuthResponse = (StatusCode, Json<AuthResult>);

const INVALID_CREDENTIALS: &str = "Invalid email or password";
const INVALID_RESET_CODE: &str = "Invalid or expired reset code";
const RESET_REQUESTED: &str = "If the e-mail is registered, a reset code has been sent";

fn auth_failure(status: StatusCode, message: impl Into<String>) -> AuthResponse {
    (status, Json(AuthResult::failure(vec![message.into()])))
}

fn auth_internal(context: &str, err: impl std::fmt::Display) -> AuthResponse {
    tracing::error!(error = %err, "{}", context);
    auth_failure(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
}

async fn issue_for(state: &AppState, user: &User, status: StatusCode) -> AuthResponse {
    match state.tokens.issue(user).await {
        Ok(issued) => (
            status,
            Json(AuthResult::issued(issued.access_token, issued.refresh_token)),
        ),
        Err(err) => auth_internal("failed to issue tokens", format!("{:?}", err)),
    }
}

pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> AuthResponse {
    if let Err(errors) = payload.validate() {
        let messages = match AppError::from(errors) {
            AppError::Validation(messages) => messages,
            _ => vec!["Validation failed".to_string()],
        };
        return (StatusCode::BAD_REQUEST, Json(AuthResult::failure(messages)));
    }

    let email = payload.email.trim().to_lowercase();
    match auth_repo::username_or_email_taken(&state.pool, &payload.username, &email).await {
        Ok(true) => {
            return auth_failure(StatusCode::CONFLICT, "Username or email already in use");
        }
        Ok(false) => {}
        Err(err) => return auth_internal("failed to check user uniqueness", err),
    }

    let password_hash = match hash_password(&payload.password) {
        Ok(hash) => hash,
        Err(err) => return auth_internal("failed to hash password", err),
    };
    let user = User::new(
        payload.username.clone(),
        email,
        password_hash,
        payload
            .full_name
            .map(|name| name.trim().to_string())
            .unwrap_or_default(),
        UserRole::Customer,
    );

    let user = match auth_repo::insert_user(&state.pool, &user).await {
        Ok(user) => user,
        Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
            return auth_failure(StatusCode::CONFLICT, "Username or email already in use");
        }
        Err(err) => return auth_internal("failed to insert user", err),
    };

    tracing::info!(user_id = %user.id, "registered user");
    issue_for(&state, &user, StatusCode::CREATED).await
}

pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> AuthResponse {
    let user = match auth_repo::find_user_by_email(&state.pool, &payload.email).await {
        Ok(user) => user,
        Err(err) => return auth_internal("failed to load user for login", err),
    };

    let matches = match verify_password_or_dummy(
        &payload.password,
        user.as_ref().map(|u| u.password_hash.as_str()),
    ) {
        Ok(matches) => matches,
        Err(err) => return auth_internal("password verification failed", err),
    };

    match user {
        Some(user) if matches => issue_for(&state, &user, StatusCode::OK).await,
        _ => auth_failure(StatusCode::UNAUTHORIZED, INVALID_CREDENTIALS),
    }
}

pub async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> AuthResponse {
    let user_id = match state
        .tokens
        .verify_refresh(&payload.token, &payload.refresh_token, Utc::now())
        .await
    {
        Ok(user_id) => user_id,
        Err(RefreshError::Internal) => {
            return auth_failure(
                StatusCode::INTERNAL_SERVER_ERROR,
                RefreshError::Internal.to_string(),
            );
        }
        Err(err) => {
            tracing::debug!(reason = %err, "refresh rejected");
            return auth_failure(StatusCode::BAD_REQUEST, err.to_string());
        }
    };

    let user = match auth_repo::find_user_by_id(&state.pool, user_id).await {
        Ok(Some(user)) => user,
        Ok(None) => return auth_failure(StatusCode::UNAUTHORIZED, "User not found"),
        Err(err) => return auth_internal("failed to load user for refresh", err),
    };

    issue_for(&state, &user, StatusCode::OK).await
}

pub async fn logout(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    state.tokens.revoke_all(user.id).await?;
    Ok(Json(json!({"message": "Logged out"})))
}

pub async fn me(Extension(user): Extension<User>) -> Json<UserResponse> {
    Json(UserResponse::from(user))
}

pub async fn change_password(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<Json<Value>, AppError> {
    if rules::validate_password_strength(&payload.new_password).is_err() {
        return Err(AppError::BadRequest(format!(
            "New password must be between {} and 128 characters",
            rules::PASSWORD_MIN_LENGTH
        )));
    }
    if payload.new_password == payload.current_password {
        return Err(AppError::BadRequest(
            "New password must differ from current password".into(),
        ));
    }
    if !verify_password(&payload.current_password, &user.password_hash)? {
        return Err(AppError::Unauthorized(
            "Current password is incorrect".into(),
        ));
    }

    let new_hash = hash_password(&payload.new_password)?;
    auth_repo::update_user_password(&state.pool, user.id, &new_hash).await?;
    state.tokens.revoke_all(user.id).await?;

    notify_password_changed(&state, &user).await;
    Ok(Json(json!({"message": "Password updated successfully"})))
}

pub async fn forgot_password(
    State(state): State<AppState>,
    Json(payload): Json<RequestPasswordResetPayload>,
) -> Result<Json<Value>, AppError> {
    payload.validate()?;

    if let Some(user) = auth_repo::find_user_by_email(&state.pool, &payload.email).await? {
        let ttl_minutes = state.config.password_reset_code_ttl_minutes;
        let code = generate_numeric_code();
        let expires_at = Utc::now() + Duration::minutes(ttl_minutes as i64);
        password_reset_repo::create_password_reset(&state.pool, user.id, &code, expires_at)
            .await?;

        if let Err(err) = state
            .email
            .send_password_reset_code(&user.email, &code, ttl_minutes)
            .await
        {
            tracing::error!(user_id = %user.id, error = %err, "failed to send reset code");
        }
    } else {
        tracing::debug!("password reset requested for unknown e-mail");
    }

    Ok(Json(json!({"message": RESET_REQUESTED})))
}

pub async fn reset_password(
    State(state): State<AppState>,
    Json(payload): Json<ResetPasswordPayload>,
) -> Result<Json<Value>, AppError> {
    payload.validate()?;

    let user = auth_repo::find_user_by_email(&state.pool, &payload.email)
        .await?
        .ok_or_else(|| AppError::BadRequest(INVALID_RESET_CODE.into()))?;
    let reset = password_reset_repo::find_active_reset(&state.pool, user.id, Utc::now())
        .await?
        .ok_or_else(|| AppError::BadRequest(INVALID_RESET_CODE.into()))?;
    if !reset.matches_code(&payload.code) {
        let attempts = password_reset_repo::record_failed_attempt(&state.pool, reset.id).await?;
        tracing::warn!(user_id = %user.id, attempts, "wrong password reset code");
        return Err(AppError::BadRequest(INVALID_RESET_CODE.into()));
    }
    if !password_reset_repo::mark_reset_as_used(&state.pool, reset.id).await? {
        return Err(AppError::BadRequest(INVALID_RESET_CODE.into()));
    }

    let new_hash = hash_password(&payload.new_password)?;
    auth_repo::update_user_password(&state.pool, user.id, &new_hash).await?;
    state.tokens.revoke_all(user.id).await?;

    tracing::info!(user_id = %user.id, "password reset completed");
    notify_password_changed(&state, &user).await;
    Ok(Json(json!({"message": "Password has been reset"})))
}

async fn notify_password_changed(state: &AppState, user: &User) {
    if let Err(err) = state
        .email
        .send_password_changed_notification(&user.email, &user.username)
        .await
    {
        tracing::warn!(user_id = %user.id, error = %err, "failed to send password change notice");
    }
}
