use axum::http::{Method, StatusCode};
use chrono::{Duration, Utc};
use serde_json::json;
use storefront_backend::{
    models::user::UserRole, routes, utils::jwt::verify_access_token,
};
use tower::ServiceExt;
use uuid::Uuid;

#[macro_use]
mod support;

use support::{json_request, read_json, TEST_PASSWORD};

async fn count_live_refresh_tokens(pool: &sqlx::PgPool, user_id: &str) -> i64 {
    sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM refresh_tokens \
         WHERE user_id = $1 AND is_used = FALSE AND is_revoked = FALSE",
    )
    .bind(user_id)
    .fetch_one(pool)
    .await
    .expect("count refresh tokens")
}

#[tokio::test]
async fn register_then_login_issues_paired_tokens() {
    let db = require_db!();
    let (state, _payments) = support::test_state(db.pool.clone());
    let secret = state.config.jwt_secret.clone();
    let app = routes::router(state).expect("build router");

    let suffix = &Uuid::new_v4().simple().to_string()[..10];
    let email = format!("new_{}@example.com", suffix);
    let response = app
        .clone()
        .oneshot(json_request(
            Method::POST,
            "/api/auth/register",
            None,
            Some(json!({
                "username": format!("new_{}", suffix),
                "email": email,
                "password": TEST_PASSWORD,
                "full_name": "New Customer"
            })),
        ))
        .await
        .expect("call register");
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = read_json(response).await;
    assert_eq!(body["success"], true);

    let response = app
        .clone()
        .oneshot(json_request(
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({"email": email.to_uppercase(), "password": TEST_PASSWORD})),
        ))
        .await
        .expect("call login");
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    let token = body["token"].as_str().expect("access token");
    let claims = verify_access_token(token, &secret).expect("valid access token");

    let jwt_id: String = sqlx::query_scalar(
        "SELECT jwt_id FROM refresh_tokens WHERE user_id = $1 ORDER BY created_at DESC LIMIT 1",
    )
    .bind(&claims.sub)
    .fetch_one(&db.pool)
    .await
    .expect("ledger row");
    assert_eq!(jwt_id, claims.jti);
    assert!(claims.exp - claims.iat == 30 * 60);

    let response = app
        .oneshot(json_request(Method::GET, "/api/auth/me", Some(token), None))
        .await
        .expect("call me");
    assert_eq!(response.status(), StatusCode::OK);
    let me = read_json(response).await;
    assert_eq!(me["email"], email);
    assert_eq!(me["role"], "customer");
    assert!(me.get("password_hash").is_none());
}

#[tokio::test]
async fn duplicate_registration_is_conflict() {
    let db = require_db!();
    let user = support::seed_user(&db.pool, UserRole::Customer).await;
    let (state, _payments) = support::test_state(db.pool.clone());
    let app = routes::router(state).expect("build router");

    let response = app
        .oneshot(json_request(
            Method::POST,
            "/api/auth/register",
            None,
            Some(json!({
                "username": user.username,
                "email": "someone_else@example.com",
                "password": TEST_PASSWORD
            })),
        ))
        .await
        .expect("call register");
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = read_json(response).await;
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn login_with_wrong_password_returns_failure_result() {
    let db = require_db!();
    let user = support::seed_user(&db.pool, UserRole::Customer).await;
    let (state, _payments) = support::test_state(db.pool.clone());
    let app = routes::router(state).expect("build router");

    for (email, password) in [
        (user.email.as_str(), "WrongPassword1"),
        ("nobody@example.com", TEST_PASSWORD),
    ] {
        let response = app
            .clone()
            .oneshot(json_request(
                Method::POST,
                "/api/auth/login",
                None,
                Some(json!({"email": email, "password": password})),
            ))
            .await
            .expect("call login");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = read_json(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["errors"][0], "Invalid email or password");
        assert!(body.get("token").is_none());
    }
}

#[tokio::test]
async fn refresh_before_access_expiry_is_rejected() {
    let db = require_db!();
    let user = support::seed_user(&db.pool, UserRole::Customer).await;
    let (state, _payments) = support::test_state(db.pool.clone());
    let issued = state.tokens.issue(&user).await.expect("issue");
    let app = routes::router(state).expect("build router");

    let response = app
        .oneshot(json_request(
            Method::POST,
            "/api/auth/refresh",
            None,
            Some(json!({"token": issued.access_token, "refresh_token": issued.refresh_token})),
        ))
        .await
        .expect("call refresh");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = read_json(response).await;
    assert_eq!(body["errors"][0], "Access token has not expired yet");
    assert_eq!(
        count_live_refresh_tokens(&db.pool, &user.id.to_string()).await,
        1
    );
}

#[tokio::test]
async fn refresh_token_is_single_use() {
    let db = require_db!();
    let user = support::seed_user(&db.pool, UserRole::Customer).await;
    let (state, _payments) = support::test_state(db.pool.clone());
    let issued = state
        .tokens
        .issue_at(&user, Utc::now() - Duration::minutes(31))
        .await
        .expect("issue");
    let app = routes::router(state).expect("build router");
    let payload = json!({"token": issued.access_token, "refresh_token": issued.refresh_token});

    let response = app
        .clone()
        .oneshot(json_request(
            Method::POST,
            "/api/auth/refresh",
            None,
            Some(payload.clone()),
        ))
        .await
        .expect("first refresh");
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["success"], true);
    assert_ne!(body["refresh_token"], issued.refresh_token.as_str());

    let is_used: bool = sqlx::query_scalar("SELECT is_used FROM refresh_tokens WHERE id = $1")
        .bind(issued.record.id)
        .fetch_one(&db.pool)
        .await
        .expect("ledger row");
    assert!(is_used);

    let response = app
        .oneshot(json_request(
            Method::POST,
            "/api/auth/refresh",
            None,
            Some(payload),
        ))
        .await
        .expect("second refresh");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = read_json(response).await;
    assert_eq!(body["errors"][0], "Refresh token has already been used");
}

#[tokio::test]
async fn logout_revokes_outstanding_refresh_tokens() {
    let db = require_db!();
    let user = support::seed_user(&db.pool, UserRole::Customer).await;
    let (state, _payments) = support::test_state(db.pool.clone());
    let stale = state
        .tokens
        .issue_at(&user, Utc::now() - Duration::minutes(31))
        .await
        .expect("issue");
    let current = support::bearer_for(&state, &user).await;
    let app = routes::router(state).expect("build router");

    let response = app
        .clone()
        .oneshot(json_request(
            Method::POST,
            "/api/auth/logout",
            Some(&current),
            None,
        ))
        .await
        .expect("call logout");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        count_live_refresh_tokens(&db.pool, &user.id.to_string()).await,
        0
    );

    let response = app
        .oneshot(json_request(
            Method::POST,
            "/api/auth/refresh",
            None,
            Some(json!({"token": stale.access_token, "refresh_token": stale.refresh_token})),
        ))
        .await
        .expect("refresh after logout");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = read_json(response).await;
    assert_eq!(body["errors"][0], "Refresh token has been revoked");
}

#[tokio::test]
async fn protected_routes_require_bearer_token() {
    let db = require_db!();
    let (state, _payments) = support::test_state(db.pool.clone());
    let app = routes::router(state).expect("build router");

    let response = app
        .clone()
        .oneshot(json_request(Method::GET, "/api/auth/me", None, None))
        .await
        .expect("call me");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .oneshot(json_request(
            Method::GET,
            "/api/auth/me",
            Some("not-a-jwt"),
            None,
        ))
        .await
        .expect("call me");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn change_password_rotates_credentials() {
    let db = require_db!();
    let user = support::seed_user(&db.pool, UserRole::Customer).await;
    let (state, _payments) = support::test_state(db.pool.clone());
    let token = support::bearer_for(&state, &user).await;
    let app = routes::router(state).expect("build router");

    let response = app
        .clone()
        .oneshot(json_request(
            Method::PUT,
            "/api/auth/change-password",
            Some(&token),
            Some(json!({"current_password": "WrongPassword1", "new_password": "BrandNew123"})),
        ))
        .await
        .expect("change with wrong password");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .clone()
        .oneshot(json_request(
            Method::PUT,
            "/api/auth/change-password",
            Some(&token),
            Some(json!({"current_password": TEST_PASSWORD, "new_password": "BrandNew123"})),
        ))
        .await
        .expect("change password");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        count_live_refresh_tokens(&db.pool, &user.id.to_string()).await,
        0
    );

    let response = app
        .oneshot(json_request(
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({"email": user.email, "password": "BrandNew123"})),
        ))
        .await
        .expect("login with new password");
    assert_eq!(response.status(), StatusCode::OK);
}
