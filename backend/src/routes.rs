use axum::{
    http::{HeaderValue, Method},
    middleware as axum_middleware,
    routing::{get, post, put},
    Router,
};
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{docs::ApiDoc, handlers, middleware, state::AppState};

/// Full HTTP surface with shared layers applied.
pub fn router(state: AppState) -> anyhow::Result<Router> {
    let cors = cors_layer(&state.config.cors_allow_origins);
    let auth_rate_limiter = middleware::create_auth_rate_limiter(&state.config)?;

    // Build public routes (no auth)
    let public_routes = Router::new()
        .route("/api/auth/register", post(handlers::auth::register))
        .route("/api/auth/login", post(handlers::auth::login))
        .route("/api/auth/refresh", post(handlers::auth::refresh))
        .route(
            "/api/auth/forgot-password",
            post(handlers::auth::forgot_password),
        )
        .route(
            "/api/auth/reset-password",
            post(handlers::auth::reset_password),
        )
        .route_layer(auth_rate_limiter);

    // Build user-protected routes (auth required)
    let user_routes = Router::new()
        .route("/api/auth/me", get(handlers::auth::me))
        .route("/api/auth/logout", post(handlers::auth::logout))
        .route(
            "/api/auth/change-password",
            put(handlers::auth::change_password),
        )
        .route(
            "/api/addresses",
            get(handlers::addresses::list_addresses).post(handlers::addresses::create_address),
        )
        .route(
            "/api/addresses/{id}",
            get(handlers::addresses::get_address)
                .put(handlers::addresses::update_address)
                .delete(handlers::addresses::delete_address),
        )
        .route(
            "/api/orders/payment-intent",
            post(handlers::orders::create_payment_intent),
        )
        .route(
            "/api/orders",
            get(handlers::orders::list_orders).post(handlers::orders::create_order),
        )
        .route("/api/orders/{id}", get(handlers::orders::get_order))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth,
        ));

    // Build admin-protected routes (auth + admin role)
    let admin_routes = Router::new()
        .route(
            "/api/admin/orders",
            get(handlers::orders::admin_list_orders),
        )
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth_admin,
        ));

    Ok(Router::new()
        .merge(public_routes)
        .merge(user_routes)
        .merge(admin_routes)
        .merge(SwaggerUi::new("/api/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(axum_middleware::from_fn(middleware::request_id))
                .layer(TraceLayer::new_for_http())
                .layer(axum_middleware::from_fn(middleware::log_error_responses))
                .layer(cors),
        )
        .with_state(state))
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.is_empty() || origins.iter().any(|origin| origin == "*") {
        AllowOrigin::from(Any)
    } else {
        let parsed: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!(origin = %origin, "ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        AllowOrigin::list(parsed)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any)
        .max_age(Duration::from_secs(24 * 60 * 60))
}
