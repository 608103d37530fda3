use std::{net::SocketAddr, sync::Arc};

use storefront_backend::{
    config::Config, db::connection::create_pool, routes, services::StripeClient, state::AppState,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn mask_secret(s: &str) -> String {
    if s.is_empty() {
        return "<empty>".into();
    }
    let prefix = s.chars().take(4).collect::<String>();
    format!("{}*** (len={})", prefix, s.len())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "storefront_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::load()?;
    tracing::info!(
        bind_address = %config.bind_address,
        jwt_secret = %mask_secret(&config.jwt_secret),
        stripe_secret_key = %mask_secret(&config.stripe_secret_key),
        stripe_api_base = %config.stripe_api_base,
        currency = %config.currency,
        access_token_expiration_minutes = config.access_token_expiration_minutes,
        refresh_token_expiration_days = config.refresh_token_expiration_days,
        rate_limit_ip_max_requests = config.rate_limit_ip_max_requests,
        rate_limit_ip_window_seconds = config.rate_limit_ip_window_seconds,
        smtp_host = %config.smtp.host,
        smtp_skip_send = config.smtp.skip_send,
        "Loaded configuration from environment/.env"
    );
    if config.stripe_secret_key.is_empty() {
        tracing::warn!("STRIPE_SECRET_KEY is empty; payment endpoints will fail");
    }

    // Initialize database
    let pool = create_pool(&config.database_url).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    let payments = StripeClient::new(&config.stripe_api_base, &config.stripe_secret_key)?;
    let addr: SocketAddr = config.bind_address.parse()?;
    let state = AppState::new(pool, config, Arc::new(payments))?;
    let app = routes::router(state)?;

    // Start server
    tracing::info!("Server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
