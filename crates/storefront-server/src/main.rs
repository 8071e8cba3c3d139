use std::sync::Arc;

use actix_governor::{Governor, GovernorConfigBuilder};
use actix_web::{middleware::Logger, web, App, HttpServer};
use storefront::store::SqliteStore;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use storefront_server::{
    config::ServerConfig, headers::security_headers, metrics::PAYMENTS_EXPIRED, routes,
    state::AppState,
};

#[tokio::main]
async fn main() -> std::io::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Configuration first: the default log level depends on it
    let config = ServerConfig::from_env().expect("Failed to load configuration");

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.default_log_filter().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let port = config.port;
    let allowed_origins = config.allowed_origins.clone();
    let rate_limit_rpm = config.rate_limit_rpm;
    let request_timeout = config.request_timeout;
    let sweep_interval = config.sweep_interval;
    let production = config.is_production();

    tracing::info!("Starting storefront on port {}", port);
    tracing::info!("Environment: {}", config.environment.as_str());
    tracing::info!("Store currency: {}", config.store_currency);
    tracing::info!("Payment gateway: {}", config.gateway_base_url);
    tracing::info!(
        "Gateway auth: {}",
        if config.internal_auth_secret.is_some() {
            "enabled"
        } else {
            "disabled (trusting X-User-Id)"
        }
    );

    // Initialize database
    let store = Arc::new(
        SqliteStore::open(&config.database_path).expect("Failed to initialize database"),
    );
    tracing::info!("Database initialized at: {}", config.database_path);

    let state = AppState::new(config, store).expect("Failed to build application state");

    // Expire payments whose callback never arrived
    let _sweep = Arc::clone(&state.coordinator)
        .start_expiry_sweep(sweep_interval, |n| PAYMENTS_EXPIRED.inc_by(n as u64));

    let state_data = web::Data::new(state);

    // Configure rate limiter (user and admin routes only)
    let governor_conf = GovernorConfigBuilder::default()
        .requests_per_minute(rate_limit_rpm as u64)
        .finish()
        .expect("Failed to create rate limiter config");

    HttpServer::new(move || {
        let cors = storefront_server::cors::build_cors(&allowed_origins);

        App::new()
            .app_data(state_data.clone())
            .app_data(web::PayloadConfig::new(64 * 1024))
            .app_data(web::JsonConfig::default().limit(64 * 1024))
            .wrap(security_headers(production))
            .wrap(Logger::default())
            .wrap(cors)
            .service(
                web::scope("/api/v1")
                    .configure(routes::configure_unthrottled)
                    .service(
                        web::scope("")
                            .wrap(Governor::new(&governor_conf))
                            .configure(routes::configure),
                    ),
            )
    })
    .client_request_timeout(request_timeout)
    .bind(("0.0.0.0", port))?
    .run()
    .await
}
