use actix_governor::{Governor, GovernorConfigBuilder};
use actix_web::{middleware::Logger, web, App, HttpServer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use x402_failover::Failover;
use x402_failover_server::{config::ServerConfig, cors::build_cors, routes, state::AppState};

#[tokio::main]
async fn main() -> std::io::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };
    let port = config.port;
    let allowed_origins = config.allowed_origins.clone();
    let rate_limit_rpm = config.rate_limit_rpm;

    tracing::info!("Starting x402-failover-server on port {}", port);
    tracing::info!("Receiving payments at {:#x} on {}", config.pay_to, config.network);
    for descriptor in &config.facilitators {
        tracing::info!(
            facilitator = %descriptor.id,
            priority = descriptor.priority,
            enabled = descriptor.enabled,
            "Facilitator {} at {}",
            descriptor.name,
            descriptor.endpoint
        );
    }

    let failover = match Failover::new(config.failover.clone(), config.facilitators.clone()) {
        Ok(failover) => failover,
        Err(e) => {
            tracing::error!("Failed to build facilitator pool: {e}");
            std::process::exit(1);
        }
    };

    let state = match AppState::new(config, failover) {
        Ok(state) => state,
        Err(e) => {
            tracing::error!("Failed to build payment routes: {e}");
            std::process::exit(1);
        }
    };
    let failover = state.failover.clone();
    failover.start();

    let state_data = web::Data::new(state);

    // Configure rate limiter
    let governor_conf = GovernorConfigBuilder::default()
        .requests_per_minute(rate_limit_rpm as u64)
        .finish()
        .expect("Failed to create rate limiter config");

    let result = HttpServer::new(move || {
        App::new()
            .app_data(state_data.clone())
            .wrap(Logger::default())
            .wrap(build_cors(&allowed_origins))
            .wrap(Governor::new(&governor_conf))
            .configure(routes::health::configure)
            .configure(routes::status::configure)
            .configure(routes::resources::configure)
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await;

    failover.shutdown();
    result
}
