//! Faultline API server entry point.

use std::error::Error;
use std::sync::Arc;

use faultline_api::config::AppConfig;
use faultline_api::error::AppError;
use faultline_api::routes;
use faultline_api::state::AppState;
use faultline_api::telemetry;
use faultline_core::clock::SystemClock;
use faultline_store::PgErrorStore;
use faultline_tracker::{ErrorTracker, LogNotifier};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let config = AppConfig::from_env()?;
    let tracer_provider = telemetry::init_tracing(config.otlp_endpoint.as_deref())?;

    info!("Starting Faultline API server");

    let pool = connect_database(&config).await?;

    let tracker = Arc::new(ErrorTracker::new(
        Arc::new(PgErrorStore::new(pool)),
        Arc::new(LogNotifier),
        Arc::new(SystemClock),
        config.tracker.clone(),
    ));
    tracker.start();

    // TODO: restrict CORS to the operator dashboard origin once it has a fixed host.
    let app = routes::app(AppState::new(Arc::clone(&tracker)))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = config.bind_addr()?;
    info!(%addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(AppError::from)?;

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(AppError::from);

    tracker.stop().await;
    telemetry::shutdown_tracing(tracer_provider);

    served?;
    info!("Faultline API server stopped");
    Ok(())
}

async fn connect_database(config: &AppConfig) -> Result<PgPool, AppError> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await?;

    sqlx::migrate!("../../migrations").run(&pool).await?;

    Ok(pool)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received, draining error buffer");
}
