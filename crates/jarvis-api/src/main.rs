use anyhow::Result;
use axum::Router;
use jarvis_api::{config::AppConfig, routes, state::AppState};
use jarvis_core::{
    CancellationToken, ConfigLoader, TelemetryOptions, init_telemetry, metrics,
};
use tokio::net::TcpListener;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::from_env()?;
    let core = ConfigLoader::read(config.config_path.clone())?;

    init_telemetry(TelemetryOptions::default().with_default_level(core.logging.level.clone()))?;
    ConfigLoader::report(&core);
    metrics::init_metrics_from_env("jarvis-api")?;

    let shutdown = CancellationToken::new();
    let state = AppState::try_new(&config, &core)?.with_shutdown(shutdown.clone());
    let credentials = state.credentials();
    info!(
        search = credentials.search,
        generation = credentials.generation,
        max_concurrency = config.max_concurrency,
        "providers configured"
    );

    let app: Router = routes::build_router(state);

    let listener = TcpListener::bind(&config.listen_addr).await?;
    info!(address = %config.listen_addr, "jarvis-api listening");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await
        .map_err(|err| {
            error!(error = %err, "server shutdown with error");
            err
        })?;

    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        if let Ok(mut stream) = signal(SignalKind::terminate()) {
            stream.recv().await;
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown signal received; cancelling in-flight requests");
    shutdown.cancel();
}
