use std::env;
use std::sync::Arc;

use tokio::sync::broadcast;

use kiln_rs::config;
use kiln_rs::hardware::GpioBackend;
use kiln_rs::time::SystemClock;
use kiln_rs::{web, FurnaceController};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    tracing::info!("Starting kiln-rs furnace controller");
    tracing::info!("Version: {}", env!("CARGO_PKG_VERSION"));

    // Get configuration file path
    let args: Vec<String> = env::args().collect();
    let config_path = if args.len() > 1 {
        args[1].as_str()
    } else {
        "furnace.toml"
    };

    let config = if std::path::Path::new(config_path).exists() {
        tracing::info!("Loading configuration from: {}", config_path);
        config::load_config(config_path).map_err(|e| {
            tracing::error!("Failed to load config from '{}': {}", config_path, e);
            Box::new(e) as Box<dyn std::error::Error + Send + Sync + 'static>
        })?
    } else {
        tracing::warn!("Config file '{}' not found, using defaults", config_path);
        config::Config::default()
    };

    tracing::info!(
        "Tick period: {} ms, heater pin {}, web bind {}",
        config.furnace.tick_period().as_millis(),
        config.pins.heater,
        config.web.bind
    );

    // Probe the board; no GPIO means simulation mode, not a startup failure.
    let backend = GpioBackend::probe();

    let (controller, handle) =
        FurnaceController::new(config.clone(), backend, Arc::new(SystemClock))?;

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let controller_task = tokio::spawn(controller.run(shutdown_tx.subscribe()));

    // The HTTP boundary is a thin adapter over the command mailbox.
    let app = web::api::create_router(handle);
    let listener = tokio::net::TcpListener::bind(&config.web.bind).await?;
    tracing::info!("Web API listening on http://{}", listener.local_addr()?);
    let server_task = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("Web server error: {}", e);
        }
    });

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown requested");

    // Stop intake first, then the control loop; the controller drives every
    // output safe before it exits.
    server_task.abort();
    let _ = shutdown_tx.send(());
    let _ = controller_task.await;

    tracing::info!("Shutdown complete");
    Ok(())
}
