#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use quantopt_core::{AppCore, QueueAction};
use quantopt_server::{config::ServerConfig, router::build_router};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing logger
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,quantopt_server=debug,quantopt_core=debug".into()),
        )
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .init();

    tracing::info!("Starting QuantOpt server");

    let config = ServerConfig::load()?;
    let core = Arc::new(AppCore::new(config.core_config()));

    if config.autostart {
        core.queue.control(QueueAction::Start);
    }

    let app = build_router(core.clone());
    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|err| anyhow::anyhow!("Failed to bind to {}: {}", addr, err))?;

    tracing::info!("QuantOpt running on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("HTTP server shutting down");
        })
        .await?;

    core.queue.control(QueueAction::Stop);
    Ok(())
}
