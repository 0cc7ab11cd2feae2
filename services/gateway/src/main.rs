use gateway::config::Config;
use gateway::state::AppState;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use transcode_core::{EventBus, FsBlobStore, PipelineContext, Registry, SingleFlight};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env();
    let registry = Registry::new(EventBus::new());

    let callback_addr = gateway::callback_server::spawn(registry.clone())
        .await
        .expect("failed to bind progress callback listener");
    info!(addr = %callback_addr, "progress callback listener bound");

    let pipeline_ctx = PipelineContext {
        http_client: reqwest::Client::new(),
        output_dir: config.output_dir.clone(),
        encoder_bin: config.encoder_bin.clone(),
        probe_bin: config.probe_bin.clone(),
        callback_base_url: format!("http://{callback_addr}"),
    };

    let state = AppState {
        store: Arc::new(FsBlobStore::new(config.output_dir.clone())),
        registry,
        singleflight: SingleFlight::new(),
        pipeline_ctx,
    };

    let router = gateway::build_router(state);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("failed to bind");
    info!(addr = %config.bind_addr, "gateway listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");
    info!("gateway shut down gracefully");
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { info!("received Ctrl+C, shutting down"); },
        () = terminate => { info!("received SIGTERM, shutting down"); },
    }
}
