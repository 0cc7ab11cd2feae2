//! Loopback HTTP endpoint the encoder subprocess posts progress lines to.
//!
//! Bound to an OS-assigned port at startup; its address is embedded in
//! the `-progress` argument the pipeline passes to `ffmpeg`.

use axum::extract::{Query, State};
use axum::routing::post;
use axum::Router;
use serde::Deserialize;
use std::net::SocketAddr;
use transcode_core::Registry;

#[derive(Deserialize)]
struct CallbackQuery {
    id: String,
}

async fn handle(
    State(registry): State<Registry>,
    Query(query): Query<CallbackQuery>,
    body: String,
) -> axum::http::StatusCode {
    transcode_core::callback::apply_body(&registry, &query.id, &body).await;
    axum::http::StatusCode::OK
}

/// Binds a loopback listener and returns its address (for use in the
/// `-progress` URL) together with a future that serves it forever.
pub async fn spawn(registry: Registry) -> std::io::Result<SocketAddr> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let router = Router::new().route("/", post(handle)).with_state(registry);
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            tracing::error!(error = %e, "progress callback listener exited");
        }
    });
    Ok(addr)
}
