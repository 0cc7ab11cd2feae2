pub mod callback_server;
pub mod config;
pub mod http;
pub mod query;
pub mod state;

use axum::routing::get;
use axum::Router;
use state::AppState;
use tower_http::trace::TraceLayer;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(http::fetch::fetch))
        .route("/events", get(http::events::events))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
