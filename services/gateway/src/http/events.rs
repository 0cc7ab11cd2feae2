use crate::query::parse_fetch_query;
use crate::state::AppState;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::Uri;
use axum::response::IntoResponse;
use std::time::Duration;
use transcode_core::{output_name, Progress};

/// `GET /events?i=...&f=...&opt=...&iopt=...` — upgrades to a websocket
/// and streams progress snapshots for one output name.
pub async fn events(ws: WebSocketUpgrade, State(state): State<AppState>, uri: Uri) -> impl IntoResponse {
    let query = parse_fetch_query(uri.query().unwrap_or_default());
    let name = output_name(
        &query.input_url,
        &query.output_opts,
        &query.input_opts,
        &query.format,
    );
    ws.on_upgrade(move |socket| stream_progress(socket, state, name))
}

async fn stream_progress(mut socket: WebSocket, state: AppState, name: String) {
    let mut subscription = state.registry.bus().subscribe();

    if !write_snapshot(&mut socket, &state, &name).await {
        return;
    }

    loop {
        match subscription.recv().await {
            Ok(()) | Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {}
            Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
        }
        // Coalesce: drop any further pending wakeups before writing, so a
        // burst of updates produces one snapshot, not one per event.
        while subscription.try_recv().is_ok() {}
        if !write_snapshot(&mut socket, &state, &name).await {
            return;
        }
        tokio::select! {
            () = tokio::time::sleep(Duration::from_millis(100)) => {}
            event = subscription.recv() => {
                if matches!(event, Err(tokio::sync::broadcast::error::RecvError::Closed)) {
                    return;
                }
            }
        }
    }
}

async fn snapshot_for(state: &AppState, name: &str) -> Progress {
    if let Ok(instance) = state.store.instance(name).await {
        if instance.exists().await {
            return Progress::ready();
        }
    }
    match state.registry.get(name).await {
        Some(operation) => operation.snapshot().await,
        None => Progress::default(),
    }
}

async fn write_snapshot(socket: &mut WebSocket, state: &AppState, name: &str) -> bool {
    let snapshot = snapshot_for(state, name).await;
    let Ok(json) = snapshot.to_json() else {
        return true; // non-finite float — skip this write, try again next event
    };
    socket.send(Message::Text(json.into())).await.is_ok()
}
