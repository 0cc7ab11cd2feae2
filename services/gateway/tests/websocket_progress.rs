//! End-to-end test of the progress websocket: a subscriber connects before
//! any producer activity, then observes a monotonically-progressing
//! sequence of snapshots ending in `ready: true` once the blob store holds
//! the finished artifact.

use futures_util::StreamExt;
use gateway::state::AppState;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio_tungstenite::tungstenite::Message;
use transcode_core::{EventBus, FsBlobStore, PipelineContext, Registry, SingleFlight};

async fn spawn_gateway() -> (String, AppState, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FsBlobStore::new(dir.path().to_path_buf()));
    let registry = Registry::new(EventBus::new());
    let state = AppState {
        store,
        registry,
        singleflight: SingleFlight::new(),
        pipeline_ctx: PipelineContext {
            http_client: reqwest::Client::new(),
            output_dir: dir.path().to_path_buf(),
            encoder_bin: "ffmpeg".to_owned(),
            probe_bin: "ffprobe".to_owned(),
            callback_base_url: "http://127.0.0.1:0".to_owned(),
        },
    };

    let router = gateway::build_router(state.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    (format!("127.0.0.1:{}", addr.port()), state, dir)
}

/// Index into the pipeline's stage order, for checking that observed
/// snapshots never regress to an earlier stage.
fn stage(snapshot: &serde_json::Value) -> u8 {
    if snapshot["ready"] == true {
        return 4;
    }
    if snapshot["storing"] == true {
        return 3;
    }
    if snapshot["converting"] == true {
        return 2;
    }
    if snapshot["downloading"] == true {
        return 1;
    }
    0
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn subscriber_present_before_producer_sees_monotonic_progress_to_ready() {
    let (addr, state, _dir) = spawn_gateway().await;
    let input_url = "http://source.test/movie.mkv";
    let format = "mp4";
    let output_name = transcode_core::output_name(input_url, &[], &[], format);

    let ws_url = format!("ws://{addr}/events?i={input_url}&f={format}");
    let (mut socket, _) = tokio_tungstenite::connect_async(ws_url).await.unwrap();

    // First snapshot: nothing has started yet.
    let first = next_json(&mut socket).await;
    assert_eq!(stage(&first), 0);
    assert_eq!(first["downloading"], false);

    // Now the producer drives the operation through every stage, exactly
    // as the pipeline would — without reading between individual calls,
    // since the websocket loop coalesces bursts of updates into a single
    // snapshot rather than emitting one message per state change.
    let guard = state.registry.begin(output_name.clone()).await;
    guard.operation().begin_download().await;
    guard.operation().set_download_progress(0.5).await;
    guard.operation().end_download().await;
    guard.operation().begin_convert().await;
    guard.operation().set_convert_pos(Duration::from_secs(3)).await;
    guard.operation().end_convert().await;
    guard.operation().begin_store().await;
    guard.operation().set_store_progress(0.9).await;
    guard.operation().end_store().await;

    // The pipeline finishes: write the artifact to the blob store, then
    // drop the registry guard, matching what `pipeline::transcode` does on
    // success.
    state
        .store
        .instance(&output_name)
        .await
        .unwrap()
        .put(&mut std::io::Cursor::new(b"fake-artifact".to_vec()).take(13))
        .await
        .unwrap();
    drop(guard);

    // Collect snapshots until `ready: true` arrives, asserting the
    // observed stage sequence never regresses.
    let mut last_stage = 0u8;
    let ready = loop {
        let snapshot = next_json(&mut socket).await;
        let s = stage(&snapshot);
        assert!(
            s >= last_stage,
            "progress regressed from stage {last_stage} to {s}: {snapshot}"
        );
        last_stage = s;
        if s == 4 {
            break snapshot;
        }
    };
    assert_eq!(ready["ready"], true);
    assert_eq!(ready["downloading"], false);
    assert_eq!(ready["converting"], false);
    assert_eq!(ready["storing"], false);
}

async fn next_json(
    socket: &mut tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
) -> serde_json::Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("timed out waiting for a progress message")
            .expect("socket closed unexpectedly")
            .expect("websocket protocol error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).unwrap();
        }
    }
}
