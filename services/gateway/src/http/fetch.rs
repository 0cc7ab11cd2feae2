use super::range::serve_ranged;
use crate::query::parse_fetch_query;
use crate::state::AppState;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use tokio_util::sync::CancellationToken;
use tracing::error;
use transcode_core::output_name;

/// `GET /?i=<url>&f=<fmt>&opt=<o1>&...&iopt=<...>`
///
/// Serves the artifact directly if it already exists; otherwise
/// coalesces concurrent producers via single-flight and runs the
/// pipeline. On pipeline success the store is re-checked exactly once —
/// if it is still missing, this fails closed with a 500 instead of
/// looping forever (see design notes on the source's retry-loop bug).
pub async fn fetch(State(state): State<AppState>, uri: Uri, headers: HeaderMap) -> Response {
    let query = parse_fetch_query(uri.query().unwrap_or_default());
    let name = output_name(
        &query.input_url,
        &query.output_opts,
        &query.input_opts,
        &query.format,
    );

    if let Some(response) = try_serve(&state, &name, &headers).await {
        return response;
    }

    // Tied to this handler's own stack frame rather than the production
    // itself (which single-flight may run detached from any one caller):
    // if this request is the single-flight winner and its connection
    // drops mid-transcode, dropping this guard cancels the subprocess and
    // download it started, per the design's "cancel the request" contract.
    let cancel = CancellationToken::new();
    let _cancel_guard = CancelOnDrop(cancel.clone());

    let run = {
        let state = state.clone();
        let name = name.clone();
        let input_url = query.input_url.clone();
        let output_opts = query.output_opts.clone();
        let input_opts = query.input_opts.clone();
        move || async move {
            transcode_core::transcode(
                &state.registry,
                state.store.as_ref(),
                &state.pipeline_ctx,
                &name,
                &input_url,
                &output_opts,
                &input_opts,
                cancel,
            )
            .await
            .map_err(|e| e.to_string())
        }
    };

    if let Err(e) = state.singleflight.call(&name, run).await {
        error!(output_name = %name, error = %e, "error transcoding");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    if let Some(response) = try_serve(&state, &name, &headers).await {
        return response;
    }
    error!(output_name = %name, "pipeline succeeded but artifact is still absent");
    StatusCode::INTERNAL_SERVER_ERROR.into_response()
}

/// Cancels the token when dropped, so a handler future torn down by a
/// client disconnect (axum drops it without running the rest of the
/// function) still signals the pipeline to stop.
struct CancelOnDrop(CancellationToken);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

async fn try_serve(state: &AppState, name: &str, headers: &HeaderMap) -> Option<Response> {
    let instance = state.store.instance(name).await.ok()?;
    if !instance.exists().await {
        return None;
    }
    Some(serve_ranged(instance.as_ref(), name, headers).await)
}
