//! Download → probe → encode → store, driven end-to-end for one operation.

use crate::error::PipelineError;
use crate::progress::Operation;
use crate::registry::Registry;
use crate::store::BlobStore;
use futures_util::StreamExt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Collaborators the pipeline needs injected rather than reached for via
/// process-wide globals (notably the HTTP client — see design notes on
/// avoiding the source's process-wide TLS-skip client).
#[derive(Clone)]
pub struct PipelineContext {
    pub http_client: reqwest::Client,
    pub output_dir: PathBuf,
    pub encoder_bin: String,
    pub probe_bin: String,
    pub callback_base_url: String,
}

/// Runs the full pipeline for `output_name`, registering and then
/// retiring an [`Operation`] in `registry` around the work.
#[allow(clippy::too_many_arguments)]
pub async fn transcode(
    registry: &Registry,
    store: &dyn BlobStore,
    ctx: &PipelineContext,
    output_name: &str,
    input_url: &str,
    output_opts: &[String],
    input_opts: &[String],
    cancel: CancellationToken,
) -> Result<(), PipelineError> {
    let guard = registry.begin(output_name.to_owned()).await;
    let operation = guard.operation().clone();

    let output_path = ctx.output_dir.join(output_name);
    let temp_path = ctx.output_dir.join(format!("{output_name}.input"));
    let log_path = ctx.output_dir.join(format!("{output_name}.log"));

    tokio::fs::create_dir_all(&ctx.output_dir).await?;

    let result = run_stages(
        &operation,
        ctx,
        input_url,
        output_opts,
        input_opts,
        output_name,
        &temp_path,
        &output_path,
        &log_path,
        store,
        cancel,
    )
    .await;

    let _ = tokio::fs::remove_file(&temp_path).await;

    if result.is_ok() {
        let _ = tokio::fs::remove_file(&output_path).await;
    }

    result
}

#[allow(clippy::too_many_arguments)]
async fn run_stages(
    operation: &Arc<Operation>,
    ctx: &PipelineContext,
    input_url: &str,
    output_opts: &[String],
    input_opts: &[String],
    output_name: &str,
    temp_path: &Path,
    output_path: &Path,
    log_path: &Path,
    store: &dyn BlobStore,
    cancel: CancellationToken,
) -> Result<(), PipelineError> {
    download(operation, ctx, input_url, temp_path, cancel.clone()).await?;

    spawn_probe(operation.clone(), ctx.probe_bin.clone(), temp_path.to_path_buf());

    encode(
        operation,
        ctx,
        temp_path,
        output_path,
        log_path,
        output_name,
        output_opts,
        input_opts,
        cancel.clone(),
    )
    .await?;

    store_artifact(operation, store, output_name, output_path, log_path).await?;
    let _ = tokio::fs::remove_file(log_path).await;

    Ok(())
}

async fn download(
    operation: &Arc<Operation>,
    ctx: &PipelineContext,
    input_url: &str,
    temp_path: &Path,
    cancel: CancellationToken,
) -> Result<(), PipelineError> {
    operation.begin_download().await;
    let outcome = download_inner(operation, ctx, input_url, temp_path, cancel).await;
    operation.end_download().await;
    if outcome.is_err() {
        let _ = tokio::fs::remove_file(temp_path).await;
    }
    outcome
}

async fn download_inner(
    operation: &Arc<Operation>,
    ctx: &PipelineContext,
    input_url: &str,
    temp_path: &Path,
    cancel: CancellationToken,
) -> Result<(), PipelineError> {
    let response = ctx
        .http_client
        .get(input_url)
        .send()
        .await
        .map_err(|source| PipelineError::Download {
            url: input_url.to_owned(),
            source,
        })?;
    if !response.status().is_success() {
        return Err(PipelineError::DownloadStatus {
            url: input_url.to_owned(),
            status: response.status(),
        });
    }
    let content_length = response.content_length();
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .truncate(true)
        .write(true)
        .open(temp_path)
        .await?;

    let mut stream = response.bytes_stream();
    let mut written: u64 = 0;
    loop {
        let chunk = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                return Err(PipelineError::Cancelled);
            }
            chunk = stream.next() => chunk,
        };
        let Some(chunk) = chunk else { break };
        let chunk = chunk.map_err(|source| PipelineError::Download {
            url: input_url.to_owned(),
            source,
        })?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
        if let Some(total) = content_length {
            if total > 0 {
                #[allow(clippy::cast_precision_loss)]
                let fraction = written as f64 / total as f64;
                operation.set_download_progress(fraction).await;
            }
        }
    }
    file.flush().await?;
    Ok(())
}

/// Fire-and-forget: probe failures are logged and never fail the
/// operation, matching the detached `go probeDurationSettingProgress(...)`
/// in the source.
fn spawn_probe(operation: Arc<Operation>, probe_bin: String, temp_path: PathBuf) {
    tokio::spawn(async move {
        operation.begin_probe().await;
        let duration = probe_duration(&probe_bin, &temp_path).await;
        if let Err(ref e) = duration {
            warn!(error = %e, "error probing duration");
        }
        operation.end_probe(duration.ok()).await;
    });
}

async fn probe_duration(probe_bin: &str, input: &Path) -> Result<Duration, std::io::Error> {
    let output = tokio::process::Command::new(probe_bin)
        .args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ])
        .arg(input)
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .output()
        .await?;
    let text = String::from_utf8_lossy(&output.stdout);
    let seconds: f64 = text.trim().parse().map_err(|_| {
        std::io::Error::new(std::io::ErrorKind::InvalidData, "unparseable probe output")
    })?;
    Ok(Duration::from_secs_f64(seconds.max(0.0)))
}

#[allow(clippy::too_many_arguments)]
async fn encode(
    operation: &Arc<Operation>,
    ctx: &PipelineContext,
    temp_path: &Path,
    output_path: &Path,
    log_path: &Path,
    output_name: &str,
    output_opts: &[String],
    input_opts: &[String],
    cancel: CancellationToken,
) -> Result<(), PipelineError> {
    let args = crate::encoder_args(
        &ctx.encoder_bin,
        &ctx.callback_base_url,
        output_name,
        temp_path,
        output_path,
        output_opts,
        input_opts,
    );
    let (program, rest) = args.split_first().ok_or(PipelineError::EncoderNotFound)?;

    let log_file = std::fs::File::create(log_path)?;
    let mut command = tokio::process::Command::new(program);
    command
        .args(rest)
        .stderr(Stdio::from(log_file))
        .kill_on_drop(true);

    operation.begin_convert().await;
    let mut child = command.spawn().map_err(|_| PipelineError::EncoderNotFound)?;
    info!(output_name, ?args, "invoking encoder");

    let status = tokio::select! {
        biased;
        () = cancel.cancelled() => {
            let _ = child.kill().await;
            operation.end_convert().await;
            return Err(PipelineError::Cancelled);
        }
        status = child.wait() => status?,
    };
    operation.end_convert().await;

    if !status.success() {
        return Err(PipelineError::Encode {
            status: status.code(),
        });
    }
    Ok(())
}

async fn store_artifact(
    operation: &Arc<Operation>,
    store: &dyn BlobStore,
    output_name: &str,
    output_path: &Path,
    log_path: &Path,
) -> Result<(), PipelineError> {
    operation.begin_store().await;
    let outcome = store_artifact_inner(operation, store, output_name, output_path).await;
    operation.end_store().await;

    // Best-effort: cache the encoder log too, in practice only ever
    // present after a failed run since a success path removes it, but the
    // contract is simply "attempt to store it".
    if let Ok(mut log) = tokio::fs::File::open(log_path).await {
        if let Ok(instance) = store.instance(&format!("{output_name}.log")).await {
            if let Err(e) = instance.put(&mut log).await {
                warn!(error = %e, "failed to cache encoder log");
            }
        }
    }

    outcome
}

async fn store_artifact_inner(
    operation: &Arc<Operation>,
    store: &dyn BlobStore,
    output_name: &str,
    output_path: &Path,
) -> Result<(), PipelineError> {
    let mut file = tokio::fs::File::open(output_path).await?;
    let total = file.metadata().await?.len();
    let instance = store.instance(output_name).await?;
    if total == 0 {
        instance.put(&mut file).await?;
        return Ok(());
    }
    let mut counting = CountingReader {
        inner: file,
        read: 0,
        total,
        operation: operation.clone(),
    };
    instance.put(&mut counting).await?;
    Ok(())
}

struct CountingReader {
    inner: tokio::fs::File,
    read: u64,
    total: u64,
    operation: Arc<Operation>,
}

impl tokio::io::AsyncRead for CountingReader {
    fn poll_read(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &mut tokio::io::ReadBuf<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        let before = buf.filled().len();
        let poll = std::pin::Pin::new(&mut self.inner).poll_read(cx, buf);
        if let std::task::Poll::Ready(Ok(())) = &poll {
            let after = buf.filled().len();
            let advanced = (after - before) as u64;
            if advanced > 0 {
                self.read += advanced;
                #[allow(clippy::cast_precision_loss)]
                let fraction = self.read as f64 / self.total as f64;
                let operation = self.operation.clone();
                tokio::spawn(async move { operation.set_store_progress(fraction).await });
            }
        }
        poll
    }
}
