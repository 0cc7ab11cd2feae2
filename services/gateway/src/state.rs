use std::sync::Arc;
use transcode_core::{BlobStore, PipelineContext, Registry, SingleFlight};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn BlobStore>,
    pub registry: Registry,
    pub singleflight: SingleFlight<()>,
    pub pipeline_ctx: PipelineContext,
}
