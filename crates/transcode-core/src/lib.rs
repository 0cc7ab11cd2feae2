//! Core of the transcoding gateway: a content-addressed cache keyed by a
//! fingerprint of the request, a single-flight coordinator guaranteeing
//! at-most-one concurrent production per fingerprint, a cooperative
//! download/probe/encode/store pipeline, and a progress bus that
//! multiplexes state changes to websocket subscribers.

pub mod bus;
pub mod callback;
pub mod encoder;
pub mod error;
pub mod fingerprint;
pub mod pipeline;
pub mod progress;
pub mod registry;
pub mod singleflight;
pub mod store;

pub use bus::EventBus;
pub use encoder::encoder_args;
pub use error::PipelineError;
pub use fingerprint::{canonicalize_url, output_name};
pub use pipeline::{transcode, PipelineContext};
pub use progress::{Operation, Progress};
pub use registry::Registry;
pub use singleflight::SingleFlight;
pub use store::{BlobInstance, BlobStore, FsBlobStore, StoreError};
