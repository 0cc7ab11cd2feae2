use crate::store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("error downloading {url}: {source}")]
    Download {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("error downloading {url}: got status {status}")]
    DownloadStatus {
        url: String,
        status: reqwest::StatusCode,
    },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("encoder exited with status {status:?}")]
    Encode { status: Option<i32> },
    #[error("encoder binary not found")]
    EncoderNotFound,
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("operation cancelled")]
    Cancelled,
}
