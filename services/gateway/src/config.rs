//! Startup configuration, read once from the environment.

use std::path::PathBuf;

pub struct Config {
    pub bind_addr: String,
    pub output_dir: PathBuf,
    pub encoder_bin: String,
    pub probe_bin: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            bind_addr: std::env::var("GATEWAY_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_owned()),
            output_dir: std::env::var("GATEWAY_OUTPUT_DIR")
                .map_or_else(|_| std::env::temp_dir().join("transcode-gateway"), PathBuf::from),
            encoder_bin: std::env::var("GATEWAY_ENCODER_BIN").unwrap_or_else(|_| "ffmpeg".to_owned()),
            probe_bin: std::env::var("GATEWAY_PROBE_BIN").unwrap_or_else(|_| "ffprobe".to_owned()),
        }
    }
}
