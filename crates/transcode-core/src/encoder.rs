//! Builds the encoder subprocess argument vector.

use std::path::Path;

/// Builds `[nice?, encoder, "-hide_banner", <iopts...>, "-i", <input>,
/// <opts...>, "-progress", <listener-url>, "-y", <output>]`.
///
/// Input-options precede `-i`; output-options follow it and precede
/// `-progress`. The `nice` prefix is included only when it resolves on
/// `PATH` (absent on platforms without it, notably Windows).
#[allow(clippy::too_many_arguments)]
pub fn encoder_args(
    encoder_bin: &str,
    callback_base_url: &str,
    output_name: &str,
    input_path: &Path,
    output_path: &Path,
    output_opts: &[String],
    input_opts: &[String],
) -> Vec<String> {
    let mut args = Vec::new();
    if which::which("nice").is_ok() {
        args.push("nice".to_owned());
    }
    args.push(encoder_bin.to_owned());
    args.push("-hide_banner".to_owned());
    args.extend(input_opts.iter().cloned());
    args.push("-i".to_owned());
    args.push(input_path.display().to_string());
    args.extend(output_opts.iter().cloned());
    args.push("-progress".to_owned());
    args.push(format!("{callback_base_url}/?id={output_name}"));
    args.push("-y".to_owned());
    args.push(output_path.display().to_string());
    args
}
