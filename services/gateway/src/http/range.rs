//! Serves a [`transcode_core::BlobInstance`]'s contents with full HTTP
//! byte-range semantics — single range only, matching the reference
//! service's reliance on `http.ServeContent`, which has the same limit.

use axum::body::Body;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use transcode_core::BlobInstance;

pub async fn serve_ranged(
    instance: &dyn BlobInstance,
    output_name: &str,
    headers: &HeaderMap,
) -> Response {
    let Some(mut reader) = instance.open_range_reader().await else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let Ok(total) = reader.seek(std::io::SeekFrom::End(0)).await else {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    };

    let range = headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| parse_range(v, total));

    let content_type = mime_guess_from_name(output_name);

    match range {
        None => {
            if reader.seek(std::io::SeekFrom::Start(0)).await.is_err() {
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }
            let stream = tokio_util::io::ReaderStream::new(reader);
            (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, content_type),
                    (header::ACCEPT_RANGES, "bytes".to_owned()),
                    (header::CONTENT_LENGTH, total.to_string()),
                ],
                Body::from_stream(stream),
            )
                .into_response()
        }
        Some((start, end)) if start <= end && end < total => {
            if reader.seek(std::io::SeekFrom::Start(start)).await.is_err() {
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }
            let len = end - start + 1;
            let limited = reader.take(len);
            let stream = tokio_util::io::ReaderStream::new(limited);
            (
                StatusCode::PARTIAL_CONTENT,
                [
                    (header::CONTENT_TYPE, content_type),
                    (header::ACCEPT_RANGES, "bytes".to_owned()),
                    (header::CONTENT_LENGTH, len.to_string()),
                    (
                        header::CONTENT_RANGE,
                        format!("bytes {start}-{end}/{total}"),
                    ),
                ],
                Body::from_stream(stream),
            )
                .into_response()
        }
        Some(_) => {
            (
                StatusCode::RANGE_NOT_SATISFIABLE,
                [(header::CONTENT_RANGE, format!("bytes */{total}"))],
            )
                .into_response()
        }
    }
}

/// Parses a single-range `Range: bytes=start-end` header. Multi-range
/// requests and malformed headers fall back to serving the whole body
/// (`None`), matching `http.ServeContent`'s handling of anything it can't
/// satisfy as a single range.
fn parse_range(header_value: &str, total: u64) -> Option<(u64, u64)> {
    let spec = header_value.strip_prefix("bytes=")?;
    if spec.contains(',') {
        return None;
    }
    let (start_str, end_str) = spec.split_once('-')?;
    if start_str.is_empty() {
        let suffix_len: u64 = end_str.parse().ok()?;
        if suffix_len == 0 || total == 0 {
            return None;
        }
        let start = total.saturating_sub(suffix_len);
        return Some((start, total - 1));
    }
    let start: u64 = start_str.parse().ok()?;
    let end = if end_str.is_empty() {
        total.saturating_sub(1)
    } else {
        end_str.parse().ok()?
    };
    Some((start, end))
}

fn mime_guess_from_name(output_name: &str) -> String {
    match output_name.rsplit('.').next() {
        Some("mp4") => "video/mp4",
        Some("webm") => "video/webm",
        Some("mkv") => "video/x-matroska",
        Some("mp3") => "audio/mpeg",
        Some("m4a") => "audio/mp4",
        _ => "application/octet-stream",
    }
    .to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_start_end_and_open_ended_ranges() {
        assert_eq!(parse_range("bytes=0-99", 1000), Some((0, 99)));
        assert_eq!(parse_range("bytes=500-", 1000), Some((500, 999)));
        assert_eq!(parse_range("bytes=-100", 1000), Some((900, 999)));
    }

    #[test]
    fn rejects_multi_range_and_malformed_headers() {
        assert_eq!(parse_range("bytes=0-10,20-30", 1000), None);
        assert_eq!(parse_range("nonsense", 1000), None);
    }

    #[test]
    fn mime_guess_covers_known_video_extensions() {
        assert_eq!(mime_guess_from_name("abc.mp4"), "video/mp4");
        assert_eq!(mime_guess_from_name("abc.unknown"), "application/octet-stream");
    }
}
