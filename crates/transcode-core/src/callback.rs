//! Parsing for the encoder's `-progress` callback stream.
//!
//! The encoder POSTs a body of `key=value` lines per frame, terminated by
//! a `progress=continue` (mid-stream) or `progress=end` (EOF) sentinel.
//! Only `out_time_ms` and the `progress` sentinel are interpreted; every
//! other key is reserved and ignored.

use crate::registry::Registry;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, PartialEq, Eq)]
pub enum ProgressLine<'a> {
    OutTimeMs(&'a str),
    Sentinel,
    Other { key: &'a str },
}

pub fn parse_line(line: &str) -> Option<ProgressLine<'_>> {
    let (key, value) = line.split_once('=')?;
    Some(match key {
        "progress" => ProgressLine::Sentinel,
        "out_time_ms" => ProgressLine::OutTimeMs(value),
        other => ProgressLine::Other { key: other },
    })
}

/// `out_time_ms` is signed integer microseconds. An empty string parses
/// as zero with no error (the encoder emits this before the first
/// frame); a non-empty but unparseable value logs a warning and leaves
/// `convert_pos` unchanged, rather than silently resetting it to zero as
/// the source's swallowed-error path did.
pub fn parse_out_time_ms(value: &str, operation_id: &str) -> Option<Duration> {
    if value.is_empty() {
        return Some(Duration::ZERO);
    }
    match value.parse::<i64>() {
        Ok(micros) => Some(Duration::from_micros(u64::try_from(micros).unwrap_or(0))),
        Err(e) => {
            warn!(operation_id, error = %e, "error parsing out_time_ms");
            None
        }
    }
}

/// Routes one parsed line from the encoder's callback body to the named
/// operation in `registry`. A missing operation (already finished, or a
/// callback racing cleanup) is a silent no-op.
pub async fn apply_line(registry: &Registry, operation_id: &str, line: &str) {
    let Some(parsed) = parse_line(line) else {
        return;
    };
    let Some(operation) = registry.get(operation_id).await else {
        return;
    };
    match parsed {
        ProgressLine::Sentinel => operation.nudge(),
        ProgressLine::OutTimeMs(value) => {
            if let Some(pos) = parse_out_time_ms(value, operation_id) {
                operation.set_convert_pos(pos).await;
            }
        }
        ProgressLine::Other { key } => debug!(operation_id, key, "ignoring reserved progress key"),
    }
}

/// Processes a full POST body (one `key=value` line per record).
pub async fn apply_body(registry: &Registry, operation_id: &str, body: &str) {
    for line in body.lines() {
        apply_line(registry, operation_id, line).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_the_three_line_shapes() {
        assert_eq!(parse_line("progress=continue"), Some(ProgressLine::Sentinel));
        assert_eq!(parse_line("progress=end"), Some(ProgressLine::Sentinel));
        assert_eq!(
            parse_line("out_time_ms=1500000"),
            Some(ProgressLine::OutTimeMs("1500000"))
        );
        assert_eq!(
            parse_line("frame=42"),
            Some(ProgressLine::Other { key: "frame" })
        );
        assert_eq!(parse_line("no-equals-sign"), None);
    }

    #[test]
    fn empty_out_time_ms_parses_as_zero() {
        assert_eq!(parse_out_time_ms("", "id"), Some(Duration::ZERO));
    }

    #[test]
    fn malformed_out_time_ms_returns_none_rather_than_zero() {
        assert_eq!(parse_out_time_ms("not-a-number", "id"), None);
    }

    #[test]
    fn valid_out_time_ms_converts_microseconds_to_duration() {
        assert_eq!(
            parse_out_time_ms("2000000", "id"),
            Some(Duration::from_secs(2))
        );
    }

    #[tokio::test]
    async fn apply_line_on_a_missing_operation_is_a_silent_no_op() {
        let registry = Registry::new(crate::bus::EventBus::new());
        apply_line(&registry, "nonexistent", "progress=continue").await;
    }

    #[tokio::test]
    async fn apply_body_updates_convert_pos_and_nudges_on_sentinel() {
        let registry = Registry::new(crate::bus::EventBus::new());
        let guard = registry.begin("op1".to_owned()).await;
        apply_body(
            &registry,
            "op1",
            "frame=10\nout_time_ms=3000000\nprogress=continue\n",
        )
        .await;
        assert_eq!(
            guard.operation().snapshot().await.convert_pos,
            Duration::from_secs(3)
        );
    }
}
