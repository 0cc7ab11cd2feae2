//! Deterministic naming of transcode artifacts.
//!
//! The fingerprint is a 128-bit digest over the ordered tuple of
//! (input options, output options, canonicalized input URL), hex-encoded
//! with the requested output format as an extension. Segment order
//! matters to the hash; `["h","el","lo"]` must not collide with
//! `["hello"]`.

use sha2::{Digest, Sha256};

const FINGERPRINT_BYTES: usize = 16;

/// Canonicalizes a caller-supplied input URL for fingerprinting.
///
/// If the string fails to parse as a URL, or parses with an empty scheme,
/// it is returned unchanged — fingerprinting then proceeds over the raw
/// string, which is still deterministic. Otherwise the query string is
/// re-serialized from the parsed key/value pairs, preserving their
/// original order (this is what makes the operation idempotent: encoding
/// already-decoded pairs can't introduce new escaping that changes on a
/// second pass).
pub fn canonicalize_url(raw: &str) -> String {
    let Ok(parsed) = url::Url::parse(raw) else {
        return raw.to_owned();
    };
    if parsed.scheme().is_empty() {
        return raw.to_owned();
    }
    let pairs: Vec<(String, String)> = parsed
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    let mut out = parsed.clone();
    if pairs.is_empty() {
        out.set_query(None);
    } else {
        let mut ser = url::form_urlencoded::Serializer::new(String::new());
        for (k, v) in &pairs {
            ser.append_pair(k, v);
        }
        out.set_query(Some(&ser.finish()));
    }
    out.to_string()
}

/// Feeds segments into a single digest such that segmentation is itself
/// part of the hash input: before absorbing each segment, the prior
/// digest snapshot is re-absorbed, so `["h","el","lo"]` and `["hello"]`
/// produce different digests even though their concatenation is equal.
fn hash_segments(segments: &[&str]) -> [u8; 32] {
    let mut prior: Vec<u8> = Vec::new();
    let mut out = [0u8; 32];
    for segment in segments {
        let mut hasher = Sha256::new();
        hasher.update(&prior);
        hasher.update(segment.as_bytes());
        out = hasher.finalize().into();
        prior = out.to_vec();
    }
    out
}

/// Computes the output name (`hex(fingerprint).<format>`) for a request.
///
/// Segments are absorbed in the order `input_opts, output_opts, url` —
/// matching the call site in the original service, where the hash is
/// computed over `iopts ++ opts ++ [url]`.
pub fn output_name(
    input_url: &str,
    output_opts: &[String],
    input_opts: &[String],
    format: &str,
) -> String {
    let canonical = canonicalize_url(input_url);
    let mut segments: Vec<&str> = Vec::with_capacity(input_opts.len() + output_opts.len() + 1);
    segments.extend(input_opts.iter().map(String::as_str));
    segments.extend(output_opts.iter().map(String::as_str));
    segments.push(&canonical);
    let digest = hash_segments(&segments);
    format!("{}.{}", hex::encode(&digest[..FINGERPRINT_BYTES]), format)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segmentation_changes_the_hash() {
        let parts = output_name("", &[], &["h".into(), "el".into(), "lo".into()], "mp4");
        let one = output_name("", &[], &["hello".into()], "mp4");
        assert_ne!(parts, one);
    }

    #[test]
    fn output_name_has_expected_hash_length() {
        let name = output_name("http://x.test/a", &[], &[], "mp4");
        let (hex_part, ext) = name.split_once('.').unwrap();
        assert_eq!(hex_part.len(), FINGERPRINT_BYTES * 2);
        assert_eq!(ext, "mp4");
    }

    #[test]
    fn output_name_is_deterministic() {
        let opts = vec!["-c:v".to_owned(), "libx264".to_owned()];
        let a = output_name("http://x.test/a", &opts, &[], "mp4");
        let b = output_name("http://x.test/a", &opts, &[], "mp4");
        assert_eq!(a, b);
    }

    #[test]
    fn differing_option_order_changes_the_hash() {
        let a = output_name(
            "http://x.test/a",
            &["-b:v".into(), "1M".into()],
            &[],
            "mp4",
        );
        let b = output_name(
            "http://x.test/a",
            &["1M".into(), "-b:v".into()],
            &[],
            "mp4",
        );
        assert_ne!(a, b);
    }

    #[test]
    fn canonicalize_passes_through_unparseable_or_schemeless_strings() {
        assert_eq!(canonicalize_url("not a url"), "not a url");
        assert_eq!(canonicalize_url("/just/a/path"), "/just/a/path");
    }

    #[test]
    fn canonicalize_reencodes_query_preserving_decoded_values() {
        let raw = "http://example.test/file?path=Season%204%2fEpisode%2011";
        let once = canonicalize_url(raw);
        let twice = canonicalize_url(&once);
        assert_eq!(once, twice, "canonicalization must be idempotent");

        let decoded_once = url::Url::parse(&once)
            .unwrap()
            .query_pairs()
            .find(|(k, _)| k == "path")
            .map(|(_, v)| v.into_owned());
        let decoded_original = url::Url::parse(raw)
            .unwrap()
            .query_pairs()
            .find(|(k, _)| k == "path")
            .map(|(_, v)| v.into_owned());
        assert_eq!(decoded_once, decoded_original);
    }
}
