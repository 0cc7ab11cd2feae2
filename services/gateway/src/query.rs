//! Query-string parsing for the fetch and events endpoints.
//!
//! `serde`'s usual `Query<T>` extractor collapses repeated keys
//! unpredictably, and `opt`/`iopt` order is part of the fingerprint input
//! — so this is a small hand-rolled parse over the raw query string
//! instead.

pub struct FetchQuery {
    pub input_url: String,
    pub format: String,
    pub output_opts: Vec<String>,
    pub input_opts: Vec<String>,
}

pub fn parse_fetch_query(raw_query: &str) -> FetchQuery {
    let mut input_url = String::new();
    let mut format = String::new();
    let mut output_opts = Vec::new();
    let mut input_opts = Vec::new();

    for (key, value) in url::form_urlencoded::parse(raw_query.as_bytes()) {
        match key.as_ref() {
            "i" => input_url = value.into_owned(),
            "f" => format = value.into_owned(),
            "opt" => output_opts.push(value.into_owned()),
            "iopt" => input_opts.push(value.into_owned()),
            _ => {}
        }
    }

    FetchQuery {
        input_url,
        format,
        output_opts,
        input_opts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_opt_and_iopt_preserve_order() {
        let q = parse_fetch_query("i=http://x.test/a&f=mp4&opt=-c:v&opt=libx264&iopt=-ss&iopt=10");
        assert_eq!(q.input_url, "http://x.test/a");
        assert_eq!(q.format, "mp4");
        assert_eq!(q.output_opts, vec!["-c:v", "libx264"]);
        assert_eq!(q.input_opts, vec!["-ss", "10"]);
    }

    #[test]
    fn missing_fields_default_to_empty() {
        let q = parse_fetch_query("");
        assert!(q.input_url.is_empty());
        assert!(q.output_opts.is_empty());
    }
}
