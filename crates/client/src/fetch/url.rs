//! URL normalization: pick the URL out of user input and strip tracking noise.

use std::sync::LazyLock;

use regex::Regex;

/// Error type for URL normalization failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UrlError {
    #[error("empty URL")]
    Empty,

    #[error("no http(s) URL found in input")]
    NotFound,

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

static URL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)https?://[^\s<>"`]+"#).expect("invalid URL pattern"));

/// Query keys removed outright.
pub const TRACKING_PARAMS: &[&str] = &[
    "fbclid",
    "gclid",
    "gclsrc",
    "dclid",
    "msclkid",
    "yclid",
    "twclid",
    "igshid",
    "mc_cid",
    "mc_eid",
    "_ga",
    "_gl",
    "_hsenc",
    "_hsmi",
    "mkt_tok",
    "ref_src",
    "s_cid",
    "vero_id",
    "oly_anon_id",
    "oly_enc_id",
    "wickedid",
];

/// Query key prefixes removed outright.
pub const TRACKING_PREFIXES: &[&str] = &["utm_"];

/// Whether a query key is a known tracking parameter.
pub fn is_tracking_param(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    TRACKING_PARAMS.contains(&key.as_str()) || TRACKING_PREFIXES.iter().any(|p| key.starts_with(p))
}

/// Normalize user input into a fetchable URL.
///
/// Steps:
/// 1. Find the first `http(s)://` substring in the input
/// 2. Parse it (host is lowercased by the parser)
/// 3. Drop known tracking query parameters
/// 4. Drop the fragment
///
/// The query string is only re-encoded when a parameter was removed, which
/// keeps `normalize(normalize(x)) == normalize(x)`.
pub fn normalize(input: &str) -> Result<url::Url, UrlError> {
    let trimmed = input.trim();

    if trimmed.is_empty() {
        return Err(UrlError::Empty);
    }

    let candidate = URL_PATTERN.find(trimmed).ok_or(UrlError::NotFound)?.as_str();

    let mut parsed = url::Url::parse(candidate).map_err(|e| UrlError::InvalidUrl(e.to_string()))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlError::UnsupportedScheme(scheme.to_string())),
    }

    if parsed.host_str().is_none_or(str::is_empty) {
        return Err(UrlError::InvalidUrl("missing host".into()));
    }

    strip_tracking_params(&mut parsed);
    parsed.set_fragment(None);

    Ok(parsed)
}

/// Remove tracking parameters in place, preserving the order of the rest.
pub fn strip_tracking_params(url: &mut url::Url) {
    if url.query().is_none() {
        return;
    }

    let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
    let kept: Vec<&(String, String)> = pairs.iter().filter(|(k, _)| !is_tracking_param(k)).collect();

    if kept.len() == pairs.len() {
        return;
    }

    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut()
            .clear()
            .extend_pairs(kept.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_basic() {
        let url = normalize("https://example.com").unwrap();
        assert_eq!(url.scheme(), "https");
        assert_eq!(url.host_str(), Some("example.com"));
    }

    #[test]
    fn test_normalize_extracts_first_url_from_text() {
        let url = normalize("Check this out https://example.com/post and http://other.com").unwrap();
        assert_eq!(url.as_str(), "https://example.com/post");
    }

    #[test]
    fn test_normalize_lowercase_host() {
        let url = normalize("HTTPS://EXAMPLE.COM/Path").unwrap();
        assert_eq!(url.host_str(), Some("example.com"));
        assert_eq!(url.path(), "/Path");
    }

    #[test]
    fn test_normalize_remove_fragment() {
        let url = normalize("https://example.com#section").unwrap();
        assert_eq!(url.fragment(), None);
        assert_eq!(url.path(), "/");
    }

    #[test]
    fn test_normalize_strips_tracking_params() {
        let url = normalize("https://example.com/a?id=7&utm_source=tw&UTM_Medium=x&fbclid=abc&page=2").unwrap();
        assert_eq!(url.query(), Some("id=7&page=2"));
    }

    #[test]
    fn test_normalize_drops_empty_query() {
        let url = normalize("https://example.com/a?utm_campaign=launch&gclid=1").unwrap();
        assert_eq!(url.as_str(), "https://example.com/a");
    }

    #[test]
    fn test_normalize_preserves_untouched_query() {
        let url = normalize("https://example.com?b=2&a=1").unwrap();
        assert_eq!(url.query(), Some("b=2&a=1"));
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let inputs = [
            "https://example.com/a?q=hello%20world&utm_source=x#frag",
            "http://Example.COM/it's/here?x=1&fbclid=2",
            "see https://example.com/path/(thing)?a=b+c",
            "https://example.com/%E2%9C%93?k=%2F",
        ];
        for input in inputs {
            let once = normalize(input).unwrap();
            let twice = normalize(once.as_str()).unwrap();
            assert_eq!(once, twice, "not idempotent for {input}");
        }
    }

    #[test]
    fn test_normalize_not_a_url() {
        assert_eq!(normalize("not a url"), Err(UrlError::NotFound));
    }

    #[test]
    fn test_normalize_unsupported_scheme() {
        assert!(normalize("file:///etc/passwd").is_err());
        assert!(normalize("ftp://example.com/file").is_err());
        assert!(normalize("javascript:alert(1)").is_err());
    }

    #[test]
    fn test_normalize_empty() {
        assert_eq!(normalize(""), Err(UrlError::Empty));
        assert_eq!(normalize("   "), Err(UrlError::Empty));
    }

    #[test]
    fn test_is_tracking_param() {
        assert!(is_tracking_param("utm_content"));
        assert!(is_tracking_param("FBCLID"));
        assert!(!is_tracking_param("id"));
        assert!(!is_tracking_param("utmost"));
    }
}
