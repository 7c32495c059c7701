//! Cache key derivation: (source URL, width, height) -> Fingerprint.
//!
//! The fingerprint is the dedup key for the whole system. It must be a pure
//! function of the request triple, so identical requests always land on the
//! same local file names and the same publish key.

use std::fmt;

use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};

/// Hex length of a fingerprint (MD5 digest, 16 bytes).
pub const FINGERPRINT_LEN: usize = 32;

/// Longest extension (without the dot) we carry into file names.
const MAX_EXTENSION_LEN: usize = 10;

/// Deterministic, fixed-length identifier of a resize request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Derive the fingerprint of a request triple.
    ///
    /// Fields are length-prefixed and separated so that two distinct triples
    /// never hash the same input, e.g. `("a", 1, 23)` and `("a", 12, 3)`.
    pub fn derive(source_url: &str, width: u32, height: u32) -> Self {
        let canonical = format!("{}:{}|{}|{}", source_url.len(), source_url, width, height);
        let mut hasher = Md5::new();
        hasher.update(canonical.as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    /// Rebuild from a stored hex string (index files, CLI input).
    pub fn parse(s: &str) -> Option<Self> {
        let valid = s.len() == FINGERPRINT_LEN
            && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'));
        valid.then(|| Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Extension of the source URL's last path segment, dot included.
///
/// Query and fragment are ignored. Returns an empty string when there is no
/// usable extension; only short ASCII alphanumeric suffixes are accepted since
/// the result ends up in local file names and storage keys.
pub fn extension_of(source_url: &str) -> String {
    let segment = match url::Url::parse(source_url) {
        Ok(url) => url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .map(str::to_string)
            .unwrap_or_default(),
        Err(_) => {
            let path = source_url
                .split(['?', '#'])
                .next()
                .unwrap_or_default();
            path.rsplit('/').next().unwrap_or_default().to_string()
        }
    };

    let Some(dot) = segment.rfind('.') else {
        return String::new();
    };
    let suffix = &segment[dot + 1..];
    if suffix.is_empty()
        || suffix.len() > MAX_EXTENSION_LEN
        || !suffix.bytes().all(|b| b.is_ascii_alphanumeric())
    {
        return String::new();
    }
    format!(".{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn derive_is_deterministic() {
        let a = Fingerprint::derive("http://host/cat.jpg", 100, 80);
        let b = Fingerprint::derive("http://host/cat.jpg", 100, 80);
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), FINGERPRINT_LEN);
    }

    #[test]
    fn delimiters_prevent_aliasing() {
        let a = Fingerprint::derive("a", 1, 23);
        let b = Fingerprint::derive("a", 12, 3);
        assert_ne!(a, b);
    }

    #[rstest]
    #[case(100, 80, 80, 100)]
    #[case(100, 80, 100, 81)]
    #[case(1, 1, 1, 2)]
    fn distinct_sizes_differ(#[case] w1: u32, #[case] h1: u32, #[case] w2: u32, #[case] h2: u32) {
        let url = "http://host/cat.jpg";
        assert_ne!(Fingerprint::derive(url, w1, h1), Fingerprint::derive(url, w2, h2));
    }

    #[test]
    fn url_length_prefix_prevents_url_suffix_aliasing() {
        // "x|1" + "|2|3" vs "x" + "|1|2|3" style collisions.
        let a = Fingerprint::derive("http://h/x|1", 2, 3);
        let b = Fingerprint::derive("http://h/x", 1, 2);
        assert_ne!(a, b);
    }

    #[test]
    fn parse_accepts_only_lower_hex_of_fixed_length() {
        let fp = Fingerprint::derive("http://host/cat.jpg", 100, 80);
        assert_eq!(Fingerprint::parse(fp.as_str()), Some(fp));
        assert!(Fingerprint::parse("abc").is_none());
        assert!(Fingerprint::parse(&"G".repeat(FINGERPRINT_LEN)).is_none());
    }

    #[rstest]
    #[case("http://host/cat.jpg", ".jpg")]
    #[case("http://host/a/b/cat.PNG?size=large#top", ".PNG")]
    #[case("https://host/archive.tar.gz", ".gz")]
    #[case("http://host/noext", "")]
    #[case("http://host/dir/", "")]
    #[case("http://host/trailing.", "")]
    #[case("http://host/weird.j%20g", "")]
    #[case("not a url/cat.webp?x=1", ".webp")]
    fn extension_cases(#[case] url: &str, #[case] expected: &str) {
        assert_eq!(extension_of(url), expected);
    }
}
