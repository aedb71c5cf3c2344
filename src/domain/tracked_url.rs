//! Normalized URL identity.
//!
//! [`TrackedUrl`] is a newtype over the normalized string form of an
//! absolute `http`/`https` URL. Two submissions that normalize to the same
//! string are the same tracked URL, which is what the dedup queue keys on.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::SitewatchError;

/// A validated, normalized absolute URL.
///
/// Normalization is delegated to [`url::Url`]: scheme and host are
/// lower-cased, default ports are dropped, an empty path becomes `/`.
/// The fragment is stripped because it never reaches the server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TrackedUrl(String);

impl TrackedUrl {
    /// Parses and normalizes a raw URL.
    ///
    /// # Errors
    ///
    /// Returns [`SitewatchError::InvalidUrl`] if the input is not an
    /// absolute URL, uses a scheme other than `http`/`https`, or has no
    /// host.
    pub fn parse(raw: &str) -> Result<Self, SitewatchError> {
        let invalid = |reason: &str| SitewatchError::InvalidUrl {
            url: raw.to_string(),
            reason: reason.to_string(),
        };

        let mut parsed = url::Url::parse(raw.trim()).map_err(|e| invalid(&e.to_string()))?;
        match parsed.scheme() {
            "http" | "https" => {}
            other => return Err(invalid(&format!("unsupported scheme {other}"))),
        }
        match parsed.host_str() {
            Some(host) if !host.is_empty() => {}
            _ => return Err(invalid("missing host")),
        }
        parsed.set_fragment(None);

        Ok(Self(parsed.into()))
    }

    /// Returns the normalized string form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the host component, used by the network probes.
    #[must_use]
    pub fn host(&self) -> Option<String> {
        url::Url::parse(&self.0)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
    }

    /// Returns the port to use for TLS checks (explicit port or 443).
    #[must_use]
    pub fn tls_port(&self) -> u16 {
        url::Url::parse(&self.0)
            .ok()
            .and_then(|u| if u.scheme() == "https" { u.port() } else { None })
            .unwrap_or(443)
    }
}

impl fmt::Display for TrackedUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for TrackedUrl {
    type Error = SitewatchError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::parse(&raw)
    }
}

impl From<TrackedUrl> for String {
    fn from(url: TrackedUrl) -> Self {
        url.0
    }
}

impl AsRef<str> for TrackedUrl {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_case_and_empty_path() {
        let Ok(url) = TrackedUrl::parse("HTTPS://Example.COM") else {
            panic!("valid url");
        };
        assert_eq!(url.as_str(), "https://example.com/");
    }

    #[test]
    fn equivalent_inputs_share_identity() {
        let a = TrackedUrl::parse("https://example.com:443/#top");
        let b = TrackedUrl::parse("  https://example.com/ ");
        let (Ok(a), Ok(b)) = (a, b) else {
            panic!("valid urls");
        };
        assert_eq!(a, b);
    }

    #[test]
    fn rejects_relative_and_foreign_schemes() {
        assert!(TrackedUrl::parse("/just/a/path").is_err());
        assert!(TrackedUrl::parse("example.com").is_err());
        assert!(TrackedUrl::parse("ftp://example.com/file").is_err());
        assert!(TrackedUrl::parse("mailto:ops@example.com").is_err());
    }

    #[test]
    fn exposes_host_and_tls_port() {
        let Ok(url) = TrackedUrl::parse("https://shop.example.com:8443/cart") else {
            panic!("valid url");
        };
        assert_eq!(url.host().as_deref(), Some("shop.example.com"));
        assert_eq!(url.tls_port(), 8443);

        let Ok(plain) = TrackedUrl::parse("http://example.com:8080/") else {
            panic!("valid url");
        };
        assert_eq!(plain.tls_port(), 443);
    }

    #[test]
    fn serde_rejects_invalid_strings() {
        let ok: Result<TrackedUrl, _> = serde_json::from_str("\"https://example.com\"");
        assert!(ok.is_ok());
        let bad: Result<TrackedUrl, _> = serde_json::from_str("\"not a url\"");
        assert!(bad.is_err());
    }
}
