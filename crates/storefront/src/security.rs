//! Secrets presented by trusted callers: the upstream API gateway
//! (`X-Internal-Auth`) and metrics scrapers (`Authorization: Bearer`).
//!
//! A [`SharedSecret`] never prints its value and is only compared through
//! the `subtle` crate.

use std::fmt;

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// A configured secret that callers must echo back.
#[derive(Clone)]
pub struct SharedSecret(Vec<u8>);

impl SharedSecret {
    pub fn new(value: impl Into<Vec<u8>>) -> Self {
        Self(value.into())
    }

    /// Whether `presented` is this secret.
    ///
    /// Both sides are hashed to fixed-length SHA-256 digests first, so
    /// timing reveals neither the content nor the length of either.
    pub fn matches(&self, presented: &[u8]) -> bool {
        let expected = Sha256::digest(&self.0);
        let presented = Sha256::digest(presented);
        expected.ct_eq(&presented).into()
    }

    /// Check an `Authorization` header value of the form `Bearer <secret>`.
    pub fn matches_bearer(&self, authorization: Option<&str>) -> bool {
        authorization
            .and_then(|v| v.strip_prefix("Bearer "))
            .is_some_and(|presented| self.matches(presented.as_bytes()))
    }
}

impl fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedSecret([REDACTED])")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_only_the_exact_value() {
        let secret = SharedSecret::new("kong-shared-secret");
        assert!(secret.matches(b"kong-shared-secret"));
        assert!(!secret.matches(b"kong-shared-secreT"));
        assert!(!secret.matches(b"kong"));
        assert!(!secret.matches(b""));
    }

    #[test]
    fn bearer_header() {
        let secret = SharedSecret::new("scrape-me");
        assert!(secret.matches_bearer(Some("Bearer scrape-me")));
        assert!(!secret.matches_bearer(Some("bearer scrape-me")));
        assert!(!secret.matches_bearer(Some("scrape-me")));
        assert!(!secret.matches_bearer(None));
    }

    #[test]
    fn debug_is_redacted() {
        let rendered = format!("{:?}", SharedSecret::new("kong-shared-secret"));
        assert_eq!(rendered, "SharedSecret([REDACTED])");
    }
}
