// src/sys/domain.rs

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::{ProvisionError, ProvisionResult};

const MAX_DOMAIN_LEN: usize = 253;

fn label_pattern() -> &'static Regex {
    static LABEL: OnceLock<Regex> = OnceLock::new();
    // RFC 1123 label: alphanumerics and inner hyphens, 1-63 chars.
    LABEL.get_or_init(|| {
        Regex::new(r"^[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?$").expect("static label regex")
    })
}

/// A validated hostname. This is the only form in which a domain ever reaches
/// a command line or a filesystem path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Domain(String);

impl Domain {
    /// 🛡️ Zero-Trust: strict allow-list parse. Rejects traversal, shell
    /// metacharacters, whitespace and anything outside the RFC 1123 grammar.
    pub fn parse(raw: &str) -> ProvisionResult<Self> {
        let invalid = |reason: &str| ProvisionError::InvalidDomain {
            domain: raw.to_string(),
            reason: reason.to_string(),
        };

        if raw.is_empty() {
            return Err(invalid("domain cannot be empty"));
        }
        if raw.contains("..") || raw.contains('/') || raw.contains('\\') {
            return Err(invalid("path traversal detected"));
        }

        let candidate = raw.strip_suffix('.').unwrap_or(raw).to_ascii_lowercase();
        if candidate.len() > MAX_DOMAIN_LEN {
            return Err(invalid("longer than 253 characters"));
        }
        if !candidate.split('.').all(|label| label_pattern().is_match(label)) {
            return Err(invalid("not a valid RFC 1123 hostname"));
        }

        Ok(Self(candidate))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Domain {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
