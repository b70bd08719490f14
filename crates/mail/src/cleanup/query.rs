//! Search query construction for the cleanup pipeline
//!
//! Validates the sender criterion (full address, bare domain, or
//! @-prefixed domain) and composes the provider search string.

use chrono::{Duration as ChronoDuration, Utc};
use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

static ADDRESS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$").expect("valid address regex")
});

static DOMAIN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9.-]+\.[A-Za-z]{2,}$").expect("valid domain regex")
});

/// Rejected search input
#[derive(Debug, Error, PartialEq)]
pub enum QueryError {
    #[error("'{0}' is not a valid email address or domain")]
    InvalidSender(String),

    #[error("no search criteria given")]
    Empty,
}

/// Whether `s` is a plausible full email address
pub fn is_valid_address(s: &str) -> bool {
    ADDRESS_RE.is_match(s)
}

/// Whether `s` is a plausible bare domain
pub fn is_valid_domain(s: &str) -> bool {
    DOMAIN_RE.is_match(s)
}

/// Builder for a provider search string.
///
/// All criteria are optional but at least one must be present.
#[derive(Debug, Default, Clone)]
pub struct SearchQuery {
    sender: Option<String>,
    older_than_days: Option<u32>,
    larger_than_mb: Option<f64>,
    extra: Option<String>,
}

impl SearchQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sender criterion: a full address, a bare domain (auto-detected),
    /// or an @-prefixed domain. Validated at build time.
    pub fn sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = Some(sender.into());
        self
    }

    /// Only messages older than this many days
    pub fn older_than_days(mut self, days: u32) -> Self {
        self.older_than_days = Some(days);
        self
    }

    /// Only messages larger than this many megabytes
    pub fn larger_than_mb(mut self, mb: f64) -> Self {
        self.larger_than_mb = Some(mb);
        self
    }

    /// Free-form terms appended verbatim (e.g. "subject:ads")
    pub fn extra(mut self, extra: impl Into<String>) -> Self {
        self.extra = Some(extra.into());
        self
    }

    /// Compose the search string, validating the sender criterion
    pub fn build(&self) -> Result<String, QueryError> {
        let mut parts: Vec<String> = Vec::new();

        if let Some(sender) = &self.sender {
            let sender = sender.trim();
            if is_valid_address(sender) {
                parts.push(format!("from:{}", sender));
            } else if let Some(domain) = sender.strip_prefix('@') {
                if is_valid_domain(domain) {
                    parts.push(format!("from:@{}", domain));
                } else {
                    return Err(QueryError::InvalidSender(sender.to_string()));
                }
            } else if is_valid_domain(sender) {
                // Bare domain: match every address under it
                parts.push(format!("from:@{}", sender));
            } else {
                return Err(QueryError::InvalidSender(sender.to_string()));
            }
        }

        if let Some(days) = self.older_than_days {
            let cutoff = Utc::now() - ChronoDuration::days(i64::from(days));
            parts.push(format!("before:{}", cutoff.format("%Y/%m/%d")));
        }

        if let Some(mb) = self.larger_than_mb {
            let bytes = (mb * 1024.0 * 1024.0) as u64;
            parts.push(format!("larger:{}", bytes));
        }

        if let Some(extra) = &self.extra
            && !extra.trim().is_empty()
        {
            parts.push(extra.trim().to_string());
        }

        if parts.is_empty() {
            return Err(QueryError::Empty);
        }
        Ok(parts.join(" "))
    }
}
