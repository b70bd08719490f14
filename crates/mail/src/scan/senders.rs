//! Sender and domain extraction and tallying

use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

use crate::models::MessageMeta;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").expect("valid email regex")
});

/// Fallback bucket for messages whose sender cannot be determined
pub const UNKNOWN_SENDER: &str = "unknown";

/// Extract the bare lowercase address from a From header value.
///
/// "Jane Roe <Jane@Example.COM>" becomes "jane@example.com". When no
/// address-shaped token is present the whole value is lowercased; an
/// empty value maps to [`UNKNOWN_SENDER`].
pub fn extract_email(from: &str) -> String {
    if from.trim().is_empty() {
        return UNKNOWN_SENDER.to_string();
    }
    match EMAIL_RE.find(from) {
        Some(m) => m.as_str().to_lowercase(),
        None => from.trim().to_lowercase(),
    }
}

/// Domain part of an address, or [`UNKNOWN_SENDER`] when there is none
pub fn extract_domain(email: &str) -> String {
    match email.rsplit_once('@') {
        Some((_, domain)) if !domain.is_empty() => domain.to_lowercase(),
        _ => UNKNOWN_SENDER.to_string(),
    }
}

/// Per-sender and per-domain message counts for one run
#[derive(Debug, Default)]
pub struct SenderTally {
    senders: HashMap<String, u64>,
    domains: HashMap<String, u64>,
}

impl SenderTally {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one message against its sender and domain
    pub fn record(&mut self, meta: &MessageMeta) {
        let sender = extract_email(&meta.from.email);
        let domain = extract_domain(&sender);
        *self.senders.entry(sender).or_insert(0) += 1;
        *self.domains.entry(domain).or_insert(0) += 1;
    }

    pub fn unique_senders(&self) -> usize {
        self.senders.len()
    }

    pub fn unique_domains(&self) -> usize {
        self.domains.len()
    }

    /// Senders by descending count, ties broken alphabetically for
    /// stable output
    pub fn top_senders(&self, n: usize) -> Vec<(String, u64)> {
        top_n(&self.senders, n)
    }

    pub fn top_domains(&self, n: usize) -> Vec<(String, u64)> {
        top_n(&self.domains, n)
    }
}

fn top_n(counts: &HashMap<String, u64>, n: usize) -> Vec<(String, u64)> {
    let mut entries: Vec<_> = counts.iter().map(|(k, v)| (k.clone(), *v)).collect();
    entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    entries.truncate(n);
    entries
}
