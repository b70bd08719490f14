//! Abstract mail-provider API
//!
//! The pipelines in this crate never talk to a concrete backend directly;
//! they drive a [`MailApi`] implementation. The Gmail client implements it
//! over HTTP, tests implement it in memory.

use thiserror::Error;

use crate::models::{FullMessage, MessageId, MessageMeta};

/// Classified failure of one remote call.
///
/// The retry wrapper dispatches on the variant: rate limits feed the
/// adaptive throttle and get an extra linear wait, transient server errors
/// get exponential backoff with jitter, fatal errors are never retried.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// Backend signalled the caller is over its allowed request rate (HTTP 429)
    #[error("rate limited by server")]
    RateLimited,

    /// Server-side transient failure (HTTP 403/500/503 class)
    #[error("transient server error (status {0})")]
    Transient(u16),

    /// Anything else: bad request, auth failure, transport breakage
    #[error("{0}")]
    Fatal(String),
}

impl ApiError {
    /// Classify an HTTP status code the way the retry pipelines expect
    pub fn from_status(status: u16) -> Self {
        match status {
            429 => ApiError::RateLimited,
            403 | 500 | 503 => ApiError::Transient(status),
            other => ApiError::Fatal(format!("HTTP status {}", other)),
        }
    }
}

/// One page from the cursor-based listing endpoint
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    pub ids: Vec<MessageId>,
    pub next_page_token: Option<String>,
}

/// Remote mail-provider operations the pipelines are built on.
///
/// Implementations must map backend failures into the [`ApiError`]
/// taxonomy; everything above this trait is transport-agnostic.
pub trait MailApi: Send + Sync {
    /// Fetch one page of message ids matching `query`
    fn list_page(
        &self,
        query: &str,
        page_size: usize,
        page_token: Option<&str>,
    ) -> Result<ListPage, ApiError>;

    /// Fetch the From/Subject/Date metadata for one message
    fn get_metadata(&self, id: &MessageId) -> Result<MessageMeta, ApiError>;

    /// Fetch one message in full (headers and decoded body)
    fn get_message(&self, id: &MessageId) -> Result<FullMessage, ApiError>;

    /// Move one message to trash
    fn trash_message(&self, id: &MessageId) -> Result<(), ApiError>;

    /// Move up to a provider-defined limit of messages to trash in one
    /// request. The backend reports only request-level success; callers
    /// must not assume per-item status.
    fn trash_batch(&self, ids: &[MessageId]) -> Result<(), ApiError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_rate_limit() {
        assert!(matches!(ApiError::from_status(429), ApiError::RateLimited));
    }

    #[test]
    fn test_classify_transient() {
        assert!(matches!(ApiError::from_status(403), ApiError::Transient(403)));
        assert!(matches!(ApiError::from_status(500), ApiError::Transient(500)));
        assert!(matches!(ApiError::from_status(503), ApiError::Transient(503)));
    }

    #[test]
    fn test_classify_fatal() {
        assert!(matches!(ApiError::from_status(404), ApiError::Fatal(_)));
        assert!(matches!(ApiError::from_status(400), ApiError::Fatal(_)));
    }
}
