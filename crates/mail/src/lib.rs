//! Mail crate - bulk mailbox inspection and cleanup
//!
//! This crate provides platform-independent machinery for working
//! through a rate-limited mail-provider API:
//! - Adaptive request pacing and bounded retry
//! - Cursor pagination with partial-result surfacing
//! - Chunked metadata scanning with sender/domain tallying
//! - Batched trash mutation with a one-by-one fallback
//! - Unsubscribe-link discovery and pre-delete JSON backup
//! - Gmail API client and OAuth authentication
//!
//! The pipelines drive any [`MailApi`] implementation; the Gmail client
//! is the production one, tests use scripted in-memory implementations.

pub mod api;
pub mod cleanup;
pub mod config;
pub mod gmail;
pub mod models;
pub mod paginate;
pub mod process;
pub mod retry;
pub mod scan;
pub mod throttle;

pub use api::{ApiError, ListPage, MailApi};
pub use cleanup::{
    BackupSummary, CleanupOptions, CleanupRun, QueryError, SearchQuery, UnsubscribeLink,
    clean_messages, export_messages, extract_unsubscribe_link, find_unsubscribe, trash_messages,
};
pub use config::GmailCredentials;
pub use gmail::{GmailAuth, GmailClient};
pub use models::{CleanupStats, EmailAddress, FullMessage, MessageId, MessageMeta, ScanStats};
pub use paginate::{Listing, collect_ids};
pub use process::{ScanOptions, ScanProgress, fetch_metadata};
pub use retry::{RetryError, RetryPolicy, call_with_retry};
pub use scan::{ScanReport, SenderTally, count_senders, extract_domain, extract_email};
pub use throttle::{AdaptiveThrottle, ThrottleConfig};
