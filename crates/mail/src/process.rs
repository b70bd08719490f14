//! Chunked metadata-scan driver
//!
//! Drives an ordered list of message ids through paced, retried metadata
//! fetches. Chunks are a reporting unit only: items are processed
//! strictly one at a time, and a failed item never stops the run.

use log::{error, info};
use std::time::{Duration, Instant};

use crate::api::MailApi;
use crate::models::{MessageId, MessageMeta, ScanStats};
use crate::retry::{RetryPolicy, call_with_retry};
use crate::throttle::{AdaptiveThrottle, ThrottleConfig};

/// Chunks between advisory throughput snapshots
const SNAPSHOT_EVERY: usize = 5;

/// Options for the metadata-scan pipeline
#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub throttle: ThrottleConfig,
    pub retry: RetryPolicy,
    /// Items per reporting chunk
    pub chunk_size: usize,
    /// When false, skip the throttle's pre-call wait entirely
    pub adaptive_pacing: bool,
    /// Page size requested from the listing endpoint
    pub page_size: usize,
    /// Fixed pause between listing pages
    pub page_delay: Duration,
    /// Stop listing after this many ids
    pub max_messages: Option<usize>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            throttle: ThrottleConfig::default(),
            retry: RetryPolicy::default(),
            chunk_size: 15,
            adaptive_pacing: true,
            page_size: 500,
            page_delay: Duration::from_millis(200),
            max_messages: None,
        }
    }
}

impl ScanOptions {
    /// Fast preset: larger chunks over the turbo throttle
    pub fn turbo() -> Self {
        Self {
            throttle: ThrottleConfig::turbo(),
            chunk_size: 20,
            ..Self::default()
        }
    }

    /// Conservative preset: smaller chunks over the conservative throttle
    pub fn conservative() -> Self {
        Self {
            throttle: ThrottleConfig::conservative(),
            chunk_size: 8,
            ..Self::default()
        }
    }
}

/// Progress snapshot passed to the caller after every item
#[derive(Debug, Clone, Copy)]
pub struct ScanProgress {
    pub processed: usize,
    pub total: usize,
    /// Current adaptive pacing delay, for display alongside the count
    pub current_delay: Duration,
}

/// Fetch metadata for every id, feeding each result to `sink`.
///
/// Items are driven through the retry wrapper one at a time in chunks of
/// `opts.chunk_size`. Failure isolation is per item: an exhausted or
/// fatal fetch increments `errors` and the run continues. Every
/// `SNAPSHOT_EVERY` chunks an advisory throughput line is logged; it
/// never affects control flow or counters. An empty id list performs
/// zero calls.
pub fn fetch_metadata<S, P>(
    api: &dyn MailApi,
    ids: &[MessageId],
    opts: &ScanOptions,
    throttle: &mut AdaptiveThrottle,
    mut sink: S,
    mut progress: P,
) -> ScanStats
where
    S: FnMut(MessageMeta),
    P: FnMut(ScanProgress),
{
    let mut stats = ScanStats::default();
    let total = ids.len();
    let start = Instant::now();
    let mut chunks_done = 0usize;

    for chunk in ids.chunks(opts.chunk_size.max(1)) {
        for id in chunk {
            match call_with_retry(&opts.retry, throttle, opts.adaptive_pacing, || {
                api.get_metadata(id)
            }) {
                Ok(meta) => {
                    sink(meta);
                    stats.processed += 1;
                }
                Err(e) => {
                    error!("giving up on {}: {}", id.as_str(), e);
                    stats.errors += 1;
                }
            }

            progress(ScanProgress {
                processed: stats.processed,
                total,
                current_delay: throttle.current_delay(),
            });
        }

        chunks_done += 1;
        if chunks_done % SNAPSHOT_EVERY == 0 {
            let elapsed = start.elapsed().as_secs_f64();
            let rate = if elapsed > 0.0 {
                stats.processed as f64 / elapsed
            } else {
                0.0
            };
            info!(
                "chunk {}: {}/{} messages, {:.1} msg/s, delay {:.3}s",
                chunks_done,
                stats.processed,
                total,
                rate,
                throttle.current_delay().as_secs_f64()
            );
        }
    }

    stats.final_delay = throttle.current_delay();
    stats
}
