//! Sender-counting scan pipeline
//!
//! Lists every message matching a query, fetches metadata under adaptive
//! pacing, and tallies messages per sender and per domain.

mod senders;

pub use senders::{SenderTally, UNKNOWN_SENDER, extract_domain, extract_email};

use anyhow::Result;
use log::{info, warn};
use std::time::Duration;

use crate::api::MailApi;
use crate::models::ScanStats;
use crate::paginate::collect_ids;
use crate::process::{ScanOptions, ScanProgress, fetch_metadata};
use crate::throttle::AdaptiveThrottle;

/// Aggregated output of one scan run
#[derive(Debug)]
pub struct ScanReport {
    pub stats: ScanStats,
    /// Ids matched by the listing (before metadata fetching)
    pub total_listed: usize,
    /// True when the listing stopped early (cap or listing error)
    pub listing_complete: bool,
    pub unique_senders: usize,
    pub unique_domains: usize,
    /// Senders by descending message count
    pub top_senders: Vec<(String, u64)>,
    /// Domains by descending message count
    pub top_domains: Vec<(String, u64)>,
}

/// Number of sender entries carried in the report
const REPORT_TOP_SENDERS: usize = 50;
/// Number of domain entries carried in the report
const REPORT_TOP_DOMAINS: usize = 20;

/// Count messages per sender and domain for everything matching `query`.
///
/// Listing failures are non-fatal: whatever ids were already listed are
/// scanned and the partial coverage is flagged on the report. The
/// progress callback fires after every fetched message.
pub fn count_senders<P>(
    api: &dyn MailApi,
    query: &str,
    opts: &ScanOptions,
    progress: P,
) -> Result<ScanReport>
where
    P: FnMut(ScanProgress),
{
    info!(
        "scanning senders for query: {}",
        if query.is_empty() { "<all mail>" } else { query }
    );

    let listing = collect_ids(
        |token| api.list_page(query, opts.page_size, token),
        opts.max_messages,
        opts.page_delay,
    );
    if let Some(e) = &listing.error {
        warn!(
            "listing stopped early ({}); scanning the {} ids already listed",
            e,
            listing.ids.len()
        );
    }

    let total_listed = listing.ids.len();
    if total_listed == 0 {
        info!("no messages matched");
        return Ok(ScanReport {
            stats: ScanStats::default(),
            total_listed: 0,
            listing_complete: listing.is_complete(),
            unique_senders: 0,
            unique_domains: 0,
            top_senders: Vec::new(),
            top_domains: Vec::new(),
        });
    }

    let mut throttle = AdaptiveThrottle::new(opts.throttle.clone());
    let mut tally = SenderTally::new();

    let start = std::time::Instant::now();
    let stats = fetch_metadata(
        api,
        &listing.ids,
        opts,
        &mut throttle,
        |meta| tally.record(&meta),
        progress,
    );

    let elapsed = start.elapsed();
    log_summary(&stats, total_listed, elapsed);

    Ok(ScanReport {
        unique_senders: tally.unique_senders(),
        unique_domains: tally.unique_domains(),
        top_senders: tally.top_senders(REPORT_TOP_SENDERS),
        top_domains: tally.top_domains(REPORT_TOP_DOMAINS),
        stats,
        total_listed,
        listing_complete: listing.is_complete(),
    })
}

fn log_summary(stats: &ScanStats, total: usize, elapsed: Duration) {
    let rate = if elapsed.as_secs_f64() > 0.0 {
        stats.processed as f64 / elapsed.as_secs_f64()
    } else {
        0.0
    };
    info!(
        "scan finished: {}/{} processed, {} errors, {:.1} msg/s, final delay {:.3}s",
        stats.processed,
        total,
        stats.errors,
        rate,
        stats.final_delay.as_secs_f64()
    );
}
