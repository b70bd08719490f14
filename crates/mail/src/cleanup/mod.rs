//! Cleanup pipeline: find, back up, and trash bulk mail
//!
//! Drives the full flow: query construction, listing, metadata fetch,
//! optional JSON backup, then batched or one-by-one trashing.

mod backup;
mod query;
mod trash;
mod unsubscribe;

pub use backup::{BackupSummary, export_messages};
pub use query::{QueryError, SearchQuery, is_valid_address, is_valid_domain};
pub use trash::trash_messages;
pub use unsubscribe::{UnsubscribeLink, extract_unsubscribe_link, find_unsubscribe};

use anyhow::Result;
use log::{info, warn};
use std::path::PathBuf;
use std::time::Duration;

use crate::api::MailApi;
use crate::models::{CleanupStats, MessageMeta};
use crate::paginate::collect_ids;
use crate::process::{ScanOptions, ScanProgress, fetch_metadata};
use crate::retry::RetryPolicy;
use crate::throttle::{AdaptiveThrottle, ThrottleConfig};

/// Listing scope appended to every cleanup search: look everywhere but
/// never re-match what is already in trash
const LISTING_SCOPE: &str = "in:anywhere -in:trash";

/// Options for the cleanup pipeline
#[derive(Debug, Clone)]
pub struct CleanupOptions {
    pub throttle: ThrottleConfig,
    pub retry: RetryPolicy,
    /// When false, skip the throttle's pre-call wait on paced calls
    pub adaptive_pacing: bool,
    /// Fixed pause between mutation requests (single or batch)
    pub delay_between_requests: Duration,
    /// Ids per batch trash request
    pub batch_delete_size: usize,
    /// Below this many targets the one-by-one path is used
    pub batch_min_items: usize,
    pub use_batch_delete: bool,
    /// Report what would happen without mutating anything
    pub dry_run: bool,
    /// Export targets to a JSON backup before trashing
    pub auto_backup: bool,
    /// Backup output directory; `None` uses the shared data directory
    pub backup_dir: Option<PathBuf>,
    /// Leave the newest N matches untouched
    pub keep_recent: usize,
    /// Items per reporting chunk in the metadata phase
    pub chunk_size: usize,
    pub page_size: usize,
    pub page_delay: Duration,
    pub max_messages: Option<usize>,
}

impl Default for CleanupOptions {
    fn default() -> Self {
        Self {
            throttle: ThrottleConfig::default(),
            retry: RetryPolicy {
                max_retries: 5,
                ..RetryPolicy::default()
            },
            adaptive_pacing: true,
            delay_between_requests: Duration::from_millis(100),
            batch_delete_size: 1000,
            batch_min_items: 10,
            use_batch_delete: true,
            dry_run: false,
            auto_backup: true,
            backup_dir: None,
            keep_recent: 0,
            chunk_size: 15,
            page_size: 100,
            page_delay: Duration::from_millis(200),
            max_messages: None,
        }
    }
}

impl CleanupOptions {
    /// View of these options for the metadata-fetch phase
    fn scan_options(&self) -> ScanOptions {
        ScanOptions {
            throttle: self.throttle.clone(),
            retry: self.retry.clone(),
            chunk_size: self.chunk_size,
            adaptive_pacing: self.adaptive_pacing,
            page_size: self.page_size,
            page_delay: self.page_delay,
            max_messages: self.max_messages,
        }
    }
}

/// Outcome of one cleanup run
#[derive(Debug)]
pub struct CleanupRun {
    pub stats: CleanupStats,
    /// Backup file written before trashing, when backup ran
    pub backup_file: Option<PathBuf>,
    /// Matched messages ordered oldest first, as fetched in the metadata
    /// phase; useful for reporting what a dry run would have removed
    pub matched: Vec<MessageMeta>,
}

/// Find every message matching `query` and move it to trash.
///
/// Listing failures are non-fatal: whatever was listed is still
/// processed. Matches are ordered oldest first (messages without a
/// parseable date sort first) so `keep_recent` always preserves the
/// newest ones. In dry-run mode everything is counted as skipped and no
/// mutation or backup happens.
pub fn clean_messages<P>(
    api: &dyn MailApi,
    query: &SearchQuery,
    opts: &CleanupOptions,
    progress: P,
) -> Result<CleanupRun>
where
    P: FnMut(ScanProgress),
{
    let search = query.build()?;
    let listing_query = format!("{} {}", search, LISTING_SCOPE);
    info!("cleanup search: {}", listing_query);

    let listing = collect_ids(
        |token| api.list_page(&listing_query, opts.page_size, token),
        opts.max_messages,
        opts.page_delay,
    );
    if let Some(e) = &listing.error {
        warn!(
            "listing stopped early ({}); continuing with {} ids",
            e,
            listing.ids.len()
        );
    }

    let mut stats = CleanupStats::default();
    let mut throttle = AdaptiveThrottle::new(opts.throttle.clone());

    if listing.ids.is_empty() {
        info!("no messages matched");
        return Ok(CleanupRun {
            stats,
            backup_file: None,
            matched: Vec::new(),
        });
    }

    // Metadata phase: needed for date ordering, backup labels, and the
    // found counter
    let scan_opts = opts.scan_options();
    let mut matched: Vec<MessageMeta> = Vec::with_capacity(listing.ids.len());
    let fetch_stats = fetch_metadata(
        api,
        &listing.ids,
        &scan_opts,
        &mut throttle,
        |meta| matched.push(meta),
        progress,
    );
    stats.errors += fetch_stats.errors;
    stats.found = matched.len();

    // Oldest first; undated messages sort first rather than being
    // exempted from cleanup
    matched.sort_by(|a, b| a.received_at.cmp(&b.received_at));

    let keep = opts.keep_recent.min(matched.len());
    let targets = &matched[..matched.len() - keep];
    stats.skipped += keep;
    if keep > 0 {
        info!("keeping the {} newest messages", keep);
    }

    if opts.dry_run {
        info!("dry run: {} messages would be trashed", targets.len());
        stats.skipped += targets.len();
        stats.final_delay = throttle.current_delay();
        return Ok(CleanupRun {
            stats,
            backup_file: None,
            matched,
        });
    }

    let mut backup_file = None;
    if opts.auto_backup && !targets.is_empty() {
        let dir = match &opts.backup_dir {
            Some(dir) => dir.clone(),
            None => config::ensure_data_subdir("backups")?,
        };
        let summary = export_messages(
            api,
            targets,
            &dir,
            &opts.retry,
            &mut throttle,
            opts.adaptive_pacing,
        )?;
        stats.backed_up += summary.exported;
        stats.errors += summary.errors;
        backup_file = Some(summary.file);
    }

    let target_ids: Vec<_> = targets.iter().map(|m| m.id.clone()).collect();
    trash_messages(api, &target_ids, opts, &mut throttle, &mut stats);

    stats.final_delay = throttle.current_delay();
    info!(
        "cleanup finished: found {}, trashed {}, skipped {}, backed up {}, errors {}",
        stats.found, stats.trashed, stats.skipped, stats.backed_up, stats.errors
    );

    Ok(CleanupRun {
        stats,
        backup_file,
        matched,
    })
}
