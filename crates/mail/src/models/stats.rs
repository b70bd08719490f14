//! Run counters for the scan and cleanup pipelines

use std::time::Duration;

/// Counters from a metadata scan run.
///
/// Monotonically non-decreasing within a run; every item ends up in
/// exactly one of `processed` or `errors`.
#[derive(Debug, Default, Clone)]
pub struct ScanStats {
    /// Messages whose metadata was fetched and recorded
    pub processed: usize,
    /// Messages that failed terminally (retries exhausted or fatal)
    pub errors: usize,
    /// Throttle delay at the end of the run
    pub final_delay: Duration,
}

/// Counters from a cleanup (trash) run
#[derive(Debug, Default, Clone)]
pub struct CleanupStats {
    /// Messages matched by the search
    pub found: usize,
    /// Messages credited as moved to trash
    pub trashed: usize,
    /// Messages deliberately left untouched (dry run, keep-recent)
    pub skipped: usize,
    /// Messages exported to the backup file
    pub backed_up: usize,
    /// Terminal failures (single-message or whole-batch)
    pub errors: usize,
    /// Throttle delay at the end of the run
    pub final_delay: Duration,
}
