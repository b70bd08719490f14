//! Trash mutation driver
//!
//! Large work lists go through the batched endpoint, small ones one by
//! one so the counters stay exact.

use log::{error, info};

use crate::api::MailApi;
use crate::models::{CleanupStats, MessageId};
use crate::retry::call_with_retry;
use crate::throttle::AdaptiveThrottle;

use super::CleanupOptions;

/// Move every id to trash, updating `stats` in place.
///
/// Batch path (at or above `batch_min_items`, when batching is enabled):
/// ids are grouped into `batch_delete_size` requests. The backend
/// reports only request-level failure, so a successful request credits
/// every id in it as trashed and a failed request credits none and adds
/// one error — a known granularity trade-off. Batch requests are not
/// retried; the run continues with the next group.
///
/// One-by-one path: each id goes through the paced retry wrapper, so
/// counters are exact per message.
pub fn trash_messages(
    api: &dyn MailApi,
    ids: &[MessageId],
    opts: &CleanupOptions,
    throttle: &mut AdaptiveThrottle,
    stats: &mut CleanupStats,
) {
    if ids.is_empty() {
        return;
    }

    if opts.use_batch_delete && ids.len() >= opts.batch_min_items {
        trash_batched(api, ids, opts, stats);
    } else {
        trash_one_by_one(api, ids, opts, throttle, stats);
    }
}

fn trash_batched(
    api: &dyn MailApi,
    ids: &[MessageId],
    opts: &CleanupOptions,
    stats: &mut CleanupStats,
) {
    let total = ids.len();
    info!("trashing {} messages in batches of {}", total, opts.batch_delete_size);

    for batch in ids.chunks(opts.batch_delete_size.max(1)) {
        match api.trash_batch(batch) {
            Ok(()) => {
                stats.trashed += batch.len();
            }
            Err(e) => {
                error!("batch trash of {} messages failed: {}", batch.len(), e);
                stats.errors += 1;
            }
        }
        std::thread::sleep(opts.delay_between_requests);
    }

    info!("batch trash finished: {} of {} credited", stats.trashed, total);
}

fn trash_one_by_one(
    api: &dyn MailApi,
    ids: &[MessageId],
    opts: &CleanupOptions,
    throttle: &mut AdaptiveThrottle,
    stats: &mut CleanupStats,
) {
    for id in ids {
        match call_with_retry(&opts.retry, throttle, opts.adaptive_pacing, || {
            api.trash_message(id)
        }) {
            Ok(()) => stats.trashed += 1,
            Err(e) => {
                error!("giving up trashing {}: {}", id.as_str(), e);
                stats.errors += 1;
            }
        }
        std::thread::sleep(opts.delay_between_requests);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ApiError, ListPage};
    use crate::models::{FullMessage, MessageMeta};
    use crate::throttle::ThrottleConfig;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Records batch sizes and single-trash calls; fails scripted batches
    struct TrashApi {
        batch_sizes: Mutex<Vec<usize>>,
        single_calls: Mutex<Vec<MessageId>>,
        failing_batches: Vec<usize>,
    }

    impl TrashApi {
        fn new(failing_batches: Vec<usize>) -> Self {
            Self {
                batch_sizes: Mutex::new(Vec::new()),
                single_calls: Mutex::new(Vec::new()),
                failing_batches,
            }
        }
    }

    impl MailApi for TrashApi {
        fn list_page(
            &self,
            _query: &str,
            _page_size: usize,
            _page_token: Option<&str>,
        ) -> Result<ListPage, ApiError> {
            Ok(ListPage::default())
        }

        fn get_metadata(&self, _id: &MessageId) -> Result<MessageMeta, ApiError> {
            Err(ApiError::Fatal("not scripted".to_string()))
        }

        fn get_message(&self, _id: &MessageId) -> Result<FullMessage, ApiError> {
            Err(ApiError::Fatal("not scripted".to_string()))
        }

        fn trash_message(&self, id: &MessageId) -> Result<(), ApiError> {
            self.single_calls.lock().unwrap().push(id.clone());
            Ok(())
        }

        fn trash_batch(&self, ids: &[MessageId]) -> Result<(), ApiError> {
            let mut sizes = self.batch_sizes.lock().unwrap();
            let index = sizes.len();
            sizes.push(ids.len());
            if self.failing_batches.contains(&index) {
                Err(ApiError::Transient(503))
            } else {
                Ok(())
            }
        }
    }

    fn ids(n: usize) -> Vec<MessageId> {
        (0..n).map(|i| MessageId::new(format!("m{}", i))).collect()
    }

    fn fast_options() -> CleanupOptions {
        CleanupOptions {
            delay_between_requests: Duration::ZERO,
            batch_delete_size: 10,
            batch_min_items: 10,
            throttle: ThrottleConfig {
                initial_delay: Duration::ZERO,
                max_delay: Duration::from_millis(1),
                ..ThrottleConfig::default()
            },
            ..CleanupOptions::default()
        }
    }

    fn run(api: &TrashApi, ids: &[MessageId], opts: &CleanupOptions) -> CleanupStats {
        let mut throttle = AdaptiveThrottle::new(opts.throttle.clone());
        let mut stats = CleanupStats::default();
        trash_messages(api, ids, opts, &mut throttle, &mut stats);
        stats
    }

    #[test]
    fn test_batches_split_and_credit_per_request() {
        // 25 ids, batch size 10 => requests of 10, 10, 5; second fails
        let api = TrashApi::new(vec![1]);
        let stats = run(&api, &ids(25), &fast_options());

        assert_eq!(*api.batch_sizes.lock().unwrap(), vec![10, 10, 5]);
        assert_eq!(stats.trashed, 15);
        assert_eq!(stats.errors, 1);
    }

    #[test]
    fn test_all_batches_succeed() {
        let api = TrashApi::new(vec![]);
        let stats = run(&api, &ids(25), &fast_options());

        assert_eq!(stats.trashed, 25);
        assert_eq!(stats.errors, 0);
    }

    #[test]
    fn test_small_list_falls_back_to_single_calls() {
        // Below batch_min_items: no batch requests at all
        let api = TrashApi::new(vec![]);
        let stats = run(&api, &ids(9), &fast_options());

        assert!(api.batch_sizes.lock().unwrap().is_empty());
        assert_eq!(api.single_calls.lock().unwrap().len(), 9);
        assert_eq!(stats.trashed, 9);
    }

    #[test]
    fn test_batching_disabled_uses_single_calls() {
        let api = TrashApi::new(vec![]);
        let opts = CleanupOptions {
            use_batch_delete: false,
            ..fast_options()
        };
        let stats = run(&api, &ids(30), &opts);

        assert!(api.batch_sizes.lock().unwrap().is_empty());
        assert_eq!(stats.trashed, 30);
    }

    #[test]
    fn test_empty_list_is_a_no_op() {
        let api = TrashApi::new(vec![]);
        let stats = run(&api, &[], &fast_options());

        assert!(api.batch_sizes.lock().unwrap().is_empty());
        assert!(api.single_calls.lock().unwrap().is_empty());
        assert_eq!(stats.trashed, 0);
        assert_eq!(stats.errors, 0);
    }
}
