//! Cursor-based listing driver
//!
//! Walks a paged listing endpoint to collect matching message ids. The
//! listing endpoint has its own rate budget, so pages are spaced by a
//! fixed delay rather than the adaptive throttle.

use log::{error, info};
use std::time::Duration;

use crate::api::{ApiError, ListPage};
use crate::models::MessageId;

/// Result of walking a listing cursor to the end (or to an early stop)
#[derive(Debug, Default)]
pub struct Listing {
    /// Ids accumulated, in listing order
    pub ids: Vec<MessageId>,
    /// True when a result cap cut the listing short
    pub truncated: bool,
    /// The error that aborted pagination, if any; ids fetched before the
    /// failure are still present
    pub error: Option<ApiError>,
}

impl Listing {
    /// Whether the listing covers everything the backend had
    pub fn is_complete(&self) -> bool {
        !self.truncated && self.error.is_none()
    }
}

/// Collect message ids from a cursor-based listing source.
///
/// `fetch` is called with the page token from the previous page (`None`
/// first). Pagination stops when a page comes back empty, when `cap` is
/// reached (the final page is truncated to the cap), or when no next
/// token is returned. A fetch error stops the walk early; whatever was
/// accumulated is returned with the error surfaced, never discarded.
pub fn collect_ids<F>(mut fetch: F, cap: Option<usize>, page_delay: Duration) -> Listing
where
    F: FnMut(Option<&str>) -> Result<ListPage, ApiError>,
{
    let mut listing = Listing::default();
    let mut page_token: Option<String> = None;

    loop {
        let page = match fetch(page_token.as_deref()) {
            Ok(page) => page,
            Err(e) => {
                error!("listing failed after {} ids: {}", listing.ids.len(), e);
                listing.error = Some(e);
                break;
            }
        };

        if page.ids.is_empty() {
            break;
        }
        listing.ids.extend(page.ids);

        if let Some(cap) = cap
            && listing.ids.len() >= cap
        {
            listing.truncated = listing.ids.len() > cap || page.next_page_token.is_some();
            listing.ids.truncate(cap);
            break;
        }

        match page.next_page_token {
            Some(token) => page_token = Some(token),
            None => break,
        }

        std::thread::sleep(page_delay);
    }

    info!("listed {} message ids", listing.ids.len());
    listing
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build pages of sequentially numbered ids
    fn pages(sizes: &[usize]) -> Vec<ListPage> {
        let mut next = 0usize;
        let count = sizes.len();
        sizes
            .iter()
            .enumerate()
            .map(|(i, &size)| {
                let ids = (next..next + size)
                    .map(|n| MessageId::new(format!("m{}", n)))
                    .collect();
                next += size;
                ListPage {
                    ids,
                    next_page_token: (i + 1 < count).then(|| format!("page{}", i + 1)),
                }
            })
            .collect()
    }

    fn walk(pages: Vec<ListPage>, cap: Option<usize>) -> Listing {
        let mut iter = pages.into_iter();
        collect_ids(|_| Ok(iter.next().unwrap_or_default()), cap, Duration::ZERO)
    }

    #[test]
    fn test_collects_all_pages() {
        let listing = walk(pages(&[3, 3, 2]), None);
        assert_eq!(listing.ids.len(), 8);
        assert!(listing.is_complete());
        assert_eq!(listing.ids[0].as_str(), "m0");
        assert_eq!(listing.ids[7].as_str(), "m7");
    }

    #[test]
    fn test_cap_truncates_last_page() {
        let listing = walk(pages(&[3, 3, 3]), Some(5));
        assert_eq!(listing.ids.len(), 5);
        assert!(listing.truncated);
        assert!(listing.error.is_none());
    }

    #[test]
    fn test_cap_equal_to_total_is_not_truncated() {
        // The cap stops the walk on the exact boundary without dropping ids
        let listing = walk(pages(&[3, 3]), Some(6));
        assert_eq!(listing.ids.len(), 6);
        assert!(!listing.truncated);
    }

    #[test]
    fn test_stops_on_empty_page() {
        let mut served = 0;
        let listing = collect_ids(
            |_| {
                served += 1;
                if served == 1 {
                    Ok(ListPage {
                        ids: vec![MessageId::new("m0")],
                        next_page_token: Some("t".to_string()),
                    })
                } else {
                    Ok(ListPage::default())
                }
            },
            None,
            Duration::ZERO,
        );
        assert_eq!(listing.ids.len(), 1);
        assert_eq!(served, 2);
        assert!(listing.is_complete());
    }

    #[test]
    fn test_error_preserves_partial_results() {
        let mut served = 0;
        let listing = collect_ids(
            |_| {
                served += 1;
                if served <= 2 {
                    Ok(ListPage {
                        ids: vec![MessageId::new(format!("m{}", served))],
                        next_page_token: Some("t".to_string()),
                    })
                } else {
                    Err(ApiError::Transient(500))
                }
            },
            None,
            Duration::ZERO,
        );
        assert_eq!(listing.ids.len(), 2);
        assert!(matches!(listing.error, Some(ApiError::Transient(500))));
        assert!(!listing.is_complete());
    }

    #[test]
    fn test_empty_listing() {
        let listing = collect_ids(|_| Ok(ListPage::default()), None, Duration::ZERO);
        assert!(listing.ids.is_empty());
        assert!(listing.is_complete());
    }
}
