//! Unsubscribe-link discovery
//!
//! Prefers the List-Unsubscribe header; falls back to scanning the
//! decoded message body for unsubscribe-shaped URLs.

use anyhow::Result;
use log::info;
use regex::Regex;
use std::sync::LazyLock;

use crate::api::MailApi;
use crate::models::{FullMessage, MessageMeta};
use crate::process::{ScanOptions, fetch_metadata};
use crate::retry::call_with_retry;
use crate::throttle::AdaptiveThrottle;

use super::query::SearchQuery;
use crate::paginate::collect_ids;

/// HTTP(S) URL inside the angle brackets of a List-Unsubscribe value
static HEADER_LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<(https?://[^>]+)>").expect("valid header link regex"));

/// Body URL patterns, tried in order
static BODY_LINK_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r#"(?i)(https?://[^\s"<>]*unsubscribe[^\s"<>]*)"#,
        r#"(?i)(https?://[^\s"<>]*opt-out[^\s"<>]*)"#,
        r#"(?i)(https?://[^\s"<>]*remove[^\s"<>]*)"#,
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid body link regex"))
    .collect()
});

/// A discovered unsubscribe link and the message it came from
#[derive(Debug, Clone)]
pub struct UnsubscribeLink {
    pub url: String,
    pub message: MessageMeta,
}

/// Extract an unsubscribe URL from one fully fetched message.
///
/// The List-Unsubscribe header wins; body patterns are the fallback.
/// Pure over the message content.
pub fn extract_unsubscribe_link(msg: &FullMessage) -> Option<String> {
    if let Some(value) = msg.header("List-Unsubscribe")
        && let Some(m) = HEADER_LINK_RE.captures(value)
    {
        return Some(m[1].to_string());
    }

    let mut body = String::new();
    if let Some(text) = &msg.body_text {
        body.push_str(text);
    }
    if let Some(html) = &msg.body_html {
        body.push('\n');
        body.push_str(html);
    }

    for re in BODY_LINK_RES.iter() {
        if let Some(m) = re.captures(&body) {
            return Some(m[1].trim_end_matches(['.', ',', ';', ')']).to_string());
        }
    }

    None
}

/// Find an unsubscribe link in the newest message from `sender`.
///
/// Lists the first page of matches, picks the most recent by date, and
/// fetches it in full. Returns `Ok(None)` when the sender has no
/// messages or none of them carry a discoverable link.
pub fn find_unsubscribe(
    api: &dyn MailApi,
    sender: &str,
    opts: &ScanOptions,
) -> Result<Option<UnsubscribeLink>> {
    let query = SearchQuery::new().sender(sender).build()?;
    info!("looking for unsubscribe link: {}", query);

    let listing = collect_ids(
        |token| api.list_page(&query, opts.page_size, token),
        Some(opts.page_size),
        opts.page_delay,
    );
    if listing.ids.is_empty() {
        return Ok(None);
    }

    // Newest matching message, determined from fetched dates rather
    // than listing order
    let mut throttle = AdaptiveThrottle::new(opts.throttle.clone());
    let mut newest: Option<MessageMeta> = None;
    fetch_metadata(
        api,
        &listing.ids,
        opts,
        &mut throttle,
        |meta| {
            let newer = match &newest {
                Some(current) => meta.received_at > current.received_at,
                None => true,
            };
            if newer {
                newest = Some(meta);
            }
        },
        |_| {},
    );

    let Some(meta) = newest else {
        return Ok(None);
    };

    let msg = call_with_retry(&opts.retry, &mut throttle, opts.adaptive_pacing, || {
        api.get_message(&meta.id)
    })?;

    Ok(extract_unsubscribe_link(&msg).map(|url| UnsubscribeLink { url, message: meta }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MessageId;

    fn message(headers: Vec<(&str, &str)>, body_text: Option<&str>) -> FullMessage {
        FullMessage {
            id: MessageId::new("m1"),
            headers: headers
                .into_iter()
                .map(|(n, v)| (n.to_string(), v.to_string()))
                .collect(),
            body_text: body_text.map(|s| s.to_string()),
            body_html: None,
            snippet: String::new(),
        }
    }

    #[test]
    fn test_header_link_preferred() {
        let msg = message(
            vec![(
                "List-Unsubscribe",
                "<mailto:unsub@x.com>, <https://x.com/unsub?u=1>",
            )],
            Some("also https://x.com/body-unsubscribe here"),
        );
        assert_eq!(
            extract_unsubscribe_link(&msg),
            Some("https://x.com/unsub?u=1".to_string())
        );
    }

    #[test]
    fn test_mailto_only_header_falls_through_to_body() {
        let msg = message(
            vec![("List-Unsubscribe", "<mailto:unsub@x.com>")],
            Some("click https://x.com/unsubscribe/abc to stop"),
        );
        assert_eq!(
            extract_unsubscribe_link(&msg),
            Some("https://x.com/unsubscribe/abc".to_string())
        );
    }

    #[test]
    fn test_body_link_trailing_punctuation_stripped() {
        let msg = message(
            vec![],
            Some("Visit https://news.example.com/opt-out/xyz."),
        );
        assert_eq!(
            extract_unsubscribe_link(&msg),
            Some("https://news.example.com/opt-out/xyz".to_string())
        );
    }

    #[test]
    fn test_no_link_found() {
        let msg = message(vec![("Subject", "hi")], Some("no links here"));
        assert_eq!(extract_unsubscribe_link(&msg), None);
    }
}
