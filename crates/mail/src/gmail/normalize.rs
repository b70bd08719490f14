//! Gmail response normalization
//!
//! Converts Gmail API message resources into the extraction models the
//! pipelines work with. Header extraction is a pure first-match-wins
//! scan over the ordered header list, with explicit fallbacks when a
//! header is missing.

use base64::prelude::*;
use chrono::{DateTime, Utc};

use super::wire::{GmailMessage, MessagePart, MessagePayload};
use crate::models::{EmailAddress, FullMessage, MessageId, MessageMeta};
use crate::scan::UNKNOWN_SENDER;

/// Subject fallback when the header is absent
const NO_SUBJECT: &str = "(no subject)";

/// Extract scan metadata from a metadata-format message.
///
/// Missing From maps to the unknown-sender bucket, missing Subject to
/// `(no subject)`, and a missing or unparseable Date to `None`.
pub fn message_meta(msg: &GmailMessage) -> MessageMeta {
    let from = header_value(msg.payload.as_ref(), "From")
        .map(EmailAddress::parse)
        .unwrap_or_else(|| EmailAddress::new(UNKNOWN_SENDER));

    let subject = header_value(msg.payload.as_ref(), "Subject")
        .filter(|s| !s.trim().is_empty())
        .map(|s| s.to_string())
        .unwrap_or_else(|| NO_SUBJECT.to_string());

    let received_at = header_value(msg.payload.as_ref(), "Date").and_then(parse_mail_date);

    MessageMeta {
        id: MessageId::new(&msg.id),
        from,
        subject,
        received_at,
    }
}

/// Flatten a full-format message into ordered headers plus decoded body
pub fn full_message(msg: GmailMessage) -> FullMessage {
    let headers = msg
        .payload
        .as_ref()
        .and_then(|p| p.headers.as_ref())
        .map(|headers| {
            headers
                .iter()
                .map(|h| (h.name.clone(), h.value.clone()))
                .collect()
        })
        .unwrap_or_default();

    let body_text = msg.payload.as_ref().and_then(extract_plain_text_body);
    let body_html = msg.payload.as_ref().and_then(extract_html_body);

    FullMessage {
        id: MessageId::new(&msg.id),
        headers,
        body_text,
        body_html,
        snippet: msg.snippet,
    }
}

/// Parse an email Date header into UTC.
///
/// RFC 2822 is the wire format; RFC 3339 is accepted as a fallback for
/// senders that emit it anyway. Anything else is `None`.
pub fn parse_mail_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc2822(value) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    None
}

/// First header with the given name, in wire order, case-insensitive
fn header_value<'a>(payload: Option<&'a MessagePayload>, name: &str) -> Option<&'a str> {
    payload?.headers.as_ref()?.iter().find_map(|h| {
        if h.name.eq_ignore_ascii_case(name) {
            Some(h.value.as_str())
        } else {
            None
        }
    })
}

/// Extract plain text body from message payload
fn extract_plain_text_body(payload: &MessagePayload) -> Option<String> {
    // Simple message with a text/plain body
    if let Some(body) = &payload.body
        && let Some(data) = &body.data
        && payload
            .mime_type
            .as_ref()
            .is_some_and(|m| m.starts_with("text/plain"))
    {
        return decode_base64_body(data);
    }

    // Multipart: first text/plain part wins
    if let Some(parts) = &payload.parts
        && let Some(text) = find_part_body(parts, "text/plain")
    {
        return Some(text);
    }

    // Fall back to whatever body data exists
    if let Some(body) = &payload.body
        && let Some(data) = &body.data
    {
        return decode_base64_body(data);
    }

    None
}

/// Extract HTML body from message payload
fn extract_html_body(payload: &MessagePayload) -> Option<String> {
    if let Some(body) = &payload.body
        && let Some(data) = &body.data
        && payload
            .mime_type
            .as_ref()
            .is_some_and(|m| m.starts_with("text/html"))
    {
        return decode_base64_body(data);
    }

    if let Some(parts) = &payload.parts {
        return find_part_body(parts, "text/html");
    }

    None
}

/// Recursively search message parts for the first body of the given type
fn find_part_body(parts: &[MessagePart], mime_prefix: &str) -> Option<String> {
    for part in parts {
        if part
            .mime_type
            .as_ref()
            .is_some_and(|m| m.starts_with(mime_prefix))
            && let Some(body) = &part.body
            && let Some(data) = &body.data
            && let Some(text) = decode_base64_body(data)
        {
            return Some(text);
        }

        if let Some(nested) = &part.parts
            && let Some(text) = find_part_body(nested, mime_prefix)
        {
            return Some(text);
        }
    }

    None
}

/// Decode base64-encoded body data.
///
/// Gmail uses URL-safe base64 but padding can vary, so multiple decoders
/// are tried.
fn decode_base64_body(data: &str) -> Option<String> {
    use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE};

    let decoders: &[&base64::engine::GeneralPurpose] =
        &[&BASE64_URL_SAFE_NO_PAD, &URL_SAFE, &STANDARD, &STANDARD_NO_PAD];

    for decoder in decoders {
        if let Ok(decoded) = decoder.decode(data)
            && let Ok(s) = String::from_utf8(decoded)
        {
            return Some(s);
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gmail::wire::{Header, MessageBody};

    fn payload(headers: Vec<(&str, &str)>) -> MessagePayload {
        MessagePayload {
            headers: Some(
                headers
                    .into_iter()
                    .map(|(n, v)| Header {
                        name: n.to_string(),
                        value: v.to_string(),
                    })
                    .collect(),
            ),
            body: None,
            parts: None,
            mime_type: Some("text/plain".to_string()),
        }
    }

    fn message(headers: Vec<(&str, &str)>) -> GmailMessage {
        GmailMessage {
            id: "m1".to_string(),
            snippet: String::new(),
            payload: Some(payload(headers)),
        }
    }

    #[test]
    fn test_meta_extracts_all_headers() {
        let meta = message_meta(&message(vec![
            ("From", "Jane <jane@example.com>"),
            ("Subject", "Hello"),
            ("Date", "Tue, 1 Jul 2025 10:00:00 +0000"),
        ]));
        assert_eq!(meta.from.email, "jane@example.com");
        assert_eq!(meta.subject, "Hello");
        assert!(meta.received_at.is_some());
    }

    #[test]
    fn test_meta_first_header_wins() {
        let meta = message_meta(&message(vec![
            ("From", "first@example.com"),
            ("From", "second@example.com"),
        ]));
        assert_eq!(meta.from.email, "first@example.com");
    }

    #[test]
    fn test_meta_fallbacks_when_headers_missing() {
        let meta = message_meta(&message(vec![]));
        assert_eq!(meta.from.email, UNKNOWN_SENDER);
        assert_eq!(meta.subject, NO_SUBJECT);
        assert!(meta.received_at.is_none());

        // No payload at all behaves the same
        let meta = message_meta(&GmailMessage {
            id: "m2".to_string(),
            snippet: String::new(),
            payload: None,
        });
        assert_eq!(meta.from.email, UNKNOWN_SENDER);
    }

    #[test]
    fn test_parse_rfc2822_date() {
        let dt = parse_mail_date("Tue, 1 Jul 2025 12:30:00 +0200").unwrap();
        assert_eq!(dt.timestamp(), 1751365800);
    }

    #[test]
    fn test_parse_rfc3339_fallback() {
        assert!(parse_mail_date("2025-07-01T12:30:00Z").is_some());
    }

    #[test]
    fn test_unparseable_date_is_none() {
        assert!(parse_mail_date("next tuesday").is_none());
        assert!(parse_mail_date("").is_none());
    }

    #[test]
    fn test_full_message_flattens_headers_and_decodes_body() {
        let msg = GmailMessage {
            id: "m1".to_string(),
            snippet: "Hello".to_string(),
            payload: Some(MessagePayload {
                headers: Some(vec![Header {
                    name: "From".to_string(),
                    value: "a@b.com".to_string(),
                }]),
                body: Some(MessageBody {
                    size: Some(13),
                    // "Hello, World!" in base64url
                    data: Some("SGVsbG8sIFdvcmxkIQ".to_string()),
                }),
                parts: None,
                mime_type: Some("text/plain".to_string()),
            }),
        };

        let full = full_message(msg);
        assert_eq!(full.header("from"), Some("a@b.com"));
        assert_eq!(full.body_text.as_deref(), Some("Hello, World!"));
        assert!(full.body_html.is_none());
    }
}
