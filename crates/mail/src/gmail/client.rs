//! Gmail API HTTP client
//!
//! Implements the provider trait over synchronous HTTP (ureq) against
//! the Gmail v1 REST endpoints. Maps HTTP failures into the error
//! taxonomy the retry pipelines dispatch on.

use super::wire::{BatchModifyRequest, GmailMessage, ListMessagesResponse};
use super::{GmailAuth, full_message, message_meta};
use crate::api::{ApiError, ListPage, MailApi};
use crate::models::{FullMessage, MessageId, MessageMeta};

/// Gmail API client
pub struct GmailClient {
    auth: GmailAuth,
}

impl GmailClient {
    /// Gmail API base URL
    const BASE_URL: &'static str = "https://gmail.googleapis.com/gmail/v1";

    /// Hard page-size ceiling enforced by the listing endpoint
    const MAX_PAGE_SIZE: usize = 500;

    /// Label mutations applied by a trash batch
    const TRASH_ADD: &'static str = "TRASH";
    const TRASH_REMOVE: &'static str = "INBOX";

    /// Create a new Gmail client
    pub fn new(auth: GmailAuth) -> Self {
        Self { auth }
    }

    /// Check if the client is authenticated
    pub fn is_authenticated(&self) -> bool {
        self.auth.is_authenticated()
    }

    /// Trigger authentication flow
    pub fn authenticate(&self) -> Result<(), ApiError> {
        self.bearer_token().map(|_| ())
    }

    fn bearer_token(&self) -> Result<String, ApiError> {
        self.auth
            .get_access_token()
            .map_err(|e| ApiError::Fatal(format!("authentication failed: {}", e)))
    }

    fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, ApiError> {
        let token = self.bearer_token()?;
        let mut response = ureq::get(url)
            .header("Authorization", &format!("Bearer {}", token))
            .call()
            .map_err(classify)?;
        response
            .body_mut()
            .read_json()
            .map_err(|e| ApiError::Fatal(format!("failed to parse response: {}", e)))
    }

    fn fetch_message(&self, id: &MessageId, format: &str, headers: &str) -> Result<GmailMessage, ApiError> {
        let url = format!(
            "{}/users/me/messages/{}?format={}{}",
            Self::BASE_URL,
            id.as_str(),
            format,
            headers
        );
        self.get_json(&url)
    }
}

/// Map a transport-level failure into the retry taxonomy
fn classify(err: ureq::Error) -> ApiError {
    match err {
        ureq::Error::StatusCode(status) => ApiError::from_status(status),
        other => ApiError::Fatal(other.to_string()),
    }
}

impl MailApi for GmailClient {
    fn list_page(
        &self,
        query: &str,
        page_size: usize,
        page_token: Option<&str>,
    ) -> Result<ListPage, ApiError> {
        let mut url = format!(
            "{}/users/me/messages?maxResults={}",
            Self::BASE_URL,
            page_size.clamp(1, Self::MAX_PAGE_SIZE)
        );
        if !query.is_empty() {
            url.push_str(&format!("&q={}", urlencoding::encode(query)));
        }
        if let Some(token) = page_token {
            url.push_str(&format!("&pageToken={}", token));
        }

        let list: ListMessagesResponse = self.get_json(&url)?;
        Ok(ListPage {
            ids: list
                .messages
                .unwrap_or_default()
                .into_iter()
                .map(|m| MessageId::new(m.id))
                .collect(),
            next_page_token: list.next_page_token,
        })
    }

    fn get_metadata(&self, id: &MessageId) -> Result<MessageMeta, ApiError> {
        let msg = self.fetch_message(
            id,
            "metadata",
            "&metadataHeaders=From&metadataHeaders=Subject&metadataHeaders=Date",
        )?;
        Ok(message_meta(&msg))
    }

    fn get_message(&self, id: &MessageId) -> Result<FullMessage, ApiError> {
        let msg = self.fetch_message(id, "full", "")?;
        Ok(full_message(msg))
    }

    fn trash_message(&self, id: &MessageId) -> Result<(), ApiError> {
        let token = self.bearer_token()?;
        let url = format!("{}/users/me/messages/{}/trash", Self::BASE_URL, id.as_str());
        ureq::post(&url)
            .header("Authorization", &format!("Bearer {}", token))
            .send_empty()
            .map_err(classify)?;
        Ok(())
    }

    fn trash_batch(&self, ids: &[MessageId]) -> Result<(), ApiError> {
        let token = self.bearer_token()?;
        let url = format!("{}/users/me/messages/batchModify", Self::BASE_URL);
        let body = BatchModifyRequest {
            ids: ids.iter().map(|id| id.as_str().to_string()).collect(),
            add_label_ids: vec![Self::TRASH_ADD.to_string()],
            remove_label_ids: vec![Self::TRASH_REMOVE.to_string()],
        };
        ureq::post(&url)
            .header("Authorization", &format!("Bearer {}", token))
            .send_json(&body)
            .map_err(classify)?;
        Ok(())
    }
}
