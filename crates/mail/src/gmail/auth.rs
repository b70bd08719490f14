//! Gmail OAuth2 authentication
//!
//! Authorization code flow with a local HTTP listener for the callback,
//! plus token refresh. Tokens live in the shared config directory.
//! Synchronous HTTP (ureq) keeps this executor-agnostic.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::path::PathBuf;

/// OAuth2 configuration and token management for Gmail
pub struct GmailAuth {
    client_id: String,
    client_secret: String,
    token_path: PathBuf,
}

/// Stored token data
#[derive(Debug, Serialize, Deserialize)]
struct StoredToken {
    access_token: String,
    refresh_token: Option<String>,
    expires_at: Option<i64>,
}

/// Token response from Google
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<u64>,
    #[allow(dead_code)]
    token_type: String,
}

impl GmailAuth {
    const AUTH_URL: &'static str = "https://accounts.google.com/o/oauth2/v2/auth";
    const TOKEN_URL: &'static str = "https://oauth2.googleapis.com/token";

    /// Modify scope: read plus the label changes trashing needs
    const GMAIL_MODIFY_SCOPE: &'static str = "https://www.googleapis.com/auth/gmail.modify";

    /// Token filename in the shared config directory
    const TOKEN_FILE: &'static str = "gmail-token.json";

    /// Port range to try for the local OAuth callback listener
    const PORT_RANGE: std::ops::RangeInclusive<u16> = 8380..=8390;

    /// Seconds of validity required before a stored token is reused
    const EXPIRY_MARGIN: i64 = 300;

    /// Create a new auth handle.
    ///
    /// # Arguments
    /// * `client_id` - OAuth2 client ID from Google Cloud Console
    /// * `client_secret` - OAuth2 client secret from Google Cloud Console
    pub fn new(client_id: String, client_secret: String) -> Result<Self> {
        let token_path =
            config::config_path(Self::TOKEN_FILE).context("Could not determine config directory")?;
        Ok(Self {
            client_id,
            client_secret,
            token_path,
        })
    }

    /// Get a valid access token, refreshing or re-authenticating as needed
    pub fn get_access_token(&self) -> Result<String> {
        if let Ok(token) = self.load_token() {
            if token_still_valid(token.expires_at) {
                return Ok(token.access_token);
            }
            if let Some(refresh_token) = token.refresh_token
                && let Ok(new_token) = self.refresh_access_token(&refresh_token)
            {
                self.save_token_response(&new_token)?;
                return Ok(new_token.access_token);
            }
        }

        let token = self.authorization_code_auth()?;
        self.save_token_response(&token)?;
        Ok(token.access_token)
    }

    /// Check if valid credentials are already on disk (or refreshable)
    pub fn is_authenticated(&self) -> bool {
        match self.load_token() {
            Ok(token) => {
                token_still_valid(token.expires_at)
                    || token
                        .refresh_token
                        .is_some_and(|rt| self.refresh_access_token(&rt).is_ok())
            }
            Err(_) => false,
        }
    }

    /// Clear stored tokens (logout)
    pub fn logout(&self) -> Result<()> {
        if self.token_path.exists() {
            fs::remove_file(&self.token_path)?;
        }
        Ok(())
    }

    /// Perform the authorization code flow from scratch
    fn authorization_code_auth(&self) -> Result<TokenResponse> {
        let (listener, port) = self.bind_callback_listener()?;
        let redirect_uri = format!("http://localhost:{}", port);

        let auth_url = format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&access_type=offline&prompt=consent",
            Self::AUTH_URL,
            urlencoding::encode(&self.client_id),
            urlencoding::encode(&redirect_uri),
            urlencoding::encode(Self::GMAIL_MODIFY_SCOPE),
        );

        println!("\n=== Gmail authentication required ===");
        println!("Opening browser; if it doesn't open, visit:\n{}", auth_url);
        if let Err(e) = open::that(&auth_url) {
            eprintln!("Failed to open browser: {}. Open the URL manually.", e);
        }

        println!("Waiting for authorization...");
        let code = self.wait_for_callback(listener)?;

        let mut response = ureq::post(Self::TOKEN_URL)
            .send_form([
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("code", code.as_str()),
                ("grant_type", "authorization_code"),
                ("redirect_uri", redirect_uri.as_str()),
            ])
            .context("Failed to exchange authorization code")?;

        let token: TokenResponse = response
            .body_mut()
            .read_json()
            .context("Failed to parse token response")?;

        println!("Authentication successful.\n");
        Ok(token)
    }

    /// Bind the local callback listener on the first free port
    fn bind_callback_listener(&self) -> Result<(TcpListener, u16)> {
        for port in Self::PORT_RANGE {
            if let Ok(listener) = TcpListener::bind(("127.0.0.1", port)) {
                return Ok((listener, port));
            }
        }
        anyhow::bail!(
            "Could not bind to any port in range {}-{}",
            Self::PORT_RANGE.start(),
            Self::PORT_RANGE.end()
        )
    }

    /// Wait for the OAuth callback and extract the authorization code
    fn wait_for_callback(&self, listener: TcpListener) -> Result<String> {
        let (mut stream, _) = listener.accept().context("Failed to accept connection")?;

        let mut reader = BufReader::new(&stream);
        let mut request_line = String::new();
        reader
            .read_line(&mut request_line)
            .context("Failed to read request")?;

        // Request line looks like: GET /?code=AUTH_CODE&scope=... HTTP/1.1
        let path = request_line.split_whitespace().nth(1).unwrap_or("");
        let code = query_param(path, "code");
        let error = query_param(path, "error");

        let (status, body) = if code.is_some() {
            ("200 OK", "Authentication successful! You can close this window.")
        } else {
            ("400 Bad Request", "Authentication failed. Please try again.")
        };
        let response = format!(
            "HTTP/1.1 {}\r\nContent-Type: text/html\r\nConnection: close\r\n\r\n<html><body><h1>{}</h1></body></html>",
            status, body
        );
        stream.write_all(response.as_bytes()).ok();

        if let Some(err) = error {
            anyhow::bail!("OAuth error: {}", err);
        }
        code.context("No authorization code received")
    }

    /// Refresh an access token using a refresh token
    fn refresh_access_token(&self, refresh_token: &str) -> Result<TokenResponse> {
        let response = ureq::post(Self::TOKEN_URL)
            .send_form([
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .context("Failed to refresh access token")?;

        let mut token: TokenResponse = response
            .into_body()
            .read_json()
            .context("Failed to parse refresh token response")?;

        // Google omits the refresh token on refresh; keep the old one
        if token.refresh_token.is_none() {
            token.refresh_token = Some(refresh_token.to_string());
        }
        Ok(token)
    }

    fn load_token(&self) -> Result<StoredToken> {
        let content = fs::read_to_string(&self.token_path)?;
        Ok(serde_json::from_str(&content)?)
    }

    fn save_token_response(&self, token: &TokenResponse) -> Result<()> {
        if let Some(parent) = self.token_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let stored = StoredToken {
            access_token: token.access_token.clone(),
            refresh_token: token.refresh_token.clone(),
            expires_at: token
                .expires_in
                .map(|d| chrono::Utc::now().timestamp() + d as i64),
        };
        let content = serde_json::to_string_pretty(&stored)?;
        fs::write(&self.token_path, content)?;
        Ok(())
    }
}

fn token_still_valid(expires_at: Option<i64>) -> bool {
    expires_at.is_some_and(|at| at > chrono::Utc::now().timestamp() + GmailAuth::EXPIRY_MARGIN)
}

/// Value of one query parameter in a request path like `/?code=x&scope=y`
fn query_param(path: &str, key: &str) -> Option<String> {
    path.split('?').nth(1).and_then(|query| {
        query.split('&').find_map(|param| {
            let (k, v) = param.split_once('=')?;
            (k == key).then(|| v.to_string())
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_param_extraction() {
        assert_eq!(
            query_param("/?code=abc123&scope=mail", "code"),
            Some("abc123".to_string())
        );
        assert_eq!(
            query_param("/?error=access_denied", "error"),
            Some("access_denied".to_string())
        );
        assert_eq!(query_param("/?code=abc", "error"), None);
        assert_eq!(query_param("/", "code"), None);
    }

    #[test]
    fn test_token_validity_margin() {
        let now = chrono::Utc::now().timestamp();
        assert!(token_still_valid(Some(now + 3600)));
        assert!(!token_still_valid(Some(now + 60))); // inside the margin
        assert!(!token_still_valid(Some(now - 10)));
        assert!(!token_still_valid(None));
    }
}
