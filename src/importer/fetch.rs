// src/importer/fetch.rs
//! Bounded, redirect-following fetch of one URL.
//!
//! Every hop is validated before it is requested; bodies are capped both by
//! the declared length and by the bytes actually received. All outcomes come
//! back as a [`FetchOutcome`]; nothing escapes as a panic or an `Err` to the
//! caller.

use metrics::counter;
use std::sync::Arc;
use url::Url;

use crate::config::ImporterConfig;
use crate::importer::security::{BlockReason, UrlValidator};
use crate::importer::transport::{Transport, TransportError};

pub const REDIRECT_STATUSES: [u16; 5] = [301, 302, 303, 307, 308];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("Empty URL.")]
    EmptyUrl,
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("Blocked URL for security reasons: {0}")]
    Blocked(BlockReason),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Network error: request timed out")]
    Timeout,
    #[error("HTTP {0}")]
    HttpStatus(u16),
    #[error("Redirect (HTTP {0}) without Location header.")]
    RedirectWithoutLocation(u16),
    #[error("Too many redirects (>{0}).")]
    TooManyRedirects(usize),
    #[error("Response too large ({declared} bytes). Max is {max} bytes.")]
    ResponseTooLarge { declared: u64, max: usize },
    #[error("Response exceeded max size ({max} bytes).")]
    ResponseExceededLimit { max: usize },
    #[error("Empty response.")]
    EmptyResponse,
}

impl From<TransportError> for FetchError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::Timeout => FetchError::Timeout,
            TransportError::Network(msg) => FetchError::Network(msg),
            TransportError::Blocked(reason) => FetchError::Blocked(reason),
        }
    }
}

/// Result of one fetch, redirects included.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchOutcome {
    /// Status of the last response received, if any.
    pub http_status: Option<u16>,
    pub content_type: String,
    pub body: Result<Vec<u8>, FetchError>,
}

impl FetchOutcome {
    fn failed(http_status: Option<u16>, content_type: String, error: FetchError) -> Self {
        Self {
            http_status,
            content_type,
            body: Err(error),
        }
    }
}

/// Add `https://` to scheme-less and protocol-relative input. Empty stays empty.
pub fn normalize_url(raw: &str) -> String {
    let s = raw.trim();
    if s.is_empty() {
        return String::new();
    }
    if let Some(rest) = s.strip_prefix("//") {
        return format!("https://{rest}");
    }
    if has_scheme(s) {
        return s.to_string();
    }
    format!("https://{s}")
}

// RFC 3986 scheme followed by ':'. "example.edu:8080/x" is host:port, not a scheme.
fn has_scheme(s: &str) -> bool {
    let Some(idx) = s.find(':') else {
        return false;
    };
    let scheme = &s[..idx];
    let valid = scheme
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic())
        && scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    if !valid {
        return false;
    }
    if scheme.contains('.') {
        return false;
    }
    // A run of digits after the colon is a port on a bare host.
    let after = s[idx + 1..].split('/').next().unwrap_or_default();
    !(!after.is_empty() && after.chars().all(|c| c.is_ascii_digit()))
}

#[derive(Clone)]
pub struct Fetcher {
    validator: UrlValidator,
    transport: Arc<dyn Transport>,
    max_redirects: usize,
    max_response_bytes: usize,
}

impl Fetcher {
    pub fn new(cfg: &ImporterConfig, validator: UrlValidator, transport: Arc<dyn Transport>) -> Self {
        Self {
            validator,
            transport,
            max_redirects: cfg.max_redirects,
            max_response_bytes: cfg.max_response_bytes,
        }
    }

    pub async fn fetch(&self, raw_url: &str) -> FetchOutcome {
        let normalized = normalize_url(raw_url);
        if normalized.is_empty() {
            return FetchOutcome::failed(None, String::new(), FetchError::EmptyUrl);
        }
        let mut target = match Url::parse(&normalized) {
            Ok(u) => u,
            Err(e) => {
                return FetchOutcome::failed(None, String::new(), FetchError::InvalidUrl(e.to_string()))
            }
        };

        for hop in 0..=self.max_redirects {
            if let Err(reason) = self.validator.validate(&target).await {
                tracing::warn!(target: "importer", url = %target, %reason, "blocked outbound url");
                counter!("importer_blocked_urls_total").increment(1);
                return FetchOutcome::failed(None, String::new(), FetchError::Blocked(reason));
            }

            tracing::debug!(target: "importer", url = %target, hop, "fetching");
            let mut resp = match self.transport.get(&target).await {
                Ok(r) => r,
                Err(TransportError::Blocked(reason)) => {
                    counter!("importer_blocked_urls_total").increment(1);
                    return FetchOutcome::failed(None, String::new(), FetchError::Blocked(reason));
                }
                Err(e) => return FetchOutcome::failed(None, String::new(), e.into()),
            };

            let status = resp.status();
            let content_type = resp.header("content-type").unwrap_or_default();

            if REDIRECT_STATUSES.contains(&status) {
                let location = resp.header("location").unwrap_or_default();
                if location.is_empty() {
                    return FetchOutcome::failed(
                        Some(status),
                        content_type,
                        FetchError::RedirectWithoutLocation(status),
                    );
                }
                let next = match target.join(&location) {
                    Ok(u) => u,
                    Err(e) => {
                        return FetchOutcome::failed(
                            Some(status),
                            content_type,
                            FetchError::InvalidUrl(format!("bad redirect location: {e}")),
                        )
                    }
                };
                counter!("importer_redirects_total").increment(1);
                target = next;
                continue;
            }

            if status >= 400 {
                return FetchOutcome::failed(Some(status), content_type, FetchError::HttpStatus(status));
            }

            if let Some(declared) = resp.content_length() {
                if declared > self.max_response_bytes as u64 {
                    return FetchOutcome::failed(
                        Some(status),
                        content_type,
                        FetchError::ResponseTooLarge {
                            declared,
                            max: self.max_response_bytes,
                        },
                    );
                }
            }

            let body = match resp.read_body(self.max_response_bytes + 1).await {
                Ok(b) => b,
                Err(e) => return FetchOutcome::failed(Some(status), content_type, e.into()),
            };
            if body.len() > self.max_response_bytes {
                return FetchOutcome::failed(
                    Some(status),
                    content_type,
                    FetchError::ResponseExceededLimit {
                        max: self.max_response_bytes,
                    },
                );
            }

            return FetchOutcome {
                http_status: Some(status),
                content_type,
                body: Ok(body),
            };
        }

        FetchOutcome::failed(None, String::new(), FetchError::TooManyRedirects(self.max_redirects))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_adds_default_scheme() {
        assert_eq!(normalize_url(""), "");
        assert_eq!(normalize_url("  "), "");
        assert_eq!(normalize_url("example.edu"), "https://example.edu");
        assert_eq!(normalize_url("//example.edu/irb"), "https://example.edu/irb");
        assert_eq!(normalize_url("http://example.edu"), "http://example.edu");
        assert_eq!(normalize_url("example.edu:443/irb"), "https://example.edu:443/irb");
        assert_eq!(normalize_url("ftp://example.edu"), "ftp://example.edu");
    }

    #[test]
    fn error_messages_are_human_readable() {
        assert_eq!(FetchError::TooManyRedirects(4).to_string(), "Too many redirects (>4).");
        assert_eq!(
            FetchError::RedirectWithoutLocation(302).to_string(),
            "Redirect (HTTP 302) without Location header."
        );
        let blocked = FetchError::Blocked(BlockReason::BlockedHost("localhost".into()));
        assert!(blocked.to_string().starts_with("Blocked URL for security reasons"));
    }
}
