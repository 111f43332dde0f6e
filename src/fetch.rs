//! External media and quote providers
//!
//! Subroutines reach third-party HTTP APIs only through [`MediaSource`] and
//! [`QuoteSource`]. Errors are classified so callers can tell a rate limit
//! apart from every other failure.

mod giphy;
mod quotes;

pub use giphy::GiphyClient;
pub use quotes::QuotesRestClient;

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Fetch error with classification
#[derive(Debug, Error)]
#[error("{message}")]
pub struct FetchError {
    pub kind: FetchErrorKind,
    pub message: String,
}

impl FetchError {
    pub fn new(kind: FetchErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::RateLimited, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::Network, message)
    }

    pub fn http(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::Http, message)
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::Decode, message)
    }

    pub fn not_configured(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::NotConfigured, message)
    }

    pub fn is_rate_limited(&self) -> bool {
        self.kind == FetchErrorKind::RateLimited
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    /// HTTP 429
    RateLimited,
    /// Connection failures and timeouts
    Network,
    /// Any other non-success status
    Http,
    /// Response body did not have the expected shape
    Decode,
    /// Missing API key or endpoint
    NotConfigured,
}

/// Map a non-success HTTP status to a fetch error
pub(crate) fn classify_status(status: reqwest::StatusCode, body: &str) -> FetchError {
    match status.as_u16() {
        429 => FetchError::rate_limited(format!("Rate limited: {body}")),
        _ => FetchError::http(format!("HTTP {status}: {body}")),
    }
}

pub(crate) fn classify_request_error(e: &reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::network(format!("Request timeout: {e}"))
    } else if e.is_connect() {
        FetchError::network(format!("Connection failed: {e}"))
    } else if e.is_decode() {
        FetchError::decode(format!("Failed to decode response: {e}"))
    } else {
        FetchError::http(format!("Request failed: {e}"))
    }
}

/// A downloadable media asset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaAsset {
    pub url: String,
    pub file_name: String,
}

#[async_trait]
pub trait MediaSource: Send + Sync {
    /// Search results, best match first
    async fn search(&self, query: &str) -> Result<Vec<MediaAsset>, FetchError>;

    async fn random(&self) -> Result<MediaAsset, FetchError>;

    async fn download(&self, asset: &MediaAsset) -> Result<Vec<u8>, FetchError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quote {
    pub text: String,
    pub author: String,
}

#[async_trait]
pub trait QuoteSource: Send + Sync {
    async fn quote_of_the_day(&self, category: &str) -> Result<Quote, FetchError>;
}

#[async_trait]
impl<T: MediaSource + ?Sized> MediaSource for Arc<T> {
    async fn search(&self, query: &str) -> Result<Vec<MediaAsset>, FetchError> {
        (**self).search(query).await
    }

    async fn random(&self) -> Result<MediaAsset, FetchError> {
        (**self).random().await
    }

    async fn download(&self, asset: &MediaAsset) -> Result<Vec<u8>, FetchError> {
        (**self).download(asset).await
    }
}

#[async_trait]
impl<T: QuoteSource + ?Sized> QuoteSource for Arc<T> {
    async fn quote_of_the_day(&self, category: &str) -> Result<Quote, FetchError> {
        (**self).quote_of_the_day(category).await
    }
}
