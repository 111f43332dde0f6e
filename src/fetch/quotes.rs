//! quotes.rest quote-of-the-day provider

use super::{classify_request_error, classify_status, FetchError, Quote, QuoteSource};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://quotes.rest";

pub struct QuotesRestClient {
    client: Client,
    base_url: String,
}

impl QuotesRestClient {
    pub fn new() -> Result<Self, FetchError> {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: &str) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| FetchError::not_configured(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct QodResponse {
    contents: QodContents,
}

#[derive(Debug, Deserialize)]
struct QodContents {
    quotes: Vec<QodQuote>,
}

#[derive(Debug, Deserialize)]
struct QodQuote {
    quote: String,
    #[serde(default)]
    author: Option<String>,
}

fn first_quote(response: QodResponse) -> Result<Quote, FetchError> {
    let quote = response
        .contents
        .quotes
        .into_iter()
        .next()
        .ok_or_else(|| FetchError::decode("Quote response contained no quotes"))?;
    Ok(Quote {
        text: quote.quote,
        author: quote.author.unwrap_or_else(|| "Unknown".to_string()),
    })
}

#[async_trait]
impl QuoteSource for QuotesRestClient {
    async fn quote_of_the_day(&self, category: &str) -> Result<Quote, FetchError> {
        let response = self
            .client
            .get(format!("{}/qod", self.base_url))
            .query(&[("category", category)])
            .header("accept", "application/json")
            .send()
            .await
            .map_err(|e| classify_request_error(&e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| FetchError::network(format!("Failed to read response: {e}")))?;

        if !status.is_success() {
            return Err(classify_status(status, &body));
        }

        let parsed: QodResponse = serde_json::from_str(&body)
            .map_err(|e| FetchError::decode(format!("Failed to parse quote: {e}")))?;
        first_quote(parsed)
    }
}
