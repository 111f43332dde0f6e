//! Giphy media provider

use super::{classify_request_error, classify_status, FetchError, MediaAsset, MediaSource};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.giphy.com/v1/gifs";

pub struct GiphyClient {
    client: Client,
    api_key: Option<String>,
    base_url: String,
}

impl GiphyClient {
    pub fn new(api_key: Option<String>) -> Result<Self, FetchError> {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(api_key: Option<String>, base_url: &str) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| FetchError::not_configured(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn api_key(&self) -> Result<&str, FetchError> {
        self.api_key
            .as_deref()
            .ok_or_else(|| FetchError::not_configured("GIPHY_API_KEY is not set"))
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<T, FetchError> {
        let response = self
            .client
            .get(url)
            .query(query)
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

        serde_json::from_str(&body)
            .map_err(|e| FetchError::decode(format!("Failed to parse response: {e}")))
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    data: Vec<GifObject>,
}

#[derive(Debug, Deserialize)]
struct RandomResponse {
    data: GifObject,
}

#[derive(Debug, Deserialize)]
struct GifObject {
    id: String,
    images: GifImages,
}

#[derive(Debug, Deserialize)]
struct GifImages {
    fixed_width: GifRendition,
}

#[derive(Debug, Deserialize)]
struct GifRendition {
    url: String,
}

impl From<GifObject> for MediaAsset {
    fn from(gif: GifObject) -> Self {
        MediaAsset {
            url: gif.images.fixed_width.url,
            file_name: format!("{}.gif", gif.id),
        }
    }
}

#[async_trait]
impl MediaSource for GiphyClient {
    async fn search(&self, query: &str) -> Result<Vec<MediaAsset>, FetchError> {
        let url = format!("{}/search", self.base_url);
        let response: SearchResponse = self
            .get_json(&url, &[("api_key", self.api_key()?), ("q", query)])
            .await?;
        Ok(response.data.into_iter().map(MediaAsset::from).collect())
    }

    async fn random(&self) -> Result<MediaAsset, FetchError> {
        let url = format!("{}/random", self.base_url);
        let response: RandomResponse = self.get_json(&url, &[("api_key", self.api_key()?)]).await?;
        Ok(response.data.into())
    }

    async fn download(&self, asset: &MediaAsset) -> Result<Vec<u8>, FetchError> {
        let response = self
            .client
            .get(&asset.url)
            .send()
            .await
            .map_err(|e| classify_request_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(status, ""));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| FetchError::network(format!("Failed to read media: {e}")))?;
        Ok(bytes.to_vec())
    }
}
