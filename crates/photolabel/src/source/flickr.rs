//! Flickr REST API client.
//!
//! Uses `flickr.photos.search` for paging and `flickr.photos.getSizes` for
//! rendition lookup. Only public, read-only methods are called, so the API
//! key is the sole credential needed.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use tracing::debug;

use super::{
    select_size, DownloadLink, ImageSource, PhotoSize, SearchQuery, SourceError, SourceResult,
};
use crate::config::Settings;

/// Public REST endpoint.
const FLICKR_REST_ENDPOINT: &str = "https://api.flickr.com/services/rest/";

/// Image source backed by the Flickr REST API.
#[derive(Clone)]
pub struct FlickrClient {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
}

impl FlickrClient {
    pub fn new(api_key: impl Into<String>, user_agent: &str, timeout: Duration) -> SourceResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            endpoint: FLICKR_REST_ENDPOINT.to_string(),
        })
    }

    /// Build a client from configured credentials.
    pub fn from_settings(settings: &Settings) -> SourceResult<Self> {
        let api_key = settings.flickr.api_key.clone().ok_or_else(|| {
            SourceError::MissingCredentials(
                "set FLICKR_API_KEY or flickr.api_key in the config file".to_string(),
            )
        })?;

        Self::new(
            api_key,
            &settings.user_agent,
            Duration::from_secs(settings.request_timeout),
        )
    }

    /// Point the client at a different REST endpoint.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Call a REST method and decode its payload.
    ///
    /// Flickr reports failures in-band with `"stat": "fail"`, often alongside
    /// an HTTP 200, so the body is checked before decoding.
    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: &[(&str, String)],
    ) -> SourceResult<T> {
        let mut url = url::Url::parse(&self.endpoint)
            .map_err(|e| SourceError::Unavailable(format!("invalid endpoint: {}", e)))?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("method", method)
                .append_pair("api_key", &self.api_key)
                .append_pair("format", "json")
                .append_pair("nojsoncallback", "1");
            for (key, value) in params {
                query.append_pair(key, value);
            }
        }

        let body: serde_json::Value = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        match body.get("stat").and_then(|s| s.as_str()) {
            Some("ok") => serde_json::from_value(body)
                .map_err(|e| SourceError::InvalidResponse(format!("{}: {}", method, e))),
            Some("fail") => Err(SourceError::Api {
                code: body.get("code").and_then(|c| c.as_i64()).unwrap_or(0),
                message: body
                    .get("message")
                    .and_then(|m| m.as_str())
                    .unwrap_or("unknown error")
                    .to_string(),
            }),
            _ => Err(SourceError::InvalidResponse(format!(
                "{}: response has no stat field",
                method
            ))),
        }
    }
}

#[async_trait]
impl ImageSource for FlickrClient {
    async fn search(&self, query: &SearchQuery, page_idx: u32) -> SourceResult<Vec<String>> {
        // Upstream pages are 1-based.
        let page = u64::from(page_idx) + 1;
        let params = [
            ("text", query.text.clone()),
            ("per_page", query.page_size.to_string()),
            ("page", page.to_string()),
            ("max_taken_date", query.recency_bound.to_string()),
        ];

        let response: SearchResponse = self.call("flickr.photos.search", &params).await?;
        let photos = response.photos;

        // Past the last page Flickr repeats the last one instead of returning nothing.
        if photos.page != 0 && photos.page != page {
            debug!(
                "Page {} of '{}' is past the end (server returned page {})",
                page, query.text, photos.page
            );
            return Ok(Vec::new());
        }

        debug!(
            "Fetched page {} of '{}': {} photos",
            page,
            query.text,
            photos.photo.len()
        );
        Ok(photos.photo.into_iter().map(|p| p.id).collect())
    }

    async fn resolve_download_link(
        &self,
        photo_id: &str,
        preferred_size: &str,
    ) -> SourceResult<DownloadLink> {
        let response: SizesResponse = self
            .call("flickr.photos.getSizes", &[("photo_id", photo_id.to_string())])
            .await?;

        let sizes: Vec<PhotoSize> = response
            .sizes
            .size
            .into_iter()
            .map(|s| PhotoSize {
                label: s.label,
                width: s.width,
                height: s.height,
                source: s.source,
            })
            .collect();

        let chosen = select_size(&sizes, preferred_size)
            .ok_or_else(|| SourceError::NoSizes(photo_id.to_string()))?;

        if chosen.label != preferred_size {
            debug!(
                "Photo {} has no '{}' size, using '{}'",
                photo_id, preferred_size, chosen.label
            );
        }

        Ok(DownloadLink {
            url: chosen.source.clone(),
            size_label: chosen.label.clone(),
        })
    }

    async fn download(&self, link: &DownloadLink) -> SourceResult<Vec<u8>> {
        let bytes = self
            .client
            .get(&link.url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        Ok(bytes.to_vec())
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    photos: PhotoPage,
}

#[derive(Debug, Deserialize)]
struct PhotoPage {
    #[serde(default, deserialize_with = "flexible_u64")]
    page: u64,
    #[serde(default)]
    photo: Vec<PhotoEntry>,
}

#[derive(Debug, Deserialize)]
struct PhotoEntry {
    id: String,
}

#[derive(Debug, Deserialize)]
struct SizesResponse {
    sizes: SizeList,
}

#[derive(Debug, Deserialize)]
struct SizeList {
    #[serde(default)]
    size: Vec<SizeEntry>,
}

#[derive(Debug, Deserialize)]
struct SizeEntry {
    label: String,
    #[serde(deserialize_with = "flexible_u64")]
    width: u64,
    #[serde(deserialize_with = "flexible_u64")]
    height: u64,
    source: String,
}

/// Accept both `75` and `"75"`; Flickr has used both for numeric fields.
fn flexible_u64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Number(u64),
        String(String),
    }

    match NumberOrString::deserialize(deserializer)? {
        NumberOrString::Number(n) => Ok(n),
        NumberOrString::String(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}
