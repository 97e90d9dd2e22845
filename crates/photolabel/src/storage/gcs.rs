//! Google Cloud Storage mirror over the JSON API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;

use super::{validate_logical_path, FileMirror, StorageError, StorageResult};
use crate::config::GcsConfig;

/// Default API host; also the public download host.
const GCS_ENDPOINT: &str = "https://storage.googleapis.com";

/// Stores blobs as objects in one bucket, under an optional prefix.
#[derive(Clone)]
pub struct GcsMirror {
    client: reqwest::Client,
    bucket: String,
    prefix: Option<String>,
    access_token: Option<String>,
    endpoint: String,
}

impl GcsMirror {
    pub fn new(bucket: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            prefix: None,
            access_token: None,
            endpoint: GCS_ENDPOINT.to_string(),
        }
    }

    pub fn from_config(
        config: &GcsConfig,
        user_agent: &str,
        timeout: Duration,
    ) -> StorageResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;

        let mut mirror = Self::new(config.bucket.clone(), client);
        mirror.prefix = config.prefix.clone();
        mirror.access_token = config.access_token.clone();
        if let Some(ref endpoint) = config.endpoint {
            mirror.endpoint = endpoint.clone();
        }
        Ok(mirror)
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Object name for a logical path.
    fn object_name(&self, logical_path: &str) -> StorageResult<String> {
        validate_logical_path(logical_path)?;
        Ok(match self.prefix.as_deref().map(|p| p.trim_matches('/')) {
            Some(prefix) if !prefix.is_empty() => format!("{}/{}", prefix, logical_path),
            _ => logical_path.to_string(),
        })
    }

    /// Public URL of an object.
    pub fn public_url(&self, object_name: &str) -> String {
        format!(
            "{}/{}/{}",
            self.endpoint.trim_end_matches('/'),
            self.bucket,
            object_name
        )
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.access_token {
            Some(ref token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl FileMirror for GcsMirror {
    fn name(&self) -> &str {
        "gcs"
    }

    async fn store(&self, data: &[u8], logical_path: &str) -> StorageResult<String> {
        let name = self.object_name(logical_path)?;
        let url = format!(
            "{}/upload/storage/v1/b/{}/o?uploadType=media&name={}",
            self.endpoint.trim_end_matches('/'),
            self.bucket,
            urlencoding::encode(&name)
        );
        let content_type = mime_guess::from_path(&name).first_or_octet_stream();

        let response = self
            .authorize(self.client.post(url))
            .header(reqwest::header::CONTENT_TYPE, content_type.essence_str())
            .body(data.to_vec())
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(StorageError::Remote {
                status: response.status().as_u16(),
                path: name,
            });
        }

        Ok(self.public_url(&name))
    }

    async fn retrieve(&self, logical_path: &str) -> StorageResult<Vec<u8>> {
        let name = self.object_name(logical_path)?;
        let url = format!(
            "{}/storage/v1/b/{}/o/{}?alt=media",
            self.endpoint.trim_end_matches('/'),
            self.bucket,
            urlencoding::encode(&name)
        );

        let response = self.authorize(self.client.get(url)).send().await?;
        match response.status() {
            StatusCode::NOT_FOUND => Err(StorageError::NotFound(name)),
            status if !status.is_success() => Err(StorageError::Remote {
                status: status.as_u16(),
                path: name,
            }),
            _ => Ok(response.bytes().await?.to_vec()),
        }
    }
}
