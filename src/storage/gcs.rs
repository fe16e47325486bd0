//! Google Cloud Storage backend.
//!
//! Talks to the GCS JSON API directly with reqwest. Authentication uses a
//! bearer token supplied by the caller or, failing that, one fetched once
//! from the instance metadata server (the pod's default service account).

use super::{ObjectStore, PutMode};
use crate::config::StorageConfig;
use crate::error::{BatchError, Result};
use reqwest::{Client, Response, StatusCode, Url};
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::debug;

const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

pub struct GcsStore {
    bucket: String,
    endpoint: String,
    http_client: Client,
    token: OnceCell<String>,
    timeout_seconds: u64,
}

#[derive(Debug, Deserialize)]
struct MetadataToken {
    access_token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    #[serde(default)]
    items: Vec<ObjectItem>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ObjectItem {
    name: String,
}

impl GcsStore {
    pub fn new(config: &StorageConfig, access_token: Option<String>) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| BatchError::config(format!("Failed to create HTTP client: {}", e)))?;

        let token = match access_token {
            Some(token) if !token.trim().is_empty() => OnceCell::new_with(Some(token)),
            _ => OnceCell::new(),
        };

        Ok(Self {
            bucket: config.bucket.clone(),
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            http_client,
            token,
            timeout_seconds: config.timeout_seconds,
        })
    }

    async fn bearer_token(&self) -> Result<&str> {
        let token = self
            .token
            .get_or_try_init(|| async {
                debug!("Requesting access token from metadata server");
                let response = self
                    .http_client
                    .get(METADATA_TOKEN_URL)
                    .header("Metadata-Flavor", "Google")
                    .send()
                    .await
                    .map_err(|e| {
                        BatchError::config(format!(
                            "No GCS_ACCESS_TOKEN set and metadata server unreachable: {}",
                            e
                        ))
                    })?;

                if !response.status().is_success() {
                    return Err(BatchError::config(format!(
                        "Metadata server refused token request: {}",
                        response.status()
                    )));
                }

                let token: MetadataToken = response.json().await.map_err(|e| {
                    BatchError::config(format!("Malformed metadata token response: {}", e))
                })?;
                Ok::<String, BatchError>(token.access_token)
            })
            .await?;

        Ok(token.as_str())
    }

    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.endpoint)
            .map_err(|e| BatchError::config(format!("Invalid storage endpoint: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| BatchError::config("Storage endpoint cannot be a base URL"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn describe_error(&self, e: reqwest::Error) -> String {
        if e.is_timeout() {
            format!("request timed out after {}s", self.timeout_seconds)
        } else if e.is_connect() {
            format!("cannot connect to {}", self.endpoint)
        } else {
            e.to_string()
        }
    }

    async fn error_body(response: Response) -> String {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        format!("GCS API error {}: {}", status, body.trim())
    }
}

impl ObjectStore for GcsStore {
    fn location(&self) -> String {
        format!("gs://{}", self.bucket)
    }

    async fn put(
        &self,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
        mode: PutMode,
    ) -> Result<()> {
        let token = self.bearer_token().await?;
        let mut url = self
            .url(&["upload", "storage", "v1", "b", self.bucket.as_str(), "o"])
            .map_err(|e| BatchError::write(key, e))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("uploadType", "media");
            query.append_pair("name", key);
            if mode == PutMode::Create {
                // Generation 0 means "only if no live object exists".
                query.append_pair("ifGenerationMatch", "0");
            }
        }

        let response = self
            .http_client
            .post(url)
            .bearer_auth(token)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await
            .map_err(|e| BatchError::write(key, self.describe_error(e)))?;

        match response.status() {
            status if status.is_success() => {
                debug!("Uploaded gs://{}/{}", self.bucket, key);
                Ok(())
            }
            StatusCode::PRECONDITION_FAILED => {
                Err(BatchError::write(key, "object already exists"))
            }
            _ => Err(BatchError::write(key, Self::error_body(response).await)),
        }
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let token = self.bearer_token().await?;
        let mut url = self
            .url(&["storage", "v1", "b", self.bucket.as_str(), "o", key])
            .map_err(|e| BatchError::read(key, e))?;
        url.query_pairs_mut().append_pair("alt", "media");

        let response = self
            .http_client
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| BatchError::read(key, self.describe_error(e)))?;

        if !response.status().is_success() {
            return Err(BatchError::read(key, Self::error_body(response).await));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| BatchError::read(key, self.describe_error(e)))?;
        Ok(bytes.to_vec())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let token = self.bearer_token().await?;
        let location = format!("gs://{}/{}", self.bucket, prefix);
        let mut keys = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut url = self
                .url(&["storage", "v1", "b", self.bucket.as_str(), "o"])
                .map_err(|e| BatchError::read(location.clone(), e))?;
            {
                let mut query = url.query_pairs_mut();
                query.append_pair("prefix", prefix);
                query.append_pair("fields", "items(name),nextPageToken");
                if let Some(ref page) = page_token {
                    query.append_pair("pageToken", page);
                }
            }

            let response = self
                .http_client
                .get(url)
                .bearer_auth(token)
                .send()
                .await
                .map_err(|e| BatchError::read(location.clone(), self.describe_error(e)))?;

            if !response.status().is_success() {
                return Err(BatchError::read(location, Self::error_body(response).await));
            }

            let page: ListResponse = response
                .json()
                .await
                .map_err(|e| BatchError::read(location.clone(), e))?;

            keys.extend(page.items.into_iter().map(|item| item.name));

            match page.next_page_token {
                Some(next) if !next.is_empty() => page_token = Some(next),
                _ => break,
            }
        }

        keys.sort();
        Ok(keys)
    }
}
