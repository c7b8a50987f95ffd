//! Client for the upstream dataset service
//!
//! The service owns authorization: it maps `(owner, dataset, token)` to the
//! location of the dataset on disk, or refuses with a status and message that
//! are passed back to our client unchanged.

use crate::error::{Result, ThumbError};
use crate::types::DatasetId;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, warn};

/// Header carrying the caller's opaque access token
pub const AUTH_TOKEN_HEADER: &str = "Auth-Token";

/// Outcome of a successful resolution
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ResolvedDataset {
    /// Root directory of the dataset
    pub path: PathBuf,
}

impl ResolvedDataset {
    /// Directory holding the ordered 2D planes of the volume
    pub fn slice_directory(&self) -> PathBuf {
        self.path.join("slices")
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Resolves a dataset identity to an authorized source location
#[async_trait]
pub trait DatasetResolver: Send + Sync {
    async fn resolve(&self, dataset: &DatasetId, token: Option<&str>) -> Result<ResolvedDataset>;
}

/// Resolver talking to the dataset service over HTTP
#[derive(Debug, Clone)]
pub struct HttpDatasetResolver {
    client: reqwest::Client,
    base_url: String,
}

impl HttpDatasetResolver {
    /// Create a resolver for `base_url` (e.g. `http://localhost:5000/api`)
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ThumbError::Configuration(format!("http client: {}", e)))?;
        Ok(Self::with_client(client, base_url))
    }

    /// Create a resolver reusing an existing client
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    /// URL of the dataset record
    pub fn dataset_url(&self, dataset: &DatasetId) -> String {
        format!(
            "{}/datasets/{}/{}",
            self.base_url, dataset.owner, dataset.dataset
        )
    }
}

#[async_trait]
impl DatasetResolver for HttpDatasetResolver {
    async fn resolve(&self, dataset: &DatasetId, token: Option<&str>) -> Result<ResolvedDataset> {
        let url = self.dataset_url(dataset);
        let mut request = self.client.get(&url);
        if let Some(token) = token {
            request = request.header(AUTH_TOKEN_HEADER, token);
        }

        debug!(%dataset, "resolving dataset");
        let response = request.send().await?;
        let status = response.status();

        if status != reqwest::StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorBody>(&body)
                .ok()
                .map(|b| b.message);
            warn!(%dataset, status = status.as_u16(), "dataset service refused request");
            return Err(ThumbError::Authorization {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.bytes().await?;
        serde_json::from_slice::<ResolvedDataset>(&body).map_err(|e| {
            ThumbError::InvalidFormat(format!("dataset service response: {}", e))
        })
    }
}
