// # Gallery Record Client
//
// Final stage of the per-file pipeline: after both transfers succeed, register
// the photo as a gallery record attached to the selected collections. A file
// whose transfers succeeded but whose record creation failed is NOT rolled
// back; the stored bytes stay orphaned (accepted gap, handled operationally).

use crate::config::BackendConfig;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum RecordCreationError {
    #[error("Record-creation request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Backend refused to register the photo (status {0})")]
    Status(StatusCode),
    #[error("Invalid record-creation request: {0}")]
    Rejected(String),
}

/// Wire payload of the record-creation endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePhotoRequest {
    /// Storage key of the full-resolution object (the original filename)
    pub url: String,
    /// Storage key of the preview object
    pub thumbnail: String,
    /// Resolved capture date, ISO-8601
    pub date: DateTime<Utc>,
    /// Destination collection ids; the endpoint requires at least one
    pub collection_ids: Vec<String>,
}

/// Registers uploaded photos with the gallery backend (allows mocking for tests)
#[async_trait]
pub trait PhotoRegistrar: Send + Sync {
    async fn create_photo(&self, request: &CreatePhotoRequest) -> Result<(), RecordCreationError>;
}

pub struct GalleryApiClient {
    client: Client,
    base_url: String,
    credential: String,
}

impl GalleryApiClient {
    pub fn new(config: &BackendConfig) -> Result<Self, crate::config::ConfigError> {
        config.validate()?;
        Ok(Self {
            client: Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            credential: config.credential.clone(),
        })
    }
}

#[async_trait]
impl PhotoRegistrar for GalleryApiClient {
    async fn create_photo(&self, request: &CreatePhotoRequest) -> Result<(), RecordCreationError> {
        if request.collection_ids.is_empty() {
            return Err(RecordCreationError::Rejected(
                "at least one collection id is required".to_string(),
            ));
        }

        debug!(
            "GalleryApi: Registering {} in {} collection(s)",
            request.url,
            request.collection_ids.len()
        );

        let response = self
            .client
            .post(format!("{}/api/photos", self.base_url))
            .bearer_auth(&self.credential)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(RecordCreationError::Status(status));
        }
        Ok(())
    }
}
