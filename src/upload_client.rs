// # Upload Target Client
//
// Two stateless operations against the upload protocol:
// - acquire write targets for one file (original + preview) from the trusted
//   backend; storage credentials never reach this client, it only ever holds
//   a capability URL valid for one write to one object key
// - transfer a payload to an acquired target with fractional progress
//
// Both sit behind a trait so the coordinator can be tested against a mock.

use crate::config::BackendConfig;
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Progress callback: invoked with monotonically non-decreasing fractions in
/// [0, 1] (bytes handed to the transport over bytes total).
pub type ProgressFn = Box<dyn Fn(f64) + Send + Sync>;

#[derive(Error, Debug)]
pub enum AcquisitionError {
    #[error("Upload-target request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Backend refused to issue upload targets (status {0})")]
    Status(StatusCode),
    #[error("Upload-target response did not match the expected schema: {0}")]
    InvalidResponse(String),
}

#[derive(Error, Debug)]
pub enum TransferError {
    #[error("Network error during storage transfer: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Storage rejected the transfer (status {0})")]
    Status(StatusCode),
    #[error("Transfer was cancelled")]
    Cancelled,
}

/// A time-bounded, single-object write capability issued by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTarget {
    pub url: String,
}

/// The pair of write targets acquired for one file.
#[derive(Debug, Clone)]
pub struct UploadTargets {
    pub original: UploadTarget,
    pub preview: UploadTarget,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AcquireTargetsRequest<'a> {
    original_filename: &'a str,
    preview_filename: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AcquireTargetsResponse {
    original_target: String,
    preview_target: String,
}

impl AcquireTargetsResponse {
    fn into_targets(self) -> Result<UploadTargets, AcquisitionError> {
        if self.original_target.trim().is_empty() || self.preview_target.trim().is_empty() {
            return Err(AcquisitionError::InvalidResponse(
                "backend returned an empty target URL".to_string(),
            ));
        }
        Ok(UploadTargets {
            original: UploadTarget {
                url: self.original_target,
            },
            preview: UploadTarget {
                url: self.preview_target,
            },
        })
    }
}

/// Client-side view of the storage upload protocol (allows mocking for tests)
#[async_trait]
pub trait UploadTargetClient: Send + Sync {
    /// Obtain write targets for one file. Called once per file, not per byte.
    async fn acquire_targets(
        &self,
        original_name: &str,
        preview_name: &str,
    ) -> Result<UploadTargets, AcquisitionError>;

    /// Write `payload` to `target` in a single PUT. Exactly one of Ok/Err
    /// occurs; a cancelled transfer stops emitting progress.
    async fn transfer(
        &self,
        target: &UploadTarget,
        payload: Bytes,
        content_type: &str,
        on_progress: ProgressFn,
        cancel: &CancellationToken,
    ) -> Result<(), TransferError>;
}

/// Production implementation: target acquisition against the trusted backend,
/// transfers as direct HTTP PUTs to the capability URLs.
pub struct HttpUploadClient {
    client: Client,
    base_url: String,
    credential: String,
}

/// Stream granularity for PUT bodies; progress is reported per chunk.
const TRANSFER_CHUNK_SIZE: usize = 64 * 1024;

impl HttpUploadClient {
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
impl UploadTargetClient for HttpUploadClient {
    async fn acquire_targets(
        &self,
        original_name: &str,
        preview_name: &str,
    ) -> Result<UploadTargets, AcquisitionError> {
        debug!(
            "UploadClient: Acquiring targets for {} / {}",
            original_name, preview_name
        );

        let response = self
            .client
            .post(format!("{}/api/upload-urls", self.base_url))
            .bearer_auth(&self.credential)
            .json(&AcquireTargetsRequest {
                original_filename: original_name,
                preview_filename: preview_name,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AcquisitionError::Status(status));
        }

        let parsed: AcquireTargetsResponse = response
            .json()
            .await
            .map_err(|e| AcquisitionError::InvalidResponse(e.to_string()))?;
        parsed.into_targets()
    }

    async fn transfer(
        &self,
        target: &UploadTarget,
        payload: Bytes,
        content_type: &str,
        on_progress: ProgressFn,
        cancel: &CancellationToken,
    ) -> Result<(), TransferError> {
        if cancel.is_cancelled() {
            return Err(TransferError::Cancelled);
        }

        let total = payload.len();
        trace!(
            "UploadClient: PUT {} bytes ({}) to {}",
            total,
            content_type,
            target.url
        );

        let body = if total == 0 {
            on_progress(1.0);
            reqwest::Body::from(payload)
        } else {
            let chunks: Vec<Bytes> = split_into_chunks(payload, TRANSFER_CHUNK_SIZE);
            let stream_cancel = cancel.clone();
            let mut sent = 0usize;
            let stream = futures::stream::iter(chunks).map(move |chunk| {
                if stream_cancel.is_cancelled() {
                    return Err(std::io::Error::other("transfer cancelled"));
                }
                sent += chunk.len();
                on_progress(sent as f64 / total as f64);
                Ok(chunk)
            });
            reqwest::Body::wrap_stream(stream)
        };

        let response = self
            .client
            .put(&target.url)
            .header(CONTENT_TYPE, content_type)
            .header(CONTENT_LENGTH, total)
            .body(body)
            .send()
            .await
            .map_err(|e| {
                if cancel.is_cancelled() {
                    TransferError::Cancelled
                } else {
                    TransferError::Network(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransferError::Status(status));
        }
        Ok(())
    }
}

fn split_into_chunks(payload: Bytes, chunk_size: usize) -> Vec<Bytes> {
    let mut chunks = Vec::with_capacity(payload.len().div_ceil(chunk_size));
    let mut rest = payload;
    while rest.len() > chunk_size {
        chunks.push(rest.split_to(chunk_size));
    }
    if !rest.is_empty() {
        chunks.push(rest);
    }
    chunks
}
