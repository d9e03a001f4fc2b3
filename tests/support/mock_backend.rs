// Mock upload backend for coordinator tests
//
// Records every call in arrival order and can be told to fail individual
// stages for individual files, which is how the partial-failure tests steer
// the pipeline without external dependencies.

use async_trait::async_trait;
use bytes::Bytes;
use darkroom::{
    AcquisitionError, CreatePhotoRequest, PhotoRegistrar, ProgressFn, RecordCreationError,
    TransferError, UploadTarget, UploadTargetClient, UploadTargets,
};
use reqwest::StatusCode;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    Acquire {
        original: String,
        preview: String,
    },
    Transfer {
        url: String,
        bytes: usize,
        content_type: String,
    },
    CreatePhoto {
        url: String,
        thumbnail: String,
        collection_ids: Vec<String>,
    },
}

#[derive(Default)]
pub struct MockBackend {
    calls: Mutex<Vec<BackendCall>>,
    fail_acquire_for: Mutex<HashSet<String>>,
    fail_transfer_urls: Mutex<HashSet<String>>,
    fail_create_for: Mutex<HashSet<String>>,
}

impl MockBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Make target acquisition fail for the given original filename
    pub fn fail_acquire(&self, original_name: &str) {
        self.fail_acquire_for
            .lock()
            .unwrap()
            .insert(original_name.to_string());
    }

    /// Make the full-resolution transfer fail for the given original filename
    pub fn fail_original_transfer(&self, original_name: &str) {
        self.fail_transfer_urls
            .lock()
            .unwrap()
            .insert(Self::original_url(original_name));
    }

    /// Make the preview transfer fail for the given original filename
    pub fn fail_preview_transfer(&self, preview_name: &str) {
        self.fail_transfer_urls
            .lock()
            .unwrap()
            .insert(Self::preview_url(preview_name));
    }

    /// Make record creation fail for the given original filename
    pub fn fail_create(&self, original_name: &str) {
        self.fail_create_for
            .lock()
            .unwrap()
            .insert(original_name.to_string());
    }

    pub fn original_url(name: &str) -> String {
        format!("mock://storage/original/{}", name)
    }

    pub fn preview_url(name: &str) -> String {
        format!("mock://storage/preview/{}", name)
    }
}

#[async_trait]
impl UploadTargetClient for MockBackend {
    async fn acquire_targets(
        &self,
        original_name: &str,
        preview_name: &str,
    ) -> Result<UploadTargets, AcquisitionError> {
        self.calls.lock().unwrap().push(BackendCall::Acquire {
            original: original_name.to_string(),
            preview: preview_name.to_string(),
        });

        if self.fail_acquire_for.lock().unwrap().contains(original_name) {
            return Err(AcquisitionError::Status(StatusCode::FORBIDDEN));
        }

        Ok(UploadTargets {
            original: UploadTarget {
                url: Self::original_url(original_name),
            },
            preview: UploadTarget {
                url: Self::preview_url(preview_name),
            },
        })
    }

    async fn transfer(
        &self,
        target: &UploadTarget,
        payload: Bytes,
        content_type: &str,
        on_progress: ProgressFn,
        cancel: &CancellationToken,
    ) -> Result<(), TransferError> {
        self.calls.lock().unwrap().push(BackendCall::Transfer {
            url: target.url.clone(),
            bytes: payload.len(),
            content_type: content_type.to_string(),
        });

        if cancel.is_cancelled() {
            return Err(TransferError::Cancelled);
        }
        if self.fail_transfer_urls.lock().unwrap().contains(&target.url) {
            return Err(TransferError::Status(StatusCode::INTERNAL_SERVER_ERROR));
        }

        on_progress(0.25);
        on_progress(1.0);
        Ok(())
    }
}

#[async_trait]
impl PhotoRegistrar for MockBackend {
    async fn create_photo(&self, request: &CreatePhotoRequest) -> Result<(), RecordCreationError> {
        self.calls.lock().unwrap().push(BackendCall::CreatePhoto {
            url: request.url.clone(),
            thumbnail: request.thumbnail.clone(),
            collection_ids: request.collection_ids.clone(),
        });

        if self.fail_create_for.lock().unwrap().contains(&request.url) {
            return Err(RecordCreationError::Status(StatusCode::BAD_REQUEST));
        }
        Ok(())
    }
}
