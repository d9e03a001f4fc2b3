// # Ingestion Coordinator
//
// Owns the SelectedFile table and drives each file through
// derivation -> target acquisition -> transfer (original + preview) -> record
// creation. Derivation fans out concurrently, one task per file; the upload
// phase is strictly sequential, one file fully at a time, which bounds backend
// load and keeps progress a single linear figure per file.
//
// The table is exclusively owned. Derivation tasks never touch it: each sends
// its outcome over a channel and the coordinator applies outcomes one at a
// time, so no locks are needed.

use crate::derivation::{self, content_type_for, Derived, DerivationError, FileInput, PREVIEW_CONTENT_TYPE};
use crate::gallery_api::{CreatePhotoRequest, PhotoRegistrar, RecordCreationError};
use crate::ingest::types::{
    BatchError, BatchSummary, FileId, FileSnapshot, FileStatus, IngestProgress, RemoveError,
    SelectedFile,
};
use crate::upload_client::{AcquisitionError, ProgressFn, TransferError, UploadTargetClient};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Everything that can end one file's upload attempt. Absorbed at file level;
/// never aborts the batch.
#[derive(Error, Debug)]
enum FileUploadError {
    #[error("{0}")]
    Acquisition(#[from] AcquisitionError),
    #[error("{0}")]
    Transfer(#[from] TransferError),
    #[error("{0}")]
    Record(#[from] RecordCreationError),
}

impl FileUploadError {
    fn is_cancellation(&self) -> bool {
        matches!(self, FileUploadError::Transfer(TransferError::Cancelled))
    }
}

struct DerivationOutcome {
    id: FileId,
    result: Result<Derived, DerivationError>,
}

pub struct IngestCoordinator {
    // Selection order is upload order
    files: Vec<SelectedFile>,
    uploader: Arc<dyn UploadTargetClient>,
    registrar: Arc<dyn PhotoRegistrar>,
    outcome_tx: mpsc::UnboundedSender<DerivationOutcome>,
    outcome_rx: mpsc::UnboundedReceiver<DerivationOutcome>,
    progress_tx: mpsc::UnboundedSender<IngestProgress>,
    cancel: CancellationToken,
}

impl IngestCoordinator {
    /// Create a coordinator and the receiver for its progress events.
    pub fn new(
        uploader: Arc<dyn UploadTargetClient>,
        registrar: Arc<dyn PhotoRegistrar>,
    ) -> (Self, mpsc::UnboundedReceiver<IngestProgress>) {
        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
        let (progress_tx, progress_rx) = mpsc::unbounded_channel();
        let coordinator = Self {
            files: Vec::new(),
            uploader,
            registrar,
            outcome_tx,
            outcome_rx,
            progress_tx,
            cancel: CancellationToken::new(),
        };
        (coordinator, progress_rx)
    }

    /// Register operator-selected files and start deriving each one
    /// immediately. One concurrent task per file; each task reports back
    /// through the outcome channel and only ever affects its own slot.
    pub fn select_files(&mut self, inputs: Vec<FileInput>) -> Vec<FileId> {
        let mut ids = Vec::with_capacity(inputs.len());
        for input in inputs {
            let mut file = SelectedFile::new(input);
            file.status = FileStatus::Processing;
            let id = file.id;
            debug!("Ingest: Selected {} ({} bytes)", file.input.name, file.input.size());
            self.emit(IngestProgress::StatusChanged {
                id,
                status: FileStatus::Processing,
            });

            let task_input = file.input.clone();
            let tx = self.outcome_tx.clone();
            let task_cancel = self.cancel.child_token();
            tokio::spawn(async move {
                let result = derivation::derive(&task_input, &task_cancel).await;
                // Receiver gone means the session closed; nothing to report
                let _ = tx.send(DerivationOutcome { id, result });
            });

            self.files.push(file);
            ids.push(id);
        }
        ids
    }

    /// Apply any derivation outcomes that have already arrived, without
    /// waiting for in-flight work.
    pub fn drain_derivation_outcomes(&mut self) {
        while let Ok(outcome) = self.outcome_rx.try_recv() {
            self.apply_outcome(outcome);
        }
    }

    /// Wait until no file is still `processing`, applying outcomes as they
    /// arrive.
    pub async fn await_derivations(&mut self) {
        self.drain_derivation_outcomes();
        while self
            .files
            .iter()
            .any(|f| f.status == FileStatus::Processing)
        {
            match self.outcome_rx.recv().await {
                Some(outcome) => self.apply_outcome(outcome),
                None => break,
            }
        }
    }

    fn apply_outcome(&mut self, outcome: DerivationOutcome) {
        // The file may have been removed while its derivation was in flight
        let Some(file) = self.files.iter_mut().find(|f| f.id == outcome.id) else {
            return;
        };
        if file.status != FileStatus::Processing {
            return;
        }

        match outcome.result {
            Ok(derived) => {
                debug!(
                    "Ingest: Derived {} -> {} ({} preview bytes)",
                    file.input.name,
                    derived.preview_name,
                    derived.preview.len()
                );
                file.derived = Some(derived);
                file.status = FileStatus::Pending;
                let id = file.id;
                self.emit(IngestProgress::StatusChanged {
                    id,
                    status: FileStatus::Pending,
                });
            }
            Err(DerivationError::Cancelled) => {
                file.status = FileStatus::Cancelled;
                let id = file.id;
                self.emit(IngestProgress::StatusChanged {
                    id,
                    status: FileStatus::Cancelled,
                });
            }
            Err(e) => {
                warn!("Ingest: Derivation failed for {}: {}", file.input.name, e);
                let message = e.to_string();
                file.status = FileStatus::Error;
                file.error = Some(message.clone());
                let id = file.id;
                self.emit(IngestProgress::FileFailed { id, error: message });
                self.emit(IngestProgress::StatusChanged {
                    id,
                    status: FileStatus::Error,
                });
            }
        }
    }

    /// Remove a file from the session. Allowed in any state except mid-upload;
    /// a still-running derivation for the removed file keeps running, and its
    /// outcome is discarded when it arrives.
    pub fn remove_file(&mut self, id: FileId) -> Result<(), RemoveError> {
        let idx = self
            .files
            .iter()
            .position(|f| f.id == id)
            .ok_or(RemoveError::UnknownFile)?;
        if self.files[idx].status == FileStatus::Uploading {
            return Err(RemoveError::UploadInFlight);
        }
        let file = self.files.remove(idx);
        debug!("Ingest: Removed {} ({})", file.input.name, file.status);
        Ok(())
    }

    /// Upload every eligible file, one at a time, in selection order.
    ///
    /// Precondition failures (empty collection set, nothing eligible) reject
    /// the whole batch without touching any file. Past that point one file's
    /// failure never aborts the batch: the file lands in `error` with its
    /// progress frozen and processing moves on.
    pub async fn upload_batch(
        &mut self,
        collection_ids: &[String],
    ) -> Result<BatchSummary, BatchError> {
        self.drain_derivation_outcomes();

        if collection_ids.is_empty() {
            return Err(BatchError::NoCollections);
        }
        let eligible: Vec<FileId> = self
            .files
            .iter()
            .filter(|f| f.status == FileStatus::Pending && f.derived.is_some())
            .map(|f| f.id)
            .collect();
        if eligible.is_empty() {
            return Err(BatchError::NothingEligible);
        }

        info!(
            "Ingest: Starting batch of {} file(s) into {} collection(s)",
            eligible.len(),
            collection_ids.len()
        );
        self.emit(IngestProgress::BatchStarted {
            files: eligible.len(),
        });

        let mut summary = BatchSummary::default();
        for id in eligible {
            // Re-check under the table: the file may have been removed
            let Some(file) = self.files.iter_mut().find(|f| f.id == id) else {
                continue;
            };
            if file.status != FileStatus::Pending {
                continue;
            }
            let Some(derived) = file.derived.clone() else {
                continue;
            };
            let input = file.input.clone();
            let progress = Arc::clone(&file.progress);

            file.status = FileStatus::Uploading;
            self.emit(IngestProgress::StatusChanged {
                id,
                status: FileStatus::Uploading,
            });

            let result = self
                .upload_one(id, &input, &derived, &progress, collection_ids)
                .await;

            match result {
                Ok(()) => {
                    self.bump_progress(id, &progress, 100);
                    self.transition(id, FileStatus::Done, None);
                    summary.completed += 1;
                    info!("Ingest: Completed {}", input.name);
                }
                Err(e) if e.is_cancellation() => {
                    self.transition(id, FileStatus::Cancelled, None);
                    summary.cancelled += 1;
                    info!("Ingest: Cancelled {}", input.name);
                }
                Err(e) => {
                    // Progress stays frozen at its last value
                    let message = e.to_string();
                    warn!("Ingest: {} failed: {}", input.name, message);
                    if matches!(e, FileUploadError::Record(_)) {
                        warn!(
                            "Ingest: {} is stored but unregistered (orphaned object)",
                            input.name
                        );
                    }
                    self.emit(IngestProgress::FileFailed {
                        id,
                        error: message.clone(),
                    });
                    self.transition(id, FileStatus::Error, Some(message));
                    summary.failed += 1;
                }
            }
        }

        info!(
            "Ingest: Batch settled: {} done, {} failed, {} cancelled",
            summary.completed, summary.failed, summary.cancelled
        );
        self.emit(IngestProgress::BatchSettled {
            completed: summary.completed,
            failed: summary.failed,
            cancelled: summary.cancelled,
        });
        Ok(summary)
    }

    /// The full sequence for one file: acquire -> transfer original (0..50)
    /// -> transfer preview (50..100) -> create record.
    async fn upload_one(
        &self,
        id: FileId,
        input: &FileInput,
        derived: &Derived,
        progress: &Arc<AtomicU8>,
        collection_ids: &[String],
    ) -> Result<(), FileUploadError> {
        let targets = self
            .uploader
            .acquire_targets(&input.name, &derived.preview_name)
            .await?;

        self.uploader
            .transfer(
                &targets.original,
                input.bytes.clone(),
                content_type_for(&input.name),
                self.progress_callback(id, Arc::clone(progress), 0, 50),
                &self.cancel,
            )
            .await?;
        self.bump_progress(id, progress, 50);

        self.uploader
            .transfer(
                &targets.preview,
                derived.preview.clone(),
                PREVIEW_CONTENT_TYPE,
                self.progress_callback(id, Arc::clone(progress), 50, 50),
                &self.cancel,
            )
            .await?;

        self.registrar
            .create_photo(&CreatePhotoRequest {
                url: derived.original_name.clone(),
                thumbnail: derived.preview_name.clone(),
                date: derived.captured_at,
                collection_ids: collection_ids.to_vec(),
            })
            .await?;

        Ok(())
    }

    /// Map a transfer's [0,1] fractions onto the file's overall progress
    /// range. `fetch_max` keeps the value monotonic within the attempt.
    fn progress_callback(
        &self,
        id: FileId,
        progress: Arc<AtomicU8>,
        base: u8,
        span: u8,
    ) -> ProgressFn {
        let tx = self.progress_tx.clone();
        Box::new(move |fraction| {
            let percent = mapped_percent(base, span, fraction);
            let previous = progress.fetch_max(percent, Ordering::SeqCst);
            if percent > previous {
                let _ = tx.send(IngestProgress::FileProgress { id, percent });
            }
        })
    }

    fn bump_progress(&self, id: FileId, progress: &Arc<AtomicU8>, percent: u8) {
        let previous = progress.fetch_max(percent, Ordering::SeqCst);
        if percent > previous {
            self.emit(IngestProgress::FileProgress { id, percent });
        }
    }

    fn transition(&mut self, id: FileId, status: FileStatus, error: Option<String>) {
        if let Some(file) = self.files.iter_mut().find(|f| f.id == id) {
            file.status = status;
            if error.is_some() {
                file.error = error;
            }
        }
        self.emit(IngestProgress::StatusChanged { id, status });
    }

    /// Read-only snapshot of the file table, in selection order.
    pub fn files(&self) -> Vec<FileSnapshot> {
        self.files.iter().map(|f| f.snapshot()).collect()
    }

    pub fn file(&self, id: FileId) -> Option<FileSnapshot> {
        self.files.iter().find(|f| f.id == id).map(|f| f.snapshot())
    }

    /// Mean per-file progress across the session, 0 when empty.
    pub fn overall_progress(&self) -> u8 {
        if self.files.is_empty() {
            return 0;
        }
        let sum: u32 = self
            .files
            .iter()
            .map(|f| f.progress.load(Ordering::SeqCst) as u32)
            .sum();
        (sum / self.files.len() as u32) as u8
    }

    /// Close the session: cancel in-flight derivations/transfers and drop all
    /// per-file state. An aborted session loses pending and derived state.
    pub fn close(&mut self) {
        self.cancel.cancel();
        self.files.clear();
    }

    fn emit(&self, progress: IngestProgress) {
        // Receiver may have been dropped; the pipeline does not care
        let _ = self.progress_tx.send(progress);
    }
}

fn mapped_percent(base: u8, span: u8, fraction: f64) -> u8 {
    let fraction = fraction.clamp(0.0, 1.0);
    let mapped = base as f64 + fraction * span as f64;
    mapped.min(100.0) as u8
}
