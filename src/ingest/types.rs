use crate::derivation::{Derived, FileInput};
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Stable identifier of one selected file within an ingestion session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileId(Uuid);

impl FileId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Per-file state machine.
///
/// `Pending` covers both "just selected" and "derived, idle"; a file may enter
/// `Uploading` only from `Pending` with a derived payload. `Error` is not
/// self-healing; the operator removes the file to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    Pending,
    Processing,
    Uploading,
    Done,
    Error,
    Cancelled,
}

impl FileStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, FileStatus::Done | FileStatus::Error | FileStatus::Cancelled)
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FileStatus::Pending => "pending",
            FileStatus::Processing => "processing",
            FileStatus::Uploading => "uploading",
            FileStatus::Done => "done",
            FileStatus::Error => "error",
            FileStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// One entry in the coordinator-owned file table. Mutated only by the
/// coordinator's transition functions; progress lives in an atomic so transfer
/// callbacks can update it without touching the table.
pub(crate) struct SelectedFile {
    pub id: FileId,
    pub input: FileInput,
    pub status: FileStatus,
    pub progress: Arc<AtomicU8>,
    pub error: Option<String>,
    pub derived: Option<Derived>,
}

impl SelectedFile {
    pub(crate) fn new(input: FileInput) -> Self {
        Self {
            id: FileId::new(),
            input,
            status: FileStatus::Pending,
            progress: Arc::new(AtomicU8::new(0)),
            error: None,
            derived: None,
        }
    }

    pub(crate) fn snapshot(&self) -> FileSnapshot {
        FileSnapshot {
            id: self.id,
            name: self.input.name.clone(),
            size: self.input.size(),
            status: self.status,
            progress: self.progress.load(Ordering::SeqCst),
            error: self.error.clone(),
            preview_name: self.derived.as_ref().map(|d| d.preview_name.clone()),
        }
    }
}

/// Read-only view of one selected file.
#[derive(Debug, Clone)]
pub struct FileSnapshot {
    pub id: FileId,
    pub name: String,
    pub size: usize,
    pub status: FileStatus,
    pub progress: u8,
    pub error: Option<String>,
    pub preview_name: Option<String>,
}

/// Progress updates published during the session
#[derive(Debug, Clone)]
pub enum IngestProgress {
    StatusChanged { id: FileId, status: FileStatus },
    FileProgress { id: FileId, percent: u8 },
    FileFailed { id: FileId, error: String },
    BatchStarted { files: usize },
    BatchSettled { completed: usize, failed: usize, cancelled: usize },
}

/// Outcome of a settled batch. `completed > 0` signals overall completion to
/// the caller (which may refresh the gallery view).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl BatchSummary {
    pub fn any_completed(&self) -> bool {
        self.completed > 0
    }
}

/// Batch-level precondition failures. The only errors that surface at batch
/// level; everything past the precondition check is absorbed per file.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum BatchError {
    #[error("No destination collections selected")]
    NoCollections,
    #[error("No files are ready to upload")]
    NothingEligible,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RemoveError {
    #[error("Unknown file id")]
    UnknownFile,
    #[error("File is mid-upload and cannot be removed")]
    UploadInFlight,
}
