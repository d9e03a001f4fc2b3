// Library exports for the gallery ingestion core

pub mod config;
pub mod derivation;
pub mod gallery_api;
pub mod ingest;
pub mod upload_client;

pub use config::{BackendConfig, ConfigError};
pub use derivation::{derive, content_type_for, Derived, DerivationError, FileInput};
pub use gallery_api::{CreatePhotoRequest, GalleryApiClient, PhotoRegistrar, RecordCreationError};
pub use ingest::{
    BatchError, BatchSummary, FileId, FileSnapshot, FileStatus, IngestCoordinator, IngestProgress,
    RemoveError,
};
pub use upload_client::{
    AcquisitionError, HttpUploadClient, ProgressFn, TransferError, UploadTarget,
    UploadTargetClient, UploadTargets,
};
