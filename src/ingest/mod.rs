// # Ingest Module
//
// The stateful heart of the pipeline:
//
// - **IngestCoordinator**: Owns the SelectedFile table and its state machines;
//   fans derivation out concurrently and runs the upload batch sequentially
// - **Types**: Per-file state machine, snapshots, progress events, batch
//   summary and the batch-level precondition errors
//
// Public API:
// - `IngestCoordinator`: Select files, remove files, run a batch, query state
// - `IngestProgress`: Real-time progress updates
// - `BatchSummary` / `BatchError`: Settled-batch outcome and preconditions

mod coordinator;
mod types;

pub use coordinator::IngestCoordinator;
pub use types::{
    BatchError, BatchSummary, FileId, FileSnapshot, FileStatus, IngestProgress, RemoveError,
};
