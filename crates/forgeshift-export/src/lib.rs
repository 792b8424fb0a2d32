//! Forgeshift Export - checkpointed, component-structured extraction
//!
//! Each project export writes an artifact tree under
//! `<output>/<project_id>/<run_id>/` with one subdirectory per
//! component and a `checkpoint.json` that makes the run resumable.

pub mod checkpoint;
pub mod components;
pub mod orchestrator;
pub mod types;

pub use checkpoint::{CheckpointState, CheckpointStore};
pub use orchestrator::{ExportOptions, ExportOrchestrator};
pub use types::{ComponentKind, ComponentReport, ExportResult, ExportStatus};
