//! services/api/src/processing/mod.rs
//!
//! Background generation of study materials.

pub mod coordinator;
pub mod generation_task;

pub use coordinator::{GenerationHandle, ProcessingCoordinator, UploadedDocument};
pub use generation_task::generation_process;
