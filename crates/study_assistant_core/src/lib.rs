pub mod domain;
pub mod ports;
pub mod status;

pub use domain::{
    file_type_for, ContentTask, Document, GeneratedContent, SourceDocument, TaskSet, TaskUpdate,
    TransitionError,
};
pub use ports::{
    ContentGenerationService, DocumentStore, GenerationError, PortError, PortResult,
};
pub use status::{derive_overall_status, DocumentStatus, TaskKind, TaskStatus};
