//! services/api/src/adapters/mod.rs
//!
//! Concrete implementations of the core ports.

pub mod db;
pub mod generation_llm;
pub mod memory;

pub use db::PgDocumentStore;
pub use generation_llm::OpenAiGenerationAdapter;
pub use memory::InMemoryDocumentStore;
