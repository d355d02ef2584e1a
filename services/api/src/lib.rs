//! services/api/src/lib.rs
//!
//! The study assistant service: adapters for the core ports, the processing
//! coordinator and the axum web layer. The binaries in `src/bin` wire them up.

pub mod adapters;
pub mod config;
pub mod error;
pub mod processing;
pub mod web;
