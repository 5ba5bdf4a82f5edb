//! Application services: content transformation, document assembly,
//! rendering and the export orchestrator.

pub mod content;
pub mod document;
pub mod engine;
pub mod error;
pub mod export;
pub mod repos;
