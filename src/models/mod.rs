//! Core data models for the file-drop service.
//!
//! These are plain value types shared by the storage services and the HTTP
//! handlers. They serialize naturally as JSON via `serde`.

pub mod byte_size;
pub mod metadata;
pub mod upload;
