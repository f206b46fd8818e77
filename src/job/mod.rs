//! Upload jobs
//!
//! This module drives media files from the caller into object storage and the
//! catalog, and keeps the gallery view in sync with the outcome.

mod executor;
mod pipeline;
pub mod registrar;
pub mod storage;
pub mod uploader;

pub use executor::{BatchOutcome, DEFAULT_PREVIEW_WAIT, Orchestrator};
