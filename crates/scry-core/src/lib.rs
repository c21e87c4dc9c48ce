//! Core types, configuration, and error handling for scry.
//!
//! This crate provides the shared foundation used by all other scry crates:
//! - [`ScryError`]: unified error type using `thiserror`
//! - [`ScryConfig`]: configuration loaded from `.scry.toml`
//! - Shared types: [`Chunk`], [`ChunkKind`], [`LineRange`], [`PointPayload`],
//!   [`Keywords`], [`RankedResult`], [`FileChange`], [`OutputFormat`]

mod config;
mod error;
mod types;

pub use config::{
    EmbeddingConfig, KeywordsConfig, LedgerConfig, LedgerMode, ScryConfig, SearchConfig,
    VectorBackend, VectorStoreConfig,
};
pub use error::ScryError;
pub use types::{
    ChangeKind, Chunk, ChunkKey, ChunkKind, Deadline, FileChange, Keywords, LineRange, OutputFormat,
    PointPayload, RankedResult,
};

/// A convenience `Result` type for scry operations.
pub type Result<T> = std::result::Result<T, ScryError>;
