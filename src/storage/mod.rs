//! Storage module for engine state persistence

pub mod persistence;

pub use persistence::{EngineState, Storage, StorageConfig, StorageError, StorageStats};
