//! Engine state persistence layer
//!
//! Saves the ledger and every multisig account as one JSON document, with
//! rotating backups.

use crate::config::EngineConfig;
use crate::ledger::InMemoryLedger;
use crate::multisig::MultisigManager;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, BufReader, BufWriter};
use std::path::PathBuf;
use thiserror::Error;

/// Storage errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

/// Everything the engine persists
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct EngineState {
    pub ledger: InMemoryLedger,
    pub multisig: MultisigManager,
}

impl EngineState {
    /// Fresh state using `config`
    pub fn new(config: EngineConfig) -> Self {
        Self {
            ledger: InMemoryLedger::new(),
            multisig: MultisigManager::new(config),
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    pub state_file: String,
    pub backup_enabled: bool,
    pub max_backups: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".multisig_data"),
            state_file: "state.json".to_string(),
            backup_enabled: true,
            max_backups: 5,
        }
    }
}

/// Engine state storage manager
pub struct Storage {
    config: StorageConfig,
}

impl Storage {
    /// Create a new storage manager
    pub fn new(config: StorageConfig) -> Result<Self, StorageError> {
        fs::create_dir_all(&config.data_dir)?;
        Ok(Self { config })
    }

    /// Create with default configuration
    pub fn with_defaults() -> Result<Self, StorageError> {
        Self::new(StorageConfig::default())
    }

    pub fn data_dir(&self) -> &std::path::Path {
        &self.config.data_dir
    }

    fn state_path(&self) -> PathBuf {
        self.config.data_dir.join(&self.config.state_file)
    }

    fn backup_path(&self, index: usize) -> PathBuf {
        self.config
            .data_dir
            .join(format!("{}.backup.{}", self.config.state_file, index))
    }

    /// Save the state to disk
    pub fn save(&self, state: &EngineState) -> Result<(), StorageError> {
        let path = self.state_path();

        if self.config.backup_enabled && path.exists() {
            self.rotate_backups()?;
            fs::copy(&path, self.backup_path(0))?;
        }

        // Write to temporary file first
        let temp_path = self.config.data_dir.join("state.tmp");
        let file = fs::File::create(&temp_path)?;
        serde_json::to_writer_pretty(BufWriter::new(file), state)?;

        fs::rename(&temp_path, &path)?;
        log::debug!("State saved to {:?}", path);

        Ok(())
    }

    /// Load the state from disk, applying `config` to the loaded manager
    pub fn load(&self, config: EngineConfig) -> Result<EngineState, StorageError> {
        let path = self.state_path();

        if !path.exists() {
            return Err(StorageError::InvalidData(
                "State file not found".to_string(),
            ));
        }

        Self::read(&path, config)
    }

    /// Load the state, or start fresh when nothing was saved yet
    pub fn load_or_default(&self, config: EngineConfig) -> Result<EngineState, StorageError> {
        if self.exists() {
            self.load(config)
        } else {
            Ok(EngineState::new(config))
        }
    }

    fn read(path: &std::path::Path, config: EngineConfig) -> Result<EngineState, StorageError> {
        let file = fs::File::open(path)?;
        let mut state: EngineState = serde_json::from_reader(BufReader::new(file))?;

        for account in state.multisig.list_accounts() {
            if !account.invariants_hold() {
                return Err(StorageError::InvalidData(format!(
                    "Account {} is inconsistent",
                    account.address()
                )));
            }
        }

        state.multisig.set_config(config);
        Ok(state)
    }

    /// Check if a saved state exists
    pub fn exists(&self) -> bool {
        self.state_path().exists()
    }

    /// Delete the saved state
    pub fn delete(&self) -> Result<(), StorageError> {
        let path = self.state_path();
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }

    /// Rotate backup files
    fn rotate_backups(&self) -> Result<(), StorageError> {
        let oldest = self.backup_path(self.config.max_backups - 1);
        if oldest.exists() {
            fs::remove_file(&oldest)?;
        }

        for i in (0..self.config.max_backups - 1).rev() {
            let current = self.backup_path(i);
            if current.exists() {
                fs::rename(&current, self.backup_path(i + 1))?;
            }
        }

        Ok(())
    }

    /// Restore from a backup
    pub fn restore_backup(
        &self,
        backup_index: usize,
        config: EngineConfig,
    ) -> Result<EngineState, StorageError> {
        let backup_path = self.backup_path(backup_index);

        if !backup_path.exists() {
            return Err(StorageError::InvalidData(format!(
                "Backup {} not found",
                backup_index
            )));
        }

        Self::read(&backup_path, config)
    }

    /// List available backups
    pub fn list_backups(&self) -> Vec<usize> {
        (0..self.config.max_backups)
            .filter(|i| self.backup_path(*i).exists())
            .collect()
    }

    /// Get storage statistics
    pub fn stats(&self) -> Result<StorageStats, StorageError> {
        let path = self.state_path();

        let file_size = if path.exists() {
            fs::metadata(&path)?.len()
        } else {
            0
        };

        Ok(StorageStats {
            file_size,
            backup_count: self.list_backups().len(),
            data_dir: self.config.data_dir.clone(),
        })
    }
}

/// Storage statistics
#[derive(Debug)]
pub struct StorageStats {
    pub file_size: u64,
    pub backup_count: usize,
    pub data_dir: PathBuf,
}
