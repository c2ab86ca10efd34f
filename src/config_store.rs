use crate::endpoint::EndpointSet;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

const ENDPOINT_FILE_NAME: &str = "config.json";

/// Owns the on-disk endpoint record. Single-writer by assumption: the daemon
/// is the only process expected to rewrite the file, so no locking is done.
pub struct ConfigStore {
    file_path: PathBuf,
}

#[derive(Debug, Error)]
pub enum ConfigStoreError {
    #[error("Failed to create state directory '{}'", path.display())]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to read '{}'", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Malformed endpoint file '{}'", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to encode endpoint set")]
    Encode(#[source] serde_json::Error),

    #[error("Failed to write '{}'", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ConfigStore {
    /// Opens the store rooted at `state_dir`, creating the directory if needed
    pub fn open(state_dir: &Path) -> Result<Self, ConfigStoreError> {
        std::fs::create_dir_all(state_dir).map_err(|source| {
            ConfigStoreError::CreateDirectory {
                path: state_dir.to_path_buf(),
                source,
            }
        })?;

        Ok(Self {
            file_path: state_dir.join(ENDPOINT_FILE_NAME),
        })
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    /// Writes a starter configuration if no endpoint file exists yet.
    /// Returns whether a file was created.
    pub fn ensure_default(&self) -> Result<bool, ConfigStoreError> {
        if self.file_path.exists() {
            return Ok(false);
        }

        self.save(&EndpointSet::starter())?;
        log::info!(
            "Created starter configuration at '{}'",
            self.file_path.display()
        );
        Ok(true)
    }

    pub fn load(&self) -> Result<EndpointSet, ConfigStoreError> {
        let contents =
            std::fs::read_to_string(&self.file_path).map_err(|source| ConfigStoreError::Read {
                path: self.file_path.clone(),
                source,
            })?;

        serde_json::from_str(&contents).map_err(|source| ConfigStoreError::Parse {
            path: self.file_path.clone(),
            source,
        })
    }

    /// Persists the complete set in one write: the new contents go to a
    /// temporary file which then replaces the endpoint file by rename, so a
    /// crash mid-save never leaves a truncated record behind.
    pub fn save(&self, set: &EndpointSet) -> Result<(), ConfigStoreError> {
        let json = serde_json::to_string_pretty(set).map_err(ConfigStoreError::Encode)?;

        let temp_path = self.file_path.with_extension("tmp");
        std::fs::write(&temp_path, json).map_err(|source| ConfigStoreError::Write {
            path: temp_path.clone(),
            source,
        })?;

        std::fs::rename(&temp_path, &self.file_path).map_err(|source| ConfigStoreError::Write {
            path: self.file_path.clone(),
            source,
        })
    }
}
