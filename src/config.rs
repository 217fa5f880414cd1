use std::{
    fs,
    path::{Path, PathBuf},
};

use directories::ProjectDirs;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::{DevkitError, Result};

/// Application configuration settings.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Directory holding the storage file
    pub data_dir: PathBuf,

    /// File name of the key-value document inside `data_dir`
    pub storage_file: String,

    /// Directory for backups
    pub backup_dir: PathBuf,

    /// Maximum number of backups to keep (0 keeps all)
    pub max_backups: usize,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = ProjectDirs::from("dev", "devkit", "devkit")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from(".devkit"));

        Self {
            backup_dir: data_dir.join("backups"),
            data_dir,
            storage_file: "storage.json".to_string(),
            max_backups: 10,
        }
    }
}

impl Config {
    /// Default location of the configuration file.
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("dev", "devkit", "devkit")
            .map(|dirs| dirs.config_dir().join("config.json"))
    }

    /// Reads the configuration at `path`, falling back to defaults when the
    /// file does not exist. Missing fields take their default values.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        let config = serde_json::from_str(&content).map_err(|e| DevkitError::ConfigError {
            message: format!("{}: {}", path.display(), e),
        })?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|_| DevkitError::DirectoryError {
                path: parent.to_path_buf(),
            })?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Points the data (and, if it was derived from it, the backup)
    /// directory somewhere else.
    pub fn with_data_dir(mut self, data_dir: PathBuf) -> Self {
        if self.backup_dir == self.data_dir.join("backups") {
            self.backup_dir = data_dir.join("backups");
        }
        self.data_dir = data_dir;
        self
    }

    pub fn storage_path(&self) -> PathBuf {
        self.data_dir.join(&self.storage_file)
    }
}
