//! Settings file storage
//!
//! Reads/writes the settings JSON under the app config directory
//! (~/.ferroterm on macOS/Linux, %APPDATA%\Ferroterm on Windows). Writes are
//! atomic (temp file + rename); a corrupted file is backed up and replaced
//! with defaults instead of failing startup.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Settings file format version
pub const SETTINGS_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Failed to determine config directory")]
    NoConfigDir,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Settings version {found} is newer than supported {supported}")]
    VersionTooNew { found: u32, supported: u32 },
}

/// On-disk settings shape: version + flat key/value map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingsFile {
    pub version: u32,
    #[serde(default)]
    pub values: HashMap<String, serde_json::Value>,
}

impl Default for SettingsFile {
    fn default() -> Self {
        Self {
            version: SETTINGS_VERSION,
            values: HashMap::new(),
        }
    }
}

/// Get the Ferroterm configuration directory
pub fn config_dir() -> Result<PathBuf, StorageError> {
    #[cfg(windows)]
    {
        if let Some(app_data) = dirs::config_dir() {
            return Ok(app_data.join("Ferroterm"));
        }
        dirs::home_dir()
            .map(|home| home.join(".ferroterm"))
            .ok_or(StorageError::NoConfigDir)
    }

    #[cfg(not(windows))]
    {
        dirs::home_dir()
            .map(|home| home.join(".ferroterm"))
            .ok_or(StorageError::NoConfigDir)
    }
}

/// Get the settings file path
pub fn settings_file() -> Result<PathBuf, StorageError> {
    Ok(config_dir()?.join("settings.json"))
}

/// Settings storage manager
pub struct SettingsStorage {
    path: PathBuf,
}

impl SettingsStorage {
    /// Create a new storage manager with default path
    pub fn new() -> Result<Self, StorageError> {
        Ok(Self {
            path: settings_file()?,
        })
    }

    /// Create storage manager with custom path (for testing)
    pub fn with_path(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    async fn ensure_dir(&self) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Load settings from disk. Missing file yields defaults; a corrupted
    /// file is backed up and defaults returned.
    pub async fn load(&self) -> Result<SettingsFile, StorageError> {
        match fs::read_to_string(&self.path).await {
            Ok(contents) => match serde_json::from_str::<SettingsFile>(&contents) {
                Ok(file) => {
                    if file.version > SETTINGS_VERSION {
                        return Err(StorageError::VersionTooNew {
                            found: file.version,
                            supported: SETTINGS_VERSION,
                        });
                    }
                    Ok(file)
                }
                Err(e) => {
                    tracing::warn!("Settings file corrupted: {}", e);
                    match self.backup().await {
                        Ok(backup_path) => {
                            tracing::warn!(
                                "Corrupted settings backed up to {:?}, using defaults",
                                backup_path
                            );
                        }
                        Err(backup_err) => {
                            tracing::error!(
                                "Failed to backup corrupted settings: {}",
                                backup_err
                            );
                        }
                    }
                    Ok(SettingsFile::default())
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(SettingsFile::default()),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    /// Save settings to disk (atomic write)
    pub async fn save(&self, file: &SettingsFile) -> Result<(), StorageError> {
        self.ensure_dir().await?;

        let temp_path = self.path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(file)?;

        let mut out = fs::File::create(&temp_path).await?;
        out.write_all(json.as_bytes()).await?;
        out.sync_all().await?;

        fs::rename(&temp_path, &self.path).await?;
        Ok(())
    }

    pub async fn exists(&self) -> bool {
        fs::metadata(&self.path).await.is_ok()
    }

    /// Create a timestamped backup of the current file
    pub async fn backup(&self) -> Result<PathBuf, StorageError> {
        let backup_path = self.path.with_extension(format!(
            "json.backup.{}",
            chrono::Utc::now().format("%Y%m%d_%H%M%S")
        ));

        if self.exists().await {
            fs::copy(&self.path, &backup_path).await?;
        }

        Ok(backup_path)
    }
}
