//! Configuration management for NoteCore.
//!
//! This module handles loading and saving application configuration to/from
//! a JSON file in the storage root. It also defines how the storage root
//! itself is found: the engine never looks up platform directories, it is
//! handed a [`StorageRootResolver`].

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::blob_store::{NOTES_BLOB, SERVER_SNAPSHOT_BLOB};
use crate::error::{NoteError, NoteResult};

/// Name of the directory created under the user's home on desktop
pub const STORAGE_DIR_NAME: &str = ".note-app";

const CONFIG_FILE_NAME: &str = "config.json";

/// Supplies the directory that holds all durable blobs.
pub trait StorageRootResolver {
    fn storage_root(&self) -> NoteResult<PathBuf>;
}

impl StorageRootResolver for PathBuf {
    fn storage_root(&self) -> NoteResult<PathBuf> {
        Ok(self.clone())
    }
}

impl StorageRootResolver for Path {
    fn storage_root(&self) -> NoteResult<PathBuf> {
        Ok(self.to_path_buf())
    }
}

/// Resolves `~/.note-app`
#[cfg(feature = "desktop")]
#[derive(Debug, Clone, Copy, Default)]
pub struct HomeDirResolver;

#[cfg(feature = "desktop")]
impl StorageRootResolver for HomeDirResolver {
    fn storage_root(&self) -> NoteResult<PathBuf> {
        dirs::home_dir()
            .map(|home| home.join(STORAGE_DIR_NAME))
            .ok_or_else(|| NoteError::Config("Cannot determine home directory".to_string()))
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigData {
    /// Base URL of the note server
    #[serde(default = "default_server_url")]
    pub server_url: String,
    /// Port the embedded server listens on
    #[serde(default = "default_server_port")]
    pub server_port: u16,
    /// Interval of the background pull
    #[serde(default = "default_refresh_interval_ms")]
    pub refresh_interval_ms: u64,
    /// Delay between the push and the pull that follow a local edit
    #[serde(default = "default_push_settle_ms")]
    pub push_settle_ms: u64,
    /// Timeout for a single HTTP request to the server
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Blob name of the local collection
    #[serde(default = "default_notes_blob")]
    pub notes_blob: String,
    /// Blob name of the server snapshot
    #[serde(default = "default_snapshot_blob")]
    pub snapshot_blob: String,
}

fn default_server_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_server_port() -> u16 {
    8080
}

fn default_refresh_interval_ms() -> u64 {
    1000
}

fn default_push_settle_ms() -> u64 {
    300
}

fn default_request_timeout_ms() -> u64 {
    5000
}

fn default_notes_blob() -> String {
    NOTES_BLOB.to_string()
}

fn default_snapshot_blob() -> String {
    SERVER_SNAPSHOT_BLOB.to_string()
}

impl Default for ConfigData {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            server_port: default_server_port(),
            refresh_interval_ms: default_refresh_interval_ms(),
            push_settle_ms: default_push_settle_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            notes_blob: default_notes_blob(),
            snapshot_blob: default_snapshot_blob(),
        }
    }
}

/// Configuration manager
pub struct Config {
    storage_dir: PathBuf,
    config_file: PathBuf,
    data: ConfigData,
}

impl Config {
    /// Create a new configuration manager
    ///
    /// Without the `desktop` feature a storage directory must be given.
    pub fn new(storage_dir: Option<PathBuf>) -> NoteResult<Self> {
        match storage_dir {
            Some(dir) => Self::from_resolver(&dir),
            None => {
                #[cfg(feature = "desktop")]
                {
                    Self::from_resolver(&HomeDirResolver)
                }
                #[cfg(not(feature = "desktop"))]
                {
                    Err(NoteError::Config(
                        "storage_dir is required without the desktop feature".to_string(),
                    ))
                }
            }
        }
    }

    /// Create a configuration manager in the directory chosen by `resolver`
    pub fn from_resolver(resolver: &(impl StorageRootResolver + ?Sized)) -> NoteResult<Self> {
        let storage_dir = resolver.storage_root()?;
        fs::create_dir_all(&storage_dir)?;
        let config_file = storage_dir.join(CONFIG_FILE_NAME);

        let data = match fs::read_to_string(&config_file) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!("Ignoring unreadable {}: {}", config_file.display(), e);
                ConfigData::default()
            }),
            Err(_) => ConfigData::default(),
        };

        let config = Self {
            storage_dir,
            config_file,
            data,
        };

        // Save default config if it doesn't exist
        if !config.config_file.exists() {
            config.save()?;
        }

        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> NoteResult<()> {
        let content = serde_json::to_string_pretty(&self.data)?;
        fs::write(&self.config_file, content)?;
        Ok(())
    }

    /// Get the storage directory path
    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    /// Raw configuration values
    pub fn data(&self) -> &ConfigData {
        &self.data
    }

    pub fn server_url(&self) -> &str {
        &self.data.server_url
    }

    pub fn set_server_url(&mut self, url: &str) -> NoteResult<()> {
        self.data.server_url = url.trim_end_matches('/').to_string();
        self.save()
    }

    pub fn server_port(&self) -> u16 {
        self.data.server_port
    }

    pub fn set_server_port(&mut self, port: u16) -> NoteResult<()> {
        self.data.server_port = port;
        self.save()
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.data.refresh_interval_ms)
    }

    pub fn push_settle_delay(&self) -> Duration {
        Duration::from_millis(self.data.push_settle_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.data.request_timeout_ms)
    }

    pub fn notes_blob(&self) -> &str {
        &self.data.notes_blob
    }

    pub fn snapshot_blob(&self) -> &str {
        &self.data.snapshot_blob
    }

    /// Get a configuration value
    pub fn get(&self, key: &str) -> Option<String> {
        match key {
            "server_url" => Some(self.data.server_url.clone()),
            "server_port" => Some(self.data.server_port.to_string()),
            "refresh_interval_ms" => Some(self.data.refresh_interval_ms.to_string()),
            "push_settle_ms" => Some(self.data.push_settle_ms.to_string()),
            "request_timeout_ms" => Some(self.data.request_timeout_ms.to_string()),
            "notes_blob" => Some(self.data.notes_blob.clone()),
            "snapshot_blob" => Some(self.data.snapshot_blob.clone()),
            _ => None,
        }
    }

    /// Set a configuration value
    pub fn set(&mut self, key: &str, value: &str) -> NoteResult<()> {
        match key {
            "server_url" => self.data.server_url = value.trim_end_matches('/').to_string(),
            "server_port" => self.data.server_port = parse_number(key, value)?,
            "refresh_interval_ms" => self.data.refresh_interval_ms = parse_number(key, value)?,
            "push_settle_ms" => self.data.push_settle_ms = parse_number(key, value)?,
            "request_timeout_ms" => self.data.request_timeout_ms = parse_number(key, value)?,
            "notes_blob" => self.data.notes_blob = value.to_string(),
            "snapshot_blob" => self.data.snapshot_blob = value.to_string(),
            _ => return Err(NoteError::Config(format!("Unknown config key: {}", key))),
        }
        self.save()
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> NoteResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| NoteError::Config(format!("Invalid value for {}: {}", key, value)))
}
