//! Configuration module for the backup exporter
//!
//! Supports loading configuration from a TOML file.
//! Configuration is stored in a standard location:
//! - Windows: %APPDATA%\xml_backup_exporter\config.toml
//! - Linux: ~/.config/xml_backup_exporter/config.toml
//! - macOS: ~/Library/Application Support/xml_backup_exporter/config.toml

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application name used for config directory
const APP_NAME: &str = "xml_backup_exporter";

/// Default config file name
const CONFIG_FILE_NAME: &str = "config.toml";

/// Local config files checked before the standard location
const LOCAL_CONFIG_FILES: &[&str] = &["./config.toml", "./xml_backup_exporter.toml"];

/// Default maximum length of a generated file name, in bytes
pub const DEFAULT_MAX_FILENAME_LENGTH: usize = 200;

/// Get the standard configuration directory for the application.
pub fn get_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_NAME))
}

/// Get the standard configuration file path.
pub fn get_config_path() -> Option<PathBuf> {
    get_config_dir().map(|dir| dir.join(CONFIG_FILE_NAME))
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Output settings
    pub output: OutputConfig,

    /// MMS media filters
    pub media: MediaConfig,

    /// Call log settings
    pub calls: CallsConfig,

    /// vCard/contacts settings
    pub contacts: ContactsConfig,

    /// Logging settings
    pub logging: LoggingConfig,
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OutputConfig {
    /// Default output directory, used when none is given on the command line
    pub directory: Option<PathBuf>,

    /// Longest file name written for extracted media (bytes, extension included)
    pub max_filename_length: usize,
}

/// Media category toggles for MMS attachment extraction
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MediaConfig {
    /// Extract image/* parts
    pub include_images: bool,

    /// Extract video/* parts
    pub include_videos: bool,

    /// Extract audio/* parts
    pub include_audio: bool,

    /// Extract application/pdf parts
    pub include_pdfs: bool,
}

/// Call log configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CallsConfig {
    /// Sort rows by timestamp instead of keeping source order
    pub sort_by_timestamp: bool,
}

/// vCard extraction configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ContactsConfig {
    /// Download URL-valued PHOTO/LOGO/SOUND/KEY properties
    pub fetch_remote: bool,

    /// Whole-request timeout for remote media, in seconds
    pub fetch_timeout_secs: u64,

    /// Connection timeout for remote media, in seconds
    pub connect_timeout_secs: u64,

    /// Also write a contacts.csv index next to the media files
    pub write_index: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: error, warn, info, debug, trace
    pub level: String,

    /// Log to file
    pub log_to_file: bool,

    /// Log file path
    pub log_file: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: None,
            max_filename_length: DEFAULT_MAX_FILENAME_LENGTH,
        }
    }
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            include_images: true,
            include_videos: true,
            include_audio: true,
            include_pdfs: true,
        }
    }
}

impl MediaConfig {
    /// Names of the enabled categories, for status output
    pub fn enabled_categories(&self) -> Vec<&'static str> {
        let mut categories = Vec::new();
        if self.include_images {
            categories.push("images");
        }
        if self.include_videos {
            categories.push("videos");
        }
        if self.include_audio {
            categories.push("audio");
        }
        if self.include_pdfs {
            categories.push("PDFs");
        }
        categories
    }

    /// Check if every category is switched off
    pub fn is_empty(&self) -> bool {
        !(self.include_images || self.include_videos || self.include_audio || self.include_pdfs)
    }
}

impl Default for ContactsConfig {
    fn default() -> Self {
        Self {
            fetch_remote: true,
            fetch_timeout_secs: 30,
            connect_timeout_secs: 10,
            write_index: false,
        }
    }
}

impl ContactsConfig {
    /// Request timeout as a `Duration`
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    /// Connect timeout as a `Duration`
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_to_file: false,
            log_file: PathBuf::from("./xml_backup_exporter.log"),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(path.to_path_buf(), e.to_string()))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;

        Ok(config)
    }

    /// Load configuration from default locations
    ///
    /// Search order:
    /// 1. ./config.toml
    /// 2. ./xml_backup_exporter.toml
    /// 3. Standard config location
    ///
    /// If no config file is found, returns default configuration.
    pub fn load_default() -> Result<Self, ConfigError> {
        match Self::find_config_file() {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// Get the first existing config file, if any
    pub fn find_config_file() -> Option<PathBuf> {
        LOCAL_CONFIG_FILES
            .iter()
            .map(PathBuf::from)
            .chain(get_config_path())
            .find(|path| path.exists())
    }

    /// Get the path where the config file is (or would be) located.
    pub fn get_active_config_path() -> PathBuf {
        Self::find_config_file()
            .or_else(get_config_path)
            .unwrap_or_else(|| PathBuf::from("./config.toml"))
    }

    /// Generate a default config file with comments
    pub fn generate_default_config() -> String {
        include_str!("../../config.example.toml").to_string()
    }
}

/// Configuration error types
#[derive(Debug)]
pub enum ConfigError {
    /// Configuration file was not found at the specified path
    FileNotFound(PathBuf),
    /// Failed to read the configuration file
    ReadError(PathBuf, String),
    /// Failed to parse the configuration file (invalid TOML)
    ParseError(PathBuf, String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::FileNotFound(path) => {
                write!(f, "Configuration file not found: {}", path.display())
            }
            ConfigError::ReadError(path, err) => {
                write!(
                    f,
                    "Failed to read config file '{}': {}",
                    path.display(),
                    err
                )
            }
            ConfigError::ParseError(path, err) => {
                write!(
                    f,
                    "Failed to parse config file '{}': {}",
                    path.display(),
                    err
                )
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_media_defaults_all_enabled() {
        let media = MediaConfig::default();
        assert!(media.include_images);
        assert!(media.include_videos);
        assert!(media.include_audio);
        assert!(media.include_pdfs);
        assert!(!media.is_empty());
        assert_eq!(
            media.enabled_categories(),
            vec!["images", "videos", "audio", "PDFs"]
        );
    }

    #[test]
    fn test_media_all_disabled() {
        let media = MediaConfig {
            include_images: false,
            include_videos: false,
            include_audio: false,
            include_pdfs: false,
        };
        assert!(media.is_empty());
        assert!(media.enabled_categories().is_empty());
    }

    #[test]
    fn test_contacts_defaults() {
        let contacts = ContactsConfig::default();
        assert!(contacts.fetch_remote);
        assert!(!contacts.write_index);
        assert_eq!(contacts.fetch_timeout(), Duration::from_secs(30));
        assert_eq!(contacts.connect_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [media]
            include_videos = false

            [calls]
            sort_by_timestamp = true
            "#,
        )
        .unwrap();

        assert!(config.media.include_images);
        assert!(!config.media.include_videos);
        assert!(config.calls.sort_by_timestamp);
        assert_eq!(config.output.max_filename_length, DEFAULT_MAX_FILENAME_LENGTH);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        fs::write(
            &path,
            "[output]\ndirectory = \"/tmp/exported\"\n\n[contacts]\nfetch_remote = false\n",
        )
        .unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.output.directory, Some(PathBuf::from("/tmp/exported")));
        assert!(!loaded.contacts.fetch_remote);
        assert_eq!(loaded.contacts.fetch_timeout_secs, 30);
        assert_eq!(loaded.media, MediaConfig::default());
    }

    #[test]
    fn test_load_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let result = Config::load(temp_dir.path().join("absent.toml"));
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_load_invalid_toml() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("broken.toml");
        fs::write(&path, "[media\ninclude_images = ").unwrap();
        let result = Config::load(&path);
        assert!(matches!(result, Err(ConfigError::ParseError(_, _))));
    }

    #[test]
    fn test_example_config_parses() {
        let config: Config = toml::from_str(&Config::generate_default_config()).unwrap();
        assert_eq!(config.media, MediaConfig::default());
        assert_eq!(config.contacts, ContactsConfig::default());
    }
}
