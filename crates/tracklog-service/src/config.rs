//! Service configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Service configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// MQTT transport settings.
    pub mqtt: MqttConfig,
    /// Storage settings.
    pub storage: StorageConfig,
    /// Backup scheduling and offload settings.
    pub backup: BackupConfig,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = default_config_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Read {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Save configuration to a file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;

        // Create parent directories if needed
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        std::fs::write(path.as_ref(), content).map_err(|e| ConfigError::Write {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Validate the configuration and return any errors.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        errors.extend(self.mqtt.validate());
        errors.extend(self.storage.validate());
        errors.extend(self.backup.validate());

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }
}

/// MQTT transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    /// Broker URL (e.g., "mqtt://localhost:1883" or "mqtts://broker:8883").
    pub broker: String,
    /// Client identifier presented to the broker.
    pub client_id: String,
    /// Topic prefix to record; the service subscribes to `{prefix}/#`.
    pub topic_prefix: String,
    /// Optional username for broker authentication.
    pub username: Option<String>,
    /// Optional password for broker authentication.
    pub password: Option<String>,
    /// Keep-alive interval in seconds.
    pub keep_alive: u64,
    /// Subscription QoS level (0, 1, or 2).
    pub qos: u8,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            broker: "mqtt://localhost:1883".to_string(),
            client_id: "tracklog".to_string(),
            topic_prefix: "owntracks".to_string(),
            username: None,
            password: None,
            keep_alive: 30,
            qos: 1,
        }
    }
}

impl MqttConfig {
    /// Validate MQTT configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.broker.is_empty() {
            errors.push(ValidationError {
                field: "mqtt.broker".to_string(),
                message: "broker URL cannot be empty".to_string(),
            });
        } else if !self.broker.starts_with("mqtt://") && !self.broker.starts_with("mqtts://") {
            errors.push(ValidationError {
                field: "mqtt.broker".to_string(),
                message: format!(
                    "invalid broker URL '{}': must start with mqtt:// or mqtts://",
                    self.broker
                ),
            });
        }

        if self.client_id.is_empty() {
            errors.push(ValidationError {
                field: "mqtt.client_id".to_string(),
                message: "client id cannot be empty".to_string(),
            });
        }

        if self.topic_prefix.is_empty() {
            errors.push(ValidationError {
                field: "mqtt.topic_prefix".to_string(),
                message: "topic prefix cannot be empty".to_string(),
            });
        } else if self.topic_prefix.contains(['#', '+']) {
            errors.push(ValidationError {
                field: "mqtt.topic_prefix".to_string(),
                message: format!(
                    "topic prefix '{}' must not contain wildcards; the subscription adds /# itself",
                    self.topic_prefix
                ),
            });
        }

        if self.qos > 2 {
            errors.push(ValidationError {
                field: "mqtt.qos".to_string(),
                message: format!("QoS {} is invalid: must be 0, 1, or 2", self.qos),
            });
        }

        errors
    }
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Database file path.
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: tracklog_store::default_db_path(),
        }
    }
}

impl StorageConfig {
    /// Validate storage configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.path.as_os_str().is_empty() {
            errors.push(ValidationError {
                field: "storage.path".to_string(),
                message: "database path cannot be empty".to_string(),
            });
        }

        errors
    }
}

/// Backup scheduling and offload configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    /// Delay before the first backup cycle, in seconds.
    pub startup_delay_secs: u64,
    /// Interval between backup cycles, in seconds.
    pub interval_secs: u64,
    /// Directory where snapshot files are written.
    pub dir: PathBuf,
    /// Remote folder snapshots are uploaded into ("" means the root).
    pub remote_folder: String,
}

/// Minimum backup interval in seconds.
pub const MIN_BACKUP_INTERVAL: u64 = 60;

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            startup_delay_secs: 10,
            interval_secs: 60 * 60 * 24,
            dir: PathBuf::from("."),
            remote_folder: String::new(),
        }
    }
}

impl BackupConfig {
    /// Validate backup configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.interval_secs < MIN_BACKUP_INTERVAL {
            errors.push(ValidationError {
                field: "backup.interval_secs".to_string(),
                message: format!(
                    "backup interval {} is too short (minimum {} seconds)",
                    self.interval_secs, MIN_BACKUP_INTERVAL
                ),
            });
        }

        if self.dir.as_os_str().is_empty() {
            errors.push(ValidationError {
                field: "backup.dir".to_string(),
                message: "backup directory cannot be empty".to_string(),
            });
        }

        if !self.remote_folder.is_empty() && !self.remote_folder.starts_with('/') {
            errors.push(ValidationError {
                field: "backup.remote_folder".to_string(),
                message: format!(
                    "remote folder '{}' must start with '/' (or be empty for the root)",
                    self.remote_folder
                ),
            });
        }

        errors
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),
    #[error("Failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Configuration validation failed:\n{}", format_validation_errors(.0))]
    Validation(Vec<ValidationError>),
}

/// A single validation error with context.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// The field path (e.g., `mqtt.broker`).
    pub field: String,
    /// Description of the validation failure.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn format_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tracklog")
        .join("config.toml")
}
