//! Session configuration.
//!
//! Every suspension point of a [`Session`](crate::Session) carries its own
//! timeout. The defaults cover Bluetooth LE's slow round trips; the presets
//! trade failure-detection speed against tolerance for a poor radio link.
//!
//! Configuration can be built in code or loaded from TOML, with durations
//! written in milliseconds:
//!
//! ```toml
//! connect_timeout_ms = 20000
//! notification_timeout_ms = 8000
//! name_filter = "Aranet4 1A2B3"
//! cache_reads = true
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default timeout for establishing a connection and discovering services.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
/// Default timeout for a characteristic read.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(10);
/// Default timeout for a characteristic write.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);
/// Default maximum silence between two history pages.
pub const DEFAULT_NOTIFICATION_TIMEOUT: Duration = Duration::from_secs(5);
/// Default time spent scanning for a device.
pub const DEFAULT_SCAN_TIMEOUT: Duration = Duration::from_secs(10);
/// Default advertised-name substring used to recognise an Aranet4.
pub const DEFAULT_NAME_FILTER: &str = "Aranet4";

/// Timeouts and discovery settings for one session.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use aranet4_core::SessionConfig;
///
/// let config = SessionConfig::challenging_environment()
///     .notification_timeout(Duration::from_secs(12));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Timeout for connecting, including service discovery.
    #[serde(rename = "connect_timeout_ms", with = "duration_ms")]
    pub connect_timeout: Duration,
    /// Timeout for a characteristic read.
    #[serde(rename = "read_timeout_ms", with = "duration_ms")]
    pub read_timeout: Duration,
    /// Timeout for a characteristic write.
    #[serde(rename = "write_timeout_ms", with = "duration_ms")]
    pub write_timeout: Duration,
    /// Maximum silence between history pages before the transfer fails.
    #[serde(rename = "notification_timeout_ms", with = "duration_ms")]
    pub notification_timeout: Duration,
    /// Time spent scanning when connecting by name.
    #[serde(rename = "scan_timeout_ms", with = "duration_ms")]
    pub scan_timeout: Duration,
    /// Substring of the advertised name that identifies a device when no
    /// address is given.
    pub name_filter: String,
    /// Reuse status values already read in this session instead of asking
    /// the device again. History transfers always read fresh values.
    pub cache_reads: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            notification_timeout: DEFAULT_NOTIFICATION_TIMEOUT,
            scan_timeout: DEFAULT_SCAN_TIMEOUT,
            name_filter: DEFAULT_NAME_FILTER.to_string(),
            cache_reads: false,
        }
    }
}

impl SessionConfig {
    /// Create a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a config for challenging RF environments.
    ///
    /// Uses longer timeouts to accommodate signal interference,
    /// thick walls, or long distances.
    pub fn challenging_environment() -> Self {
        Self {
            connect_timeout: Duration::from_secs(25),
            read_timeout: Duration::from_secs(15),
            write_timeout: Duration::from_secs(15),
            notification_timeout: Duration::from_secs(10),
            scan_timeout: Duration::from_secs(20),
            ..Self::default()
        }
    }

    /// Create a config for fast, reliable environments.
    ///
    /// Uses shorter timeouts for quicker failure detection
    /// when devices are nearby with strong signals.
    pub fn fast() -> Self {
        Self {
            connect_timeout: Duration::from_secs(8),
            read_timeout: Duration::from_secs(5),
            write_timeout: Duration::from_secs(5),
            notification_timeout: Duration::from_secs(3),
            scan_timeout: Duration::from_secs(5),
            ..Self::default()
        }
    }

    /// Set the connection timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the read timeout.
    #[must_use]
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Set the write timeout.
    #[must_use]
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Set the maximum silence between history pages.
    #[must_use]
    pub fn notification_timeout(mut self, timeout: Duration) -> Self {
        self.notification_timeout = timeout;
        self
    }

    /// Set the scan timeout.
    #[must_use]
    pub fn scan_timeout(mut self, timeout: Duration) -> Self {
        self.scan_timeout = timeout;
        self
    }

    /// Set the advertised-name filter.
    #[must_use]
    pub fn name_filter(mut self, filter: impl Into<String>) -> Self {
        self.name_filter = filter.into();
        self
    }

    /// Enable or disable the per-session read cache.
    #[must_use]
    pub fn cache_reads(mut self, enabled: bool) -> Self {
        self.cache_reads = enabled;
        self
    }

    /// Load configuration from a TOML file. Missing keys keep their defaults.
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

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: PathBuf::from("<string>"),
            source: e,
        })
    }

    /// Load and validate configuration in one step.
    pub fn load_validated<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::load(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration and return any errors.
    ///
    /// This checks that no timeout is zero and that the name filter is not
    /// empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        for (field, value) in [
            ("connect_timeout_ms", self.connect_timeout),
            ("read_timeout_ms", self.read_timeout),
            ("write_timeout_ms", self.write_timeout),
            ("notification_timeout_ms", self.notification_timeout),
            ("scan_timeout_ms", self.scan_timeout),
        ] {
            if value.is_zero() {
                errors.push(ValidationError {
                    field: field.to_string(),
                    message: "timeout must be greater than zero".to_string(),
                });
            }
        }

        if self.name_filter.trim().is_empty() {
            errors.push(ValidationError {
                field: "name_filter".to_string(),
                message: "name filter cannot be empty".to_string(),
            });
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
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
    #[error("Configuration validation failed:\n{}", format_validation_errors(.0))]
    Validation(Vec<ValidationError>),
}

impl From<ConfigError> for crate::Error {
    fn from(err: ConfigError) -> Self {
        crate::Error::InvalidConfig(err.to_string())
    }
}

/// A single validation error with context.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// The field name as written in TOML.
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

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = SessionConfig::default();
        assert_eq!(config.connect_timeout, Duration::from_secs(15));
        assert_eq!(config.read_timeout, Duration::from_secs(10));
        assert_eq!(config.write_timeout, Duration::from_secs(10));
        assert_eq!(config.notification_timeout, Duration::from_secs(5));
        assert_eq!(config.scan_timeout, Duration::from_secs(10));
        assert_eq!(config.name_filter, "Aranet4");
        assert!(!config.cache_reads);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_presets_are_valid() {
        assert!(SessionConfig::fast().validate().is_ok());
        assert!(SessionConfig::challenging_environment().validate().is_ok());
        assert!(
            SessionConfig::fast().notification_timeout
                < SessionConfig::challenging_environment().notification_timeout
        );
    }

    #[test]
    fn test_builder_setters() {
        let config = SessionConfig::new()
            .read_timeout(Duration::from_millis(1500))
            .name_filter("Aranet4 0ABCD");
        assert_eq!(config.read_timeout, Duration::from_millis(1500));
        assert_eq!(config.name_filter, "Aranet4 0ABCD");
    }

    #[test]
    fn test_from_toml_partial() {
        let config = SessionConfig::from_toml_str(
            r#"
            notification_timeout_ms = 8000
            name_filter = "Office"
            cache_reads = true
        "#,
        )
        .unwrap();
        assert!(config.cache_reads);
        assert_eq!(config.notification_timeout, Duration::from_secs(8));
        assert_eq!(config.name_filter, "Office");
        assert_eq!(config.connect_timeout, DEFAULT_CONNECT_TIMEOUT);
    }

    #[test]
    fn test_toml_round_trip() {
        let config = SessionConfig::fast();
        let text = toml::to_string(&config).unwrap();
        assert!(text.contains("read_timeout_ms = 5000"));
        assert_eq!(SessionConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn test_parse_error() {
        let err = SessionConfig::from_toml_str("read_timeout_ms = \"soon\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_validation_collects_all_errors() {
        let config = SessionConfig::default()
            .read_timeout(Duration::ZERO)
            .scan_timeout(Duration::ZERO)
            .name_filter("  ");
        let err = config.validate().unwrap_err();
        match &err {
            ConfigError::Validation(errors) => {
                assert_eq!(errors.len(), 3);
                assert_eq!(errors[0].field, "read_timeout_ms");
                assert_eq!(errors[2].field, "name_filter");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.to_string().contains("  - scan_timeout_ms"));
    }

    #[test]
    fn test_load_missing_file() {
        let err = SessionConfig::load("/nonexistent/aranet4.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_config_error_into_core_error() {
        let err: crate::Error = SessionConfig::default()
            .connect_timeout(Duration::ZERO)
            .validate()
            .unwrap_err()
            .into();
        assert!(matches!(err, crate::Error::InvalidConfig(_)));
    }
}
