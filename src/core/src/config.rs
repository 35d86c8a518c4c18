use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{ConvertError, Result};
use crate::log::LogConfig;

/// How a layer's byte stream is held while it is re-wrapped under a new media type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LayerBuffer {
    /// Read the whole layer into memory (default).
    #[default]
    Memory,
    /// Spool the layer to an anonymous temporary file.
    TempFile,
}

/// Conversion configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvertConfig {
    /// Buffering strategy for rebuilt layers
    pub layer_buffer: LayerBuffer,

    /// Directory for temp-file spooling (system temp dir when unset)
    pub spool_dir: Option<PathBuf>,

    /// Compare rebuilt layer digests against the source layer
    pub verify_digests: bool,

    /// Logging configuration
    pub log: LogConfig,
}

impl Default for ConvertConfig {
    fn default() -> Self {
        Self {
            layer_buffer: LayerBuffer::Memory,
            spool_dir: None,
            verify_digests: true,
            log: LogConfig::default(),
        }
    }
}

impl ConvertConfig {
    /// Parse a configuration from YAML (JSON is accepted as a YAML subset).
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| ConvertError::ConfigError(format!("Failed to parse config: {}", e)))
    }

    /// Load a configuration file. `.json` files are parsed as JSON, anything else as YAML.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ConvertError::ConfigError(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str(&content).map_err(|e| {
                ConvertError::ConfigError(format!(
                    "Failed to parse config file {}: {}",
                    path.display(),
                    e
                ))
            }),
            _ => Self::from_yaml_str(&content),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::{LogFormat, LogLevel};
    use tempfile::TempDir;

    #[test]
    fn test_convert_config_defaults() {
        let config = ConvertConfig::default();
        assert_eq!(config.layer_buffer, LayerBuffer::Memory);
        assert!(config.spool_dir.is_none());
        assert!(config.verify_digests);
    }

    #[test]
    fn test_from_yaml_str() {
        let config = ConvertConfig::from_yaml_str(
            "layer_buffer: temp-file\nspool_dir: /var/tmp/ocify\nlog:\n  level: debug\n  format: json\n",
        )
        .unwrap();
        assert_eq!(config.layer_buffer, LayerBuffer::TempFile);
        assert_eq!(config.spool_dir, Some(PathBuf::from("/var/tmp/ocify")));
        assert!(config.verify_digests);
        assert_eq!(config.log.level, LogLevel::Debug);
        assert_eq!(config.log.format, LogFormat::Json);
    }

    #[test]
    fn test_from_yaml_str_rejects_unknown_buffer() {
        let result = ConvertConfig::from_yaml_str("layer_buffer: mmap\n");
        assert!(matches!(result, Err(ConvertError::ConfigError(_))));
    }

    #[test]
    fn test_from_file_json_and_yaml() {
        let dir = TempDir::new().unwrap();

        let json_path = dir.path().join("ocify.json");
        std::fs::write(&json_path, r#"{"verify_digests": false}"#).unwrap();
        let config = ConvertConfig::from_file(&json_path).unwrap();
        assert!(!config.verify_digests);
        assert_eq!(config.layer_buffer, LayerBuffer::Memory);

        let yaml_path = dir.path().join("ocify.yaml");
        std::fs::write(&yaml_path, "layer_buffer: temp-file\n").unwrap();
        let config = ConvertConfig::from_file(&yaml_path).unwrap();
        assert_eq!(config.layer_buffer, LayerBuffer::TempFile);
    }

    #[test]
    fn test_from_file_missing() {
        let result = ConvertConfig::from_file("/nonexistent/ocify.yaml");
        assert!(result.unwrap_err().to_string().contains("Failed to read config file"));
    }
}
