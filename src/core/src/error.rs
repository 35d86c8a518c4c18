use thiserror::Error;

/// Conversion error types
#[derive(Error, Debug)]
pub enum ConvertError {
    /// Failure reading manifest, config, or layer content from an image source
    #[error("Source read error: {0}")]
    SourceRead(String),

    /// Failure building a new layer, image, or index from otherwise-valid input
    #[error("Construction error: {0}")]
    Construction(String),

    /// An error wrapped with the operation that produced it
    #[error("{stage}: {source}")]
    Stage {
        stage: String,
        #[source]
        source: Box<ConvertError>,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Malformed OCI/Docker document or layout
    #[error("OCI image error: {0}")]
    OciImageError(String),
}

impl ConvertError {
    /// Wrap this error with the name of the operation that failed.
    pub fn during(self, stage: impl Into<String>) -> Self {
        ConvertError::Stage {
            stage: stage.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error beneath any stage wrappers.
    pub fn root_cause(&self) -> &ConvertError {
        let mut current = self;
        while let ConvertError::Stage { source, .. } = current {
            current = source;
        }
        current
    }

    /// Stage names from outermost to innermost.
    pub fn stages(&self) -> Vec<&str> {
        let mut stages = Vec::new();
        let mut current = self;
        while let ConvertError::Stage { stage, source } = current {
            stages.push(stage.as_str());
            current = source;
        }
        stages
    }

    pub fn is_source_read(&self) -> bool {
        matches!(
            self.root_cause(),
            ConvertError::SourceRead(_) | ConvertError::IoError(_)
        )
    }

    pub fn is_construction(&self) -> bool {
        matches!(self.root_cause(), ConvertError::Construction(_))
    }
}

impl From<serde_json::Error> for ConvertError {
    fn from(err: serde_json::Error) -> Self {
        ConvertError::SerializationError(err.to_string())
    }
}

impl From<serde_yaml::Error> for ConvertError {
    fn from(err: serde_yaml::Error) -> Self {
        ConvertError::SerializationError(err.to_string())
    }
}

/// Adds the failing operation's name to an error as it propagates.
pub trait StageExt<T> {
    fn stage(self, stage: impl Into<String>) -> Result<T>;
}

impl<T, E: Into<ConvertError>> StageExt<T> for std::result::Result<T, E> {
    fn stage(self, stage: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().during(stage))
    }
}

/// Result type alias for conversion operations
pub type Result<T> = std::result::Result<T, ConvertError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_read_error_display() {
        let error = ConvertError::SourceRead("connection reset".to_string());
        assert_eq!(error.to_string(), "Source read error: connection reset");
    }

    #[test]
    fn test_construction_error_display() {
        let error = ConvertError::Construction("truncated gzip stream".to_string());
        assert_eq!(
            error.to_string(),
            "Construction error: truncated gzip stream"
        );
    }

    #[test]
    fn test_stage_wraps_message() {
        let error = ConvertError::SourceRead("blob missing".to_string())
            .during("converting layers")
            .during("converting image sha256:abc");
        assert_eq!(
            error.to_string(),
            "converting image sha256:abc: converting layers: Source read error: blob missing"
        );
    }

    #[test]
    fn test_root_cause_and_stages() {
        let error = ConvertError::Construction("bad".to_string())
            .during("appending layers")
            .during("outer");
        assert!(matches!(error.root_cause(), ConvertError::Construction(_)));
        assert_eq!(error.stages(), vec!["outer", "appending layers"]);
        assert!(error.is_construction());
        assert!(!error.is_source_read());
    }

    #[test]
    fn test_stage_ext_on_result() {
        let result: std::result::Result<(), std::io::Error> = Err(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "eof",
        ));
        let error = result.stage("getting image layers").unwrap_err();
        assert!(error.to_string().starts_with("getting image layers: I/O error"));
        assert!(error.is_source_read());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let error: ConvertError = io_error.into();
        assert!(matches!(error, ConvertError::IoError(_)));
        assert!(error.to_string().contains("file not found"));
    }

    #[test]
    fn test_serde_json_error_conversion() {
        let result: std::result::Result<serde_json::Value, _> = serde_json::from_str("{ nope }");
        let error: ConvertError = result.unwrap_err().into();
        assert!(matches!(error, ConvertError::SerializationError(_)));
    }

    #[test]
    fn test_serde_yaml_error_conversion() {
        let result: std::result::Result<serde_yaml::Value, _> =
            serde_yaml::from_str("invalid: yaml: content:");
        let error: ConvertError = result.unwrap_err().into();
        assert!(matches!(error, ConvertError::SerializationError(_)));
    }
}
