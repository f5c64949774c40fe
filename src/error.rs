//! Error types and handling for crashring

use std::path::PathBuf;

/// Result type alias for crashring operations
pub type Result<T> = std::result::Result<T, CrashLogError>;

/// Error types for segment and channel operations
///
/// None of these ever reach the code being instrumented: channel writers
/// swallow them and the aggregator turns them into missing report sections.
#[derive(Debug, thiserror::Error)]
pub enum CrashLogError {
    /// I/O related errors (file operations, mmap, etc.)
    #[error("I/O error: {message}")]
    Io {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// Invalid parameters or configuration
    #[error("Invalid parameter: {parameter} - {message}")]
    InvalidParameter { parameter: String, message: String },

    /// No segment with this name exists
    #[error("Segment not found: {name} ({path})")]
    SegmentNotFound { name: String, path: PathBuf },

    /// A segment exists under this name but its layout is not the one expected
    #[error("Incompatible segment layout for {name}: {message}")]
    IncompatibleLayout { name: String, message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },
}

impl CrashLogError {
    /// Create an I/O error from a standard I/O error
    pub fn from_io(source: std::io::Error, context: &str) -> Self {
        Self::Io {
            message: format!("{}: {}", context, source),
            source: Some(source),
        }
    }

    /// Create an invalid parameter error
    pub fn invalid_parameter(parameter: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            parameter: parameter.into(),
            message: message.into(),
        }
    }

    /// Create a segment not found error
    pub fn segment_not_found(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self::SegmentNotFound {
            name: name.into(),
            path: path.into(),
        }
    }

    /// Create an incompatible layout error
    pub fn incompatible_layout(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::IncompatibleLayout {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Whether the segment is simply not usable (absent or foreign layout)
    ///
    /// Readers treat both cases the same way: the channel is left out.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            Self::SegmentNotFound { .. } | Self::IncompatibleLayout { .. }
        )
    }
}

// Convert from common error types
impl From<std::io::Error> for CrashLogError {
    fn from(err: std::io::Error) -> Self {
        Self::from_io(err, "I/O operation failed")
    }
}

impl From<serde_json::Error> for CrashLogError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(format!("JSON error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = CrashLogError::segment_not_found("crashring.Test.1", "/dev/shm/crashring.Test.1");
        assert!(matches!(err, CrashLogError::SegmentNotFound { .. }));
        assert!(err.is_unavailable());

        let err = CrashLogError::incompatible_layout("seg", "version 2 != 1");
        assert!(err.is_unavailable());

        let err = CrashLogError::invalid_parameter("line_count", "must be greater than 0");
        assert!(!err.is_unavailable());
    }

    #[test]
    fn test_error_display() {
        let err = CrashLogError::incompatible_layout("seg", "Test message");
        let display = format!("{}", err);
        assert!(display.contains("Incompatible segment layout"));
        assert!(display.contains("Test message"));
    }

    #[test]
    fn test_io_conversion_keeps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: CrashLogError = io.into();
        match err {
            CrashLogError::Io { source, .. } => assert!(source.is_some()),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
