//! Error types for the lip-sync pipeline
//!
//! Every stage failure is terminal for its task. The status store records the
//! [`ErrorKind`] name together with the rendered message, so the messages here
//! carry the external tool's diagnostic text verbatim.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Errors produced by the pipeline and its components
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Bad or missing request input
    #[error("Validation error: {0}")]
    Validation(String),

    /// Language tag outside the supported set
    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),

    /// Engine not installed, not loaded or unreachable
    #[error("Engine {engine} unavailable: {message}")]
    EngineUnavailable { engine: String, message: String },

    /// Engine ran but failed to produce audio
    #[error("Speech synthesis failed: {0}")]
    SynthesisFailed(String),

    #[error("Failed to probe duration of {path}: {message}")]
    ProbeFailed { path: PathBuf, message: String },

    #[error("Audio transform failed: {0}")]
    TransformFailed(String),

    #[error("Video concatenation failed: {0}")]
    ConcatenationFailed(String),

    #[error("Muxing failed: {0}")]
    MuxFailed(String),

    /// Precondition path missing before the inference call
    #[error("Missing dependency {which}: {path}")]
    MissingDependency { which: String, path: PathBuf },

    #[error("Lip-sync inference failed: {0}")]
    InferenceFailed(String),

    #[error("Stage {stage} timed out after {seconds}s")]
    Timeout { stage: String, seconds: u64 },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Speaker {0} is already registered")]
    AlreadyRegistered(String),

    #[error("Source video is {duration:.2}s, shorter than one {clip_length:.2}s clip")]
    InsufficientSourceLength { duration: f64, clip_length: f64 },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Stable, caller-visible name of an error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    ValidationError,
    UnsupportedLanguage,
    EngineUnavailable,
    SynthesisFailed,
    ProbeFailed,
    TransformFailed,
    ConcatenationFailed,
    MuxFailed,
    MissingDependency,
    InferenceFailed,
    Timeout,
    NotFound,
    AlreadyRegistered,
    InsufficientSourceLength,
    Configuration,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ValidationError => "ValidationError",
            Self::UnsupportedLanguage => "UnsupportedLanguage",
            Self::EngineUnavailable => "EngineUnavailable",
            Self::SynthesisFailed => "SynthesisFailed",
            Self::ProbeFailed => "ProbeFailed",
            Self::TransformFailed => "TransformFailed",
            Self::ConcatenationFailed => "ConcatenationFailed",
            Self::MuxFailed => "MuxFailed",
            Self::MissingDependency => "MissingDependency",
            Self::InferenceFailed => "InferenceFailed",
            Self::Timeout => "Timeout",
            Self::NotFound => "NotFound",
            Self::AlreadyRegistered => "AlreadyRegistered",
            Self::InsufficientSourceLength => "InsufficientSourceLength",
            Self::Configuration => "Configuration",
            Self::Internal => "Internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::ValidationError,
            Self::UnsupportedLanguage(_) => ErrorKind::UnsupportedLanguage,
            Self::EngineUnavailable { .. } => ErrorKind::EngineUnavailable,
            Self::SynthesisFailed(_) => ErrorKind::SynthesisFailed,
            Self::ProbeFailed { .. } => ErrorKind::ProbeFailed,
            Self::TransformFailed(_) => ErrorKind::TransformFailed,
            Self::ConcatenationFailed(_) => ErrorKind::ConcatenationFailed,
            Self::MuxFailed(_) => ErrorKind::MuxFailed,
            Self::MissingDependency { .. } => ErrorKind::MissingDependency,
            Self::InferenceFailed(_) => ErrorKind::InferenceFailed,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::AlreadyRegistered(_) => ErrorKind::AlreadyRegistered,
            Self::InsufficientSourceLength { .. } => ErrorKind::InsufficientSourceLength,
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Io(_) | Self::Json(_) | Self::Http(_) => ErrorKind::Internal,
        }
    }
}

/// Result type for the pipeline
pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names_match_taxonomy() {
        let err = PipelineError::UnsupportedLanguage("fr".to_string());
        assert_eq!(err.kind().as_str(), "UnsupportedLanguage");

        let err = PipelineError::Timeout { stage: "MUXING".to_string(), seconds: 30 };
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert_eq!(err.to_string(), "Stage MUXING timed out after 30s");

        let err = PipelineError::Validation("text is required".to_string());
        assert_eq!(err.kind().to_string(), "ValidationError");
    }

    #[test]
    fn test_missing_dependency_display() {
        let err = PipelineError::MissingDependency {
            which: "checkpoint".to_string(),
            path: PathBuf::from("/models/wav2lip_gan.pth"),
        };
        assert_eq!(err.to_string(), "Missing dependency checkpoint: /models/wav2lip_gan.pth");
    }

    #[test]
    fn test_io_error_is_internal() {
        let err: PipelineError = std::io::Error::new(std::io::ErrorKind::Other, "disk full").into();
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert!(err.to_string().contains("disk full"));
    }

    #[test]
    fn test_kind_serializes_as_name() {
        let json = serde_json::to_string(&ErrorKind::InsufficientSourceLength).unwrap();
        assert_eq!(json, "\"InsufficientSourceLength\"");
    }
}
