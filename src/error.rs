use serde::Serialize;

/// Main error type for the application
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// I/O errors (file operations, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The input could not be decoded as a raster image
    #[error("Image decode error for {identity}: {reason}")]
    ImageDecode {
        /// Path or other identity of the offending image.
        identity: String,
        /// What went wrong while decoding.
        reason: String,
    },

    /// The model artifact is missing, corrupt or incompatible with the runtime
    #[error("Model load error: {0}")]
    ModelLoad(String),

    /// The model produced an output that cannot be used as an embedding
    #[error("Inference error: {0}")]
    Inference(String),

    /// Two embeddings of different length were compared
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Length of the left-hand embedding.
        expected: usize,
        /// Length of the right-hand embedding.
        actual: usize,
    },

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input parameters
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Model artifact download errors
    #[error("Download error: {0}")]
    Download(String),

    /// Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Standard error report format, used for JSON output
#[derive(Serialize)]
#[derive(Debug)]
pub struct ErrorResponse {
    /// Stable error kind
    pub kind: &'static str,
    /// Error message
    pub message: String,
}

impl AppError {
    /// Whether this error concerns a single image only.
    ///
    /// Per-image failures are logged and the image is excluded from the
    /// results; every other error aborts the run.
    pub fn is_per_image(&self) -> bool {
        matches!(self, Self::ImageDecode { .. } | Self::Inference(_))
    }

    /// Short machine-readable name of the error kind
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Io(_) => "io",
            Self::ImageDecode { .. } => "image_decode",
            Self::ModelLoad(_) => "model_load",
            Self::Inference(_) => "inference",
            Self::DimensionMismatch { .. } => "dimension_mismatch",
            Self::Json(_) => "json",
            Self::Config(_) => "config",
            Self::InvalidInput(_) => "invalid_input",
            Self::NotFound(_) => "not_found",
            Self::Download(_) => "download",
            Self::Internal(_) => "internal",
        }
    }

    /// Convert the error to a JSON-serializable report
    pub fn to_json(&self) -> ErrorResponse {
        ErrorResponse {
            kind: self.kind(),
            message: self.to_string(),
        }
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        AppError::Internal(format!("Task join error: {}", err))
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<rayon::ThreadPoolBuildError> for AppError {
    fn from(err: rayon::ThreadPoolBuildError) -> Self {
        AppError::Internal(format!("Worker pool error: {}", err))
    }
}

#[cfg(feature = "download")]
impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::Download(err.to_string())
    }
}

/// Result type alias for the application
pub type Result<T> = std::result::Result<T, AppError>;

/// Extension trait for working with Results
pub trait ResultExt<T> {
    /// Add context to an error
    fn context<C>(self, context: C) -> Result<T>
    where
        C: std::fmt::Display + Send + Sync + 'static;

    /// Add context to an error if the result is an error
    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: std::fmt::Display + Send + Sync + 'static,
        F: FnOnce() -> C;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn context<C>(self, context: C) -> Result<T>
    where
        C: std::fmt::Display + Send + Sync + 'static,
    {
        self.map_err(|e| AppError::Internal(format!("{}: {}", context, e)))
    }

    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: std::fmt::Display + Send + Sync + 'static,
        F: FnOnce() -> C,
    {
        self.map_err(|e| {
            let context = f();
            AppError::Internal(format!("{}: {}", context, e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_per_image_classification() {
        let decode = AppError::ImageDecode {
            identity: "a.png".to_string(),
            reason: "truncated".to_string(),
        };
        assert!(decode.is_per_image());
        assert!(AppError::Inference("rank 3".to_string()).is_per_image());

        assert!(!AppError::ModelLoad("missing".to_string()).is_per_image());
        assert!(!AppError::DimensionMismatch { expected: 512, actual: 3 }.is_per_image());
    }

    #[test]
    fn test_to_json() {
        let err = AppError::DimensionMismatch { expected: 3, actual: 2 };
        let report = err.to_json();
        assert_eq!(report.kind, "dimension_mismatch");
        assert_eq!(report.message, "Dimension mismatch: expected 3, got 2");
    }

    #[test]
    fn test_result_context() {
        let res: std::result::Result<(), std::io::Error> =
            Err(std::io::Error::new(std::io::ErrorKind::Other, "boom"));
        let err = res.context("reading config").unwrap_err();
        assert_eq!(err.to_string(), "Internal error: reading config: boom");
    }
}
