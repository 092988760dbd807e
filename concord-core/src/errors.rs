use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DiffError {
    #[error("Document too large: {actual_size} bytes exceeds limit of {max_size} bytes")]
    DocumentTooLarge { actual_size: usize, max_size: usize },

    #[error("Maximum diff depth exceeded: depth {depth} > {max_depth}")]
    MaxDepthExceeded { depth: usize, max_depth: usize },

    #[error("Invalid merge strategy: {reason}")]
    InvalidMergeStrategy { reason: String },

    #[error("Merge operation failed: {reason} (paths: {})", conflict_paths.join(", "))]
    MergeOperationFailed {
        reason: String,
        conflict_paths: Vec<String>,
    },

    #[error("Conflict detection failed: {reason}")]
    ConflictDetectionFailed { reason: String },

    #[error("Change set generation failed: {reason}")]
    ChangeSetGenerationFailed { reason: String },

    #[error("Failed to apply change at '{path}': {reason}")]
    ChangeApplicationFailed { path: String, reason: String },

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid configuration: {0}")]
    Configuration(String),
}

impl DiffError {
    pub fn merge_failed(reason: impl Into<String>, conflict_paths: Vec<String>) -> Self {
        DiffError::MergeOperationFailed {
            reason: reason.into(),
            conflict_paths,
        }
    }

    pub fn application_failed(path: impl Into<String>, reason: impl Into<String>) -> Self {
        DiffError::ChangeApplicationFailed {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Stable machine-readable code for this error kind.
    pub fn code(&self) -> &'static str {
        match self {
            DiffError::DocumentTooLarge { .. } => "document_too_large",
            DiffError::MaxDepthExceeded { .. } => "max_depth_exceeded",
            DiffError::InvalidMergeStrategy { .. } => "invalid_merge_strategy",
            DiffError::MergeOperationFailed { .. } => "merge_operation_failed",
            DiffError::ConflictDetectionFailed { .. } => "conflict_detection_failed",
            DiffError::ChangeSetGenerationFailed { .. } => "change_set_generation_failed",
            DiffError::ChangeApplicationFailed { .. } => "change_application_failed",
            DiffError::InvalidPath(_) => "invalid_path",
            DiffError::Serialization(_) => "serialization",
            DiffError::Configuration(_) => "configuration",
        }
    }
}

impl From<serde_json::Error> for DiffError {
    fn from(err: serde_json::Error) -> Self {
        DiffError::Serialization(err.to_string())
    }
}
