//! Error types for the PaperScout pipeline
//!
//! Provides a single error taxonomy with:
//! - Distinct variants per failure mode of each external collaborator
//! - A systemic/per-record split that drives batch abort decisions
//! - A mapping from enrichment failures to the sub-stage that caused them

use crate::models::SubStage;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using PipelineError
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Machine-readable error kinds for reports and metrics labels
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    SourceUnavailable,
    RecordPersistence,
    StoreUnavailable,
    AcquisitionFailed,
    StorageFull,
    StorageUnavailable,
    ExtractionTimeout,
    UnsupportedFormat,
    EmptyExtraction,
    IndexUnavailable,
    IndexRejected,
    EmbeddingUnavailable,
    StageConflict,
    PaperNotFound,
    Configuration,
    Internal,
}

/// Pipeline error types
#[derive(Error, Debug)]
pub enum PipelineError {
    // Upstream paper source
    #[error("paper source unavailable: {message}")]
    SourceUnavailable { message: String },

    // Metadata store: per-record write rejection vs systemic unavailability
    #[error("persistence failed for paper {paper_id}: {message}")]
    RecordPersistence { paper_id: String, message: String },

    #[error("metadata store unavailable: {message}")]
    StoreUnavailable { message: String },

    // Enrichment: acquire sub-stage
    #[error("acquisition failed for paper {paper_id}: {message}")]
    AcquisitionFailed { paper_id: String, message: String },

    #[error("object storage full")]
    StorageFull,

    #[error("object storage unavailable: {message}")]
    StorageUnavailable { message: String },

    // Enrichment: extract sub-stage
    #[error("text extraction timed out after {timeout_secs}s")]
    ExtractionTimeout { timeout_secs: u64 },

    #[error("unsupported document format: {message}")]
    UnsupportedFormat { message: String },

    #[error("extraction produced no text")]
    EmptyExtraction,

    // Enrichment: index sub-stage
    #[error("search index unavailable: {message}")]
    IndexUnavailable { message: String },

    #[error("search index rejected paper {paper_id}: {message}")]
    IndexRejected { paper_id: String, message: String },

    // Embedding provider
    #[error("embedding provider unavailable: {message}")]
    EmbeddingUnavailable { message: String },

    // Concurrency
    #[error("enrichment stage for paper {paper_id} changed concurrently")]
    StageConflict { paper_id: String },

    #[error("paper not found: {id}")]
    PaperNotFound { id: String },

    #[error("configuration error: {message}")]
    Configuration { message: String },

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl PipelineError {
    /// Get the machine-readable kind for this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::SourceUnavailable { .. } => ErrorKind::SourceUnavailable,
            PipelineError::RecordPersistence { .. } => ErrorKind::RecordPersistence,
            PipelineError::StoreUnavailable { .. } => ErrorKind::StoreUnavailable,
            PipelineError::AcquisitionFailed { .. } => ErrorKind::AcquisitionFailed,
            PipelineError::StorageFull => ErrorKind::StorageFull,
            PipelineError::StorageUnavailable { .. } => ErrorKind::StorageUnavailable,
            PipelineError::ExtractionTimeout { .. } => ErrorKind::ExtractionTimeout,
            PipelineError::UnsupportedFormat { .. } => ErrorKind::UnsupportedFormat,
            PipelineError::EmptyExtraction => ErrorKind::EmptyExtraction,
            PipelineError::IndexUnavailable { .. } => ErrorKind::IndexUnavailable,
            PipelineError::IndexRejected { .. } => ErrorKind::IndexRejected,
            PipelineError::EmbeddingUnavailable { .. } => ErrorKind::EmbeddingUnavailable,
            PipelineError::StageConflict { .. } => ErrorKind::StageConflict,
            PipelineError::PaperNotFound { .. } => ErrorKind::PaperNotFound,
            PipelineError::Configuration { .. } => ErrorKind::Configuration,
            PipelineError::HttpClient(_) => ErrorKind::SourceUnavailable,
            PipelineError::Serialization(_) => ErrorKind::Internal,
            PipelineError::Other(_) => ErrorKind::Internal,
        }
    }

    /// Whether this failure aborts a whole run rather than a single record.
    ///
    /// Systemic errors mean an external dependency is down entirely; retrying
    /// the next candidate would hit the same wall.
    pub fn is_systemic(&self) -> bool {
        matches!(
            self,
            PipelineError::SourceUnavailable { .. } | PipelineError::StoreUnavailable { .. }
        )
    }

    /// Map an enrichment failure to the sub-stage it belongs to.
    ///
    /// Returns `None` for errors that are not enrichment sub-stage failures
    /// (those propagate instead of being recorded on the EnrichmentRecord).
    pub fn sub_stage(&self) -> Option<SubStage> {
        match self {
            PipelineError::AcquisitionFailed { .. }
            | PipelineError::StorageFull
            | PipelineError::StorageUnavailable { .. }
            | PipelineError::HttpClient(_) => Some(SubStage::Acquire),

            PipelineError::ExtractionTimeout { .. }
            | PipelineError::UnsupportedFormat { .. }
            | PipelineError::EmptyExtraction => Some(SubStage::Extract),

            PipelineError::IndexUnavailable { .. } | PipelineError::IndexRejected { .. } => {
                Some(SubStage::Index)
            }

            _ => None,
        }
    }
}

impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        PipelineError::Other(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_systemic_split() {
        let err = PipelineError::StoreUnavailable {
            message: "connection refused".into(),
        };
        assert!(err.is_systemic());

        let err = PipelineError::RecordPersistence {
            paper_id: "2401.00001".into(),
            message: "write rejected".into(),
        };
        assert!(!err.is_systemic());
    }

    #[test]
    fn test_sub_stage_mapping() {
        let err = PipelineError::ExtractionTimeout { timeout_secs: 30 };
        assert_eq!(err.sub_stage(), Some(SubStage::Extract));

        let err = PipelineError::StorageFull;
        assert_eq!(err.sub_stage(), Some(SubStage::Acquire));

        let err = PipelineError::IndexUnavailable {
            message: "index down".into(),
        };
        assert_eq!(err.sub_stage(), Some(SubStage::Index));

        let err = PipelineError::PaperNotFound { id: "x".into() };
        assert_eq!(err.sub_stage(), None);
    }

    #[test]
    fn test_kind_mapping() {
        let err = PipelineError::EmbeddingUnavailable {
            message: "api error".into(),
        };
        assert_eq!(err.kind(), ErrorKind::EmbeddingUnavailable);
    }
}
