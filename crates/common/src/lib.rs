//! PaperScout Common Library
//!
//! Shared code for the PaperScout pipeline crates including:
//! - Domain models (papers, enrichment records, interest profiles)
//! - Collaborator traits and in-memory reference implementations
//! - Embedding client abstraction
//! - Error types and handling
//! - Configuration management
//! - Metrics and observability

pub mod config;
pub mod embeddings;
pub mod errors;
pub mod metrics;
pub mod models;
pub mod stores;

// Re-export commonly used types
pub use config::AppConfig;
pub use embeddings::Embedder;
pub use errors::{PipelineError, Result};
pub use models::{CandidatePaper, EnrichmentRecord, PaperRecord, Profile, Stage, SubStage};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default embedding dimension for the deterministic hash embedder
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 384;
