//! Collaborator contracts consumed by the pipeline
//!
//! The pipeline core never talks to a concrete database, object store, or
//! search index; it drives these traits. Real deployments plug in network
//! implementations, the test suite and the local runner use the in-memory
//! ones from [`memory`].

pub mod memory;

use crate::errors::Result;
use crate::models::{CandidatePaper, EnrichmentRecord, PaperRecord, ReadStatus, Stage};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of a conditional enrichment transition
#[derive(Clone, Debug, PartialEq)]
pub enum TransitionOutcome {
    /// The expected stage matched; the update was applied
    Applied(EnrichmentRecord),
    /// Someone else transitioned first; carries what is stored now
    Conflict(EnrichmentRecord),
}

/// Aggregate store statistics for the stats command
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreStats {
    pub total_papers: usize,
    pub read_papers: usize,
    pub starred_papers: usize,
    pub high_relevance_papers: usize,
    pub avg_relevance: f64,
    pub enrichment_pending: usize,
    pub enrichment_acquired: usize,
    pub enrichment_extracted: usize,
    pub enrichment_indexed: usize,
    pub enrichment_failed: usize,
}

/// One full-text search result
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub paper_id: String,
    pub title: String,
    pub score: f64,
}

/// Upstream paper metadata source (e.g. the arXiv API)
#[async_trait]
pub trait PaperSource: Send + Sync {
    /// Fetch candidate papers in the monitored categories published since
    /// the given date. Fails with `SourceUnavailable`.
    async fn fetch_candidates(
        &self,
        categories: &[String],
        since: DateTime<Utc>,
    ) -> Result<Vec<CandidatePaper>>;

    /// Download the paper's binary (PDF). Callers pace these requests; the
    /// source itself does not. Fails with `AcquisitionFailed`.
    async fn fetch_binary(&self, paper: &PaperRecord) -> Result<Vec<u8>>;
}

/// Single source of truth for paper and enrichment state
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Reachability check, called at the start of a run
    async fn ping(&self) -> Result<()>;

    async fn get_paper(&self, id: &str) -> Result<Option<PaperRecord>>;

    async fn upsert_paper(&self, paper: &PaperRecord) -> Result<()>;

    /// Papers with `relevance_score >= min_score`, ordered by score descending
    async fn list_papers(&self, min_score: f64, limit: Option<usize>) -> Result<Vec<PaperRecord>>;

    /// Returns false when the paper does not exist
    async fn set_read_status(&self, id: &str, status: ReadStatus) -> Result<bool>;

    /// Returns false when the paper does not exist
    async fn set_starred(&self, id: &str, starred: bool) -> Result<bool>;

    /// Replace the user's notes; `None` clears them.
    /// Returns false when the paper does not exist
    async fn set_notes(&self, id: &str, notes: Option<String>) -> Result<bool>;

    async fn get_enrichment(&self, paper_id: &str) -> Result<Option<EnrichmentRecord>>;

    async fn upsert_enrichment(&self, record: &EnrichmentRecord) -> Result<()>;

    /// Per-id atomic compare-and-swap: apply `updated` only if the stored
    /// stage still equals `expected`. At most one of two concurrent
    /// transitions from the same source stage wins.
    async fn transition_enrichment(
        &self,
        paper_id: &str,
        expected: Stage,
        updated: EnrichmentRecord,
    ) -> Result<TransitionOutcome>;

    async fn put_full_text(&self, paper_id: &str, text: &str) -> Result<()>;

    async fn get_full_text(&self, paper_id: &str) -> Result<Option<String>>;

    async fn stats(&self) -> Result<StoreStats>;
}

/// Binary object storage for acquired PDFs
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store bytes under a key, returning an opaque location handle.
    /// Fails with `StorageFull` or `StorageUnavailable`.
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<String>;

    /// Retrieve bytes by location handle
    async fn get(&self, location: &str) -> Result<Vec<u8>>;
}

/// External text extraction (e.g. a Tika-like service or a local parser)
#[async_trait]
pub trait ExtractionService: Send + Sync {
    /// Extract plain text from a binary document.
    /// Fails with `UnsupportedFormat`; callers bound it with a timeout.
    async fn extract_text(&self, bytes: &[u8]) -> Result<String>;
}

/// Full-text search index
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Submit a document for indexing. Fails with `IndexUnavailable` or
    /// `IndexRejected`.
    async fn index(&self, paper_id: &str, title: &str, text: &str) -> Result<()>;

    /// Query indexed documents, ranked by relevance
    async fn query(&self, text: &str, limit: usize) -> Result<Vec<SearchHit>>;
}
