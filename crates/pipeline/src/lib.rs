//! PaperScout pipeline core
//!
//! The relevance scoring & multi-store ingestion pipeline:
//! - `scoring`: signal computers and the composite scoring engine
//! - `dedup`: new/update/duplicate resolution against the metadata store
//! - `ingest`: batch ingestion with per-candidate failure capture
//! - `enrich`: the acquire -> extract -> index state machine
//! - `extract`: local PDF text extraction adapter
//! - `orchestrator`: top-level run driver and command-surface operations

pub mod dedup;
pub mod enrich;
pub mod extract;
pub mod ingest;
pub mod orchestrator;
pub mod scoring;

pub use dedup::{Deduplicator, Resolution};
pub use enrich::{CancelFlag, EnrichmentPipeline};
pub use extract::PdfTextExtractor;
pub use ingest::{IngestionPipeline, IngestionReport};
pub use orchestrator::{EnrichmentDepth, Orchestrator, RunSummary};
pub use scoring::{ScoreBreakdown, ScoringEngine};
