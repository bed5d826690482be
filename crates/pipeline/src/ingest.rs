//! Batch ingestion pipeline
//!
//! Drives dedup -> score -> persist for a batch of candidates, sequentially
//! and in arrival order so a later candidate in the batch observes an
//! earlier candidate's insert. Per-candidate failures are captured in the
//! report; only systemic store unavailability aborts the batch.

use crate::dedup::{merge_update, Deduplicator, Resolution};
use crate::scoring::ScoringEngine;
use chrono::Utc;
use paperscout_common::errors::{ErrorKind, PipelineError, Result};
use paperscout_common::metrics::{record_candidate, record_score};
use paperscout_common::models::{CandidatePaper, PaperRecord};
use paperscout_common::stores::MetadataStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// One candidate that could not be processed
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CandidateFailure {
    pub paper_id: String,
    pub kind: ErrorKind,
    pub reason: String,
}

/// Outcome counts and enrichment-eligible ids for one batch
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct IngestionReport {
    pub new: usize,
    pub updated: usize,
    pub duplicate: usize,
    /// Persisted papers whose score fell below the relevance threshold
    pub below_threshold: usize,
    pub failed: Vec<CandidateFailure>,
    /// Ids with `score >= min_relevance_score`, in arrival order
    pub eligible: Vec<String>,
}

impl IngestionReport {
    pub fn processed(&self) -> usize {
        self.new + self.updated + self.duplicate + self.failed.len()
    }
}

pub struct IngestionPipeline {
    store: Arc<dyn MetadataStore>,
    dedup: Deduplicator,
    engine: Arc<ScoringEngine>,
}

impl IngestionPipeline {
    pub fn new(store: Arc<dyn MetadataStore>, engine: Arc<ScoringEngine>) -> Self {
        Self {
            dedup: Deduplicator::new(Arc::clone(&store)),
            store,
            engine,
        }
    }

    /// Process a batch of candidates.
    ///
    /// Returns a fatal error only when the metadata store is systemically
    /// unavailable; everything else lands in the report.
    #[instrument(skip(self, candidates), fields(batch = candidates.len()))]
    pub async fn run(&self, candidates: &[CandidatePaper]) -> Result<IngestionReport> {
        // A dead store fails the batch up front rather than candidate by
        // candidate.
        self.store.ping().await?;

        let threshold = self.engine.min_relevance_score();
        let mut report = IngestionReport::default();

        for candidate in candidates {
            match self.process_one(candidate, threshold, &mut report).await {
                Ok(()) => {}
                Err(err) if err.is_systemic() => return Err(err),
                Err(err) => {
                    warn!(paper_id = %candidate.id, error = %err, "Candidate failed");
                    record_candidate("failed");
                    report.failed.push(CandidateFailure {
                        paper_id: candidate.id.clone(),
                        kind: err.kind(),
                        reason: err.to_string(),
                    });
                }
            }
        }

        info!(
            new = report.new,
            updated = report.updated,
            duplicate = report.duplicate,
            below_threshold = report.below_threshold,
            failed = report.failed.len(),
            eligible = report.eligible.len(),
            "Ingestion batch complete"
        );
        Ok(report)
    }

    async fn process_one(
        &self,
        candidate: &CandidatePaper,
        threshold: f64,
        report: &mut IngestionReport,
    ) -> Result<()> {
        if let Err(reason) = candidate.validate() {
            return Err(PipelineError::RecordPersistence {
                paper_id: candidate.id.clone(),
                message: reason,
            });
        }

        let record = match self.dedup.resolve(candidate).await? {
            Resolution::Duplicate => {
                // No rescoring, no write, and never a second enrichment
                // trigger for this id.
                record_candidate("duplicate");
                report.duplicate += 1;
                return Ok(());
            }
            Resolution::New => {
                let breakdown = self.engine.score(candidate).await?;
                record_score(breakdown.composite);
                let record = PaperRecord::from_candidate(candidate, breakdown.composite, Utc::now());
                self.store.upsert_paper(&record).await?;
                record_candidate("new");
                report.new += 1;
                record
            }
            Resolution::Update(existing) => {
                let breakdown = self.engine.score(candidate).await?;
                record_score(breakdown.composite);
                let record = merge_update(&existing, candidate, breakdown.composite, Utc::now());
                self.store.upsert_paper(&record).await?;
                record_candidate("updated");
                report.updated += 1;
                record
            }
        };

        if record.relevance_score >= threshold {
            report.eligible.push(record.id);
        } else {
            report.below_threshold += 1;
        }
        Ok(())
    }
}
