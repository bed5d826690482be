//! Enrichment state machine records
//!
//! One [`EnrichmentRecord`] exists per paper that crossed the relevance
//! threshold. Its stage only moves forward (`Pending -> Acquired ->
//! Extracted -> Indexed`) except on an explicit retry, which resets a
//! `Failed` record to the failed sub-stage's predecessor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Position of a paper in the enrichment state machine
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Pending,
    Acquired,
    Extracted,
    Indexed,
    Failed,
}

impl Stage {
    /// Ordering rank for monotonicity checks. `Failed` carries no rank:
    /// it is terminal-until-retried, not part of the success ladder.
    pub fn rank(&self) -> Option<u8> {
        match self {
            Stage::Pending => Some(0),
            Stage::Acquired => Some(1),
            Stage::Extracted => Some(2),
            Stage::Indexed => Some(3),
            Stage::Failed => None,
        }
    }
}

/// The sub-stage an enrichment failure occurred in
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubStage {
    Acquire,
    Extract,
    Index,
}

impl SubStage {
    /// The stage a retry resets to: the failed sub-stage's predecessor.
    pub fn predecessor(&self) -> Stage {
        match self {
            SubStage::Acquire => Stage::Pending,
            SubStage::Extract => Stage::Acquired,
            SubStage::Index => Stage::Extracted,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentRecord {
    pub paper_id: String,
    pub stage: Stage,

    /// Which sub-stage failed; present only when `stage == Failed`
    pub failed_sub_stage: Option<SubStage>,
    pub failure_message: Option<String>,

    /// Opaque handle to the stored binary, set once acquired
    pub object_location: Option<String>,
    /// sha256 of the acquired binary, set alongside `object_location`
    pub content_hash: Option<String>,
    /// Length of the extracted text, set once extracted
    pub text_length: Option<usize>,

    pub attempt_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EnrichmentRecord {
    /// Fresh record for a paper that just crossed the enrichment threshold.
    pub fn new(paper_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            paper_id: paper_id.into(),
            stage: Stage::Pending,
            failed_sub_stage: None,
            failure_message: None,
            object_location: None,
            content_hash: None,
            text_length: None,
            attempt_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Terminal success: nothing left to do.
    pub fn is_complete(&self) -> bool {
        self.stage == Stage::Indexed
    }

    /// The sub-stage the next `advance` invocation would run, if any.
    pub fn next_sub_stage(&self) -> Option<SubStage> {
        match self.stage {
            Stage::Pending => Some(SubStage::Acquire),
            Stage::Acquired => Some(SubStage::Extract),
            Stage::Extracted => Some(SubStage::Index),
            Stage::Indexed | Stage::Failed => None,
        }
    }

    /// Whether the stored stage has already reached `target`.
    pub fn has_reached(&self, target: Stage) -> bool {
        match (self.stage.rank(), target.rank()) {
            (Some(current), Some(target)) => current >= target,
            _ => false,
        }
    }

    /// Mark the record failed at `sub_stage`, preserving fields set by
    /// earlier successful stages.
    pub fn mark_failed(&mut self, sub_stage: SubStage, message: String, now: DateTime<Utc>) {
        self.stage = Stage::Failed;
        self.failed_sub_stage = Some(sub_stage);
        self.failure_message = Some(message);
        self.attempt_count += 1;
        self.updated_at = now;
    }

    /// Reset a failed record to the failed sub-stage's predecessor.
    ///
    /// Returns the stage the record was reset to, or `None` when the record
    /// is not in `Failed` (retry on a healthy record is a no-op).
    pub fn reset_for_retry(&mut self, now: DateTime<Utc>) -> Option<Stage> {
        let failed = self.failed_sub_stage.take()?;
        if self.stage != Stage::Failed {
            self.failed_sub_stage = Some(failed);
            return None;
        }
        let target = failed.predecessor();
        self.stage = target;
        self.failure_message = None;
        self.updated_at = now;
        Some(target)
    }
}
