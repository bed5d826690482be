//! Paper records and incoming candidate metadata

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Read state of a stored paper, mutated only by the user
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadStatus {
    #[default]
    Unread,
    Read,
}

/// Raw paper metadata as delivered by the upstream source.
///
/// Validated at the ingestion boundary with [`CandidatePaper::validate`];
/// everything past that boundary works with [`PaperRecord`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CandidatePaper {
    /// Stable external identifier, e.g. an arXiv id like "2401.00001"
    pub id: String,
    pub title: String,
    pub summary: String,
    pub authors: Vec<String>,
    pub categories: Vec<String>,
    pub published_date: DateTime<Utc>,
    pub pdf_url: Option<String>,
}

impl CandidatePaper {
    /// Check the boundary invariants: non-empty id and title.
    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("candidate has an empty id".into());
        }
        if self.title.trim().is_empty() {
            return Err(format!("candidate {} has an empty title", self.id));
        }
        Ok(())
    }

    /// Title and summary combined, the text the signal computers score.
    pub fn scoring_text(&self) -> String {
        format!("{} {}", self.title, self.summary)
    }
}

/// A persisted paper. `id` is the unique key: a record arriving with an id
/// already present is an update target, never a second insert.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PaperRecord {
    pub id: String,
    pub title: String,
    pub summary: String,
    pub authors: Vec<String>,
    pub categories: Vec<String>,
    pub published_date: DateTime<Utc>,
    pub added_date: DateTime<Utc>,
    pub pdf_url: Option<String>,
    /// Composite relevance score in [0.0, 1.0], recomputed on each scoring pass
    pub relevance_score: f64,
    /// User-mutated; the pipeline preserves it across merges
    pub read_status: ReadStatus,
    /// User-mutated; the pipeline preserves it across merges
    pub starred: bool,
    /// Free-form user annotation; the pipeline preserves it across merges
    pub notes: Option<String>,
}

impl PaperRecord {
    /// Build a fresh record from a first-sighted candidate.
    pub fn from_candidate(candidate: &CandidatePaper, score: f64, now: DateTime<Utc>) -> Self {
        Self {
            id: candidate.id.clone(),
            title: candidate.title.clone(),
            summary: candidate.summary.clone(),
            authors: candidate.authors.clone(),
            categories: candidate.categories.clone(),
            published_date: candidate.published_date,
            added_date: now,
            pdf_url: candidate.pdf_url.clone(),
            relevance_score: score,
            read_status: ReadStatus::default(),
            starred: false,
            notes: None,
        }
    }

    /// Whether the stored metadata differs from an incoming candidate.
    ///
    /// Category comparison is order-insensitive; relevance score and
    /// user-mutated fields never count as differences.
    pub fn differs_from(&self, candidate: &CandidatePaper) -> bool {
        if self.title != candidate.title || self.summary != candidate.summary {
            return true;
        }
        let stored: BTreeSet<&str> = self.categories.iter().map(String::as_str).collect();
        let incoming: BTreeSet<&str> = candidate.categories.iter().map(String::as_str).collect();
        stored != incoming
    }
}
