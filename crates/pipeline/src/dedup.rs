//! Candidate deduplication
//!
//! Resolves whether an incoming candidate is new, an update to a stored
//! paper, or an exact duplicate. The distinction matters downstream:
//! rescoring an update may flip enrichment eligibility, while a duplicate
//! must never re-trigger enrichment.

use chrono::{DateTime, Utc};
use paperscout_common::errors::Result;
use paperscout_common::models::{CandidatePaper, PaperRecord};
use paperscout_common::stores::MetadataStore;
use std::sync::Arc;
use tracing::debug;

/// Resolution of one incoming candidate against the store
#[derive(Clone, Debug, PartialEq)]
pub enum Resolution {
    /// No record with this id exists yet
    New,
    /// A record exists and its metadata differs; carries the stored record
    /// so the caller can merge without a second read
    Update(Box<PaperRecord>),
    /// A record exists and is unchanged; no write may happen
    Duplicate,
}

pub struct Deduplicator {
    store: Arc<dyn MetadataStore>,
}

impl Deduplicator {
    pub fn new(store: Arc<dyn MetadataStore>) -> Self {
        Self { store }
    }

    /// Look up the candidate's id and classify it.
    pub async fn resolve(&self, candidate: &CandidatePaper) -> Result<Resolution> {
        match self.store.get_paper(&candidate.id).await? {
            None => Ok(Resolution::New),
            Some(existing) if existing.differs_from(candidate) => {
                debug!(paper_id = %candidate.id, "Candidate updates an existing record");
                Ok(Resolution::Update(Box::new(existing)))
            }
            Some(_) => Ok(Resolution::Duplicate),
        }
    }
}

/// Merge an update candidate into the stored record.
///
/// Pipeline-owned fields (title, summary, categories, score) come from the
/// candidate and the fresh scoring pass; user-mutated fields (`read_status`,
/// `starred`, `notes`) and `added_date` are preserved from the stored record.
/// Enrichment state lives in its own record and is untouched here.
pub fn merge_update(
    existing: &PaperRecord,
    candidate: &CandidatePaper,
    score: f64,
    now: DateTime<Utc>,
) -> PaperRecord {
    let mut merged = PaperRecord::from_candidate(candidate, score, now);
    merged.added_date = existing.added_date;
    merged.read_status = existing.read_status;
    merged.starred = existing.starred;
    merged.notes = existing.notes.clone();
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use paperscout_common::models::ReadStatus;
    use paperscout_common::stores::memory::InMemoryMetadataStore;

    fn candidate() -> CandidatePaper {
        CandidatePaper {
            id: "2401.00001".into(),
            title: "Sparse Autoencoders for Interpretability".into(),
            summary: "We study sparse autoencoders.".into(),
            authors: vec!["A. Author".into()],
            categories: vec!["cs.LG".into()],
            published_date: Utc::now(),
            pdf_url: None,
        }
    }

    #[tokio::test]
    async fn test_unknown_id_is_new() {
        let store = Arc::new(InMemoryMetadataStore::new());
        let dedup = Deduplicator::new(store);
        assert_eq!(dedup.resolve(&candidate()).await.unwrap(), Resolution::New);
    }

    #[tokio::test]
    async fn test_unchanged_candidate_is_duplicate() {
        let store = Arc::new(InMemoryMetadataStore::new());
        let c = candidate();
        store
            .upsert_paper(&PaperRecord::from_candidate(&c, 0.8, Utc::now()))
            .await
            .unwrap();

        let dedup = Deduplicator::new(store);
        assert_eq!(dedup.resolve(&c).await.unwrap(), Resolution::Duplicate);
    }

    #[tokio::test]
    async fn test_changed_categories_is_update() {
        let store = Arc::new(InMemoryMetadataStore::new());
        let c = candidate();
        store
            .upsert_paper(&PaperRecord::from_candidate(&c, 0.8, Utc::now()))
            .await
            .unwrap();

        let mut changed = c.clone();
        changed.categories.push("stat.ML".into());

        let dedup = Deduplicator::new(store);
        match dedup.resolve(&changed).await.unwrap() {
            Resolution::Update(existing) => assert_eq!(existing.id, c.id),
            other => panic!("expected update, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_merge_preserves_user_fields() {
        let c = candidate();
        let added = Utc::now() - chrono::Duration::days(10);
        let mut existing = PaperRecord::from_candidate(&c, 0.5, added);
        existing.read_status = ReadStatus::Read;
        existing.starred = true;
        existing.notes = Some("re-read section 3".into());

        let mut changed = c.clone();
        changed.summary = "Expanded abstract.".into();

        let merged = merge_update(&existing, &changed, 0.9, Utc::now());
        assert_eq!(merged.read_status, ReadStatus::Read);
        assert!(merged.starred);
        assert_eq!(merged.notes.as_deref(), Some("re-read section 3"));
        assert_eq!(merged.added_date, added);
        assert_eq!(merged.summary, "Expanded abstract.");
        assert_eq!(merged.relevance_score, 0.9);
    }
}
