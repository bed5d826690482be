//! In-memory collaborator implementations
//!
//! Mutex-guarded maps with genuine compare-and-swap semantics for the
//! enrichment transition. These back the test suite and the local runner;
//! they also support failure injection so partial-failure paths can be
//! exercised without a real broken dependency.

use crate::errors::{PipelineError, Result};
use crate::models::{CandidatePaper, EnrichmentRecord, PaperRecord, ReadStatus, Stage};
use crate::stores::{
    ExtractionService, MetadataStore, ObjectStore, PaperSource, SearchHit, SearchIndex,
    StoreStats, TransitionOutcome,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Default)]
struct MetadataInner {
    papers: HashMap<String, PaperRecord>,
    enrichment: HashMap<String, EnrichmentRecord>,
    full_text: HashMap<String, String>,
    fail_upsert_ids: HashSet<String>,
}

/// In-memory metadata store with injectable failures and a write counter
#[derive(Default)]
pub struct InMemoryMetadataStore {
    inner: Mutex<MetadataInner>,
    unavailable: AtomicBool,
    write_count: AtomicUsize,
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate systemic unavailability: every call fails until cleared
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make paper upserts for one id fail with a per-record error
    pub fn fail_upserts_for(&self, id: &str) {
        lock(&self.inner).fail_upsert_ids.insert(id.to_string());
    }

    /// Number of successful paper/enrichment/full-text writes so far
    pub fn write_count(&self) -> usize {
        self.write_count.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(PipelineError::StoreUnavailable {
                message: "in-memory store marked unavailable".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl MetadataStore for InMemoryMetadataStore {
    async fn ping(&self) -> Result<()> {
        self.check_available()
    }

    async fn get_paper(&self, id: &str) -> Result<Option<PaperRecord>> {
        self.check_available()?;
        Ok(lock(&self.inner).papers.get(id).cloned())
    }

    async fn upsert_paper(&self, paper: &PaperRecord) -> Result<()> {
        self.check_available()?;
        let mut inner = lock(&self.inner);
        if inner.fail_upsert_ids.contains(&paper.id) {
            return Err(PipelineError::RecordPersistence {
                paper_id: paper.id.clone(),
                message: "write rejected".into(),
            });
        }
        inner.papers.insert(paper.id.clone(), paper.clone());
        self.write_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn list_papers(&self, min_score: f64, limit: Option<usize>) -> Result<Vec<PaperRecord>> {
        self.check_available()?;
        let inner = lock(&self.inner);
        let mut papers: Vec<PaperRecord> = inner
            .papers
            .values()
            .filter(|p| p.relevance_score >= min_score)
            .cloned()
            .collect();
        papers.sort_by(|a, b| {
            b.relevance_score
                .partial_cmp(&a.relevance_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        if let Some(limit) = limit {
            papers.truncate(limit);
        }
        Ok(papers)
    }

    async fn set_read_status(&self, id: &str, status: ReadStatus) -> Result<bool> {
        self.check_available()?;
        let mut inner = lock(&self.inner);
        match inner.papers.get_mut(id) {
            Some(paper) => {
                paper.read_status = status;
                self.write_count.fetch_add(1, Ordering::SeqCst);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn set_starred(&self, id: &str, starred: bool) -> Result<bool> {
        self.check_available()?;
        let mut inner = lock(&self.inner);
        match inner.papers.get_mut(id) {
            Some(paper) => {
                paper.starred = starred;
                self.write_count.fetch_add(1, Ordering::SeqCst);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn set_notes(&self, id: &str, notes: Option<String>) -> Result<bool> {
        self.check_available()?;
        let mut inner = lock(&self.inner);
        match inner.papers.get_mut(id) {
            Some(paper) => {
                paper.notes = notes;
                self.write_count.fetch_add(1, Ordering::SeqCst);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get_enrichment(&self, paper_id: &str) -> Result<Option<EnrichmentRecord>> {
        self.check_available()?;
        Ok(lock(&self.inner).enrichment.get(paper_id).cloned())
    }

    async fn upsert_enrichment(&self, record: &EnrichmentRecord) -> Result<()> {
        self.check_available()?;
        lock(&self.inner)
            .enrichment
            .insert(record.paper_id.clone(), record.clone());
        self.write_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn transition_enrichment(
        &self,
        paper_id: &str,
        expected: Stage,
        updated: EnrichmentRecord,
    ) -> Result<TransitionOutcome> {
        self.check_available()?;
        let mut inner = lock(&self.inner);
        match inner.enrichment.get(paper_id) {
            Some(stored) if stored.stage == expected => {
                inner.enrichment.insert(paper_id.to_string(), updated.clone());
                self.write_count.fetch_add(1, Ordering::SeqCst);
                Ok(TransitionOutcome::Applied(updated))
            }
            Some(stored) => Ok(TransitionOutcome::Conflict(stored.clone())),
            None => Err(PipelineError::PaperNotFound {
                id: paper_id.to_string(),
            }),
        }
    }

    async fn put_full_text(&self, paper_id: &str, text: &str) -> Result<()> {
        self.check_available()?;
        lock(&self.inner)
            .full_text
            .insert(paper_id.to_string(), text.to_string());
        self.write_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn get_full_text(&self, paper_id: &str) -> Result<Option<String>> {
        self.check_available()?;
        Ok(lock(&self.inner).full_text.get(paper_id).cloned())
    }

    async fn stats(&self) -> Result<StoreStats> {
        self.check_available()?;
        let inner = lock(&self.inner);
        let total = inner.papers.len();
        let sum: f64 = inner.papers.values().map(|p| p.relevance_score).sum();
        let avg = if total > 0 { sum / total as f64 } else { 0.0 };

        let mut stats = StoreStats {
            total_papers: total,
            read_papers: inner
                .papers
                .values()
                .filter(|p| p.read_status == ReadStatus::Read)
                .count(),
            starred_papers: inner.papers.values().filter(|p| p.starred).count(),
            high_relevance_papers: inner
                .papers
                .values()
                .filter(|p| p.relevance_score > 0.7)
                .count(),
            avg_relevance: (avg * 1000.0).round() / 1000.0,
            ..StoreStats::default()
        };
        for record in inner.enrichment.values() {
            match record.stage {
                Stage::Pending => stats.enrichment_pending += 1,
                Stage::Acquired => stats.enrichment_acquired += 1,
                Stage::Extracted => stats.enrichment_extracted += 1,
                Stage::Indexed => stats.enrichment_indexed += 1,
                Stage::Failed => stats.enrichment_failed += 1,
            }
        }
        Ok(stats)
    }
}

/// In-memory object store keyed by sha-derived locations
#[derive(Default)]
pub struct InMemoryObjectStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    full: AtomicBool,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a full volume: subsequent puts fail with `StorageFull`
    pub fn set_full(&self, full: bool) {
        self.full.store(full, Ordering::SeqCst);
    }

    pub fn object_count(&self) -> usize {
        lock(&self.objects).len()
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<String> {
        if self.full.load(Ordering::SeqCst) {
            return Err(PipelineError::StorageFull);
        }
        let location = format!("mem://{key}");
        lock(&self.objects).insert(location.clone(), bytes);
        Ok(location)
    }

    async fn get(&self, location: &str) -> Result<Vec<u8>> {
        lock(&self.objects)
            .get(location)
            .cloned()
            .ok_or_else(|| PipelineError::StorageUnavailable {
                message: format!("no object at {location}"),
            })
    }
}

/// In-memory search index with naive term-frequency ranking
#[derive(Default)]
pub struct InMemorySearchIndex {
    docs: Mutex<HashMap<String, (String, String)>>,
    unavailable: AtomicBool,
    index_calls: AtomicUsize,
}

impl InMemorySearchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn index_calls(&self) -> usize {
        self.index_calls.load(Ordering::SeqCst)
    }

    pub fn contains(&self, paper_id: &str) -> bool {
        lock(&self.docs).contains_key(paper_id)
    }
}

#[async_trait]
impl SearchIndex for InMemorySearchIndex {
    async fn index(&self, paper_id: &str, title: &str, text: &str) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(PipelineError::IndexUnavailable {
                message: "in-memory index marked unavailable".into(),
            });
        }
        self.index_calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.docs).insert(paper_id.to_string(), (title.to_string(), text.to_string()));
        Ok(())
    }

    async fn query(&self, text: &str, limit: usize) -> Result<Vec<SearchHit>> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(PipelineError::IndexUnavailable {
                message: "in-memory index marked unavailable".into(),
            });
        }
        let terms: Vec<String> = text
            .to_lowercase()
            .split_whitespace()
            .map(str::to_string)
            .collect();
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let docs = lock(&self.docs);
        let mut hits: Vec<SearchHit> = docs
            .iter()
            .filter_map(|(id, (title, body))| {
                let haystack = format!("{} {}", title, body).to_lowercase();
                let matched = terms.iter().filter(|t| haystack.contains(*t)).count();
                if matched == 0 {
                    return None;
                }
                Some(SearchHit {
                    paper_id: id.clone(),
                    title: title.clone(),
                    score: matched as f64 / terms.len() as f64,
                })
            })
            .collect();
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.paper_id.cmp(&b.paper_id))
        });
        hits.truncate(limit);
        Ok(hits)
    }
}

/// A paper source serving a fixed candidate set, with per-paper binaries
#[derive(Default)]
pub struct StaticSource {
    candidates: Mutex<Vec<CandidatePaper>>,
    binaries: Mutex<HashMap<String, Vec<u8>>>,
    unavailable: AtomicBool,
}

impl StaticSource {
    pub fn new(candidates: Vec<CandidatePaper>) -> Self {
        Self {
            candidates: Mutex::new(candidates),
            binaries: Mutex::new(HashMap::new()),
            unavailable: AtomicBool::new(false),
        }
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn set_binary(&self, paper_id: &str, bytes: Vec<u8>) {
        lock(&self.binaries).insert(paper_id.to_string(), bytes);
    }
}

#[async_trait]
impl PaperSource for StaticSource {
    async fn fetch_candidates(
        &self,
        categories: &[String],
        since: DateTime<Utc>,
    ) -> Result<Vec<CandidatePaper>> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(PipelineError::SourceUnavailable {
                message: "static source marked unavailable".into(),
            });
        }
        let monitored: HashSet<&str> = categories.iter().map(String::as_str).collect();
        Ok(lock(&self.candidates)
            .iter()
            .filter(|c| c.published_date >= since)
            .filter(|c| {
                monitored.is_empty()
                    || c.categories.iter().any(|cat| monitored.contains(cat.as_str()))
            })
            .cloned()
            .collect())
    }

    async fn fetch_binary(&self, paper: &PaperRecord) -> Result<Vec<u8>> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(PipelineError::SourceUnavailable {
                message: "static source marked unavailable".into(),
            });
        }
        lock(&self.binaries)
            .get(&paper.id)
            .cloned()
            .ok_or_else(|| PipelineError::AcquisitionFailed {
                paper_id: paper.id.clone(),
                message: "no binary available".into(),
            })
    }
}

/// Extraction that treats the binary as UTF-8 text, for tests and demos
#[derive(Default)]
pub struct PassthroughExtractor {
    calls: AtomicUsize,
}

impl PassthroughExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExtractionService for PassthroughExtractor {
    async fn extract_text(&self, bytes: &[u8]) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        String::from_utf8(bytes.to_vec()).map_err(|_| PipelineError::UnsupportedFormat {
            message: "binary is not valid UTF-8".into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SubStage;

    fn paper(id: &str, score: f64) -> PaperRecord {
        PaperRecord {
            id: id.to_string(),
            title: format!("Paper {id}"),
            summary: "summary".into(),
            authors: vec![],
            categories: vec!["cs.LG".into()],
            published_date: Utc::now(),
            added_date: Utc::now(),
            pdf_url: None,
            relevance_score: score,
            read_status: ReadStatus::Unread,
            starred: false,
            notes: None,
        }
    }

    #[tokio::test]
    async fn test_list_orders_by_score() {
        let store = InMemoryMetadataStore::new();
        store.upsert_paper(&paper("a", 0.3)).await.unwrap();
        store.upsert_paper(&paper("b", 0.9)).await.unwrap();
        store.upsert_paper(&paper("c", 0.6)).await.unwrap();

        let listed = store.list_papers(0.5, None).await.unwrap();
        let ids: Vec<&str> = listed.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
    }

    #[tokio::test]
    async fn test_transition_cas_applies_once() {
        let store = InMemoryMetadataStore::new();
        let now = Utc::now();
        let record = EnrichmentRecord::new("a", now);
        store.upsert_enrichment(&record).await.unwrap();

        let mut winner = record.clone();
        winner.stage = Stage::Acquired;
        let outcome = store
            .transition_enrichment("a", Stage::Pending, winner.clone())
            .await
            .unwrap();
        assert!(matches!(outcome, TransitionOutcome::Applied(_)));

        // Second attempt from the same source stage loses
        let outcome = store
            .transition_enrichment("a", Stage::Pending, winner)
            .await
            .unwrap();
        match outcome {
            TransitionOutcome::Conflict(stored) => assert_eq!(stored.stage, Stage::Acquired),
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unavailable_store_fails_systemically() {
        let store = InMemoryMetadataStore::new();
        store.set_unavailable(true);
        let err = store.ping().await.unwrap_err();
        assert!(err.is_systemic());
    }

    #[tokio::test]
    async fn test_stats_counts_enrichment_stages() {
        let store = InMemoryMetadataStore::new();
        store.upsert_paper(&paper("a", 0.9)).await.unwrap();
        let now = Utc::now();
        let mut record = EnrichmentRecord::new("a", now);
        record.mark_failed(SubStage::Acquire, "down".into(), now);
        store.upsert_enrichment(&record).await.unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.total_papers, 1);
        assert_eq!(stats.high_relevance_papers, 1);
        assert_eq!(stats.enrichment_failed, 1);
    }

    #[tokio::test]
    async fn test_object_store_roundtrip_and_full() {
        let objects = InMemoryObjectStore::new();
        let location = objects.put("a.pdf", b"content".to_vec()).await.unwrap();
        assert_eq!(objects.get(&location).await.unwrap(), b"content".to_vec());

        objects.set_full(true);
        assert!(matches!(
            objects.put("b.pdf", vec![]).await,
            Err(PipelineError::StorageFull)
        ));
    }

    #[tokio::test]
    async fn test_search_index_ranking() {
        let index = InMemorySearchIndex::new();
        index
            .index("a", "Sparse Autoencoders", "features and circuits")
            .await
            .unwrap();
        index.index("b", "Diffusion Models", "images").await.unwrap();

        let hits = index.query("sparse circuits", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].paper_id, "a");
    }

    #[tokio::test]
    async fn test_static_source_filters_by_category() {
        let mut candidate = CandidatePaper {
            id: "a".into(),
            title: "t".into(),
            summary: "s".into(),
            authors: vec![],
            categories: vec!["cs.LG".into()],
            published_date: Utc::now(),
            pdf_url: None,
        };
        let other = {
            candidate.id = "a".into();
            let mut c = candidate.clone();
            c.id = "b".into();
            c.categories = vec!["math.CO".into()];
            c
        };
        let source = StaticSource::new(vec![candidate, other]);
        let since = Utc::now() - chrono::Duration::days(1);
        let fetched = source
            .fetch_candidates(&["cs.LG".to_string()], since)
            .await
            .unwrap();
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0].id, "a");
    }
}
