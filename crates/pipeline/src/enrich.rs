//! Enrichment pipeline: acquire -> extract -> index
//!
//! Each paper that crossed the relevance threshold owns one
//! [`EnrichmentRecord`] whose stage only moves forward. A step runs under a
//! per-id async lock plus a store-level compare-and-swap, so two workers
//! racing on the same paper perform the external call at most once; the
//! loser observes the new stage and does nothing.
//!
//! Binary downloads are paced through a rate limiter so the upstream source
//! sees at most one request per configured interval, regardless of worker
//! count.

use chrono::Utc;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use paperscout_common::errors::{PipelineError, Result};
use paperscout_common::metrics::record_enrichment_step;
use paperscout_common::models::{EnrichmentRecord, PaperRecord, Stage, SubStage};
use paperscout_common::stores::{
    ExtractionService, MetadataStore, ObjectStore, PaperSource, SearchIndex, TransitionOutcome,
};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

/// Cooperative cancellation shared across enrichment workers
#[derive(Clone, Default)]
pub struct CancelFlag {
    cancelled: Arc<AtomicBool>,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

fn sub_stage_label(sub_stage: SubStage) -> &'static str {
    match sub_stage {
        SubStage::Acquire => "acquire",
        SubStage::Extract => "extract",
        SubStage::Index => "index",
    }
}

pub struct EnrichmentPipeline {
    store: Arc<dyn MetadataStore>,
    objects: Arc<dyn ObjectStore>,
    extractor: Arc<dyn ExtractionService>,
    index: Arc<dyn SearchIndex>,
    source: Arc<dyn PaperSource>,

    /// Paces `fetch_binary` calls; `None` disables pacing
    pacer: Option<DefaultDirectRateLimiter>,
    extract_timeout: Duration,

    /// Per-id locks serializing steps within this process. The store-level
    /// compare-and-swap covers racers outside it.
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl EnrichmentPipeline {
    pub fn new(
        store: Arc<dyn MetadataStore>,
        objects: Arc<dyn ObjectStore>,
        extractor: Arc<dyn ExtractionService>,
        index: Arc<dyn SearchIndex>,
        source: Arc<dyn PaperSource>,
        acquire_interval: Duration,
        extract_timeout: Duration,
    ) -> Self {
        let pacer = Quota::with_period(acquire_interval).map(RateLimiter::direct);
        Self {
            store,
            objects,
            extractor,
            index,
            source,
            pacer,
            extract_timeout,
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn id_lock(&self, paper_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(
            locks
                .entry(paper_id.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))),
        )
    }

    /// Drop the map entry once no other task holds a clone of the lock.
    /// The map and the caller each hold one reference, so a strong count
    /// of two means the entry is idle. Counting and removal both happen
    /// under the map mutex, the same mutex [`id_lock`] clones under.
    ///
    /// [`id_lock`]: EnrichmentPipeline::id_lock
    fn prune_lock(&self, paper_id: &str, lock: &Arc<tokio::sync::Mutex<()>>) {
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if Arc::strong_count(lock) == 2 {
            locks.remove(paper_id);
        }
    }

    async fn load_or_create(&self, paper_id: &str) -> Result<EnrichmentRecord> {
        if let Some(record) = self.store.get_enrichment(paper_id).await? {
            return Ok(record);
        }
        let record = EnrichmentRecord::new(paper_id, Utc::now());
        self.store.upsert_enrichment(&record).await?;
        Ok(record)
    }

    /// Advance a paper's enrichment by exactly one sub-stage.
    ///
    /// Returns the record as stored afterwards. `Indexed` and `Failed`
    /// records come back unchanged; a `Failed` record needs [`retry`] first.
    /// When another worker advanced the record between our read and our
    /// lock, the newer record is returned and no external call is made.
    ///
    /// [`retry`]: EnrichmentPipeline::retry
    #[instrument(skip(self))]
    pub async fn advance(&self, paper_id: &str) -> Result<EnrichmentRecord> {
        let observed = self.load_or_create(paper_id).await?;
        let Some(sub_stage) = observed.next_sub_stage() else {
            return Ok(observed);
        };

        let lock = self.id_lock(paper_id);
        let result = {
            let _guard = lock.lock().await;
            self.advance_locked(paper_id, observed, sub_stage).await
        };
        self.prune_lock(paper_id, &lock);
        result
    }

    async fn advance_locked(
        &self,
        paper_id: &str,
        observed: EnrichmentRecord,
        sub_stage: SubStage,
    ) -> Result<EnrichmentRecord> {
        // Re-read under the lock; a concurrent step may have landed first.
        let current = self
            .store
            .get_enrichment(paper_id)
            .await?
            .unwrap_or(observed.clone());
        if current.stage != observed.stage {
            debug!(paper_id, stage = ?current.stage, "Stage moved concurrently, skipping");
            return Ok(current);
        }

        let paper = self
            .store
            .get_paper(paper_id)
            .await?
            .ok_or_else(|| PipelineError::PaperNotFound {
                id: paper_id.to_string(),
            })?;

        let started = Instant::now();
        let step = self.run_sub_stage(sub_stage, &paper, &current).await;
        let elapsed = started.elapsed().as_secs_f64();

        match step {
            Ok(updated) => {
                record_enrichment_step(sub_stage_label(sub_stage), true, elapsed);
                self.commit(paper_id, current.stage, updated).await
            }
            Err(err) if err.sub_stage().is_some() => {
                record_enrichment_step(sub_stage_label(sub_stage), false, elapsed);
                warn!(paper_id, sub_stage = ?sub_stage, error = %err, "Enrichment step failed");
                let mut failed = current.clone();
                failed.mark_failed(sub_stage, err.to_string(), Utc::now());
                self.commit(paper_id, current.stage, failed).await
            }
            // Systemic store failures and the like propagate to the caller
            Err(err) => Err(err),
        }
    }

    async fn commit(
        &self,
        paper_id: &str,
        expected: Stage,
        updated: EnrichmentRecord,
    ) -> Result<EnrichmentRecord> {
        match self
            .store
            .transition_enrichment(paper_id, expected, updated)
            .await?
        {
            TransitionOutcome::Applied(record) => Ok(record),
            TransitionOutcome::Conflict(stored) => {
                debug!(paper_id, stage = ?stored.stage, "Transition lost to a concurrent writer");
                Ok(stored)
            }
        }
    }

    async fn run_sub_stage(
        &self,
        sub_stage: SubStage,
        paper: &PaperRecord,
        record: &EnrichmentRecord,
    ) -> Result<EnrichmentRecord> {
        match sub_stage {
            SubStage::Acquire => self.acquire(paper, record).await,
            SubStage::Extract => self.extract(paper, record).await,
            SubStage::Index => self.index_paper(paper, record).await,
        }
    }

    async fn acquire(
        &self,
        paper: &PaperRecord,
        record: &EnrichmentRecord,
    ) -> Result<EnrichmentRecord> {
        if let Some(pacer) = &self.pacer {
            pacer.until_ready().await;
        }
        let bytes = self.source.fetch_binary(paper).await?;
        let content_hash = hex::encode(Sha256::digest(&bytes));
        let location = self.objects.put(&format!("{}.pdf", paper.id), bytes).await?;

        let mut updated = record.clone();
        updated.stage = Stage::Acquired;
        updated.object_location = Some(location);
        updated.content_hash = Some(content_hash);
        updated.updated_at = Utc::now();
        Ok(updated)
    }

    async fn extract(
        &self,
        paper: &PaperRecord,
        record: &EnrichmentRecord,
    ) -> Result<EnrichmentRecord> {
        let location = record
            .object_location
            .as_deref()
            .ok_or_else(|| PipelineError::StorageUnavailable {
                message: format!("no object location recorded for paper {}", paper.id),
            })?;
        let bytes = self.objects.get(location).await?;

        let text = tokio::time::timeout(self.extract_timeout, self.extractor.extract_text(&bytes))
            .await
            .map_err(|_| PipelineError::ExtractionTimeout {
                timeout_secs: self.extract_timeout.as_secs(),
            })??;
        if text.trim().is_empty() {
            return Err(PipelineError::EmptyExtraction);
        }

        self.store.put_full_text(&paper.id, &text).await?;

        let mut updated = record.clone();
        updated.stage = Stage::Extracted;
        updated.text_length = Some(text.len());
        updated.updated_at = Utc::now();
        Ok(updated)
    }

    async fn index_paper(
        &self,
        paper: &PaperRecord,
        record: &EnrichmentRecord,
    ) -> Result<EnrichmentRecord> {
        let text = self
            .store
            .get_full_text(&paper.id)
            .await?
            .ok_or(PipelineError::EmptyExtraction)?;
        self.index.index(&paper.id, &paper.title, &text).await?;

        let mut updated = record.clone();
        updated.stage = Stage::Indexed;
        updated.updated_at = Utc::now();
        Ok(updated)
    }

    /// Advance a paper until it reaches `target`, fails, or is cancelled.
    #[instrument(skip(self, cancel))]
    pub async fn run_to(
        &self,
        paper_id: &str,
        target: Stage,
        cancel: &CancelFlag,
    ) -> Result<EnrichmentRecord> {
        let mut record = self.load_or_create(paper_id).await?;
        while !record.has_reached(target) && record.stage != Stage::Failed {
            if cancel.is_cancelled() {
                info!(paper_id, stage = ?record.stage, "Enrichment cancelled");
                return Ok(record);
            }
            record = self.advance(paper_id).await?;
        }
        Ok(record)
    }

    /// Reset a failed record to the failed sub-stage's predecessor so the
    /// failed step can run again. A no-op for records that are not failed.
    #[instrument(skip(self))]
    pub async fn retry(&self, paper_id: &str) -> Result<EnrichmentRecord> {
        let lock = self.id_lock(paper_id);
        let result = {
            let _guard = lock.lock().await;
            self.retry_locked(paper_id).await
        };
        self.prune_lock(paper_id, &lock);
        result
    }

    async fn retry_locked(&self, paper_id: &str) -> Result<EnrichmentRecord> {
        let Some(mut record) = self.store.get_enrichment(paper_id).await? else {
            return Err(PipelineError::PaperNotFound {
                id: paper_id.to_string(),
            });
        };
        let Some(target) = record.reset_for_retry(Utc::now()) else {
            return Ok(record);
        };
        info!(paper_id, target = ?target, "Retrying failed enrichment");
        self.commit(paper_id, Stage::Failed, record).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use paperscout_common::errors::Result;
    use paperscout_common::models::CandidatePaper;
    use paperscout_common::stores::memory::{
        InMemoryMetadataStore, InMemoryObjectStore, InMemorySearchIndex, PassthroughExtractor,
        StaticSource,
    };
    use async_trait::async_trait;

    struct Fixture {
        store: Arc<InMemoryMetadataStore>,
        objects: Arc<InMemoryObjectStore>,
        extractor: Arc<PassthroughExtractor>,
        index: Arc<InMemorySearchIndex>,
        source: Arc<StaticSource>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                store: Arc::new(InMemoryMetadataStore::new()),
                objects: Arc::new(InMemoryObjectStore::new()),
                extractor: Arc::new(PassthroughExtractor::new()),
                index: Arc::new(InMemorySearchIndex::new()),
                source: Arc::new(StaticSource::new(vec![])),
            }
        }

        fn pipeline(&self) -> EnrichmentPipeline {
            self.pipeline_with_timeout(Duration::from_secs(5))
        }

        fn pipeline_with_timeout(&self, extract_timeout: Duration) -> EnrichmentPipeline {
            EnrichmentPipeline::new(
                Arc::clone(&self.store) as Arc<dyn MetadataStore>,
                Arc::clone(&self.objects) as Arc<dyn ObjectStore>,
                Arc::clone(&self.extractor) as Arc<dyn ExtractionService>,
                Arc::clone(&self.index) as Arc<dyn SearchIndex>,
                Arc::clone(&self.source) as Arc<dyn PaperSource>,
                Duration::ZERO,
                extract_timeout,
            )
        }

        async fn seed_paper(&self, id: &str) {
            let candidate = CandidatePaper {
                id: id.into(),
                title: format!("Paper {id}"),
                summary: "summary".into(),
                authors: vec![],
                categories: vec!["cs.LG".into()],
                published_date: Utc::now(),
                pdf_url: None,
            };
            let record = PaperRecord::from_candidate(&candidate, 0.9, Utc::now());
            self.store.upsert_paper(&record).await.unwrap();
            self.source.set_binary(id, b"extracted full text".to_vec());
        }
    }

    #[tokio::test]
    async fn test_advance_runs_full_ladder() {
        let fx = Fixture::new();
        fx.seed_paper("a").await;
        let pipeline = fx.pipeline();

        let record = pipeline.advance("a").await.unwrap();
        assert_eq!(record.stage, Stage::Acquired);
        assert!(record.object_location.is_some());
        assert_eq!(
            record.content_hash.as_deref(),
            Some(hex::encode(Sha256::digest(b"extracted full text")).as_str())
        );

        let record = pipeline.advance("a").await.unwrap();
        assert_eq!(record.stage, Stage::Extracted);
        assert_eq!(record.text_length, Some("extracted full text".len()));
        assert_eq!(
            fx.store.get_full_text("a").await.unwrap().as_deref(),
            Some("extracted full text")
        );

        let record = pipeline.advance("a").await.unwrap();
        assert_eq!(record.stage, Stage::Indexed);
        assert!(record.is_complete());
        assert!(fx.index.contains("a"));
    }

    #[tokio::test]
    async fn test_run_to_reaches_target() {
        let fx = Fixture::new();
        fx.seed_paper("a").await;
        let pipeline = fx.pipeline();

        let record = pipeline
            .run_to("a", Stage::Indexed, &CancelFlag::new())
            .await
            .unwrap();
        assert_eq!(record.stage, Stage::Indexed);
        assert_eq!(fx.extractor.call_count(), 1);
        assert_eq!(fx.index.index_calls(), 1);
    }

    /// A hung extractor that never resolves
    struct HangingExtractor;

    #[async_trait]
    impl ExtractionService for HangingExtractor {
        async fn extract_text(&self, _bytes: &[u8]) -> Result<String> {
            futures::future::pending::<()>().await;
            unreachable!()
        }
    }

    #[tokio::test]
    async fn test_extraction_timeout_marks_failed_and_keeps_acquire_fields() {
        let fx = Fixture::new();
        fx.seed_paper("a").await;
        let pipeline = EnrichmentPipeline::new(
            Arc::clone(&fx.store) as Arc<dyn MetadataStore>,
            Arc::clone(&fx.objects) as Arc<dyn ObjectStore>,
            Arc::new(HangingExtractor),
            Arc::clone(&fx.index) as Arc<dyn SearchIndex>,
            Arc::clone(&fx.source) as Arc<dyn PaperSource>,
            Duration::ZERO,
            Duration::from_millis(20),
        );

        pipeline.advance("a").await.unwrap();
        let record = pipeline.advance("a").await.unwrap();
        assert_eq!(record.stage, Stage::Failed);
        assert_eq!(record.failed_sub_stage, Some(SubStage::Extract));
        assert!(record.object_location.is_some());
        assert_eq!(record.text_length, None);
        assert_eq!(record.attempt_count, 1);

        // Failed records stay put until an explicit retry
        let record = pipeline.advance("a").await.unwrap();
        assert_eq!(record.stage, Stage::Failed);
    }

    #[tokio::test]
    async fn test_retry_resets_and_reruns_only_failed_step() {
        let fx = Fixture::new();
        fx.seed_paper("a").await;
        let pipeline = fx.pipeline();

        pipeline.advance("a").await.unwrap();
        let mut failed = fx.store.get_enrichment("a").await.unwrap().unwrap();
        failed.mark_failed(SubStage::Extract, "boom".into(), Utc::now());
        fx.store.upsert_enrichment(&failed).await.unwrap();

        let record = pipeline.retry("a").await.unwrap();
        assert_eq!(record.stage, Stage::Acquired);
        assert_eq!(record.failed_sub_stage, None);
        // The earlier acquire result is reused
        assert!(record.object_location.is_some());

        let record = pipeline
            .run_to("a", Stage::Indexed, &CancelFlag::new())
            .await
            .unwrap();
        assert_eq!(record.stage, Stage::Indexed);
        assert_eq!(fx.objects.object_count(), 1);
    }

    #[tokio::test]
    async fn test_advance_on_indexed_record_is_noop() {
        let fx = Fixture::new();
        fx.seed_paper("a").await;
        let pipeline = fx.pipeline();

        pipeline
            .run_to("a", Stage::Indexed, &CancelFlag::new())
            .await
            .unwrap();
        let calls_before = fx.extractor.call_count();
        let index_before = fx.index.index_calls();

        let record = pipeline.advance("a").await.unwrap();
        assert_eq!(record.stage, Stage::Indexed);
        assert_eq!(fx.extractor.call_count(), calls_before);
        assert_eq!(fx.index.index_calls(), index_before);
    }

    /// Counts calls and yields mid-extraction so a racing task gets to
    /// observe the pre-transition stage.
    struct YieldingExtractor {
        calls: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl ExtractionService for YieldingExtractor {
        async fn extract_text(&self, bytes: &[u8]) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            Ok(String::from_utf8_lossy(bytes).into_owned())
        }
    }

    #[tokio::test]
    async fn test_concurrent_advance_runs_step_once() {
        let fx = Fixture::new();
        fx.seed_paper("a").await;
        let extractor = Arc::new(YieldingExtractor {
            calls: std::sync::atomic::AtomicUsize::new(0),
        });
        let pipeline = Arc::new(EnrichmentPipeline::new(
            Arc::clone(&fx.store) as Arc<dyn MetadataStore>,
            Arc::clone(&fx.objects) as Arc<dyn ObjectStore>,
            Arc::clone(&extractor) as Arc<dyn ExtractionService>,
            Arc::clone(&fx.index) as Arc<dyn SearchIndex>,
            Arc::clone(&fx.source) as Arc<dyn PaperSource>,
            Duration::ZERO,
            Duration::from_secs(5),
        ));
        pipeline.advance("a").await.unwrap(); // -> Acquired

        // Both tasks observe Acquired; one wins the extraction, the loser
        // returns the newer record without calling the extractor.
        let first = {
            let p = Arc::clone(&pipeline);
            tokio::spawn(async move { p.advance("a").await })
        };
        let second = {
            let p = Arc::clone(&pipeline);
            tokio::spawn(async move { p.advance("a").await })
        };
        let a = first.await.unwrap().unwrap();
        let b = second.await.unwrap().unwrap();

        assert_eq!(a.stage, Stage::Extracted);
        assert_eq!(b.stage, Stage::Extracted);
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_id_locks_are_released_after_steps() {
        let fx = Fixture::new();
        fx.seed_paper("a").await;
        fx.seed_paper("b").await;
        let pipeline = fx.pipeline();

        pipeline
            .run_to("a", Stage::Indexed, &CancelFlag::new())
            .await
            .unwrap();
        pipeline
            .run_to("b", Stage::Indexed, &CancelFlag::new())
            .await
            .unwrap();

        // The per-id lock map holds no entries between steps, so a
        // long-lived pipeline does not accumulate one lock per paper seen.
        assert!(pipeline.locks.lock().unwrap().is_empty());

        let mut failed = fx.store.get_enrichment("a").await.unwrap().unwrap();
        failed.mark_failed(SubStage::Index, "boom".into(), Utc::now());
        fx.store.upsert_enrichment(&failed).await.unwrap();
        pipeline.retry("a").await.unwrap();
        assert!(pipeline.locks.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_acquire_failure_records_sub_stage() {
        let fx = Fixture::new();
        fx.seed_paper("a").await;
        let pipeline = fx.pipeline();

        // No binary registered for "b"
        let candidate = CandidatePaper {
            id: "b".into(),
            title: "Paper b".into(),
            summary: "s".into(),
            authors: vec![],
            categories: vec![],
            published_date: Utc::now(),
            pdf_url: None,
        };
        fx.store
            .upsert_paper(&PaperRecord::from_candidate(&candidate, 0.9, Utc::now()))
            .await
            .unwrap();

        let record = pipeline.advance("b").await.unwrap();
        assert_eq!(record.stage, Stage::Failed);
        assert_eq!(record.failed_sub_stage, Some(SubStage::Acquire));
        assert!(record.failure_message.is_some());
    }

    #[tokio::test]
    async fn test_cancel_stops_between_steps() {
        let fx = Fixture::new();
        fx.seed_paper("a").await;
        let pipeline = fx.pipeline();

        let cancel = CancelFlag::new();
        cancel.cancel();
        let record = pipeline.run_to("a", Stage::Indexed, &cancel).await.unwrap();
        assert_eq!(record.stage, Stage::Pending);
        assert_eq!(fx.extractor.call_count(), 0);
    }

    #[tokio::test]
    async fn test_acquire_pacing_enforces_interval() {
        let fx = Fixture::new();
        fx.seed_paper("a").await;
        fx.seed_paper("b").await;
        let pipeline = EnrichmentPipeline::new(
            Arc::clone(&fx.store) as Arc<dyn MetadataStore>,
            Arc::clone(&fx.objects) as Arc<dyn ObjectStore>,
            Arc::clone(&fx.extractor) as Arc<dyn ExtractionService>,
            Arc::clone(&fx.index) as Arc<dyn SearchIndex>,
            Arc::clone(&fx.source) as Arc<dyn PaperSource>,
            Duration::from_millis(50),
            Duration::from_secs(5),
        );

        let started = Instant::now();
        pipeline.advance("a").await.unwrap();
        pipeline.advance("b").await.unwrap();
        // The second download waits out the pacing interval
        assert!(started.elapsed() >= Duration::from_millis(50));
    }
}
