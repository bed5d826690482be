//! Run orchestration
//!
//! Wires discovery, ingestion, and enrichment into one run, and carries the
//! management operations (listing, read/star flags, full-text search, stats,
//! rescoring, redriving failures) on top of the same collaborators.

use crate::enrich::{CancelFlag, EnrichmentPipeline};
use crate::ingest::{IngestionPipeline, IngestionReport};
use crate::scoring::ScoringEngine;
use backoff::ExponentialBackoffBuilder;
use chrono::{Duration as ChronoDuration, Utc};
use futures::stream::{self, StreamExt};
use paperscout_common::config::AppConfig;
use paperscout_common::errors::{PipelineError, Result};
use paperscout_common::models::{EnrichmentRecord, PaperRecord, ReadStatus, Stage};
use paperscout_common::stores::{
    ExtractionService, MetadataStore, ObjectStore, PaperSource, SearchHit, SearchIndex, StoreStats,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

/// How far a run drives enrichment
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnrichmentDepth {
    Off,
    Acquire,
    Extract,
    Index,
}

impl EnrichmentDepth {
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "off" => Ok(Self::Off),
            "acquire" => Ok(Self::Acquire),
            "extract" => Ok(Self::Extract),
            "index" => Ok(Self::Index),
            other => Err(PipelineError::Configuration {
                message: format!("unknown enrichment depth: {other}"),
            }),
        }
    }

    /// Stage a run drives each eligible paper to; `None` disables enrichment.
    fn target_stage(&self) -> Option<Stage> {
        match self {
            Self::Off => None,
            Self::Acquire => Some(Stage::Acquired),
            Self::Extract => Some(Stage::Extracted),
            Self::Index => Some(Stage::Indexed),
        }
    }
}

/// Outcome of one discovery-to-enrichment run
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub fetched: usize,
    pub ingestion: IngestionReport,
    /// Final enrichment state of each eligible paper, by id
    pub enriched: Vec<EnrichmentRecord>,
}

pub struct Orchestrator {
    config: AppConfig,
    store: Arc<dyn MetadataStore>,
    source: Arc<dyn PaperSource>,
    index: Arc<dyn SearchIndex>,
    engine: Arc<ScoringEngine>,
    ingestion: IngestionPipeline,
    enrichment: EnrichmentPipeline,
    depth: EnrichmentDepth,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: AppConfig,
        store: Arc<dyn MetadataStore>,
        source: Arc<dyn PaperSource>,
        objects: Arc<dyn ObjectStore>,
        extractor: Arc<dyn ExtractionService>,
        index: Arc<dyn SearchIndex>,
        engine: Arc<ScoringEngine>,
    ) -> Result<Self> {
        let depth = EnrichmentDepth::parse(&config.enrichment.depth)?;
        let ingestion = IngestionPipeline::new(Arc::clone(&store), Arc::clone(&engine));
        let enrichment = EnrichmentPipeline::new(
            Arc::clone(&store),
            objects,
            extractor,
            Arc::clone(&index),
            Arc::clone(&source),
            config.acquire_interval(),
            config.extract_timeout(),
        );
        Ok(Self {
            config,
            store,
            source,
            index,
            engine,
            ingestion,
            enrichment,
            depth,
        })
    }

    /// One full run: discover, ingest, enrich.
    ///
    /// Fails only on systemic errors (source or metadata store down);
    /// per-paper failures land in the summary.
    #[instrument(skip(self, cancel), fields(run_id))]
    pub async fn run(&self, cancel: &CancelFlag) -> Result<RunSummary> {
        let run_id = Uuid::new_v4();
        tracing::Span::current().record("run_id", tracing::field::display(run_id));
        self.store.ping().await?;

        let since = Utc::now() - ChronoDuration::days(self.config.source.days_lookback as i64);
        let mut candidates = self
            .source
            .fetch_candidates(&self.engine.profile().categories, since)
            .await?;
        candidates.truncate(self.config.source.max_results);
        let fetched = candidates.len();
        info!(fetched, "Fetched candidate papers");

        let ingestion = self.ingestion.run(&candidates).await?;

        let enriched = match self.depth.target_stage() {
            Some(target) if !cancel.is_cancelled() => {
                self.enrich_all(&ingestion.eligible, target, cancel).await?
            }
            _ => Vec::new(),
        };

        let summary = RunSummary {
            run_id,
            fetched,
            ingestion,
            enriched,
        };
        info!(
            new = summary.ingestion.new,
            eligible = summary.ingestion.eligible.len(),
            indexed = summary
                .enriched
                .iter()
                .filter(|r| r.stage == Stage::Indexed)
                .count(),
            "Run complete"
        );
        Ok(summary)
    }

    /// Drive eligible papers to `target` with a bounded worker pool.
    /// Workers parallelize across papers, never within one.
    async fn enrich_all(
        &self,
        paper_ids: &[String],
        target: Stage,
        cancel: &CancelFlag,
    ) -> Result<Vec<EnrichmentRecord>> {
        let mut results = stream::iter(paper_ids.iter().cloned())
            .map(|id| async move { self.enrichment.run_to(&id, target, cancel).await })
            .buffer_unordered(self.config.enrichment.workers.max(1));

        let mut records = Vec::with_capacity(paper_ids.len());
        while let Some(result) = results.next().await {
            records.push(result?);
        }
        records.sort_by(|a, b| a.paper_id.cmp(&b.paper_id));
        Ok(records)
    }

    pub async fn list_papers(
        &self,
        min_score: f64,
        limit: Option<usize>,
    ) -> Result<Vec<PaperRecord>> {
        self.store.list_papers(min_score, limit).await
    }

    pub async fn mark_read(&self, paper_id: &str, status: ReadStatus) -> Result<()> {
        if !self.store.set_read_status(paper_id, status).await? {
            return Err(PipelineError::PaperNotFound {
                id: paper_id.to_string(),
            });
        }
        Ok(())
    }

    pub async fn set_starred(&self, paper_id: &str, starred: bool) -> Result<()> {
        if !self.store.set_starred(paper_id, starred).await? {
            return Err(PipelineError::PaperNotFound {
                id: paper_id.to_string(),
            });
        }
        Ok(())
    }

    pub async fn set_notes(&self, paper_id: &str, notes: Option<String>) -> Result<()> {
        if !self.store.set_notes(paper_id, notes).await? {
            return Err(PipelineError::PaperNotFound {
                id: paper_id.to_string(),
            });
        }
        Ok(())
    }

    pub async fn search_full_text(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        self.index.query(query, limit).await
    }

    pub async fn stats(&self) -> Result<StoreStats> {
        self.store.stats().await
    }

    /// Recompute every stored paper's score with the current engine.
    ///
    /// Run this after changing signal weights or the interest profile;
    /// stored scores are otherwise never recomputed. Returns the number of
    /// papers whose score changed.
    #[instrument(skip(self))]
    pub async fn rescore_all(&self) -> Result<usize> {
        let papers = self.store.list_papers(0.0, None).await?;
        let mut changed = 0;
        for mut paper in papers {
            let breakdown = self.engine.score_stored(&paper).await?;
            if (breakdown.composite - paper.relevance_score).abs() > f64::EPSILON {
                paper.relevance_score = breakdown.composite;
                self.store.upsert_paper(&paper).await?;
                changed += 1;
            }
        }
        info!(changed, "Rescoring complete");
        Ok(changed)
    }

    /// Retry every failed enrichment and drive it back to the configured
    /// depth. Systemic outages are retried with exponential backoff before
    /// giving up; per-paper failures simply stay failed.
    #[instrument(skip(self, cancel))]
    pub async fn redrive_failed(&self, cancel: &CancelFlag) -> Result<Vec<EnrichmentRecord>> {
        let Some(target) = self.depth.target_stage() else {
            return Ok(Vec::new());
        };

        let mut redriven = Vec::new();
        for paper in self.store.list_papers(0.0, None).await? {
            if cancel.is_cancelled() {
                break;
            }
            let Some(record) = self.store.get_enrichment(&paper.id).await? else {
                continue;
            };
            if record.stage != Stage::Failed {
                continue;
            }

            self.enrichment.retry(&paper.id).await?;
            let policy = ExponentialBackoffBuilder::new()
                .with_initial_interval(Duration::from_millis(200))
                .with_max_elapsed_time(Some(Duration::from_secs(30)))
                .build();
            let record = backoff::future::retry(policy, || async {
                self.enrichment
                    .run_to(&paper.id, target, cancel)
                    .await
                    .map_err(|err| {
                        if err.is_systemic() {
                            backoff::Error::transient(err)
                        } else {
                            backoff::Error::permanent(err)
                        }
                    })
            })
            .await?;
            redriven.push(record);
        }
        info!(redriven = redriven.len(), "Redrive complete");
        Ok(redriven)
    }
}
