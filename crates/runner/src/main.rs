//! PaperScout Runner
//!
//! Standalone entrypoint that wires the pipeline against the in-memory
//! collaborators and executes one discovery-to-enrichment run:
//! 1. Fetches candidates from the configured source
//! 2. Scores and persists them
//! 3. Drives eligible papers through acquire -> extract -> index
//! 4. Logs the run summary

use chrono::Utc;
use paperscout_common::{
    config::AppConfig,
    embeddings::create_embedder,
    metrics::register_metrics,
    models::CandidatePaper,
    stores::memory::{
        InMemoryMetadataStore, InMemoryObjectStore, InMemorySearchIndex, StaticSource,
    },
    VERSION,
};
use paperscout_pipeline::{CancelFlag, Orchestrator, PdfTextExtractor, ScoringEngine};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration before tracing so the log level is config-driven
    let config = AppConfig::load().map_err(|e| {
        eprintln!("Failed to load configuration: {e}");
        e
    })?;
    init_tracing(&config);
    config.validate().map_err(|e| {
        error!(error = %e, "Invalid configuration");
        e
    })?;

    info!("Starting PaperScout Runner v{}", VERSION);
    register_metrics();

    // Wire collaborators. The runner ships with the in-memory set; real
    // deployments swap these for network-backed implementations.
    let store = Arc::new(InMemoryMetadataStore::new());
    let objects = Arc::new(InMemoryObjectStore::new());
    let index = Arc::new(InMemorySearchIndex::new());
    let source = Arc::new(demo_source());

    let embedder = create_embedder(&config.embedding)?;
    info!(
        model = embedder.model_name(),
        dimension = embedder.dimension(),
        "Embedder ready"
    );
    let profile = config.profile.to_profile();
    if profile.is_empty() {
        warn!("Interest profile is empty; every candidate will score 0.0");
    }
    let engine = ScoringEngine::build(embedder, profile, config.scoring.clone()).await?;

    let orchestrator = Orchestrator::new(
        config,
        store,
        source,
        objects,
        Arc::new(PdfTextExtractor::new()),
        index,
        Arc::new(engine),
    )?;

    // Ctrl-C flips the cancel flag; in-flight steps finish, nothing new starts
    let cancel = CancelFlag::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling run");
            signal_cancel.cancel();
        }
    });

    let summary = orchestrator.run(&cancel).await?;
    info!(
        run_id = %summary.run_id,
        summary = %serde_json::to_string(&summary)?,
        "Run finished"
    );

    let stats = orchestrator.stats().await?;
    info!(
        total = stats.total_papers,
        high_relevance = stats.high_relevance_papers,
        indexed = stats.enrichment_indexed,
        failed = stats.enrichment_failed,
        "Store state"
    );

    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.observability.log_level.clone()));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    if config.observability.json_logging {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// A small built-in candidate set so a run is observable out of the box.
fn demo_source() -> StaticSource {
    let candidates = vec![
        CandidatePaper {
            id: "2508.01001".into(),
            title: "Sparse Autoencoders Recover Monosemantic Features".into(),
            summary: "We train sparse autoencoders on transformer activations \
                      and study the recovered feature dictionaries."
                .into(),
            authors: vec!["J. Doe".into(), "R. Roe".into()],
            categories: vec!["cs.LG".into()],
            published_date: Utc::now() - chrono::Duration::days(2),
            pdf_url: Some("https://arxiv.org/pdf/2508.01001".into()),
        },
        CandidatePaper {
            id: "2508.01002".into(),
            title: "A Survey of Combinatorial Optimization".into(),
            summary: "Classical results on matchings and flows.".into(),
            authors: vec!["M. Poe".into()],
            categories: vec!["math.CO".into()],
            published_date: Utc::now() - chrono::Duration::days(3),
            pdf_url: None,
        },
    ];
    StaticSource::new(candidates)
}
