//! Metrics helpers
//!
//! Counters and histograms for pipeline outcomes, with standardized naming
//! under a single prefix.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};

/// Metrics prefix for all PaperScout metrics
pub const METRICS_PREFIX: &str = "paperscout";

/// Histogram buckets for composite relevance scores
pub const SCORE_BUCKETS: &[f64] = &[0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9, 1.0];

/// Register all metric descriptions
pub fn register_metrics() {
    describe_counter!(
        format!("{}_candidates_total", METRICS_PREFIX),
        Unit::Count,
        "Candidates processed by the ingestion pipeline, labelled by outcome"
    );

    describe_histogram!(
        format!("{}_relevance_score", METRICS_PREFIX),
        "Composite relevance score distribution"
    );

    describe_counter!(
        format!("{}_enrichment_transitions_total", METRICS_PREFIX),
        Unit::Count,
        "Enrichment stage transitions, labelled by sub-stage and outcome"
    );

    describe_histogram!(
        format!("{}_enrichment_step_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Duration of a single enrichment step"
    );

    describe_counter!(
        format!("{}_embedding_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Embedding provider requests"
    );

    tracing::info!("Metrics registered");
}

/// Record one ingestion outcome ("new", "updated", "duplicate", "failed")
pub fn record_candidate(outcome: &'static str) {
    counter!(
        format!("{}_candidates_total", METRICS_PREFIX),
        "outcome" => outcome
    )
    .increment(1);
}

/// Record a computed composite score
pub fn record_score(score: f64) {
    histogram!(format!("{}_relevance_score", METRICS_PREFIX)).record(score);
}

/// Record an enrichment step result
pub fn record_enrichment_step(sub_stage: &'static str, success: bool, duration_secs: f64) {
    let outcome = if success { "success" } else { "failure" };
    counter!(
        format!("{}_enrichment_transitions_total", METRICS_PREFIX),
        "sub_stage" => sub_stage,
        "outcome" => outcome
    )
    .increment(1);

    histogram!(
        format!("{}_enrichment_step_duration_seconds", METRICS_PREFIX),
        "sub_stage" => sub_stage
    )
    .record(duration_secs);
}
