//! Relevance scoring
//!
//! Three independent signal computers (keyword, category, semantic) and the
//! engine that combines them into one composite score with configured
//! weights.

mod engine;
mod signals;

pub use engine::{ScoreBreakdown, ScoringEngine};
pub use signals::{category_signal, cosine_similarity, keyword_signal};
