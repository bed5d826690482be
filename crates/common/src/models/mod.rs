//! Domain models for the PaperScout pipeline

mod enrichment;
mod paper;
mod profile;

pub use enrichment::{EnrichmentRecord, Stage, SubStage};
pub use paper::{CandidatePaper, PaperRecord, ReadStatus};
pub use profile::Profile;
