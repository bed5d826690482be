//! User interest profile

use serde::{Deserialize, Serialize};

/// An immutable interest profile, passed explicitly into the scoring engine
/// and signal computers. Scoring never reads ambient state, so the same
/// (paper, profile) pair always produces the same score.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// Keyword phrases matched against paper title and summary
    pub keywords: Vec<String>,
    /// Monitored category codes, e.g. "cs.LG"
    pub categories: Vec<String>,
    /// Free-text statements of interest; their embedding centroid anchors
    /// the semantic signal
    pub interest_statements: Vec<String>,
}

impl Profile {
    pub fn new(
        keywords: Vec<String>,
        categories: Vec<String>,
        interest_statements: Vec<String>,
    ) -> Self {
        Self {
            keywords,
            categories,
            interest_statements,
        }
    }

    /// A profile with nothing to match scores every paper 0.0.
    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty() && self.categories.is_empty() && self.interest_statements.is_empty()
    }
}
