//! Signal computers
//!
//! Pure functions, each returning a signal in [0.0, 1.0]. No I/O, no hidden
//! randomness: the same (input, profile) pair always yields the same value.

use regex_lite::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

fn word_regex() -> &'static Regex {
    static WORDS: OnceLock<Regex> = OnceLock::new();
    WORDS.get_or_init(|| Regex::new(r"[a-z0-9]+").unwrap_or_else(|_| unreachable!()))
}

fn tokenize(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    word_regex()
        .find_iter(&lowered)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Lightweight suffix stemmer so "autoencoders" matches "autoencoder" and
/// "pruning" matches "prune"-ish stems. Deliberately crude; exact phrase
/// matches carry the real weight.
fn stem(word: &str) -> String {
    if let Some(base) = word.strip_suffix("ies") {
        if base.len() >= 2 {
            return format!("{base}y");
        }
    }
    if word.len() > 5 {
        if let Some(base) = word.strip_suffix("ing") {
            return base.to_string();
        }
    }
    if word.len() > 4 {
        if let Some(base) = word.strip_suffix("ed") {
            return base.to_string();
        }
    }
    if word.len() > 3 {
        if let Some(base) = word.strip_suffix("es") {
            return base.to_string();
        }
        if let Some(base) = word.strip_suffix('s') {
            return base.to_string();
        }
    }
    word.to_string()
}

fn stem_set(text: &str) -> HashSet<String> {
    tokenize(text).iter().map(|w| stem(w)).collect()
}

/// Keyword signal: normalized credit for exact and stem-level matches
/// between profile keywords and the paper's title and summary.
///
/// Per keyword: an exact phrase match in the title earns full credit, a
/// phrase match in the summary earns less, and otherwise stem overlap earns
/// a fraction proportional to how much of the keyword's stems appear in the
/// text. Per-keyword credit saturates at 1.0, so repeated mentions never
/// grow the signal unbounded; the total is normalized by keyword count.
pub fn keyword_signal(keywords: &[String], title: &str, summary: &str) -> f64 {
    if keywords.is_empty() {
        return 0.0;
    }

    let title_lower = title.to_lowercase();
    let summary_lower = summary.to_lowercase();
    let text_stems = {
        let mut stems = stem_set(&title_lower);
        stems.extend(stem_set(&summary_lower));
        stems
    };

    let mut total = 0.0;
    for keyword in keywords {
        let phrase = keyword.to_lowercase();
        if phrase.trim().is_empty() {
            continue;
        }

        let credit: f64 = if title_lower.contains(&phrase) {
            1.0
        } else if summary_lower.contains(&phrase) {
            0.6
        } else {
            let keyword_stems = stem_set(&phrase);
            if keyword_stems.is_empty() {
                0.0
            } else {
                let overlap = keyword_stems
                    .iter()
                    .filter(|s| text_stems.contains(*s))
                    .count();
                0.4 * overlap as f64 / keyword_stems.len() as f64
            }
        };

        total += credit.min(1.0);
    }

    (total / keywords.len() as f64).clamp(0.0, 1.0)
}

/// Category signal: 1.0 when the paper's categories intersect the monitored
/// set, `partial_factor` when only the top-level archive matches (e.g.
/// "cs.CL" against monitored "cs.LG"), 0.0 otherwise.
pub fn category_signal(monitored: &[String], paper_categories: &[String], partial_factor: f64) -> f64 {
    if monitored.is_empty() || paper_categories.is_empty() {
        return 0.0;
    }

    let monitored_set: HashSet<&str> = monitored.iter().map(String::as_str).collect();
    if paper_categories
        .iter()
        .any(|c| monitored_set.contains(c.as_str()))
    {
        return 1.0;
    }

    let top_level = |cat: &str| cat.split('.').next().unwrap_or(cat).to_string();
    let monitored_tops: HashSet<String> = monitored.iter().map(|c| top_level(c)).collect();
    if paper_categories
        .iter()
        .any(|c| monitored_tops.contains(&top_level(c)))
    {
        return partial_factor.clamp(0.0, 1.0);
    }

    0.0
}

/// Cosine similarity between two embeddings, clamped to [0.0, 1.0].
///
/// Mismatched dimensions or a zero vector yield 0.0 rather than an error:
/// the semantic signal is total for well-formed input.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0_f64;
    let mut norm_a = 0.0_f64;
    let mut norm_b = 0.0_f64;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += f64::from(*x) * f64::from(*y);
        norm_a += f64::from(*x) * f64::from(*x);
        norm_b += f64::from(*y) * f64::from(*y);
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kw(words: &[&str]) -> Vec<String> {
        words.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_title_match_outweighs_summary_match() {
        let keywords = kw(&["sparse autoencoder"]);
        let in_title = keyword_signal(&keywords, "Sparse Autoencoder Features", "a study");
        let in_summary = keyword_signal(&keywords, "Feature Study", "uses a sparse autoencoder");
        assert!(in_title > in_summary);
        assert!(in_summary > 0.0);
    }

    #[test]
    fn test_keyword_signal_saturates() {
        let keywords = kw(&["attention"]);
        let once = keyword_signal(&keywords, "Attention Mechanisms", "attention");
        let many = keyword_signal(
            &keywords,
            "Attention Attention Attention",
            "attention attention attention attention",
        );
        assert!(once <= 1.0);
        assert_eq!(once, many);
    }

    #[test]
    fn test_stem_level_match() {
        let keywords = kw(&["autoencoders"]);
        let signal = keyword_signal(&keywords, "An Autoencoder Study", "no exact phrase here");
        assert!(signal > 0.0);
        assert!(signal < 1.0);
    }

    #[test]
    fn test_empty_keywords_score_zero() {
        assert_eq!(keyword_signal(&[], "title", "summary"), 0.0);
    }

    #[test]
    fn test_keyword_signal_bounds() {
        let keywords = kw(&["sparse autoencoder", "interpretability", "circuits"]);
        let signal = keyword_signal(
            &keywords,
            "Sparse Autoencoders for Interpretability",
            "We trace circuits in sparse autoencoders.",
        );
        assert!((0.0..=1.0).contains(&signal));
    }

    #[test]
    fn test_category_direct_match() {
        let monitored = kw(&["cs.LG", "cs.AI"]);
        assert_eq!(category_signal(&monitored, &kw(&["cs.LG"]), 0.5), 1.0);
    }

    #[test]
    fn test_category_partial_match() {
        let monitored = kw(&["cs.LG"]);
        assert_eq!(category_signal(&monitored, &kw(&["cs.CL"]), 0.5), 0.5);
    }

    #[test]
    fn test_category_no_match() {
        let monitored = kw(&["cs.LG"]);
        assert_eq!(category_signal(&monitored, &kw(&["math.CO"]), 0.5), 0.0);
        assert_eq!(category_signal(&monitored, &[], 0.5), 0.0);
        assert_eq!(category_signal(&[], &kw(&["cs.LG"]), 0.5), 0.0);
    }

    #[test]
    fn test_cosine_identical_vectors() {
        let v = vec![0.3_f32, -0.2, 0.9];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_cosine_orthogonal_and_opposite() {
        let a = vec![1.0_f32, 0.0];
        let b = vec![0.0_f32, 1.0];
        assert_eq!(cosine_similarity(&a, &b), 0.0);

        // Negative similarity clamps to zero
        let c = vec![-1.0_f32, 0.0];
        assert_eq!(cosine_similarity(&a, &c), 0.0);
    }

    #[test]
    fn test_cosine_degenerate_input() {
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }
}
