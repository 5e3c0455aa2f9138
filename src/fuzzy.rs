// Fuzzy text scoring behind a narrow, swappable interface

use nucleo_matcher::pattern::{CaseMatching, Normalization, Pattern};
use nucleo_matcher::{Config, Matcher, Utf32Str};
use parking_lot::Mutex;

/// Scores how well `document` matches `query`.
///
/// Returns a similarity in `(0, 1]` where 1 is a perfect match, or `None`
/// when the document does not match at all.
pub trait Scorer: Send + Sync {
    fn score(&self, query: &str, document: &str) -> Option<f64>;
}

/// Default error tolerance: roughly one typo per three query characters
pub const DEFAULT_THRESHOLD: f64 = 0.35;

/// Typo-tolerant approximate substring matching.
///
/// Finds the substring of the document with the smallest optimal string
/// alignment distance to the query (insert, delete, substitute, swap of
/// adjacent characters each cost 1) and accepts it when
/// `distance / query_len <= threshold`.
#[derive(Debug, Clone, Copy)]
pub struct EditDistanceScorer {
    threshold: f64,
}

impl Default for EditDistanceScorer {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

impl EditDistanceScorer {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold: threshold.clamp(0.0, 1.0),
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }
}

impl Scorer for EditDistanceScorer {
    fn score(&self, query: &str, document: &str) -> Option<f64> {
        let query: Vec<char> = query.trim().to_lowercase().chars().collect();
        if query.is_empty() {
            return Some(1.0);
        }
        let document: Vec<char> = document.to_lowercase().chars().collect();

        let distance = substring_distance(&query, &document);
        let ratio = distance as f64 / query.len() as f64;
        if ratio <= self.threshold {
            Some(1.0 - ratio)
        } else {
            None
        }
    }
}

/// Smallest OSA distance between `query` and any substring of `document`
fn substring_distance(query: &[char], document: &[char]) -> usize {
    let n = document.len();
    // Row i holds distances for query[..i]; row 0 is all zeros so a match
    // may start anywhere in the document.
    let mut before_prev: Vec<usize> = vec![0; n + 1];
    let mut prev: Vec<usize> = vec![0; n + 1];
    let mut current: Vec<usize> = vec![0; n + 1];

    for i in 1..=query.len() {
        current[0] = i;
        for j in 1..=n {
            let cost = usize::from(query[i - 1] != document[j - 1]);
            let mut best = (prev[j] + 1).min(current[j - 1] + 1).min(prev[j - 1] + cost);
            if i > 1 && j > 1 && query[i - 1] == document[j - 2] && query[i - 2] == document[j - 1] {
                best = best.min(before_prev[j - 2] + 1);
            }
            current[j] = best;
        }
        std::mem::swap(&mut before_prev, &mut prev);
        std::mem::swap(&mut prev, &mut current);
    }

    // After the final swap `prev` is the last computed row
    prev.iter().copied().min().unwrap_or(query.len())
}

/// Subsequence matching via nucleo; rewards abbreviations and prefixes but
/// does not tolerate typos.
pub struct SubsequenceScorer {
    matcher: Mutex<Matcher>,
}

impl Default for SubsequenceScorer {
    fn default() -> Self {
        Self {
            matcher: Mutex::new(Matcher::new(Config::DEFAULT)),
        }
    }
}

impl SubsequenceScorer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Scorer for SubsequenceScorer {
    fn score(&self, query: &str, document: &str) -> Option<f64> {
        let query = query.trim();
        if query.is_empty() {
            return Some(1.0);
        }

        let pattern = Pattern::parse(query, CaseMatching::Ignore, Normalization::Smart);
        let mut matcher = self.matcher.lock();
        let mut buf = Vec::new();

        let score = pattern.score(Utf32Str::new(document, &mut buf), &mut matcher)?;
        // Normalize against the query matched with itself
        let best = pattern
            .score(Utf32Str::new(query, &mut buf), &mut matcher)
            .unwrap_or(score)
            .max(1);

        Some((f64::from(score) / f64::from(best)).clamp(f64::MIN_POSITIVE, 1.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn distance(query: &str, document: &str) -> usize {
        let q: Vec<char> = query.chars().collect();
        let d: Vec<char> = document.chars().collect();
        substring_distance(&q, &d)
    }

    #[test]
    fn test_substring_distance() {
        assert_eq!(distance("milk", "buy milk today"), 0);
        assert_eq!(distance("mlik", "buy milk"), 1);
        assert_eq!(distance("milks", "buy milk"), 1);
        assert_eq!(distance("abc", ""), 3);
    }

    #[test]
    fn test_exact_substring_scores_one() {
        let scorer = EditDistanceScorer::default();
        assert_eq!(scorer.score("Milk", "Buy milk"), Some(1.0));
    }

    #[test]
    fn test_typo_tolerance() {
        let scorer = EditDistanceScorer::default();
        let typo = scorer.score("grocceries", "Weekly groceries").unwrap();
        assert!(typo > 0.8 && typo < 1.0);
        assert!(scorer.score("mlik", "Buy milk").is_some());
    }

    #[test]
    fn test_unrelated_text_does_not_match() {
        let scorer = EditDistanceScorer::default();
        assert!(scorer.score("dentist", "Buy milk").is_none());
        assert!(scorer.score("ab", "xyz").is_none());
    }

    #[test]
    fn test_better_matches_rank_higher() {
        let scorer = EditDistanceScorer::default();
        let exact = scorer.score("report", "Quarterly report").unwrap();
        let typo = scorer.score("report", "Quarterly reprot").unwrap();
        assert!(exact > typo);
    }

    #[test]
    fn test_empty_query_matches_everything() {
        assert_eq!(EditDistanceScorer::default().score("  ", "anything"), Some(1.0));
        assert_eq!(SubsequenceScorer::new().score("", "anything"), Some(1.0));
    }

    #[test]
    fn test_strict_threshold() {
        let scorer = EditDistanceScorer::new(0.0);
        assert!(scorer.score("mlik", "Buy milk").is_none());
        assert!(scorer.score("milk", "Buy milk").is_some());
    }

    #[test]
    fn test_subsequence_scorer() {
        let scorer = SubsequenceScorer::new();
        assert!(scorer.score("bmk", "Buy milk").is_some());
        assert!(scorer.score("zzz", "Buy milk").is_none());
        let exact = scorer.score("milk", "milk").unwrap();
        assert!((exact - 1.0).abs() < 1e-9);
    }
}
