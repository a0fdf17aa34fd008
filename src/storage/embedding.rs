//! Term-frequency document vectors and cosine distance.
//!
//! Vectors are sparse maps from lower-cased alphanumeric tokens to counts,
//! with common English stopwords removed.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

const STOPWORDS: &[&str] = &[
    "a", "about", "an", "and", "are", "as", "at", "be", "by", "for", "from", "how", "in", "is",
    "it", "its", "of", "on", "or", "that", "the", "this", "to", "was", "what", "when", "where",
    "which", "who", "why", "will", "with",
];

/// Sparse term-frequency vector.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TermVector(BTreeMap<String, f64>);

impl TermVector {
    /// Embed a piece of text.
    pub fn from_text(text: &str) -> Self {
        let mut terms = BTreeMap::new();
        for token in text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| t.chars().count() > 1 && !STOPWORDS.contains(t))
        {
            *terms.entry(token.to_string()).or_insert(0.0) += 1.0;
        }
        Self(terms)
    }

    /// True when no term survived tokenization.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn norm(&self) -> f64 {
        self.0.values().map(|v| v * v).sum::<f64>().sqrt()
    }

    /// Cosine similarity in [0, 1]; zero if either vector is empty.
    pub fn cosine_similarity(&self, other: &TermVector) -> f64 {
        let denominator = self.norm() * other.norm();
        if denominator == 0.0 {
            return 0.0;
        }
        let dot: f64 = self
            .0
            .iter()
            .filter_map(|(term, weight)| other.0.get(term).map(|w| w * weight))
            .sum();
        (dot / denominator).clamp(0.0, 1.0)
    }

    /// `1 - cosine_similarity`, in [0, 1].
    pub fn cosine_distance(&self, other: &TermVector) -> f64 {
        1.0 - self.cosine_similarity(other)
    }
}
