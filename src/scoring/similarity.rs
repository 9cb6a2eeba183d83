use super::text::token_set;

/// Semantic-similarity seam used by the answer-inclusion scorer.
///
/// Implementations must be synchronous and free of I/O so scoring stays
/// pure; a model backed by an embedding service should precompute vectors
/// before scoring and answer from them here. Scores are in `[0, 1]`.
pub trait SimilarityModel: Send + Sync {
    fn similarity(&self, a: &str, b: &str) -> f64;

    fn name(&self) -> &'static str;
}

/// Token Jaccard overlap over content words.
#[derive(Debug, Clone, Copy, Default)]
pub struct LexicalSimilarity;

impl SimilarityModel for LexicalSimilarity {
    fn similarity(&self, a: &str, b: &str) -> f64 {
        let a = token_set(a);
        let b = token_set(b);
        if a.is_empty() || b.is_empty() {
            return 0.0;
        }
        let shared = a.intersection(&b).count();
        let union = a.union(&b).count();
        shared as f64 / union as f64
    }

    fn name(&self) -> &'static str {
        "lexical-jaccard"
    }
}
