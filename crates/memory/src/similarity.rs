use std::cmp::Ordering;

use crate::records::{Concept, SemanticMatch};

/// Cosine of the angle between `a` and `b`. Mismatched lengths, empty
/// vectors and zero vectors score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }

    let (dot, sq_a, sq_b) = a
        .iter()
        .zip(b)
        .fold((0.0f32, 0.0f32, 0.0f32), |(dot, sq_a, sq_b), (x, y)| {
            (dot + x * y, sq_a + x * x, sq_b + y * y)
        });

    let magnitude = (sq_a * sq_b).sqrt();
    if magnitude == 0.0 {
        return 0.0;
    }
    dot / magnitude
}

/// Rank `concepts` against `query`, best first, keeping at most `top_k`.
/// Ties keep insertion order.
pub fn nearest(concepts: impl IntoIterator<Item = Concept>, query: &[f32], top_k: usize) -> Vec<SemanticMatch> {
    let mut scored: Vec<SemanticMatch> = concepts
        .into_iter()
        .map(|concept| {
            let score = cosine_similarity(&concept.embedding, query);
            SemanticMatch { concept, score }
        })
        .collect();

    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    scored.truncate(top_k);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parallel_vectors_score_one_regardless_of_length() {
        let sim = cosine_similarity(&[2.0, 4.0, 0.0], &[0.5, 1.0, 0.0]);
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn opposite_vectors_score_minus_one() {
        let sim = cosine_similarity(&[1.0, -1.0], &[-3.0, 3.0]);
        assert!((sim + 1.0).abs() < 1e-6);
    }

    #[test]
    fn degenerate_inputs_score_zero() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn nearest_orders_by_score_and_truncates() {
        let concepts = vec![
            Concept::new(vec![0.0, 1.0], json!("north")),
            Concept::new(vec![1.0, 0.0], json!("east")),
            Concept::new(vec![0.7, 0.7], json!("north-east")),
        ];

        let hits = nearest(concepts, &[1.0, 0.1], 2);

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].concept.content, json!("east"));
        assert_eq!(hits[1].concept.content, json!("north-east"));
        assert!(hits[0].score >= hits[1].score);
    }
}
