use crate::error::{ApiError, Result};
use ndarray::ArrayView1;
use std::cmp::Ordering;
use std::collections::HashMap;

/// One candidate's similarity to a query vector. Ephemeral, produced per
/// query, never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityResult {
    pub book_id: i64,
    pub score: f32,
}

/// Cosine similarity in [-1, 1].
///
/// Vectors of differing dimension are a hard error; they are never
/// truncated or padded to fit. A zero-magnitude vector has no direction,
/// so its similarity to anything is 0.0.
pub fn cosine(a: &[f32], b: &[f32]) -> Result<f32> {
    if a.len() != b.len() {
        return Err(ApiError::ShapeMismatch {
            left: a.len(),
            right: b.len(),
        });
    }

    let a = ArrayView1::from(a);
    let b = ArrayView1::from(b);

    let norm_a = a.dot(&a).sqrt();
    let norm_b = b.dot(&b).sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return Ok(0.0);
    }

    Ok(a.dot(&b) / (norm_a * norm_b))
}

/// Ranks candidate embeddings against reference vectors.
#[derive(Debug, Clone, Default)]
pub struct SimilarityEngine;

impl SimilarityEngine {
    pub fn new() -> Self {
        Self
    }

    /// Books most similar to the book identified by `reference_id`.
    ///
    /// The reference is excluded from the output by identifier, results
    /// below `min_similarity` are dropped, and survivors are ordered by
    /// score descending with ties broken by id ascending. An unknown
    /// reference id is an insufficient-data case, not an error: the result
    /// is simply empty.
    pub fn find_similar(
        &self,
        reference_id: i64,
        candidates: &HashMap<i64, Vec<f32>>,
        top_k: usize,
        min_similarity: f32,
    ) -> Result<Vec<SimilarityResult>> {
        let reference = match candidates.get(&reference_id) {
            Some(embedding) => embedding,
            None => return Ok(Vec::new()),
        };

        self.rank(reference, candidates, top_k, Some(min_similarity), Some(reference_id))
    }

    /// Rank every candidate against an ad-hoc query embedding. No floor:
    /// all candidates participate, best first.
    pub fn rank_against(
        &self,
        query: &[f32],
        candidates: &HashMap<i64, Vec<f32>>,
        top_k: usize,
    ) -> Result<Vec<SimilarityResult>> {
        self.rank(query, candidates, top_k, None, None)
    }

    fn rank(
        &self,
        query: &[f32],
        candidates: &HashMap<i64, Vec<f32>>,
        top_k: usize,
        min_similarity: Option<f32>,
        exclude_id: Option<i64>,
    ) -> Result<Vec<SimilarityResult>> {
        let mut results = Vec::with_capacity(candidates.len());

        for (&book_id, embedding) in candidates {
            if exclude_id == Some(book_id) {
                continue;
            }

            let score = cosine(query, embedding)?;
            if let Some(floor) = min_similarity {
                if score < floor {
                    continue;
                }
            }

            results.push(SimilarityResult { book_id, score });
        }

        // Score descending, id ascending on ties, so output order is
        // deterministic regardless of map iteration order.
        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.book_id.cmp(&b.book_id))
        });
        results.truncate(top_k);

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index(entries: &[(i64, Vec<f32>)]) -> HashMap<i64, Vec<f32>> {
        entries.iter().cloned().collect()
    }

    #[test]
    fn cosine_of_a_vector_with_itself_is_one() {
        let a = vec![0.3, -1.2, 4.5, 0.01];
        let sim = cosine(&a, &a).unwrap();
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_is_symmetric() {
        let a = vec![1.0, 2.0, 3.0];
        let b = vec![-0.5, 0.25, 2.0];
        assert_eq!(cosine(&a, &b).unwrap(), cosine(&b, &a).unwrap());
    }

    #[test]
    fn cosine_rejects_mismatched_dimensions() {
        let a = vec![1.0, 2.0];
        let b = vec![1.0, 2.0, 3.0];
        match cosine(&a, &b) {
            Err(ApiError::ShapeMismatch { left: 2, right: 3 }) => {}
            other => panic!("expected ShapeMismatch, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn cosine_of_zero_vector_is_zero() {
        let zero = vec![0.0; 3];
        let a = vec![1.0, 2.0, 3.0];
        assert_eq!(cosine(&zero, &a).unwrap(), 0.0);
    }

    #[test]
    fn find_similar_excludes_reference_and_orders_descending() {
        let engine = SimilarityEngine::new();
        let candidates = index(&[
            (1, vec![1.0, 0.0]),
            (2, vec![1.0, 0.1]),
            (3, vec![0.0, 1.0]),
            (4, vec![1.0, 0.5]),
        ]);

        let results = engine.find_similar(1, &candidates, 10, -1.0).unwrap();

        assert!(results.iter().all(|r| r.book_id != 1));
        for pair in results.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
        assert_eq!(results[0].book_id, 2);
    }

    #[test]
    fn find_similar_applies_floor_and_top_k() {
        let engine = SimilarityEngine::new();
        let candidates = index(&[
            (1, vec![1.0, 0.0]),
            (2, vec![1.0, 0.05]),
            (3, vec![0.9, 0.1]),
            (4, vec![0.0, 1.0]), // orthogonal, score 0.0
        ]);

        let results = engine.find_similar(1, &candidates, 1, 0.5).unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].score >= 0.5);

        let all = engine.find_similar(1, &candidates, 10, 0.5).unwrap();
        assert!(all.iter().all(|r| r.score >= 0.5));
        assert!(all.iter().all(|r| r.book_id != 4));
    }

    #[test]
    fn find_similar_breaks_ties_by_id_ascending() {
        let engine = SimilarityEngine::new();
        // Books 7 and 3 are identical, so they tie exactly.
        let candidates = index(&[
            (1, vec![1.0, 0.0]),
            (7, vec![0.5, 0.5]),
            (3, vec![0.5, 0.5]),
        ]);

        let results = engine.find_similar(1, &candidates, 10, -1.0).unwrap();
        assert_eq!(results[0].book_id, 3);
        assert_eq!(results[1].book_id, 7);
    }

    #[test]
    fn unknown_reference_yields_empty_not_error() {
        let engine = SimilarityEngine::new();
        let candidates = index(&[(1, vec![1.0, 0.0])]);
        let results = engine.find_similar(99, &candidates, 10, 0.0).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn rank_against_has_no_floor() {
        let engine = SimilarityEngine::new();
        let candidates = index(&[(1, vec![1.0, 0.0]), (2, vec![-1.0, 0.0])]);

        let results = engine.rank_against(&[1.0, 0.0], &candidates, 10).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].book_id, 1);
        assert!(results[1].score < 0.0);
    }
}
