// ranking.rs
use crate::document::{DocumentChunk, RetrievalResult};
use crate::error::RagError;
use std::cmp::Ordering;

/// Cosine similarity of two vectors, in [-1, 1].
///
/// Vectors of different lengths, empty vectors and zero vectors score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot_product = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot_product += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let norm_a = norm_a.sqrt();
    let norm_b = norm_b.sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    let similarity = dot_product / (norm_a * norm_b);
    if similarity.is_finite() {
        similarity.clamp(-1.0, 1.0)
    } else {
        0.0
    }
}

/// Scores every candidate against the query embedding and keeps the best `top_k`.
///
/// Chunks without an embedding score 0. The sort is stable, so equal scores keep
/// their candidate order. Fails with `NoCandidates` when there is nothing to rank.
pub fn rank_chunks(
    query: &str,
    query_embedding: &[f32],
    candidates: Vec<DocumentChunk>,
    top_k: usize,
) -> Result<RetrievalResult, RagError> {
    if candidates.is_empty() {
        return Err(RagError::NoCandidates);
    }
    let total_results = candidates.len();

    let mut scored: Vec<(f32, DocumentChunk)> = candidates
        .into_iter()
        .map(|chunk| {
            let score = chunk
                .embedding
                .as_deref()
                .map_or(0.0, |embedding| cosine_similarity(query_embedding, embedding));
            (score, chunk)
        })
        .collect();
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));
    scored.truncate(top_k);

    let (scores, chunks) = scored.into_iter().unzip();
    Ok(RetrievalResult {
        query: query.to_string(),
        chunks,
        scores,
        total_results,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn chunk(id: usize, embedding: Option<Vec<f32>>) -> DocumentChunk {
        let mut chunk = DocumentChunk::new(
            format!("c{}", id),
            format!("content {}", id),
            "doc.txt",
            format!("Chunk {}", id + 1),
        );
        chunk.embedding = embedding;
        chunk
    }

    fn index_of(chunk: &DocumentChunk) -> usize {
        chunk.id[1..].parse().unwrap()
    }

    #[test]
    fn test_cosine_similarity_basics() {
        assert!((cosine_similarity(&[1.0, 0.0], &[2.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }

    #[test]
    fn test_rank_orders_best_first_and_truncates() {
        let candidates = vec![
            chunk(0, Some(vec![0.0, 1.0])),
            chunk(1, Some(vec![1.0, 0.0])),
            chunk(2, None),
            chunk(3, Some(vec![1.0, 1.0])),
        ];
        let result = rank_chunks("q", &[1.0, 0.0], candidates, 2).unwrap();
        let ids: Vec<&str> = result.chunks.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["c1", "c3"]);
        assert_eq!(result.scores.len(), 2);
        assert!((result.scores[0] - 1.0).abs() < 1e-6);
        assert_eq!(result.total_results, 4);
        assert_eq!(result.query, "q");
    }

    #[test]
    fn test_missing_embeddings_score_zero_and_keep_order() {
        let candidates = vec![chunk(0, None), chunk(1, None), chunk(2, None)];
        let result = rank_chunks("q", &[1.0, 0.0], candidates, 10).unwrap();
        let ids: Vec<&str> = result.chunks.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["c0", "c1", "c2"]);
        assert_eq!(result.scores, vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_empty_candidates_fail() {
        assert_eq!(rank_chunks("q", &[1.0], Vec::new(), 5), Err(RagError::NoCandidates));
    }

    fn arb_candidates() -> impl Strategy<Value = Vec<Option<Vec<f32>>>> {
        // Few distinct directions so ties are common.
        let direction = prop_oneof![
            Just(vec![1.0f32, 0.0]),
            Just(vec![0.0f32, 1.0]),
            Just(vec![1.0f32, 1.0]),
            Just(vec![-1.0f32, 0.5]),
        ];
        prop::collection::vec(prop::option::of(direction), 1..25)
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(128))]

        #[test]
        fn prop_ranking_is_sorted_stable_and_complete(
            embeddings in arb_candidates(),
            top_k in 1usize..40,
        ) {
            let candidates: Vec<DocumentChunk> = embeddings
                .into_iter()
                .enumerate()
                .map(|(i, e)| chunk(i, e))
                .collect();
            let count = candidates.len();
            let query = [0.6f32, 0.8];
            let expected_scores: Vec<f32> = candidates
                .iter()
                .map(|c| c.embedding.as_deref().map_or(0.0, |e| cosine_similarity(&query, e)))
                .collect();

            let result = rank_chunks("q", &query, candidates, top_k).unwrap();

            prop_assert_eq!(result.total_results, count);
            prop_assert_eq!(result.chunks.len(), result.scores.len());
            prop_assert_eq!(result.chunks.len(), top_k.min(count));
            prop_assert!(result.scores.windows(2).all(|w| w[0] >= w[1]));

            for (chunk, score) in result.chunks.iter().zip(result.scores.iter()) {
                prop_assert_eq!(expected_scores[index_of(chunk)], *score);
            }
            for pair in result.chunks.windows(2) {
                let (a, b) = (index_of(&pair[0]), index_of(&pair[1]));
                if expected_scores[a] == expected_scores[b] {
                    prop_assert!(a < b, "tie broke original order: {} before {}", a, b);
                }
            }

            // Nothing left out scores better than the last kept chunk.
            if let Some(last) = result.scores.last() {
                let kept: Vec<usize> = result.chunks.iter().map(index_of).collect();
                for (i, score) in expected_scores.iter().enumerate() {
                    if !kept.contains(&i) {
                        prop_assert!(score <= last);
                    }
                }
            }

            if top_k >= count {
                let mut seen: Vec<usize> = result.chunks.iter().map(index_of).collect();
                seen.sort_unstable();
                prop_assert_eq!(seen, (0..count).collect::<Vec<_>>());
            }
        }
    }
}
