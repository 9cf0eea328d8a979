//! Cosine similarity and maximal-marginal-relevance selection.

/// Cosine similarity of two vectors; `0.0` when either has zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Pick up to `k` candidate indices balancing relevance and diversity.
///
/// The most relevant candidate is taken first. Each following pick maximises
/// `lambda * sim(query, d) - (1 - lambda) * max(sim(d, s) for s in selected)`.
/// Returned indices are in selection order.
pub fn mmr_select(query: &[f32], candidates: &[&[f32]], k: usize, lambda_mult: f32) -> Vec<usize> {
    if candidates.is_empty() || k == 0 {
        return Vec::new();
    }

    let lambda = lambda_mult.clamp(0.0, 1.0);
    let relevance: Vec<f32> = candidates
        .iter()
        .map(|candidate| cosine_similarity(query, candidate))
        .collect();

    let mut selected: Vec<usize> = Vec::with_capacity(k.min(candidates.len()));
    let mut remaining: Vec<usize> = (0..candidates.len()).collect();

    while selected.len() < k && !remaining.is_empty() {
        let mut best_position = 0;
        let mut best_score = f32::NEG_INFINITY;

        for (position, &index) in remaining.iter().enumerate() {
            let redundancy = selected
                .iter()
                .map(|&chosen| cosine_similarity(candidates[index], candidates[chosen]))
                .fold(f32::NEG_INFINITY, f32::max);
            let score = if selected.is_empty() {
                relevance[index]
            } else {
                lambda * relevance[index] - (1.0 - lambda) * redundancy
            };
            if score > best_score {
                best_score = score;
                best_position = position;
            }
        }

        selected.push(remaining.remove(best_position));
    }

    selected
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_similarity_handles_zero_vectors() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert!((cosine_similarity(&[1.0, 0.0], &[2.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
    }

    #[test]
    fn pure_relevance_matches_similarity_order() {
        let query = [1.0, 0.0];
        let a = [1.0, 0.0];
        let b = [0.9, 0.1];
        let c = [0.0, 1.0];
        let picked = mmr_select(&query, &[&c, &b, &a], 3, 1.0);
        assert_eq!(picked, vec![2, 1, 0]);
    }

    #[test]
    fn diversity_skips_near_duplicates() {
        let query = [1.0, 0.2];
        let top = [1.0, 0.2];
        let duplicate = [1.0, 0.21];
        let different = [0.6, -0.8];
        let picked = mmr_select(&query, &[&top, &duplicate, &different], 2, 0.3);
        assert_eq!(picked, vec![0, 2]);
    }

    #[test]
    fn never_returns_more_than_available() {
        let query = [1.0];
        let only = [1.0];
        assert_eq!(mmr_select(&query, &[&only], 5, 0.5), vec![0]);
        assert!(mmr_select(&query, &[], 5, 0.5).is_empty());
    }
}
