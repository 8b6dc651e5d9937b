//! Cosine similarity over flat tensor buffers.

/// Cosine similarity between two buffers, in [-1, 1].
///
/// Returns 0.0 if either vector is all zeros or the lengths differ,
/// rather than erroring: similarity against degenerate input is simply
/// "no resemblance".
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (&x, &y) in a.iter().zip(b) {
        dot += f64::from(x) * f64::from(y);
        norm_a += f64::from(x) * f64::from(x);
        norm_b += f64::from(y) * f64::from(y);
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a.sqrt() * norm_b.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_vectors_are_fully_similar() {
        let v = [1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn orthogonal_vectors_score_zero() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
    }

    #[test]
    fn opposite_vectors_score_negative_one() {
        let sim = cosine_similarity(&[1.0, 1.0], &[-1.0, -1.0]);
        assert!((sim + 1.0).abs() < 1e-9);
    }

    #[test]
    fn zero_vector_scores_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[0.0, 0.0]), 0.0);
    }

    #[test]
    fn length_mismatch_scores_zero() {
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn basis_vectors_score_equally() {
        // query [1,1,0] against the two basis vectors: both 1/sqrt(2)
        let query = [1.0, 1.0, 0.0];
        let a = [1.0, 0.0, 0.0];
        let b = [0.0, 1.0, 0.0];

        let sim_a = cosine_similarity(&query, &a);
        let sim_b = cosine_similarity(&query, &b);
        assert!((sim_a - std::f64::consts::FRAC_1_SQRT_2).abs() < 1e-9);
        assert!((sim_a - sim_b).abs() < 1e-12);
    }
}
