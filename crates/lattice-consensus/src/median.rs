//! Confidence-weighted element-wise median.
//!
//! The agreed value of an accepted proposal is the per-element weighted
//! median of the accepting voters' submissions. Median, not mean: up to
//! half the total confidence mass can sit on arbitrary values without
//! moving the result past the honest contributions.

/// Compute the weighted element-wise median of equally-shaped buffers.
///
/// Each contribution is `(weight, values)`; all value slices must have
/// the same length (the caller enforces shape agreement). For each index
/// the result is the smallest value whose cumulative weight reaches half
/// the total. Zero or non-finite total weight falls back to equal
/// weighting. An empty contribution set yields an empty vec.
pub fn weighted_elementwise_median(contributions: &[(f64, &[f32])]) -> Vec<f32> {
    let Some(len) = contributions.first().map(|(_, v)| v.len()) else {
        return Vec::new();
    };

    let total: f64 = contributions.iter().map(|(w, _)| w).sum();
    let uniform = total <= 0.0 || !total.is_finite();
    let total = if uniform {
        contributions.len() as f64
    } else {
        total
    };

    let mut result = Vec::with_capacity(len);
    let mut column: Vec<(f32, f64)> = Vec::with_capacity(contributions.len());

    for i in 0..len {
        column.clear();
        for (w, values) in contributions {
            let weight = if uniform { 1.0 } else { *w };
            column.push((values[i], weight));
        }
        column.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

        let half = total / 2.0;
        let mut cumulative = 0.0;
        let mut chosen = column[column.len() - 1].0;
        for &(value, weight) in &column {
            cumulative += weight;
            if cumulative >= half {
                chosen = value;
                break;
            }
        }
        result.push(chosen);
    }

    result
}
