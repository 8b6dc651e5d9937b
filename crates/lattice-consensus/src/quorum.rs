//! Byzantine quorum arithmetic.
//!
//! Thresholds use strict inequality: "exceeds 2/3" means 0.75 of 4
//! qualifies and exactly 2/3 of 3 does not. Comparisons are done as
//! `3 × confidence > 2 × n` to keep the fraction exact rather than
//! comparing against a rounded constant.

/// Whether summed accept confidence over `invited` participants exceeds
/// the 2/3 Byzantine quorum threshold.
pub fn accept_quorum(accept_confidence: f64, invited: usize) -> bool {
    if invited == 0 {
        return false;
    }
    3.0 * accept_confidence > 2.0 * invited as f64
}

/// Whether summed reject confidence exceeds 1/3 of participants,
/// making an accept quorum unreachable in the worst case.
pub fn reject_quorum(reject_confidence: f64, invited: usize) -> bool {
    if invited == 0 {
        return false;
    }
    3.0 * reject_confidence > invited as f64
}

/// Maximum faulty participants a round of `invited` can tolerate:
/// ⌊(n − 1) / 3⌋.
pub const fn max_faulty(invited: usize) -> usize {
    if invited == 0 {
        0
    } else {
        (invited - 1) / 3
    }
}
