//! Quorum thresholds over validator counts.
//!
//! With `n` validators a BFT network tolerates `f` faulty ones where
//! `n >= 3f + 1`. A majority is strictly more than two thirds of `n` and a
//! minority is at least one third, which guarantees one honest participant.

/// `count > floor(2n / 3)`
pub fn is_majority(count: usize, total: usize) -> bool {
    count > total * 2 / 3
}

/// `count >= ceil(n / 3)`
pub fn is_minority(count: usize, total: usize) -> bool {
    count >= total.div_ceil(3)
}

/// Smallest count that satisfies [`is_majority`].
pub fn majority_threshold(total: usize) -> usize {
    total * 2 / 3 + 1
}

/// Smallest count that satisfies [`is_minority`].
pub fn minority_threshold(total: usize) -> usize {
    total.div_ceil(3)
}
