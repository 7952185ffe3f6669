//! Effort estimation in working days.
//!
//! An item's estimate is its complexity scaled by a per-unit day cost,
//! inflated by the team's extra load, plus an even share of the sprint's
//! ceremony overhead.
//!
//! # Example
//!
//! ```
//! use backlog_lens::models::{TeamCapacity, estimate_days};
//!
//! let capacity = TeamCapacity { load_percent: 0.0, story_count: 5 };
//! assert_eq!(estimate_days(1.0, &capacity, 10.0, 2.0), 2.3);
//! ```

use super::TeamCapacity;

/// Share of the sprint spent in ceremonies (planning, review, retro, dailies).
pub const CEREMONY_OVERHEAD_RATIO: f64 = 0.15;

/// Complexity assumed when a record carries none.
pub const DEFAULT_COMPLEXITY: f64 = 1.0;

/// Estimate the days an item takes.
///
/// The result is rounded to two decimals, half away from zero
/// (`0.125` becomes `0.13`, `-0.125` becomes `-0.13`). Inputs are not
/// validated; a `story_count` below 1 is treated as 1.
pub fn estimate_days(
    complexity: f64,
    capacity: &TeamCapacity,
    sprint_days: f64,
    days_per_complexity_unit: f64,
) -> f64 {
    let base = days_per_complexity_unit * complexity;

    let overhead_total = sprint_days * CEREMONY_OVERHEAD_RATIO;
    let overhead_per_item = overhead_total / capacity.story_count.max(1) as f64;

    let load_adjusted = base * (1.0 + capacity.load_percent / 100.0);

    round_to_hundredths(load_adjusted + overhead_per_item)
}

fn round_to_hundredths(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capacity(load_percent: f64, story_count: i64) -> TeamCapacity {
        TeamCapacity {
            load_percent,
            story_count,
        }
    }

    fn has_at_most_two_decimals(value: f64) -> bool {
        let scaled = value * 100.0;
        (scaled - scaled.round()).abs() < 1e-6
    }

    #[test]
    fn test_reference_case() {
        // base 2, overhead 10 * 0.15 / 5 = 0.3
        assert_eq!(estimate_days(1.0, &capacity(0.0, 5), 10.0, 2.0), 2.3);
    }

    #[test]
    fn test_load_inflates_base_only() {
        // base 4 * 1.5 = 6, overhead 1.5 / 3 = 0.5
        assert_eq!(estimate_days(2.0, &capacity(50.0, 3), 10.0, 2.0), 6.5);
    }

    #[test]
    fn test_negative_load_reduces_estimate() {
        // base 2 * 0.8 = 1.6, overhead 1.5
        assert_eq!(estimate_days(1.0, &capacity(-20.0, 1), 10.0, 2.0), 3.1);
    }

    #[test]
    fn test_zero_story_count_uses_divisor_of_one() {
        let zero = estimate_days(1.0, &capacity(0.0, 0), 10.0, 2.0);
        let one = estimate_days(1.0, &capacity(0.0, 1), 10.0, 2.0);
        assert_eq!(zero, one);
        assert_eq!(zero, 3.5);
    }

    #[test]
    fn test_negative_story_count_uses_divisor_of_one() {
        let negative = estimate_days(1.0, &capacity(0.0, -4), 10.0, 2.0);
        assert_eq!(negative, 3.5);
        assert!(negative.is_finite());
    }

    #[test]
    fn test_zero_complexity_leaves_only_overhead() {
        assert_eq!(estimate_days(0.0, &capacity(0.0, 2), 10.0, 2.0), 0.75);
    }

    #[test]
    fn test_rounds_half_away_from_zero() {
        // 0.125 is exact in binary, so it exercises the tie rule directly.
        assert_eq!(estimate_days(0.125, &capacity(0.0, 1), 0.0, 1.0), 0.13);
        assert_eq!(estimate_days(-0.125, &capacity(0.0, 1), 0.0, 1.0), -0.13);
        assert_eq!(estimate_days(0.375, &capacity(0.0, 1), 0.0, 1.0), 0.38);
    }

    #[test]
    fn test_output_has_two_decimals() {
        for complexity in [1.0, 1.3, 2.5, 3.33, 4.77, 5.0] {
            for load in [0.0, 7.5, 12.3, 33.0] {
                for stories in [1, 3, 7, 11] {
                    let days = estimate_days(complexity, &capacity(load, stories), 10.0, 2.0);
                    assert!(
                        has_at_most_two_decimals(days),
                        "{} has more than two decimals",
                        days
                    );
                }
            }
        }
    }

    #[test]
    fn test_monotonic_in_complexity() {
        let cap = capacity(10.0, 6);
        let mut previous = f64::MIN;
        for step in 0..=50 {
            let complexity = 1.0 + step as f64 * 0.08;
            let days = estimate_days(complexity, &cap, 10.0, 2.0);
            assert!(days >= previous, "{} < {} at {}", days, previous, complexity);
            previous = days;
        }
    }

    #[test]
    fn test_monotonic_in_load() {
        let mut previous = f64::MIN;
        for step in 0..=40 {
            let load = step as f64 * 2.5;
            let days = estimate_days(2.5, &capacity(load, 6), 10.0, 2.0);
            assert!(days >= previous, "{} < {} at load {}", days, previous, load);
            previous = days;
        }
    }

    #[test]
    fn test_deterministic() {
        let cap = capacity(15.0, 7);
        let a = estimate_days(3.7, &cap, 12.0, 1.5);
        let b = estimate_days(3.7, &cap, 12.0, 1.5);
        assert_eq!(a.to_bits(), b.to_bits());
    }
}
