//! Brute-force backoff schedule.
//!
//! | failures | throttle |
//! |----------|----------|
//! | 0 | 0 |
//! | 1–10, not a multiple of 5 | 0 |
//! | 5, 10 | 30 s |
//! | 11–29 | 30 s |
//! | 30–139 | `30 * 2^((failures - 30) / 10)` s |
//! | ≥ 140 | 1 day |
//!
//! The first ten attempts are mostly free with a short pause every fifth
//! one; after that the ramp doubles every ten failures up to a one-day cap.

/// Base throttle applied once a slot starts being rate limited.
pub const THROTTLE_BASE_SECS: u32 = 30;

/// Ceiling of the schedule, reached at [`MAX_TIER_FAILURES`].
pub const MAX_THROTTLE_SECS: u32 = 86_400;

/// Failure count from which the one-day ceiling applies.
pub const MAX_TIER_FAILURES: u32 = 140;

const FREE_ATTEMPTS: u32 = 10;
const FLAT_TIER_END: u32 = 30;
const DOUBLING_STEP: u32 = 10;

/// Map a failure count to the number of seconds reads must be refused.
#[must_use]
pub const fn throttle_seconds(failure_count: u32) -> u32 {
    match failure_count {
        0 => 0,
        n if n <= FREE_ATTEMPTS => {
            if n % 5 == 0 {
                THROTTLE_BASE_SECS
            } else {
                0
            }
        }
        n if n < FLAT_TIER_END => THROTTLE_BASE_SECS,
        n if n < MAX_TIER_FAILURES => {
            // (139 - 30) / 10 == 10, so the shift stays well inside u32.
            THROTTLE_BASE_SECS << ((n - FLAT_TIER_END) / DOUBLING_STEP)
        }
        _ => MAX_THROTTLE_SECS,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn table_points() {
        let cases = [
            (0, 0),
            (1, 0),
            (4, 0),
            (5, 30),
            (6, 0),
            (9, 0),
            (10, 30),
            (11, 30),
            (29, 30),
            (30, 30),
            (39, 30),
            (40, 60),
            (50, 120),
            (129, 15_360),
            (130, 30_720),
            (139, 30_720),
            (140, 86_400),
            (1000, 86_400),
            (u32::MAX, 86_400),
        ];
        for (failures, expected) in cases {
            assert_eq!(
                throttle_seconds(failures),
                expected,
                "failure count {failures}"
            );
        }
    }

    #[test]
    fn usable_in_const_context() {
        const AT_FIVE: u32 = throttle_seconds(5);
        assert_eq!(AT_FIVE, THROTTLE_BASE_SECS);
    }

    proptest! {
        #[test]
        fn never_decreases_after_free_attempts(n in FREE_ATTEMPTS..u32::MAX) {
            prop_assert!(throttle_seconds(n + 1) >= throttle_seconds(n));
        }

        #[test]
        fn bounded_by_ceiling(n in any::<u32>()) {
            prop_assert!(throttle_seconds(n) <= MAX_THROTTLE_SECS);
        }

        #[test]
        fn free_attempts_only_pause_on_fifths(n in 1..=FREE_ATTEMPTS) {
            let expected = if n % 5 == 0 { THROTTLE_BASE_SECS } else { 0 };
            prop_assert_eq!(throttle_seconds(n), expected);
        }
    }
}
