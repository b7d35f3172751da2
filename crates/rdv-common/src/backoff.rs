//! Retry-delay scheduling for the rendezvous exchange.
//!
//! Both roles retransmit on a fixed schedule rather than reacting to
//! feedback: the client resends its request, the server resends its
//! response. The schedule is front-loaded (short gaps first, long gaps
//! last) so early losses are repaired quickly while most of the timeout
//! budget is spent waiting after the final transmission.

use std::time::Duration;

/// Acceptable deviation between the scheduled sum and the requested total.
const SUM_TOLERANCE: f64 = 0.01;

/// Hard cap on bisection iterations; the interval halves each round, so
/// this is far beyond what f64 precision can use.
const MAX_ITERATIONS: usize = 200;

/// Computes `attempts` retry delays summing to `total` within tolerance.
///
/// Delay `i` follows the shape `(e^(x·(i+1)) − 1) / e`, with the scale
/// factor `x` found by bisection so the delays add up to the requested
/// total. The resulting sequence is non-negative and non-decreasing.
/// Converges for every `attempts ≥ 1` and `total > 0`; zero attempts yield
/// an empty schedule.
///
/// # Examples
///
/// ```
/// use rdv_common::backoff::retry_schedule;
/// use std::time::Duration;
///
/// let delays = retry_schedule(3, Duration::from_secs(3));
/// let sum: Duration = delays.iter().sum();
/// assert!((sum.as_secs_f64() - 3.0).abs() < 0.02);
/// assert!(delays[0] < delays[2]);
/// ```
#[must_use]
pub fn retry_schedule(attempts: usize, total: Duration) -> Vec<Duration> {
    if attempts == 0 {
        return Vec::new();
    }
    let target = total.as_secs_f64();
    if target <= 0.0 {
        return vec![Duration::ZERO; attempts];
    }

    // Widen the bracket until the shape sum covers the target; for small
    // totals the sum at x = target can fall short of the target itself.
    let mut hi = target;
    while schedule_sum(hi, attempts) < target {
        hi *= 2.0;
    }
    let mut lo = 0.0;
    let mut x = hi;
    for _ in 0..MAX_ITERATIONS {
        x = (lo + hi) / 2.0;
        let sum = schedule_sum(x, attempts);
        if (sum - target).abs() <= SUM_TOLERANCE {
            break;
        }
        if sum > target {
            hi = x;
        } else {
            lo = x;
        }
    }

    (0..attempts)
        .map(|i| Duration::from_secs_f64(shape(x, i)))
        .collect()
}

/// Backoff shape: exponential in the attempt index, scaled by `x`.
fn shape(x: f64, index: usize) -> f64 {
    ((x * (index as f64 + 1.0)).exp() - 1.0) / std::f64::consts::E
}

fn schedule_sum(x: f64, attempts: usize) -> f64 {
    (0..attempts).map(|i| shape(x, i)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_sums_to(attempts: usize, total_secs: f64) {
        let delays = retry_schedule(attempts, Duration::from_secs_f64(total_secs));
        assert_eq!(delays.len(), attempts);
        let sum: f64 = delays.iter().map(Duration::as_secs_f64).sum();
        assert!(
            (sum - total_secs).abs() <= SUM_TOLERANCE * 2.0,
            "sum {sum} differs from target {total_secs}"
        );
    }

    #[test]
    fn sums_match_target_across_shapes() {
        assert_sums_to(1, 3.0);
        assert_sums_to(3, 3.0);
        assert_sums_to(10, 60.0);
        assert_sums_to(5, 0.5);
        assert_sums_to(30, 600.0);
    }

    #[test]
    fn converges_for_single_attempt_with_small_total() {
        // x = total is not enough here; the bracket has to widen.
        assert_sums_to(1, 0.5);
        assert_sums_to(2, 0.05);
    }

    #[test]
    fn delays_are_non_negative_and_non_decreasing() {
        let delays = retry_schedule(8, Duration::from_secs(30));
        for pair in delays.windows(2) {
            assert!(pair[0] <= pair[1], "schedule must not shrink: {delays:?}");
        }
    }

    #[test]
    fn schedule_is_front_loaded() {
        let delays = retry_schedule(10, Duration::from_secs(60));
        let first: f64 = delays[..5].iter().map(Duration::as_secs_f64).sum();
        let last = delays[9].as_secs_f64();
        assert!(
            first < last,
            "first half {first}s should be shorter than the final wait {last}s"
        );
    }

    #[test]
    fn zero_attempts_yield_empty_schedule() {
        assert!(retry_schedule(0, Duration::from_secs(10)).is_empty());
    }

    #[test]
    fn zero_total_yields_zero_delays() {
        let delays = retry_schedule(4, Duration::ZERO);
        assert_eq!(delays, vec![Duration::ZERO; 4]);
    }
}
