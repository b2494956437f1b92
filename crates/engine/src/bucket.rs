//! Token-bucket refill and admission arithmetic.
//!
//! The same arithmetic runs in three places: the Lua script the Redis driver
//! executes, the in-process store's atomic evaluation, and the non-atomic
//! fallback path. This module is the Rust rendition; the Lua script mirrors
//! it statement for statement.

use crate::store::{BucketArgs, BucketReply};

/// Bucket state as read from the shared store. Absent fields take their
/// defaults during evaluation: a full bucket that was last refilled now and
/// has consumed nothing.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(crate) struct BucketState {
    pub tokens: Option<f64>,
    pub last_refill: Option<u64>,
    pub count: Option<u64>,
}

/// Values to persist after an evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct BucketWrite {
    pub tokens: f64,
    pub last_refill: u64,
    pub count: u64,
}

/// Evaluate one request against a bucket.
///
/// Refill is continuous at `adjusted_max / window` tokens per second and
/// clamps at `adjusted_burst`. A request is admitted when the refilled
/// bucket covers its cost and the consumed count stays under the per-window
/// ceiling. Denials still persist the refill and advance `last_refill`.
pub(crate) fn evaluate(state: BucketState, args: BucketArgs) -> (BucketReply, BucketWrite) {
    let BucketArgs {
        now,
        adjusted_max,
        adjusted_burst,
        window_secs,
        cost,
    } = args;

    let burst = adjusted_burst as f64;
    let mut tokens = state.tokens.unwrap_or(burst);
    let last_refill = state.last_refill.unwrap_or(now);
    let mut count = state.count.unwrap_or(0);

    // Backward clock skew between frontends reads as a negative elapsed
    // time; it must never drain the bucket.
    let elapsed = now.saturating_sub(last_refill);

    if window_secs > 0 {
        let refill = elapsed as f64 * adjusted_max as f64 / window_secs as f64;
        tokens = f64::min(burst, tokens + refill);
    }

    let allowed = tokens >= f64::from(cost) && count < adjusted_max;

    if allowed {
        tokens -= f64::from(cost);
        count += u64::from(cost);
    }

    let reply = BucketReply {
        allowed,
        remaining: tokens.max(0.0).floor() as u64,
        count,
    };

    let write = BucketWrite {
        tokens,
        last_refill: now,
        count,
    };

    (reply, write)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(now: u64, max: u64, burst: u64, window: u64, cost: u32) -> BucketArgs {
        BucketArgs {
            now,
            adjusted_max: max,
            adjusted_burst: burst,
            window_secs: window,
            cost,
        }
    }

    fn state(tokens: f64, last_refill: u64, count: u64) -> BucketState {
        BucketState {
            tokens: Some(tokens),
            last_refill: Some(last_refill),
            count: Some(count),
        }
    }

    #[test]
    fn fresh_bucket_starts_full() {
        let (reply, write) = evaluate(BucketState::default(), args(1000, 100, 20, 3600, 1));

        assert!(reply.allowed);
        assert_eq!(reply.remaining, 19);
        assert_eq!(reply.count, 1);
        assert_eq!(write.last_refill, 1000);
    }

    #[test]
    fn refills_at_max_per_window() {
        // Half a window of idle time refills half of max.
        let (reply, _) = evaluate(state(0.0, 1000, 10), args(2800, 100, 100, 3600, 1));

        assert!(reply.allowed);
        assert_eq!(reply.remaining, 49);
    }

    #[test]
    fn refill_clamps_at_burst() {
        let (reply, write) = evaluate(state(0.0, 0, 10), args(1_000_000, 100, 20, 3600, 1));

        assert!(reply.allowed);
        assert_eq!(reply.remaining, 19);
        assert!(write.tokens <= 20.0);
    }

    #[test]
    fn backward_clock_skew_is_treated_as_zero() {
        // The reading frontend lags the writer by 30 seconds.
        let (reply, write) = evaluate(state(5.0, 1030, 15), args(1000, 100, 20, 3600, 1));

        assert!(reply.allowed);
        assert_eq!(reply.remaining, 4);
        assert!(write.tokens >= 0.0);
        assert_eq!(write.last_refill, 1000);
    }

    #[test]
    fn count_gate_caps_the_window() {
        // Tokens are available, but the per-window ceiling is spent.
        let (reply, _) = evaluate(state(20.0, 1000, 10), args(1000, 10, 20, 3600, 1));

        assert!(!reply.allowed);
        assert_eq!(reply.count, 10);
    }

    #[test]
    fn oversized_cost_is_denied_without_overflow() {
        let (reply, write) = evaluate(BucketState::default(), args(1000, 10, 2, 3600, 5));

        assert!(!reply.allowed);
        assert_eq!(reply.remaining, 2);
        assert_eq!(write.count, 0);
    }

    #[test]
    fn denial_persists_refill_and_advances_clock() {
        let (reply, write) = evaluate(state(0.0, 1000, 99), args(1036, 100, 20, 3600, 5));

        assert!(!reply.allowed);
        // One token refilled over 36 seconds at 100 per 3600.
        assert_eq!(reply.remaining, 1);
        assert!((write.tokens - 1.0).abs() < 1e-9);
        assert_eq!(write.last_refill, 1036);
        assert_eq!(write.count, 99);
    }

    #[test]
    fn zero_adjusted_max_denies_everything() {
        let (reply, _) = evaluate(BucketState::default(), args(1000, 0, 0, 3600, 1));

        assert!(!reply.allowed);
        assert_eq!(reply.remaining, 0);
    }
}
