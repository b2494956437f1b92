//! Non-atomic bucket evaluation for when the atomic path cannot reach the
//! shared store.

use std::time::Duration;

use crate::bucket::{self, BucketState};
use crate::store::{BucketArgs, BucketKeys, BucketReply, SharedStore};

/// What the fallback path produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FallbackOutcome {
    /// The bucket was evaluated with plain reads and writes.
    Evaluated(BucketReply),
    /// Reads failed too; the caller fails open.
    FailOpen,
}

/// Evaluate a request with plain reads and writes.
///
/// The read-modify-write sequence is racy across frontends; during store
/// degradation availability wins over exact accounting. Failed writes leave
/// the decision standing, failed reads fail open.
pub(crate) async fn evaluate<S: SharedStore>(
    store: &S,
    keys: &BucketKeys,
    args: BucketArgs,
) -> FallbackOutcome {
    let (tokens, last_refill, count) = tokio::join!(
        store.get(&keys.tokens),
        store.get(&keys.last_refill),
        store.get(&keys.count),
    );

    let (Ok(tokens), Ok(last_refill), Ok(count)) = (tokens, last_refill, count) else {
        log::warn!("Fallback reads failed for {}, failing open", keys.tokens);
        return FallbackOutcome::FailOpen;
    };

    let state = BucketState {
        tokens: tokens.and_then(|v| v.parse().ok()),
        last_refill: last_refill.and_then(|v| v.parse().ok()),
        count: count.and_then(|v| v.parse().ok()),
    };

    let (reply, write) = bucket::evaluate(state, args);

    let ttl = Duration::from_secs(args.window_secs);

    let tokens_str = write.tokens.to_string();
    let last_refill_str = write.last_refill.to_string();
    let count_str = write.count.to_string();

    let writes = tokio::join!(
        store.setex(&keys.tokens, ttl, &tokens_str),
        store.setex(&keys.last_refill, ttl, &last_refill_str),
        store.setex(&keys.count, ttl, &count_str),
    );

    if let (Err(e), _, _) | (_, Err(e), _) | (_, _, Err(e)) = writes {
        log::warn!("Fallback write failed for {}: {e}", keys.tokens);
    }

    FallbackOutcome::Evaluated(reply)
}
