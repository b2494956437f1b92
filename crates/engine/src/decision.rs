//! Decision records returned by the engine.

use std::fmt;

use serde::{Serialize, Serializer};

/// Whole tokens left in a bucket after an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Remaining {
    /// Tokens left under a finite policy.
    Limited(u64),
    /// Sentinel for the unlimited tier and fail-open decisions.
    Unlimited,
}

impl Remaining {
    /// Whether this is the unbounded sentinel.
    pub fn is_unlimited(self) -> bool {
        matches!(self, Remaining::Unlimited)
    }
}

impl fmt::Display for Remaining {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Remaining::Limited(tokens) => tokens.fmt(f),
            Remaining::Unlimited => f.write_str("unlimited"),
        }
    }
}

impl Serialize for Remaining {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Remaining::Limited(tokens) => serializer.serialize_u64(*tokens),
            Remaining::Unlimited => serializer.serialize_str("unlimited"),
        }
    }
}

/// The engine's answer for one request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Decision {
    /// Whether the request is admitted.
    pub allowed: bool,
    /// Whole tokens left in the bucket after the operation.
    pub remaining: Remaining,
    /// Seconds the caller should wait before retrying. Zero when admitted,
    /// at least one when denied.
    pub retry_after_seconds: u64,
    /// Tokens the request asked to consume, echoed back.
    pub cost: u32,
}

impl Decision {
    /// An allow without a bound, used for the unlimited tier, unrated
    /// endpoints and fail-open paths.
    pub(crate) fn unbounded_allow(cost: u32) -> Self {
        Self {
            allowed: true,
            remaining: Remaining::Unlimited,
            retry_after_seconds: 0,
            cost,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remaining_display() {
        assert_eq!(Remaining::Limited(42).to_string(), "42");
        assert_eq!(Remaining::Unlimited.to_string(), "unlimited");
    }

    #[test]
    fn remaining_serializes_as_number_or_sentinel() {
        assert_eq!(serde_json::to_string(&Remaining::Limited(7)).unwrap(), "7");
        assert_eq!(
            serde_json::to_string(&Remaining::Unlimited).unwrap(),
            "\"unlimited\""
        );
    }
}
