//! Fetch monotonicity watermark.
//!
//! # Purpose
//!
//! A pass computed from a stale ledger fetch could move stock state
//! backwards relative to a pass that already applied a newer fetch.
//! This module tracks the fetch timestamp of the last applied window
//! per machine and rejects any pass whose fetch is older.
//!
//! # Invariants
//!
//! - **Non-decreasing**: a fetch is accepted only if its timestamp is
//!   ≥ the last accepted fetch's timestamp.
//! - **No-timestamp → stale**: a fetch stamped `0` is always rejected
//!   (fail-closed).
//! - **Watermark advances only on acceptance**.
//! - **Pure, no IO**: the caller provides the timestamp and decides
//!   what to do with the result.

// ---------------------------------------------------------------------------
// Freshness decision
// ---------------------------------------------------------------------------

/// Result of checking a ledger fetch against the monotonicity watermark.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FetchFreshness {
    /// Fetch timestamp is ≥ the watermark; the pass may apply.
    Fresh,

    /// Fetch is strictly older than the last accepted one.
    ///
    /// Fields carry the watermark value and the rejected timestamp for
    /// logging.
    Stale { watermark_ms: i64, got_ms: i64 },

    /// Fetch has no timestamp (`fetched_at_ms == 0`). A fetch that
    /// cannot be proven fresh must not be applied.
    NoTimestamp,
}

impl FetchFreshness {
    pub fn is_fresh(&self) -> bool {
        matches!(self, FetchFreshness::Fresh)
    }

    pub fn is_rejected(&self) -> bool {
        !self.is_fresh()
    }
}

// ---------------------------------------------------------------------------
// Watermark
// ---------------------------------------------------------------------------

/// Tracks the last accepted ledger-fetch timestamp for one machine.
///
/// Start with [`FetchWatermark::new`] (accepts any positive timestamp).
/// Call [`accept`][FetchWatermark::accept] before applying a pass; only
/// apply when the result is [`FetchFreshness::Fresh`].
#[derive(Clone, Debug)]
pub struct FetchWatermark {
    /// Timestamp of the last accepted fetch.
    /// Starts at `i64::MIN` so any positive timestamp is fresh.
    last_accepted_ms: i64,
}

impl Default for FetchWatermark {
    fn default() -> Self {
        Self::new()
    }
}

impl FetchWatermark {
    pub fn new() -> Self {
        Self {
            last_accepted_ms: i64::MIN,
        }
    }

    /// Check freshness without advancing the watermark.
    pub fn check(&self, fetched_at_ms: i64) -> FetchFreshness {
        if fetched_at_ms == 0 {
            return FetchFreshness::NoTimestamp;
        }
        if fetched_at_ms < self.last_accepted_ms {
            return FetchFreshness::Stale {
                watermark_ms: self.last_accepted_ms,
                got_ms: fetched_at_ms,
            };
        }
        FetchFreshness::Fresh
    }

    /// Check freshness and advance the watermark on acceptance.
    /// Rejections do not move the watermark.
    pub fn accept(&mut self, fetched_at_ms: i64) -> FetchFreshness {
        let result = self.check(fetched_at_ms);
        if result.is_fresh() {
            self.last_accepted_ms = fetched_at_ms;
        }
        result
    }

    /// `true` once any fetch has been accepted.
    pub fn has_accepted_any(&self) -> bool {
        self.last_accepted_ms > i64::MIN
    }
}
