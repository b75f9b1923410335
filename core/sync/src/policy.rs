//! Per-tick fetch decision.
//!
//! Pure function of the scheduler state, the cursor timestamp read fresh
//! from the store, the current time and the timing knobs. Kept separate
//! from the scheduler so every branch can be tested without a runtime.

use std::fmt;

use dripsync_common::{elapsed_ms, UtcMillis};

use crate::config::SyncTimings;
use crate::state::SchedulerState;

/// Why a fetch was issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchReason {
    /// Nothing stored and nothing ever attempted.
    Bootstrap,
    /// Nothing stored and the last attempt went unanswered too long.
    CompanionUnresponsive,
    /// Last attempt failed and is older than the staleness threshold.
    RetryAfterFailure,
    /// Stored data is older than the freshness window.
    DataStale,
    /// Another writer advanced the cursor since we last looked.
    ExternalUpdate,
}

/// Why a tick did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// A request is still outstanding.
    InFlight,
    /// Nothing stored yet; the last attempt is still recent.
    AwaitingCompanion,
    /// Stored data is fresh and already observed.
    UpToDate,
    /// The cursor could not be read.
    StoreUnavailable,
}

/// Outcome of one tick evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Fetch(FetchReason),
    Skip(SkipReason),
}

impl Decision {
    /// Whether this decision issues a request.
    pub fn is_fetch(&self) -> bool {
        matches!(self, Decision::Fetch(_))
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Fetch(reason) => write!(f, "fetch ({:?})", reason),
            Decision::Skip(reason) => write!(f, "skip ({:?})", reason),
        }
    }
}

/// Decide whether this tick should fetch.
///
/// `persisted` is `infoLastUpdate` as just read from the store, with zero
/// already mapped to `None`.
///
/// A failed attempt past the staleness threshold is checked before data
/// age, so a prompt retry wins over waiting out the freshness window.
pub fn evaluate(
    state: &SchedulerState,
    persisted: Option<UtcMillis>,
    now: UtcMillis,
    timings: &SyncTimings,
) -> Decision {
    if state.updating_data {
        return Decision::Skip(SkipReason::InFlight);
    }

    let attempt_is_stale = state
        .last_update_attempt
        .is_some_and(|attempt| elapsed_ms(now, attempt) > timings.stale_ms());

    let Some(persisted) = persisted else {
        return match state.last_update_attempt {
            None => Decision::Fetch(FetchReason::Bootstrap),
            Some(_) if attempt_is_stale => Decision::Fetch(FetchReason::CompanionUnresponsive),
            Some(_) => Decision::Skip(SkipReason::AwaitingCompanion),
        };
    };

    if !state.last_update_successful && attempt_is_stale {
        return Decision::Fetch(FetchReason::RetryAfterFailure);
    }

    if elapsed_ms(now, persisted) > timings.update_interval_ms() {
        return Decision::Fetch(FetchReason::DataStale);
    }

    if persisted == state.last_observed_info_update {
        return Decision::Skip(SkipReason::UpToDate);
    }

    Decision::Fetch(FetchReason::ExternalUpdate)
}
