//! In-memory scheduler state.

use serde::Serialize;

use dripsync_common::UtcMillis;

/// Bookkeeping the scheduler keeps between ticks.
///
/// None of this is load-bearing across a restart: a fresh state with the
/// same cursor behind it re-fetches once and then settles.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchedulerState {
    /// A request is outstanding. Single-flight guard.
    pub updating_data: bool,
    /// When the last fetch was initiated, successful or not.
    pub last_update_attempt: Option<UtcMillis>,
    /// Outcome of the most recent attempt.
    pub last_update_successful: bool,
    /// Cursor timestamp as of the last time this process looked.
    pub last_observed_info_update: UtcMillis,
    /// Bumped on every attempt and every guard reset.
    pub attempt_generation: u64,
}

impl SchedulerState {
    /// Create an empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a fetch as started at `now` and take the guard.
    ///
    /// Returns the generation that must be presented to release the guard.
    pub fn begin_attempt(&mut self, now: UtcMillis) -> u64 {
        self.attempt_generation += 1;
        self.updating_data = true;
        self.last_update_successful = false;
        self.last_update_attempt = Some(now);
        self.attempt_generation
    }

    /// Record an attempt that does not go through the guard (e.g. asking
    /// the host to launch the companion app).
    pub fn note_attempt(&mut self, now: UtcMillis) {
        self.last_update_attempt = Some(now);
    }

    /// Record a successful fetch whose payload was written at `written_at`.
    ///
    /// A completion from a superseded attempt still advances the observed
    /// cursor (its data did land in the store) but does not claim success
    /// for the current attempt.
    pub fn record_success(&mut self, generation: u64, written_at: UtcMillis) {
        self.last_observed_info_update = self.last_observed_info_update.max(written_at);
        if generation == self.attempt_generation {
            self.last_update_successful = true;
        }
    }

    /// Release the guard taken by `generation`.
    ///
    /// Returns false when the attempt was superseded; the guard then belongs
    /// to someone else and is left alone.
    pub fn release(&mut self, generation: u64) -> bool {
        if generation != self.attempt_generation {
            return false;
        }
        self.updating_data = false;
        true
    }

    /// Drop the guard unconditionally.
    ///
    /// Used on host suspend/resume, where a pending response may never be
    /// delivered. Invalidates the outstanding attempt's generation.
    pub fn reset_guard(&mut self) {
        if self.updating_data {
            self.attempt_generation += 1;
        }
        self.updating_data = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attempt_lifecycle() {
        let mut state = SchedulerState::new();
        state.last_update_successful = true;

        let generation = state.begin_attempt(1_000);
        assert!(state.updating_data);
        assert!(!state.last_update_successful);
        assert_eq!(state.last_update_attempt, Some(1_000));

        state.record_success(generation, 1_200);
        assert!(state.release(generation));
        assert!(!state.updating_data);
        assert!(state.last_update_successful);
        assert_eq!(state.last_observed_info_update, 1_200);
    }

    #[test]
    fn test_reset_guard_supersedes_outstanding_attempt() {
        let mut state = SchedulerState::new();
        let stale = state.begin_attempt(1_000);

        state.reset_guard();
        assert!(!state.updating_data);

        let current = state.begin_attempt(2_000);
        assert_ne!(stale, current);

        // The late completion of the first attempt must not free the second.
        assert!(!state.release(stale));
        assert!(state.updating_data);

        state.record_success(stale, 1_500);
        assert!(!state.last_update_successful);
        assert_eq!(state.last_observed_info_update, 1_500);

        assert!(state.release(current));
        assert!(!state.updating_data);
    }

    #[test]
    fn test_reset_guard_when_idle_keeps_generation() {
        let mut state = SchedulerState::new();
        let generation = state.begin_attempt(1_000);
        state.release(generation);

        state.reset_guard();
        assert_eq!(state.attempt_generation, generation);
    }

    #[test]
    fn test_note_attempt_does_not_take_guard() {
        let mut state = SchedulerState::new();
        state.note_attempt(3_000);
        assert_eq!(state.last_update_attempt, Some(3_000));
        assert!(!state.updating_data);
    }
}
