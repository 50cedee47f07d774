use std::time::{Duration, Instant};

/// A single pending value that becomes due once its window has elapsed.
///
/// Time is passed in by the caller. Scheduling again replaces the pending
/// value and restarts the window; values are never merged.
#[derive(Debug)]
pub struct Debounce<T> {
    window: Duration,
    pending: Option<(T, Instant)>,
}

impl<T> Debounce<T> {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: None,
        }
    }

    /// Schedules `value` to become due at `now + window`.
    pub fn schedule(&mut self, value: T, now: Instant) {
        self.pending = Some((value, now + self.window));
    }

    /// Returns the pending value if its deadline has passed.
    pub fn poll(&mut self, now: Instant) -> Option<T> {
        match &self.pending {
            Some((_, deadline)) if *deadline <= now => self.take(),
            _ => None,
        }
    }

    /// Removes the pending value regardless of its deadline.
    pub fn take(&mut self) -> Option<T> {
        self.pending.take().map(|(value, _)| value)
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}
