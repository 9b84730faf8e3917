//! Inbound event deduplication.
//!
//! Chat platforms deliver events at least once, so the same event can show up
//! again after a reconnect or a slow acknowledgement. [`DuplicateGuard`]
//! remembers recently seen event IDs for a fixed window and reports repeats.
//! State is in-memory only; a restart forgets everything.

use std::{
    collections::HashMap,
    sync::Mutex,
    time::{Duration, Instant},
};

/// How long a seen event ID suppresses redeliveries.
pub const DEFAULT_SUPPRESSION_WINDOW: Duration = Duration::from_secs(10 * 60);

/// Time-windowed record of recently seen event IDs.
///
/// Each channel account owns its own guard; there is no process-wide state.
#[derive(Debug)]
pub struct DuplicateGuard {
    seen: Mutex<HashMap<String, Instant>>,
    window: Duration,
}

impl Default for DuplicateGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl DuplicateGuard {
    pub fn new() -> Self {
        Self::with_window(DEFAULT_SUPPRESSION_WINDOW)
    }

    pub fn with_window(window: Duration) -> Self {
        Self {
            seen: Mutex::new(HashMap::new()),
            window,
        }
    }

    /// Returns `true` if `event_id` was already seen within the window.
    ///
    /// On first sighting the ID is recorded and `false` is returned. Missing
    /// or empty IDs are never suppressed.
    pub fn check_and_mark(&self, event_id: Option<&str>) -> bool {
        self.check_and_mark_at(event_id, Instant::now())
    }

    /// Same as [`check_and_mark`](Self::check_and_mark) with an explicit clock
    /// reading.
    pub fn check_and_mark_at(&self, event_id: Option<&str>, now: Instant) -> bool {
        let mut seen = self.seen.lock().unwrap_or_else(|e| e.into_inner());

        // Sweep and check under one lock so concurrent first sightings of the
        // same ID cannot both win.
        seen.retain(|_, first_seen| now.saturating_duration_since(*first_seen) <= self.window);

        let Some(event_id) = event_id.filter(|id| !id.is_empty()) else {
            return false;
        };
        if seen.contains_key(event_id) {
            return true;
        }
        seen.insert(event_id.to_string(), now);
        false
    }

    /// Forget every recorded event ID.
    pub fn reset(&self) {
        self.seen.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    /// Number of IDs currently remembered.
    pub fn len(&self) -> usize {
        self.seen.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
