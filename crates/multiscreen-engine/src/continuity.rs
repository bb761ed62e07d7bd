// crates/multiscreen-engine/src/continuity.rs
//
// Per-PID continuity-counter tracking over a 60s trailing window.

use crate::ts::TsHeader;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

const CC_ERROR_WINDOW: Duration = Duration::from_secs(60);

/// Per-PID expectation state.
#[derive(Clone, Copy, Debug, Default)]
struct CcPidState {
    valid: bool,
    last_cc: u8,
}

/// Tracks per-PID continuity-counter expectations and a 60s sliding window
/// of CC-error timestamps.
pub struct ContinuityTracker {
    pids: HashMap<u16, CcPidState>,
    /// Milliseconds-since-start (or any monotonic base) of each error.
    error_times_ms: VecDeque<i64>,
    total_errors: u64,
}

impl Default for ContinuityTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ContinuityTracker {
    pub fn new() -> Self {
        Self {
            pids: HashMap::new(),
            error_times_ms: VecDeque::new(),
            total_errors: 0,
        }
    }

    /// Feed one parsed TS header. `now_ms` must be monotonically
    /// non-decreasing across calls for a given tracker. Returns `true` if
    /// this packet produced a CC-error event.
    pub fn observe(&mut self, hdr: &TsHeader, now_ms: i64) -> bool {
        let state = self.pids.entry(hdr.pid).or_default();

        if hdr.discontinuity {
            // Mark invalid and defer initialization to whichever packet
            // arrives next for this PID; the discontinuity-flagged packet
            // itself is never compared against.
            state.valid = false;
            return false;
        }

        if !state.valid {
            // First packet for this PID, or the first one after a
            // discontinuity: initialize, don't compare.
            state.valid = true;
            state.last_cc = hdr.cc;
            return false;
        }

        if !hdr.payload_present {
            // Non-payload-bearing packets neither advance last_cc nor error.
            return false;
        }

        let expected = (state.last_cc + 1) & 0x0F;
        let is_error = hdr.cc != expected;
        state.last_cc = hdr.cc;

        if is_error {
            self.total_errors += 1;
            self.note_error(now_ms);
        }
        is_error
    }

    fn note_error(&mut self, now_ms: i64) {
        self.error_times_ms.push_back(now_ms);
        self.trim(now_ms);
    }

    fn trim(&mut self, now_ms: i64) {
        let horizon = now_ms - CC_ERROR_WINDOW.as_millis() as i64;
        while matches!(self.error_times_ms.front(), Some(&t) if t < horizon) {
            self.error_times_ms.pop_front();
        }
    }

    /// Count of CC-error events in the trailing 60s, as of `now_ms`.
    pub fn cc_errors_per_min(&mut self, now_ms: i64) -> usize {
        self.trim(now_ms);
        self.error_times_ms.len()
    }

    /// Monotonic lifetime counter: never decreases for the life of a
    /// worker.
    pub fn total_errors(&self) -> u64 {
        self.total_errors
    }
}
