// crates/multiscreen-engine/src/metrics.rs
//
// Process-wide metrics aggregator for callers that feed raw TS packets and
// rendered-frame timestamps directly, rather than going through a
// `StreamWorker`.

use crate::alerts::AlertDispatcher;
use crate::continuity::ContinuityTracker;
use crate::ts::parse_ts_header;
use crate::windowed::FrameTimeWindow;
use multiscreen_core::config::ConfigSnapshot;
use multiscreen_core::stats::Severity;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Expected-FPS-aware metrics aggregator, expressed as an explicit instance
/// rather than a hidden process-global singleton.
pub struct MetricsAggregator {
    expected_fps: AtomicI64,
    last_progress_ms: AtomicI64,
    frame_window: Mutex<FrameTimeWindow>,
    cc: Mutex<ContinuityTracker>,
    total_cc_errors: AtomicU64,
}

impl Default for MetricsAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsAggregator {
    pub fn new() -> Self {
        Self {
            expected_fps: AtomicI64::new(30),
            last_progress_ms: AtomicI64::new(0),
            frame_window: Mutex::new(FrameTimeWindow::new()),
            cc: Mutex::new(ContinuityTracker::new()),
            total_cc_errors: AtomicU64::new(0),
        }
    }

    /// Clamped to [1, 300].
    pub fn set_expected_fps(&self, fps: i64) {
        let fps = fps.clamp(1, 300);
        self.expected_fps.store(fps, Ordering::Relaxed);
    }

    pub fn on_frame_rendered(&self) {
        let now = now_ms();
        self.frame_window.lock().push(now);
        self.last_progress_ms.store(now, Ordering::Relaxed);
    }

    pub fn on_bytes_received(&self) {
        self.last_progress_ms.store(now_ms(), Ordering::Relaxed);
    }

    /// Feed one raw TS packet. Malformed packets are silently ignored.
    pub fn on_packet_ts(&self, pkt: &[u8]) {
        let Some(hdr) = parse_ts_header(pkt) else {
            return;
        };
        let now = now_ms();
        if self.cc.lock().observe(&hdr, now) {
            self.total_cc_errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn render_fps(&self, window_sec: f64) -> f64 {
        self.frame_window.lock().fps(now_ms(), window_sec)
    }

    pub fn cc_errors_per_min(&self) -> usize {
        self.cc.lock().cc_errors_per_min(now_ms())
    }

    pub fn total_cc_errors(&self) -> u64 {
        self.total_cc_errors.load(Ordering::Relaxed)
    }

    /// Milliseconds since the last render/byte progress event, or 0 if none
    /// has been observed yet.
    pub fn stall_ms_now(&self) -> i64 {
        let last = self.last_progress_ms.load(Ordering::Relaxed);
        if last <= 0 {
            return 0;
        }
        let now = now_ms();
        if now > last {
            now - last
        } else {
            0
        }
    }

    /// Periodic threshold check + alert dispatch: stall, render-FPS-vs-
    /// expected, and the legacy CC-errors/min threshold, each independently
    /// gated.
    pub fn poll_and_alert(&self, name: &str, cfg: &ConfigSnapshot, dispatcher: &AlertDispatcher) {
        let th = &cfg.thresholds;

        let stall = self.stall_ms_now();
        if stall >= th.stall.crit_ms {
            dispatcher.send(&format!("{name}: Stall {stall} ms"), "No progress detected", Severity::Critical);
        } else if stall >= th.stall.warn_ms {
            dispatcher.send(&format!("{name}: Stall {stall} ms"), "No progress detected", Severity::Warning);
        }

        let expected = self.expected_fps.load(Ordering::Relaxed) as f64;
        let fps = self.render_fps(2.0);
        if fps <= th.fps.crit_ratio * expected {
            dispatcher.send(
                &format!("{name}: Low FPS {fps:.1} (exp {expected})"),
                "Render FPS below threshold",
                Severity::Critical,
            );
        } else if fps <= th.fps.warn_ratio * expected {
            dispatcher.send(
                &format!("{name}: Low FPS {fps:.1} (exp {expected})"),
                "Render FPS below threshold",
                Severity::Warning,
            );
        }

        let per_min = self.cc_errors_per_min();
        let legacy_limit = th.cc_errors_per_min;
        if legacy_limit > 0 && per_min as i64 >= legacy_limit {
            dispatcher.send(
                &format!("{name}: CC errors/min = {per_min} (>= {legacy_limit})"),
                "Transport continuity errors",
                Severity::Warning,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expected_fps_is_clamped() {
        let m = MetricsAggregator::new();
        m.set_expected_fps(0);
        assert_eq!(m.expected_fps.load(Ordering::Relaxed), 1);
        m.set_expected_fps(1000);
        assert_eq!(m.expected_fps.load(Ordering::Relaxed), 300);
    }

    #[test]
    fn stall_is_zero_before_any_progress() {
        let m = MetricsAggregator::new();
        assert_eq!(m.stall_ms_now(), 0);
    }

    #[test]
    fn stall_increases_after_progress_then_silence() {
        let m = MetricsAggregator::new();
        m.on_bytes_received();
        std::thread::sleep(std::time::Duration::from_millis(20));
        assert!(m.stall_ms_now() >= 15);
    }

    #[test]
    fn on_packet_ts_feeds_the_continuity_tracker() {
        let m = MetricsAggregator::new();
        let mut pkt = vec![0u8; 188];
        pkt[0] = 0x47;
        pkt[1] = 0x01; // pid high bits
        pkt[2] = 0x00;
        pkt[3] = 0x10; // afc=1 (payload), cc=0
        m.on_packet_ts(&pkt);
        pkt[3] = 0x12; // cc=2, expected 1 -> error
        m.on_packet_ts(&pkt);
        assert_eq!(m.total_cc_errors(), 1);
    }
}
