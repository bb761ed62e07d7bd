// crates/multiscreen-engine/src/windowed.rs
//
// Sliding-window frame-rate and bitrate counters shared by the per-stream
// worker and the process-wide metrics aggregator.

use std::collections::VecDeque;

const FRAME_WINDOW_HORIZON_MS: i64 = 10_000;
const EWMA_ALPHA: f64 = 0.25;
const SAMPLE_INTERVAL_MS: i64 = 1_000;
const VBR_CBR_SAMPLE_COUNT: usize = 6;
const VBR_CBR_DEVIATION: f64 = 0.10;

fn clamp_window_sec(window_sec: f64) -> f64 {
    if window_sec <= 0.1 {
        0.1
    } else {
        window_sec
    }
}

/// Append-only, monotonic-timestamp (ms) ring, trimmed to a 10s horizon on
/// every insert. Backs both decode-frame counting and render-FPS queries.
#[derive(Default)]
pub struct FrameTimeWindow {
    times_ms: VecDeque<i64>,
}

impl FrameTimeWindow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, now_ms: i64) {
        self.times_ms.push_back(now_ms);
        self.trim(now_ms);
    }

    fn trim(&mut self, now_ms: i64) {
        let horizon = now_ms - FRAME_WINDOW_HORIZON_MS;
        while matches!(self.times_ms.front(), Some(&t) if t < horizon) {
            self.times_ms.pop_front();
        }
    }

    /// Count of entries with `ts >= now - window_ms`, divided by the window
    /// length — i.e. an instantaneous FPS over the trailing window.
    /// `window_sec` is clamped to >= 0.1s.
    pub fn fps(&mut self, now_ms: i64, window_sec: f64) -> f64 {
        let window_sec = clamp_window_sec(window_sec);
        self.trim(now_ms);
        let window_ms = (window_sec * 1000.0) as i64;
        let horizon = now_ms - window_ms;
        let count = self.times_ms.iter().filter(|&&t| t >= horizon).count();
        count as f64 / window_sec
    }
}

/// EWMA-smoothed decode-FPS sampler. Seeded with the known input FPS on
/// first use; samples at >= 1000ms cadence.
pub struct DecodeFpsSampler {
    sample_start_ms: i64,
    sample_frames: u64,
    ema: f64,
    seeded: bool,
}

impl DecodeFpsSampler {
    pub fn new(now_ms: i64) -> Self {
        Self {
            sample_start_ms: now_ms,
            sample_frames: 0,
            ema: 0.0,
            seeded: false,
        }
    }

    /// Seed the EWMA with the declared input FPS, if not already seeded.
    pub fn seed(&mut self, input_fps: f64) {
        if !self.seeded && input_fps > 0.0 {
            self.ema = input_fps;
            self.seeded = true;
        }
    }

    /// Record one decoded frame. Every >= 1000ms, folds the instantaneous
    /// rate into the EWMA with alpha = 0.25.
    pub fn on_frame_decoded(&mut self, now_ms: i64) {
        self.sample_frames += 1;
        let elapsed_ms = now_ms - self.sample_start_ms;
        if elapsed_ms >= SAMPLE_INTERVAL_MS {
            let dt_secs = elapsed_ms as f64 / 1000.0;
            let instantaneous = if dt_secs > 0.0 {
                self.sample_frames as f64 / dt_secs
            } else {
                0.0
            };
            self.ema = if self.ema <= 0.0 {
                instantaneous
            } else {
                self.ema + EWMA_ALPHA * (instantaneous - self.ema)
            };
            self.sample_frames = 0;
            self.sample_start_ms = now_ms;
        }
    }

    /// Current EWMA value, clamped to `[0, input_fps]` when `input_fps >
    /// 0`, else clamped to `>= 0`.
    pub fn decode_fps(&self, input_fps: f64) -> f64 {
        let mut fps = self.ema;
        if input_fps > 0.0 {
            if fps > input_fps {
                fps = input_fps;
            }
            if fps <= 0.0 {
                fps = input_fps;
            }
        } else if fps < 0.0 {
            fps = 0.0;
        }
        fps
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PacketKind {
    Video,
    Audio,
    Other,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateMode {
    Vbr,
    Cbr,
}

impl RateMode {
    pub fn as_str(self) -> &'static str {
        match self {
            RateMode::Vbr => "VBR",
            RateMode::Cbr => "CBR",
        }
    }
}

/// Per-second bitrate accumulator with the VBR/CBR heuristic: six
/// consecutive 1s kbps samples, compare the last sample's deviation from
/// their mean.
pub struct BitrateAccumulator {
    window_start_ms: i64,
    bits_total: u64,
    last_kind: PacketKind,

    pub kbps: i64,
    pub v_kbps: i64,
    pub a_kbps: i64,

    sample_sum: i64,
    sample_count: usize,
    rate_mode: RateMode,
}

impl BitrateAccumulator {
    pub fn new(now_ms: i64) -> Self {
        Self {
            window_start_ms: now_ms,
            bits_total: 0,
            last_kind: PacketKind::Other,
            kbps: 0,
            v_kbps: 0,
            a_kbps: 0,
            sample_sum: 0,
            sample_count: 0,
            rate_mode: RateMode::Vbr,
        }
    }

    /// Add one packet's bit count. Emits a new kbps sample (and possibly a
    /// VBR/CBR classification) once >= 1000ms has elapsed since the window
    /// started.
    pub fn add_packet(&mut self, bits: u64, kind: PacketKind, now_ms: i64) {
        self.bits_total += bits;
        self.last_kind = kind;

        let elapsed_ms = now_ms - self.window_start_ms;
        if elapsed_ms >= SAMPLE_INTERVAL_MS {
            let dt_secs = elapsed_ms as f64 / 1000.0;
            let kbps = (self.bits_total as f64 / 1000.0 / dt_secs).round() as i64;
            self.kbps = kbps;
            match self.last_kind {
                PacketKind::Video => self.v_kbps = kbps,
                PacketKind::Audio => self.a_kbps = kbps,
                PacketKind::Other => {}
            }

            self.sample_sum += kbps;
            self.sample_count += 1;
            if self.sample_count >= VBR_CBR_SAMPLE_COUNT {
                let mean = self.sample_sum as f64 / self.sample_count as f64;
                self.rate_mode = if mean > 1.0 && ((kbps as f64 - mean).abs() / mean) < VBR_CBR_DEVIATION
                {
                    RateMode::Cbr
                } else {
                    RateMode::Vbr
                };
                self.sample_sum = 0;
                self.sample_count = 0;
            }

            self.bits_total = 0;
            self.window_start_ms = now_ms;
        }
    }

    /// Defaults to "VBR" until six samples have been seen.
    pub fn rate_mode(&self) -> RateMode {
        self.rate_mode
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_window_reports_zero_after_horizon_passes() {
        let mut w = FrameTimeWindow::new();
        w.push(0);
        w.push(100);
        assert!(w.fps(500, 2.0) > 0.0);
        // no new frames for >= window_sec (2s): fps(window) == 0
        assert_eq!(w.fps(3_000, 2.0), 0.0);
    }

    #[test]
    fn frame_window_clamps_tiny_window() {
        let mut w = FrameTimeWindow::new();
        w.push(0);
        let fps = w.fps(0, 0.0);
        assert!(fps.is_finite());
    }

    #[test]
    fn decode_fps_sampler_seeds_and_clamps_to_input_fps() {
        let mut s = DecodeFpsSampler::new(0);
        s.seed(30.0);
        assert_eq!(s.decode_fps(30.0), 30.0);

        for i in 0..15 {
            s.on_frame_decoded(i * 100);
        }
        s.on_frame_decoded(1100);
        let fps = s.decode_fps(30.0);
        assert!(fps >= 0.0 && fps <= 30.0);
    }

    #[test]
    fn decode_fps_never_exceeds_input_fps() {
        let mut s = DecodeFpsSampler::new(0);
        s.seed(10.0);
        // simulate a burst of frames far exceeding input_fps
        for i in 0..200u64 {
            s.on_frame_decoded((i * 5) as i64);
        }
        assert!(s.decode_fps(10.0) <= 10.0);
    }

    #[test]
    fn bitrate_classifies_cbr_when_stable() {
        let mut acc = BitrateAccumulator::new(0);
        let mut t = 0i64;
        for _ in 0..6 {
            t += 1000;
            acc.add_packet(2_000_000, PacketKind::Video, t); // ~2000 kbps
        }
        assert_eq!(acc.rate_mode(), RateMode::Cbr);
    }

    #[test]
    fn bitrate_classifies_vbr_when_unstable() {
        let mut acc = BitrateAccumulator::new(0);
        let mut t = 0i64;
        let bursts = [500_000u64, 4_000_000, 200_000, 3_500_000, 100_000, 5_000_000];
        for bits in bursts {
            t += 1000;
            acc.add_packet(bits, PacketKind::Video, t);
        }
        assert_eq!(acc.rate_mode(), RateMode::Vbr);
    }

    #[test]
    fn defaults_to_vbr_before_six_samples() {
        let acc = BitrateAccumulator::new(0);
        assert_eq!(acc.rate_mode(), RateMode::Vbr);
    }
}
