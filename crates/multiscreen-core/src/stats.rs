// crates/multiscreen-core/src/stats.rs
//
// StreamSpec and StreamStats — the data model, decimal-coded PIDs and all.
// Missing PID/program values are reported as -1.

use serde::{Deserialize, Serialize};

/// A configured source. Immutable after creation; `name` is unique within a
/// `StreamManager` registry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamSpec {
    pub name: String,
    pub url: String,
}

impl StreamSpec {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }
}

/// Alert severity, shared by `AlertDispatcher` and `MetricsAggregator`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }
}

/// Derived per-stream health status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamStatus {
    Ok,
    Warn,
    Crit,
}

impl StreamStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            StreamStatus::Ok => "ok",
            StreamStatus::Warn => "warn",
            StreamStatus::Crit => "crit",
        }
    }
}

impl Default for StreamStatus {
    fn default() -> Self {
        StreamStatus::Ok
    }
}

/// Point-in-time snapshot of one worker's stats, copied under its mutex by
/// `StreamWorker::stats()`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StreamStats {
    // identity
    pub name: String,
    pub url: String,

    // lifecycle
    pub running: bool,
    pub last_error: String,

    // rates
    pub input_fps: f64,
    pub decode_fps: f64,
    pub render_fps: f64,

    // bandwidth
    pub bitrate_kbps: i64,
    pub v_kbps: i64,
    pub a_kbps: i64,
    pub rate_mode: String,
    pub decoder: String,

    // program info (MPEG-TS PSI)
    pub sid: i32,
    pub pmt_pid: i32,
    pub pcr_pid: i32,
    pub video_pid: i32,
    pub audio_pids: Vec<i32>,
    pub service_name: String,

    // integrity
    pub cc_errors: u64,

    // derived
    pub status: String,
    pub status_reason: String,
}

impl StreamStats {
    /// A freshly-created, not-yet-started stats record: all PIDs unknown
    /// (-1), decoder not yet opened, status "ok" until the monitor says
    /// otherwise.
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            running: false,

            last_error: String::new(),
            input_fps: 0.0,
            decode_fps: 0.0,
            render_fps: 0.0,
            bitrate_kbps: 0,
            v_kbps: 0,
            a_kbps: 0,
            rate_mode: "VBR".to_string(),
            decoder: "CPU".to_string(),
            sid: -1,
            pmt_pid: -1,
            pcr_pid: -1,
            video_pid: -1,
            audio_pids: Vec::new(),
            service_name: String::new(),
            cc_errors: 0,
            status: StreamStatus::Ok.as_str().to_string(),
            status_reason: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_stats_have_unknown_pids() {
        let st = StreamStats::new("a", "url://x");
        assert_eq!(st.sid, -1);
        assert_eq!(st.pmt_pid, -1);
        assert_eq!(st.pcr_pid, -1);
        assert_eq!(st.video_pid, -1);
        assert!(st.audio_pids.is_empty());
    }

    #[test]
    fn severity_strings_match_webhook_schema() {
        assert_eq!(Severity::Info.as_str(), "info");
        assert_eq!(Severity::Warning.as_str(), "warning");
        assert_eq!(Severity::Critical.as_str(), "critical");
    }
}
