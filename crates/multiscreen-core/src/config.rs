// crates/multiscreen-core/src/config.rs
//
// Thresholds and webhook settings, loaded once and passed by value into the
// monitor loop; unknown fields ignored, malformed JSON leaves defaults in
// place and the load call reports failure.

use serde::Deserialize;
use std::path::Path;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FpsThresholds {
    pub warn_ratio: f64,
    pub crit_ratio: f64,
}

impl Default for FpsThresholds {
    fn default() -> Self {
        Self {
            warn_ratio: 0.75,
            crit_ratio: 0.50,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BitrateThresholds {
    pub warn_kbps: i64,
    pub crit_kbps: i64,
}

impl Default for BitrateThresholds {
    fn default() -> Self {
        Self {
            warn_kbps: 1500,
            crit_kbps: 500,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StallThresholds {
    pub warn_ms: i64,
    pub crit_ms: i64,
}

impl Default for StallThresholds {
    fn default() -> Self {
        Self {
            warn_ms: 1000,
            crit_ms: 3000,
        }
    }
}

/// All threshold groups, plus two legacy scalar fields older deployments
/// may still carry in `settings.json`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Thresholds {
    pub fps: FpsThresholds,
    pub bitrate: BitrateThresholds,
    pub stall: StallThresholds,
    /// Legacy: `thresholds.decode_fps_min`. Derived from `warn_ratio * 30`
    /// when absent from the settings file.
    pub decode_fps_min: i64,
    /// Legacy: `thresholds.bitrate_drop_pct`, 0-100.
    pub bitrate_drop_pct: i64,
    /// 0 = disabled.
    pub cc_errors_per_min: i64,
}

impl Default for Thresholds {
    fn default() -> Self {
        let fps = FpsThresholds::default();
        Self {
            fps,
            bitrate: BitrateThresholds::default(),
            stall: StallThresholds::default(),
            decode_fps_min: (fps.warn_ratio * 30.0) as i64,
            bitrate_drop_pct: 0,
            cc_errors_per_min: 0,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct WebhookConfig {
    pub enabled: bool,
    pub url: String,
    pub timeout_ms: u64,
    pub cooldown_sec: u64,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: String::new(),
            timeout_ms: 2000,
            cooldown_sec: 60,
        }
    }
}

/// Immutable snapshot of thresholds + webhook settings, loaded once at
/// startup and passed by value into the monitor loop.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConfigSnapshot {
    pub thresholds: Thresholds,
    pub webhook: WebhookConfig,
    source_path: Option<String>,
}

impl ConfigSnapshot {
    pub fn source_path(&self) -> Option<&str> {
        self.source_path.as_deref()
    }

    /// Parse settings JSON. Unknown fields are ignored. Malformed JSON
    /// returns `Err`; the caller is expected to fall back to
    /// `ConfigSnapshot::default()` rather than treat this as fatal.
    pub fn parse(body: &str) -> anyhow::Result<Self> {
        let raw: RawSettings = serde_json::from_str(body)?;
        Ok(raw.into_snapshot(None))
    }

    /// Load from a path on disk. On any I/O or parse error, defaults are
    /// returned and the error is surfaced for logging rather than
    /// propagated.
    pub fn load(path: impl AsRef<Path>) -> (Self, Option<anyhow::Error>) {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(body) => match serde_json::from_str::<RawSettings>(&body) {
                Ok(raw) => (raw.into_snapshot(Some(path.display().to_string())), None),
                Err(e) => (Self::default(), Some(e.into())),
            },
            Err(e) => (Self::default(), Some(e.into())),
        }
    }
}

// --- JSON schema (all fields optional) -------------------------------------

#[derive(Deserialize, Default)]
struct RawSettings {
    thresholds: Option<RawThresholds>,
    alerts: Option<RawAlerts>,
}

#[derive(Deserialize, Default)]
struct RawThresholds {
    fps: Option<RawFps>,
    bitrate: Option<RawBitrate>,
    stall: Option<RawStall>,
    decode_fps_min: Option<i64>,
    bitrate_drop_pct: Option<i64>,
    cc_errors_per_min: Option<i64>,
}

#[derive(Deserialize)]
struct RawFps {
    warn_ratio: Option<f64>,
    crit_ratio: Option<f64>,
}

#[derive(Deserialize)]
struct RawBitrate {
    warn_kbps: Option<i64>,
    crit_kbps: Option<i64>,
}

#[derive(Deserialize)]
struct RawStall {
    warn_ms: Option<i64>,
    crit_ms: Option<i64>,
}

#[derive(Deserialize, Default)]
struct RawAlerts {
    webhook: Option<RawWebhook>,
    cooldown_sec: Option<i64>,
}

#[derive(Deserialize)]
struct RawWebhook {
    enabled: Option<bool>,
    url: Option<String>,
    timeout_ms: Option<i64>,
}

impl RawSettings {
    fn into_snapshot(self, source_path: Option<String>) -> ConfigSnapshot {
        let mut thresholds = Thresholds::default();
        if let Some(t) = self.thresholds {
            if let Some(fps) = t.fps {
                if let Some(v) = fps.warn_ratio {
                    thresholds.fps.warn_ratio = v.clamp(0.0, 10.0);
                }
                if let Some(v) = fps.crit_ratio {
                    thresholds.fps.crit_ratio = v.clamp(0.0, 10.0);
                }
            }
            if let Some(br) = t.bitrate {
                if let Some(v) = br.warn_kbps {
                    thresholds.bitrate.warn_kbps = v.max(0);
                }
                if let Some(v) = br.crit_kbps {
                    thresholds.bitrate.crit_kbps = v.max(0);
                }
            }
            if let Some(st) = t.stall {
                if let Some(v) = st.warn_ms {
                    thresholds.stall.warn_ms = v.max(0);
                }
                if let Some(v) = st.crit_ms {
                    thresholds.stall.crit_ms = v.max(0);
                }
            }
            // legacy decode_fps_min is read explicitly if present, else
            // re-derived from the (possibly just-updated) warn_ratio.
            thresholds.decode_fps_min = t
                .decode_fps_min
                .map(|v| v.max(0))
                .unwrap_or((thresholds.fps.warn_ratio * 30.0) as i64);
            if let Some(v) = t.bitrate_drop_pct {
                thresholds.bitrate_drop_pct = v.clamp(0, 100);
            }
            if let Some(v) = t.cc_errors_per_min {
                thresholds.cc_errors_per_min = v.max(0);
            }
        }

        let mut webhook = WebhookConfig::default();
        if let Some(a) = self.alerts {
            if let Some(wh) = a.webhook {
                if let Some(v) = wh.enabled {
                    webhook.enabled = v;
                }
                if let Some(v) = wh.url {
                    webhook.url = v;
                }
                if let Some(v) = wh.timeout_ms {
                    webhook.timeout_ms = v.max(0) as u64;
                }
            }
            if let Some(v) = a.cooldown_sec {
                webhook.cooldown_sec = v.max(0) as u64;
            }
        }

        ConfigSnapshot {
            thresholds,
            webhook,
            source_path,
        }
    }
}
