// crates/multiscreen-engine/src/alerts.rs
//
// Thread-safe, cooldown-gated webhook POST dispatcher, expressed as an
// explicit handle rather than a function-local static singleton, using
// `ureq` for synchronous, single-shot HTTP calls.

use multiscreen_core::stats::Severity;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// `(title, severity)` — the alert cooldown key.
type AlertKey = (String, Severity);

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Global, thread-safe alert cooldown ledger + outbound webhook sender.
/// Construct one instance at process start and hand a `&AlertDispatcher` (or
/// `Arc<AlertDispatcher>`) to the supervisor and to any `MetricsAggregator`
/// users.
pub struct AlertDispatcher {
    enabled: bool,
    url: String,
    timeout_ms: u64,
    cooldown_sec: u64,
    /// -1 = unset; overrides `cooldown_sec` for all keys when >= 0.
    cooldown_override_sec: AtomicI64,
    last_sent_ms: Mutex<HashMap<AlertKey, i64>>,
    /// Count of attempted outbound POSTs (either payload shape), regardless
    /// of whether the send succeeded. Test-only observability: lets a test
    /// assert "at most one HTTP POST" without standing up a fake receiver.
    sent_count: AtomicU64,
}

impl AlertDispatcher {
    pub fn new(enabled: bool, url: impl Into<String>, timeout_ms: u64, cooldown_sec: u64) -> Self {
        Self {
            enabled,
            url: url.into(),
            timeout_ms,
            cooldown_sec,
            cooldown_override_sec: AtomicI64::new(-1),
            last_sent_ms: Mutex::new(HashMap::new()),
            sent_count: AtomicU64::new(0),
        }
    }

    /// Number of outbound POST attempts made so far, success or failure.
    pub fn sent_count(&self) -> u64 {
        self.sent_count.load(Ordering::Relaxed)
    }

    pub fn from_config(cfg: &multiscreen_core::config::WebhookConfig) -> Self {
        Self::new(cfg.enabled, cfg.url.clone(), cfg.timeout_ms, cfg.cooldown_sec)
    }

    /// Debug/test-only override; `-1` restores the configured cooldown.
    pub fn set_cooldown_override(&self, seconds: i64) {
        self.cooldown_override_sec.store(seconds, Ordering::SeqCst);
    }

    fn effective_cooldown_ms(&self) -> i64 {
        let over = self.cooldown_override_sec.load(Ordering::SeqCst);
        if over >= 0 {
            over * 1000
        } else {
            self.cooldown_sec as i64 * 1000
        }
    }

    /// Send an alert, subject to per-(title,severity) cooldown. Returns
    /// `true` if dispatched OR suppressed by cooldown/disabled-webhook
    /// (both non-errors); `false` only on a hard send failure.
    pub fn send(&self, title: &str, message: &str, severity: Severity) -> bool {
        self.send_at(title, message, severity, now_ms())
    }

    /// Same as `send`, with an explicit "now" for deterministic tests.
    pub fn send_at(&self, title: &str, message: &str, severity: Severity, now_ms: i64) -> bool {
        if !self.enabled || self.url.is_empty() {
            return true;
        }

        let key = (title.to_string(), severity);
        let cooldown_ms = self.effective_cooldown_ms();
        {
            let mut ledger = self.last_sent_ms.lock();
            if let Some(&last) = ledger.get(&key) {
                if now_ms - last < cooldown_ms {
                    return true; // suppressed, not an error
                }
            }
            ledger.insert(key, now_ms);
        }

        let body = serde_json::json!({
            "title": title,
            "message": message,
            "severity": severity.as_str(),
            "source": "MultiScreenSystem",
        });
        self.dispatch(body)
    }

    /// Attempt a single-shot POST of `body`. Counts the attempt regardless
    /// of outcome, so callers/tests can verify "at most one HTTP POST" per
    /// cooldown window without a real receiver.
    fn dispatch(&self, body: serde_json::Value) -> bool {
        self.sent_count.fetch_add(1, Ordering::Relaxed);

        let timeout = std::time::Duration::from_millis(if self.timeout_ms > 0 {
            self.timeout_ms
        } else {
            2000
        });

        let agent = ureq::AgentBuilder::new()
            .timeout_connect(timeout)
            .timeout_read(timeout)
            .timeout_write(timeout)
            .build();

        match agent
            .post(&self.url)
            .set("Content-Type", "application/json")
            .send_string(&body.to_string())
        {
            Ok(resp) => (200..300).contains(&resp.status()),
            Err(ureq::Error::Status(status, _)) => (200..300).contains(&status),
            Err(_) => false,
        }
    }

    /// Send the alternate `stream_status` transition payload, used by the
    /// supervisor's monitor tick rather than `send`.
    pub fn send_status_transition(
        &self,
        channel: &str,
        service: &str,
        status: &str,
        input_fps: f64,
        decode_fps: f64,
        bitrate_kbps: i64,
        stall_ms: i64,
    ) -> bool {
        if !self.enabled || self.url.is_empty() {
            return true;
        }

        let fps_ratio = if input_fps > 0.0 {
            decode_fps / input_fps
        } else {
            1.0
        };

        let body = serde_json::json!({
            "event": "stream_status",
            "channel": channel,
            "service": service,
            "status": status,
            "metrics": {
                "input_fps": input_fps,
                "decode_fps": decode_fps,
                "fps_ratio": fps_ratio,
                "bitrate_kbps": bitrate_kbps,
                "stall_ms": stall_ms,
            },
            "ts": now_ms(),
        });
        self.dispatch(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_webhook_is_a_noop_success() {
        let d = AlertDispatcher::new(false, "", 2000, 60);
        assert!(d.send("X", "m", Severity::Warning));
    }

    #[test]
    fn empty_url_is_a_noop_success() {
        let d = AlertDispatcher::new(true, "", 2000, 60);
        assert!(d.send("X", "m", Severity::Warning));
    }

    #[test]
    fn second_alert_within_cooldown_is_suppressed() {
        // webhook pointed at an address nothing listens on so `post` fails
        // — the first call still attempts the POST and reports the hard
        // failure, but the ledger entry is set regardless of that outcome.
        let d = AlertDispatcher::new(true, "http://127.0.0.1:1", 100, 60);
        d.set_cooldown_override(2);

        let _ = d.send_at("X", "m", Severity::Warning, 0); // attempted POST, ledger set either way
        // second call within cooldown should short-circuit to true without
        // attempting another POST, regardless of the first POST's outcome.
        assert!(d.send_at("X", "m", Severity::Warning, 1_000));
        assert_eq!(d.sent_count(), 1);
    }

    // spec.md §8 scenario 3: cooldown=2s. t=0 -> POST; t=1000ms -> suppressed;
    // t=2500ms -> past the cooldown window, the ledger entry is eligible for
    // replacement and a second POST is attempted. Exactly 2 network requests.
    #[test]
    fn cooldown_expiry_makes_the_ledger_entry_eligible_for_replacement() {
        let d = AlertDispatcher::new(true, "http://127.0.0.1:1", 100, 60);
        d.set_cooldown_override(2);

        assert!(d.send_at("X", "m", Severity::Warning, 0));
        assert_eq!(d.sent_count(), 1);

        assert!(d.send_at("X", "m", Severity::Warning, 1_000));
        assert_eq!(d.sent_count(), 1); // still within the 2s cooldown: suppressed

        assert!(d.send_at("X", "m", Severity::Warning, 2_500));
        assert_eq!(d.sent_count(), 2); // past cooldown: ledger entry replaced, POST re-attempted
    }

    #[test]
    fn cooldown_override_of_negative_one_restores_configured_value() {
        let d = AlertDispatcher::new(true, "", 2000, 42);
        d.set_cooldown_override(5);
        assert_eq!(d.effective_cooldown_ms(), 5000);
        d.set_cooldown_override(-1);
        assert_eq!(d.effective_cooldown_ms(), 42_000);
    }
}
