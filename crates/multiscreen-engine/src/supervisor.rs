// crates/multiscreen-engine/src/supervisor.rs
//
// StreamManager: registry of StreamWorkers plus a periodic monitor tick
// that derives ok/warn/crit status from each worker's stats and fires a
// throttled webhook on transition. One registry mutex; never held across a
// worker call that can block.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use multiscreen_core::config::{ConfigSnapshot, Thresholds};
use multiscreen_core::stats::{StreamSpec, StreamStats};

use crate::alerts::AlertDispatcher;
use crate::worker::StreamWorker;

const MONITOR_TICK: Duration = Duration::from_millis(300);
const KBPS_HISTORY_CAP: usize = 60;

/// The threshold cascade from spec.md §4.5: crit beats warn beats ok, each
/// checked across fps-ratio, bitrate, and stall independently. Pure and
/// unit-testable on its own, with no dependency on a live worker or clock.
fn derive_status(ratio: f64, bitrate_kbps: i64, stall_ms: i64, th: &Thresholds) -> &'static str {
    if ratio <= th.fps.crit_ratio || bitrate_kbps <= th.bitrate.crit_kbps || stall_ms >= th.stall.crit_ms {
        "crit"
    } else if ratio <= th.fps.warn_ratio || bitrate_kbps <= th.bitrate.warn_kbps || stall_ms >= th.stall.warn_ms
    {
        "warn"
    } else {
        "ok"
    }
}

/// Per-stream supervisor-owned debounce state (never touched by the worker
/// thread itself).
#[derive(Clone, Debug, Default)]
struct WatchdogState {
    last_status: String,
    kbps_history: Vec<i64>,
    low_decode_consecutive: i64,
}

struct Registry {
    workers: HashMap<String, Arc<StreamWorker>>,
    watchdogs: HashMap<String, WatchdogState>,
}

/// Multi-stream registry + lifecycle + monitor tick. Construct one instance
/// with a shared `AlertDispatcher` and `ConfigSnapshot`; `start_all` spawns
/// the monitor thread the first time it's called.
pub struct StreamManager {
    registry: Mutex<Registry>,
    monitor_run: Arc<AtomicBool>,
    monitor_handle: Mutex<Option<JoinHandle<()>>>,
    alerts: Arc<AlertDispatcher>,
    config: Mutex<ConfigSnapshot>,
}

impl StreamManager {
    pub fn new(alerts: Arc<AlertDispatcher>, config: ConfigSnapshot) -> Self {
        Self {
            registry: Mutex::new(Registry {
                workers: HashMap::new(),
                watchdogs: HashMap::new(),
            }),
            monitor_run: Arc::new(AtomicBool::new(false)),
            monitor_handle: Mutex::new(None),
            alerts,
            config: Mutex::new(config),
        }
    }

    pub fn set_config(&self, config: ConfigSnapshot) {
        *self.config.lock().unwrap() = config;
    }

    pub fn size(&self) -> usize {
        self.registry.lock().unwrap().workers.len()
    }

    /// Add (or replace, if `name` already exists) a stream and start it
    /// immediately.
    pub fn add_stream(&self, name: &str, url: &str) {
        let worker = Arc::new(StreamWorker::new(name, url));
        let mut reg = self.registry.lock().unwrap();
        if let Some(old) = reg.workers.remove(name) {
            drop(reg);
            old.stop();
            reg = self.registry.lock().unwrap();
        }
        reg.workers.insert(name.to_string(), Arc::clone(&worker));
        reg.watchdogs.insert(
            name.to_string(),
            WatchdogState {
                last_status: "ok".to_string(),
                ..Default::default()
            },
        );
        drop(reg);
        worker.start();
    }

    pub fn remove_stream(&self, name: &str) -> bool {
        let worker = {
            let mut reg = self.registry.lock().unwrap();
            reg.watchdogs.remove(name);
            reg.workers.remove(name)
        };
        match worker {
            Some(w) => {
                w.stop();
                true
            }
            None => false,
        }
    }

    pub fn start_stream(&self, name: &str) -> bool {
        let worker = self.registry.lock().unwrap().workers.get(name).cloned();
        match worker {
            Some(w) => {
                w.start();
                true
            }
            None => false,
        }
    }

    pub fn stop_stream(&self, name: &str) -> bool {
        let worker = self.registry.lock().unwrap().workers.get(name).cloned();
        match worker {
            Some(w) => {
                w.stop();
                true
            }
            None => false,
        }
    }

    pub fn restart_stream(&self, name: &str) -> bool {
        let worker = self.registry.lock().unwrap().workers.get(name).cloned();
        match worker {
            Some(w) => {
                w.stop();
                w.start();
                true
            }
            None => false,
        }
    }

    /// Start every registered worker, then start the monitor thread if it
    /// isn't already running.
    pub fn start_all(self: &Arc<Self>) {
        {
            let reg = self.registry.lock().unwrap();
            for w in reg.workers.values() {
                w.start();
            }
        }
        if self.monitor_run.swap(true, Ordering::SeqCst) {
            return;
        }
        let manager = Arc::clone(self);
        let jh = thread::spawn(move || manager.monitor_loop());
        *self.monitor_handle.lock().unwrap() = Some(jh);
    }

    /// Signal the monitor to exit, join it, then stop every worker.
    pub fn stop_all(&self) {
        self.monitor_run.store(false, Ordering::SeqCst);
        if let Some(jh) = self.monitor_handle.lock().unwrap().take() {
            let _ = jh.join();
        }
        let reg = self.registry.lock().unwrap();
        for w in reg.workers.values() {
            w.stop();
        }
    }

    /// Replace the registry wholesale: stop and drop every existing worker,
    /// then create one per entry in `items`.
    pub fn load_from_list(&self, items: &[StreamSpec]) {
        let old_workers: Vec<Arc<StreamWorker>> = {
            let mut reg = self.registry.lock().unwrap();
            let old: Vec<_> = reg.workers.values().cloned().collect();
            reg.workers.clear();
            reg.watchdogs.clear();
            old
        };
        for w in old_workers {
            w.stop();
        }

        let mut reg = self.registry.lock().unwrap();
        for spec in items {
            let worker = Arc::new(StreamWorker::new(spec.name.clone(), spec.url.clone()));
            reg.workers.insert(spec.name.clone(), worker);
            reg.watchdogs.insert(
                spec.name.clone(),
                WatchdogState {
                    last_status: "ok".to_string(),
                    ..Default::default()
                },
            );
        }
    }

    /// Parse a streams config file (array of `{name,url}`, or
    /// `{"streams": [...]}`) and replace the registry. Entries with an
    /// empty name or url are skipped.
    pub fn load_config(&self, body: &str) -> anyhow::Result<()> {
        let value: serde_json::Value = serde_json::from_str(body)?;
        let entries = match &value {
            serde_json::Value::Array(arr) => arr.clone(),
            serde_json::Value::Object(obj) => obj
                .get("streams")
                .and_then(|v| v.as_array())
                .cloned()
                .unwrap_or_default(),
            _ => Vec::new(),
        };

        let items: Vec<StreamSpec> = entries
            .iter()
            .filter_map(|e| {
                let name = e.get("name")?.as_str()?.to_string();
                let url = e.get("url")?.as_str()?.to_string();
                if name.is_empty() || url.is_empty() {
                    None
                } else {
                    Some(StreamSpec::new(name, url))
                }
            })
            .collect();

        self.load_from_list(&items);
        Ok(())
    }

    /// Snapshot every worker's stats, overlaying the current watchdog
    /// status.
    pub fn get_all_stats(&self) -> Vec<StreamStats> {
        let reg = self.registry.lock().unwrap();
        reg.workers
            .values()
            .map(|w| {
                let mut st = w.stats();
                if let Some(wd) = reg.watchdogs.get(w.name()) {
                    st.status = wd.last_status.clone();
                }
                st
            })
            .collect()
    }

    fn monitor_loop(&self) {
        while self.monitor_run.load(Ordering::SeqCst) {
            self.tick();
            thread::sleep(MONITOR_TICK);
        }
    }

    /// One monitor tick: snapshot every worker's stats (lock released before
    /// computing), then evaluate each independently.
    fn tick(&self) {
        let snapshot: Vec<(String, StreamStats)> = {
            let reg = self.registry.lock().unwrap();
            reg.workers
                .iter()
                .map(|(name, w)| (name.clone(), w.stats()))
                .collect()
        };

        let cfg = self.config.lock().unwrap().clone();

        for (name, st) in snapshot {
            self.evaluate_and_maybe_alert(&name, &st, &cfg);
        }
    }

    /// Derive status for one stream's stats, update its watchdog state, and
    /// fire a `stream_status` webhook iff this call crossed a transition
    /// edge. Returns whether it dispatched, so tests can feed the same
    /// stats across repeated calls and assert the alert only fires once per
    /// transition, not once per call.
    fn evaluate_and_maybe_alert(&self, name: &str, st: &StreamStats, cfg: &ConfigSnapshot) -> bool {
        let input_fps = st.input_fps.max(0.0);
        let decode_fps = st.decode_fps.max(0.0);
        let bitrate = st.bitrate_kbps.max(0);
        let stall_ms = 0i64; // not wired: see DESIGN.md open-question decision

        let ratio = if input_fps > 0.0001 {
            decode_fps / input_fps
        } else {
            1.0
        };

        let status = derive_status(ratio, bitrate, stall_ms, &cfg.thresholds);

        let transitioned = {
            let mut reg = self.registry.lock().unwrap();
            let wd = reg.watchdogs.entry(name.to_string()).or_default();
            wd.kbps_history.push(bitrate);
            if wd.kbps_history.len() > KBPS_HISTORY_CAP {
                wd.kbps_history.remove(0);
            }
            if status == "crit" {
                wd.low_decode_consecutive += 1;
            } else {
                wd.low_decode_consecutive = 0;
            }

            let changed = wd.last_status != status;
            if changed {
                wd.last_status = status.to_string();
            }
            changed
        };

        if transitioned {
            self.alerts.send_status_transition(
                name,
                &st.service_name,
                status,
                input_fps,
                decode_fps,
                bitrate,
                stall_ms,
            );
        }

        transitioned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> Arc<StreamManager> {
        let alerts = Arc::new(AlertDispatcher::new(false, "", 2000, 60));
        Arc::new(StreamManager::new(alerts, ConfigSnapshot::default()))
    }

    #[test]
    fn add_then_remove_leaves_registry_empty() {
        let m = manager();
        m.add_stream("A", "url://bad");
        assert_eq!(m.size(), 1);
        assert!(m.remove_stream("A"));
        assert_eq!(m.size(), 0);
    }

    #[test]
    fn remove_missing_stream_returns_false() {
        let m = manager();
        assert!(!m.remove_stream("nope"));
    }

    #[test]
    fn load_from_list_produces_matching_entries() {
        let m = manager();
        m.load_from_list(&[StreamSpec::new("A", "url://a"), StreamSpec::new("B", "url://b")]);
        let stats = m.get_all_stats();
        assert_eq!(stats.len(), 2);
        let mut names: Vec<_> = stats.iter().map(|s| s.name.clone()).collect();
        names.sort();
        assert_eq!(names, vec!["A".to_string(), "B".to_string()]);
        m.stop_all();
    }

    #[test]
    fn load_config_skips_entries_with_empty_name_or_url() {
        let m = manager();
        let body = r#"{"streams":[{"name":"A","url":"url://a"},{"name":"","url":"url://x"},{"name":"B","url":""}]}"#;
        m.load_config(body).unwrap();
        assert_eq!(m.size(), 1);
    }

    #[test]
    fn start_stop_all_is_idempotent_and_leaves_no_worker_running() {
        let m = manager();
        m.add_stream("A", "url://bad");
        m.start_all();
        m.start_all(); // second call must not spawn a second monitor thread
        std::thread::sleep(std::time::Duration::from_millis(50));
        m.stop_all();
        for st in m.get_all_stats() {
            assert!(!st.running);
        }
    }

    // spec.md §8 scenario 4: input_fps=30, decode_fps=10, bitrate_kbps=2000,
    // fps_warn_ratio=0.75, fps_crit_ratio=0.50 -> ratio=0.333 -> "crit".
    #[test]
    fn derive_status_reproduces_scenario_4() {
        let th = Thresholds::default();
        let ratio = 10.0_f64 / 30.0;
        assert_eq!(derive_status(ratio, 2000, 0, &th), "crit");
    }

    #[test]
    fn derive_status_cascades_crit_over_warn_over_ok() {
        let th = Thresholds::default(); // fps warn=0.75 crit=0.50, bitrate warn=1500 crit=500
        assert_eq!(derive_status(1.0, 5000, 0, &th), "ok");
        assert_eq!(derive_status(0.6, 5000, 0, &th), "warn"); // <= warn_ratio, > crit_ratio
        assert_eq!(derive_status(0.4, 5000, 0, &th), "crit"); // <= crit_ratio
        // bitrate alone can also trip each band, independent of fps ratio
        assert_eq!(derive_status(1.0, 1000, 0, &th), "warn"); // <= bitrate.warn_kbps
        assert_eq!(derive_status(1.0, 400, 0, &th), "crit"); // <= bitrate.crit_kbps
        // stall alone too
        assert_eq!(derive_status(1.0, 5000, 1000, &th), "warn"); // >= stall.warn_ms
        assert_eq!(derive_status(1.0, 5000, 3000, &th), "crit"); // >= stall.crit_ms
    }

    // Universal invariant (spec.md §8): a status transition produces exactly
    // one webhook event per transition, not per tick.
    #[test]
    fn identical_stats_across_two_ticks_dispatch_exactly_once() {
        let alerts = Arc::new(AlertDispatcher::new(true, "http://127.0.0.1:1", 50, 60));
        let m = Arc::new(StreamManager::new(Arc::clone(&alerts), ConfigSnapshot::default()));
        m.add_stream("A", "url://bad");

        let mut st = StreamStats::new("A", "url://bad");
        st.input_fps = 30.0;
        st.decode_fps = 10.0;
        st.bitrate_kbps = 2000;
        let cfg = ConfigSnapshot::default();

        // first tick: "ok" (the initial watchdog state) -> "crit" transition
        assert!(m.evaluate_and_maybe_alert("A", &st, &cfg));
        assert_eq!(alerts.sent_count(), 1);

        // second tick, same stats: still "crit", no transition, no re-send
        assert!(!m.evaluate_and_maybe_alert("A", &st, &cfg));
        assert_eq!(alerts.sent_count(), 1);

        m.stop_all();
    }
}
