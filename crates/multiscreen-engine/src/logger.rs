// crates/multiscreen-engine/src/logger.rs
//
// A reentrant-safe, try-lock-or-drop logger: every write attempt either
// acquires the lock immediately or gives up, so a log call made while the
// same thread already holds the lock (or another thread is mid-write) never
// blocks or deadlocks the caller.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

const MAX_RECENT: usize = 1000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    fn as_str(self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARN",
            LogLevel::Error => "ERROR",
        }
    }
}

#[derive(Clone, Debug)]
pub struct LogEntry {
    pub ts_ms: u128,
    pub level: LogLevel,
    pub message: String,
}

struct Inner {
    file: Option<std::fs::File>,
    recent: VecDeque<LogEntry>,
}

/// Process-lifetime logging singleton. Every write is a non-blocking
/// attempt; on contention the line is silently dropped rather than
/// blocking the caller.
pub struct Logger {
    inner: Mutex<Inner>,
}

impl Default for Logger {
    fn default() -> Self {
        Self::new()
    }
}

impl Logger {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                file: None,
                recent: VecDeque::new(),
            }),
        }
    }

    /// Open (append) a log file. Failure is swallowed — logging to a file
    /// is best-effort, never fatal.
    pub fn initialize(&self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        if let Some(mut guard) = self.inner.try_lock() {
            if let Ok(file) = OpenOptions::new().create(true).append(true).open(path) {
                guard.file = Some(file);
            }
        }
    }

    pub fn shutdown(&self) {
        if let Some(mut guard) = self.inner.try_lock() {
            guard.file = None;
        }
    }

    /// Non-blocking log attempt. On lock contention, silently drops the
    /// message — never blocks.
    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        let Some(mut guard) = self.inner.try_lock() else {
            return;
        };
        let ts_ms = now_ms();
        let message = message.into();

        if let Some(file) = guard.file.as_mut() {
            let _ = writeln!(file, "{} [{}] {}", ts_ms, level.as_str(), message);
        }

        guard.recent.push_back(LogEntry {
            ts_ms,
            level,
            message,
        });
        if guard.recent.len() > MAX_RECENT {
            guard.recent.pop_front();
        }
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.log(LogLevel::Debug, message);
    }
    pub fn info(&self, message: impl Into<String>) {
        self.log(LogLevel::Info, message);
    }
    pub fn warning(&self, message: impl Into<String>) {
        self.log(LogLevel::Warning, message);
    }
    pub fn error(&self, message: impl Into<String>) {
        self.log(LogLevel::Error, message);
    }

    /// Most recent `count` entries, newest first. Returns empty on
    /// contention rather than blocking.
    pub fn recent(&self, count: usize) -> Vec<LogEntry> {
        let Some(guard) = self.inner.try_lock() else {
            return Vec::new();
        };
        guard.recent.iter().rev().take(count).cloned().collect()
    }
}

fn now_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logs_are_retained_in_recent_order() {
        let logger = Logger::new();
        logger.info("first");
        logger.warning("second");
        let recent = logger.recent(10);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].message, "second");
        assert_eq!(recent[1].message, "first");
    }

    #[test]
    fn contended_lock_drops_silently_instead_of_blocking() {
        let logger = Logger::new();
        let guard = logger.inner.try_lock().unwrap();
        // logger.log() must not block here even though the lock is held.
        logger.log(LogLevel::Error, "dropped");
        drop(guard);
        assert!(logger.recent(10).is_empty());
    }

    #[test]
    fn recent_entries_are_bounded() {
        let logger = Logger::new();
        for i in 0..(MAX_RECENT + 10) {
            logger.info(format!("msg {i}"));
        }
        assert_eq!(logger.recent(usize::MAX).len(), MAX_RECENT);
    }
}
