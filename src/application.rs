// src/application.rs
//
// Process wiring: load settings and the stream list, build the shared
// AlertDispatcher and StreamManager, start everything, and hold the pieces
// an embedder would want to reach (logger, manager) for the lifetime of
// the process.

use std::sync::Arc;

use multiscreen_core::config::ConfigSnapshot;
use multiscreen_core::control::{FileStreamListSource, StreamListSource};
use multiscreen_engine::{AlertDispatcher, Logger, StreamManager};

const DEFAULT_SETTINGS_PATH: &str = "settings.json";
const DEFAULT_STREAMS_PATH: &str = "streams.json";
const DEFAULT_LOG_PATH: &str = "multiscreen.log";

pub struct Application {
    pub logger: Arc<Logger>,
    pub manager: Arc<StreamManager>,
}

impl Application {
    /// Read settings + the stream list from disk (missing/malformed files
    /// fall back to defaults, logged rather than treated as fatal), start
    /// every configured worker and the monitor thread.
    pub fn bootstrap() -> Self {
        let logger = Arc::new(Logger::new());
        logger.initialize(DEFAULT_LOG_PATH);

        let (config, load_err) = ConfigSnapshot::load(DEFAULT_SETTINGS_PATH);
        if let Some(err) = load_err {
            logger.warning(format!(
                "settings load from {DEFAULT_SETTINGS_PATH} failed, using defaults: {err}"
            ));
        }

        let alerts = Arc::new(AlertDispatcher::from_config(&config.webhook));
        let manager = Arc::new(StreamManager::new(alerts, config));

        let source = FileStreamListSource::new(DEFAULT_STREAMS_PATH);
        match source.load() {
            Ok(specs) => {
                logger.info(format!("loaded {} stream(s) from {DEFAULT_STREAMS_PATH}", specs.len()));
                manager.load_from_list(&specs);
            }
            Err(err) => {
                logger.warning(format!(
                    "stream list load from {DEFAULT_STREAMS_PATH} failed, starting with no streams: {err}"
                ));
            }
        }

        manager.start_all();
        logger.info("multiscreen started".to_string());

        Self { logger, manager }
    }

    pub fn shutdown(&self) {
        self.manager.stop_all();
        self.logger.info("multiscreen stopped".to_string());
        self.logger.shutdown();
    }
}
