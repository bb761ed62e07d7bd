//! Pure data types shared between the ingest engine and its callers.
//!
//! Nothing in this crate spawns a thread, opens a socket, or touches
//! ffmpeg — that all lives in `multiscreen-engine`. Keeping the stats and
//! config shapes here lets an external HTTP control surface depend on them
//! without pulling in the worker machinery.

pub mod config;
pub mod control;
pub mod stats;

pub use config::{ConfigSnapshot, Thresholds, WebhookConfig};
pub use control::{ConfigPersistence, FileConfigPersistence, FileStreamListSource, StreamListSource};
pub use stats::{Severity, StreamSpec, StreamStats, StreamStatus};
