// crates/multiscreen-engine/src/lib.rs

pub mod alerts;
pub mod continuity;
pub mod logger;
pub mod metrics;
pub mod supervisor;
pub mod ts;
pub mod windowed;
pub mod worker;

pub use alerts::AlertDispatcher;
pub use continuity::ContinuityTracker;
pub use logger::{LogEntry, LogLevel, Logger};
pub use metrics::MetricsAggregator;
pub use supervisor::StreamManager;
pub use ts::{parse_ts_header, TsHeader};
pub use windowed::{BitrateAccumulator, DecodeFpsSampler, FrameTimeWindow};
pub use worker::StreamWorker;
