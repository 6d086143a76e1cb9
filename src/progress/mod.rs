//! Progress observability for orchestration runs.
//!
//! Sinks are told when each phase of a run starts and finishes. They are purely observational:
//! nothing a sink does can affect the run.

pub mod event;
pub mod sink;
pub mod store;

pub use event::{Phase, PhaseFinishedData, ProgressEvent};
pub use sink::{FanoutProgress, HistoryProgress, ProgressSink, RecordingProgress, TracingProgress};
pub use store::{RunHistory, RunRecord, RunStatus};
