//! Progress sinks.

use crate::progress::event::{Phase, PhaseFinishedData, ProgressEvent};
use crate::progress::store::RunHistory;
use crate::types::ApplicationId;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{info, warn};

pub trait ProgressSink: Send + Sync {
    fn notify_start(&self, application: &ApplicationId, phase: Phase);

    fn notify_finish(&self, application: &ApplicationId, phase: Phase, data: &PhaseFinishedData);
}

/// Logs phase transitions.
#[derive(Debug, Default)]
pub struct TracingProgress;

impl ProgressSink for TracingProgress {
    fn notify_start(&self, application: &ApplicationId, phase: Phase) {
        info!(application = %application, phase = %phase, "Phase started");
    }

    fn notify_finish(&self, application: &ApplicationId, phase: Phase, data: &PhaseFinishedData) {
        if data.ok {
            info!(
                application = %application,
                phase = %phase,
                nodes = data.nodes,
                duration_ms = data.duration_ms as u64,
                "Phase finished"
            );
        } else {
            warn!(
                application = %application,
                phase = %phase,
                nodes = data.nodes,
                failed = data.failed,
                duration_ms = data.duration_ms as u64,
                "Phase finished with failures"
            );
        }
    }
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct RecordingProgress {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().clone()
    }

    /// Phases in the order they were reported, one entry per start and per finish.
    pub fn phases(&self) -> Vec<(Phase, bool)> {
        self.events
            .lock()
            .iter()
            .map(|e| (e.phase, e.is_finish()))
            .collect()
    }

    fn push(&self, mut event: ProgressEvent) {
        let mut events = self.events.lock();
        event.seq = events.len() as u64 + 1;
        events.push(event);
    }
}

impl ProgressSink for RecordingProgress {
    fn notify_start(&self, application: &ApplicationId, phase: Phase) {
        self.push(ProgressEvent::started(*application, phase));
    }

    fn notify_finish(&self, application: &ApplicationId, phase: Phase, data: &PhaseFinishedData) {
        self.push(ProgressEvent::finished(*application, phase, data.clone()));
    }
}

/// Appends events to one run of the durable [`RunHistory`]. Storage failures are logged.
pub struct HistoryProgress {
    history: RunHistory,
    run_id: String,
}

impl HistoryProgress {
    pub fn new(history: RunHistory, run_id: impl Into<String>) -> Self {
        Self {
            history,
            run_id: run_id.into(),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    fn append(&self, event: ProgressEvent) {
        if let Err(err) = self.history.append_event(&self.run_id, &event) {
            warn!(run = %self.run_id, error = %err, "Failed to record progress event");
        }
    }
}

impl ProgressSink for HistoryProgress {
    fn notify_start(&self, application: &ApplicationId, phase: Phase) {
        self.append(ProgressEvent::started(*application, phase));
    }

    fn notify_finish(&self, application: &ApplicationId, phase: Phase, data: &PhaseFinishedData) {
        self.append(ProgressEvent::finished(*application, phase, data.clone()));
    }
}

/// Forwards every notification to each inner sink.
#[derive(Default)]
pub struct FanoutProgress {
    sinks: Vec<Arc<dyn ProgressSink>>,
}

impl FanoutProgress {
    pub fn new(sinks: Vec<Arc<dyn ProgressSink>>) -> Self {
        Self { sinks }
    }

    pub fn push(&mut self, sink: Arc<dyn ProgressSink>) {
        self.sinks.push(sink);
    }
}

impl ProgressSink for FanoutProgress {
    fn notify_start(&self, application: &ApplicationId, phase: Phase) {
        for sink in &self.sinks {
            sink.notify_start(application, phase);
        }
    }

    fn notify_finish(&self, application: &ApplicationId, phase: Phase, data: &PhaseFinishedData) {
        for sink in &self.sinks {
            sink.notify_finish(application, phase, data);
        }
    }
}
