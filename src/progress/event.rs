//! Event schema for run progress.

use crate::types::ApplicationId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Reconcile,
    Load,
    Launch,
    Stop,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Reconcile => "reconcile",
            Phase::Load => "load",
            Phase::Launch => "launch",
            Phase::Stop => "stop",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub ts: DateTime<Utc>,
    pub application: ApplicationId,
    pub seq: u64,
    #[serde(rename = "type")]
    pub event_type: String,
    pub phase: Phase,
    pub data: Value,
}

impl ProgressEvent {
    pub fn started(application: ApplicationId, phase: Phase) -> Self {
        Self {
            ts: Utc::now(),
            application,
            seq: 0,
            event_type: "phase_started".to_string(),
            phase,
            data: Value::Null,
        }
    }

    pub fn finished(application: ApplicationId, phase: Phase, data: PhaseFinishedData) -> Self {
        Self {
            ts: Utc::now(),
            application,
            seq: 0,
            event_type: "phase_finished".to_string(),
            phase,
            data: serde_json::to_value(data).unwrap_or(Value::Null),
        }
    }

    pub fn is_finish(&self) -> bool {
        self.event_type == "phase_finished"
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseFinishedData {
    pub ok: bool,
    pub nodes: usize,
    pub failed: usize,
    pub duration_ms: u128,
}
