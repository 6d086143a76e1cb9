//! Durable sled-backed run history.

use std::io;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sled::{Db, Tree};
use uuid::Uuid;

use crate::error::StorageError;
use crate::progress::event::ProgressEvent;
use crate::types::ApplicationId;

const TREE_RUNS: &str = "run_records";
const TREE_EVENTS: &str = "run_events";
const EVENT_KEY_PAD: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Active,
    Completed,
    Failed,
    Interrupted,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Active => "active",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Interrupted => "interrupted",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub application: ApplicationId,
    pub command: String,
    pub policy: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
    pub error: Option<String>,
    pub next_seq: u64,
}

/// One record per orchestration run plus its ordered progress events.
#[derive(Clone)]
pub struct RunHistory {
    db: Db,
    runs: Tree,
    events: Tree,
}

impl RunHistory {
    pub fn new(db: Db) -> Result<Self, StorageError> {
        let runs = db.open_tree(TREE_RUNS).map_err(to_storage_io)?;
        let events = db.open_tree(TREE_EVENTS).map_err(to_storage_io)?;
        Ok(Self { db, runs, events })
    }

    /// Opens a new active run and returns its id.
    pub fn begin(
        &self,
        application: ApplicationId,
        command: &str,
        policy: Option<&str>,
    ) -> Result<String, StorageError> {
        let record = RunRecord {
            run_id: Uuid::new_v4().to_string(),
            application,
            command: command.to_string(),
            policy: policy.map(str::to_string),
            started_at: Utc::now(),
            ended_at: None,
            status: RunStatus::Active,
            error: None,
            next_seq: 1,
        };
        self.put_run(&record)?;
        Ok(record.run_id)
    }

    pub fn finish(&self, run_id: &str, error: Option<String>) -> Result<(), StorageError> {
        let Some(mut record) = self.get_run(run_id)? else {
            return Ok(());
        };
        record.ended_at = Some(Utc::now());
        record.status = if error.is_some() {
            RunStatus::Failed
        } else {
            RunStatus::Completed
        };
        record.error = error;
        self.put_run(&record)?;
        self.flush()
    }

    pub fn put_run(&self, record: &RunRecord) -> Result<(), StorageError> {
        let value = serde_json::to_vec(record).map_err(to_storage_data)?;
        self.runs
            .insert(record.run_id.as_bytes(), value)
            .map_err(to_storage_io)?;
        Ok(())
    }

    pub fn get_run(&self, run_id: &str) -> Result<Option<RunRecord>, StorageError> {
        let Some(raw) = self.runs.get(run_id.as_bytes()).map_err(to_storage_io)? else {
            return Ok(None);
        };
        let parsed = serde_json::from_slice(&raw).map_err(to_storage_data)?;
        Ok(Some(parsed))
    }

    /// Runs, newest first; `application` narrows to one application.
    pub fn list_runs(
        &self,
        application: Option<&ApplicationId>,
    ) -> Result<Vec<RunRecord>, StorageError> {
        let mut out = Vec::new();
        for result in self.runs.iter() {
            let (_, value) = result.map_err(to_storage_io)?;
            let rec: RunRecord = serde_json::from_slice(&value).map_err(to_storage_data)?;
            if application.map_or(true, |app| rec.application == *app) {
                out.push(rec);
            }
        }
        out.sort_by_key(|r| std::cmp::Reverse(r.started_at));
        Ok(out)
    }

    /// Appends an event to a run, assigning the next sequence number.
    pub fn append_event(&self, run_id: &str, event: &ProgressEvent) -> Result<u64, StorageError> {
        let Some(mut record) = self.get_run(run_id)? else {
            return Ok(0);
        };
        let seq = record.next_seq;
        let mut event = event.clone();
        event.seq = seq;
        let value = serde_json::to_vec(&event).map_err(to_storage_data)?;
        self.events
            .insert(encode_event_key(run_id, seq).as_bytes(), value)
            .map_err(to_storage_io)?;
        record.next_seq += 1;
        self.put_run(&record)?;
        Ok(seq)
    }

    pub fn read_events(&self, run_id: &str) -> Result<Vec<ProgressEvent>, StorageError> {
        let prefix = format!("{run_id}:");
        let mut out = Vec::new();
        for result in self.events.scan_prefix(prefix.as_bytes()) {
            let (_, value) = result.map_err(to_storage_io)?;
            let parsed: ProgressEvent = serde_json::from_slice(&value).map_err(to_storage_data)?;
            out.push(parsed);
        }
        out.sort_by_key(|e| e.seq);
        Ok(out)
    }

    /// Marks runs left active by a crashed process as interrupted.
    pub fn mark_interrupted_runs(&self) -> Result<usize, StorageError> {
        let mut changed = 0usize;
        for mut run in self.list_runs(None)? {
            if run.status == RunStatus::Active {
                run.status = RunStatus::Interrupted;
                run.ended_at = Some(Utc::now());
                self.put_run(&run)?;
                changed += 1;
            }
        }
        Ok(changed)
    }

    /// Keeps the newest `max_finished` finished runs, deleting older ones with their events.
    pub fn prune(&self, max_finished: usize) -> Result<usize, StorageError> {
        let finished: Vec<RunRecord> = self
            .list_runs(None)?
            .into_iter()
            .filter(|r| r.status != RunStatus::Active)
            .collect();
        let mut removed = 0usize;
        for run in finished.iter().skip(max_finished) {
            self.delete_run(&run.run_id)?;
            removed += 1;
        }
        Ok(removed)
    }

    pub fn delete_run(&self, run_id: &str) -> Result<(), StorageError> {
        self.runs.remove(run_id.as_bytes()).map_err(to_storage_io)?;
        let prefix = format!("{run_id}:");
        let keys: Vec<Vec<u8>> = self
            .events
            .scan_prefix(prefix.as_bytes())
            .filter_map(|r| r.ok().map(|(k, _)| k.to_vec()))
            .collect();
        for key in keys {
            self.events.remove(key).map_err(to_storage_io)?;
        }
        Ok(())
    }

    pub fn flush(&self) -> Result<(), StorageError> {
        self.db.flush().map_err(to_storage_io)?;
        Ok(())
    }
}

fn encode_event_key(run_id: &str, seq: u64) -> String {
    format!("{run_id}:{seq:0EVENT_KEY_PAD$}")
}

fn to_storage_io(err: sled::Error) -> StorageError {
    StorageError::IoError(io::Error::new(io::ErrorKind::Other, err.to_string()))
}

fn to_storage_data(err: serde_json::Error) -> StorageError {
    StorageError::IoError(io::Error::new(io::ErrorKind::InvalidData, err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::event::{Phase, PhaseFinishedData};
    use crate::types::ExtensionId;
    use tempfile::TempDir;

    fn history() -> (TempDir, RunHistory) {
        let dir = TempDir::new().unwrap();
        let db = sled::open(dir.path()).unwrap();
        (dir, RunHistory::new(db).unwrap())
    }

    #[test]
    fn key_encoding_is_lexicographic() {
        assert!(encode_event_key("r1", 2) < encode_event_key("r1", 10));
    }

    #[test]
    fn events_are_sequenced_per_run() {
        let (_dir, history) = history();
        let app = ExtensionId::new();
        let run = history.begin(app, "start", Some("full-update")).unwrap();

        history
            .append_event(&run, &ProgressEvent::started(app, Phase::Load))
            .unwrap();
        let finished = ProgressEvent::finished(
            app,
            Phase::Load,
            PhaseFinishedData {
                ok: true,
                nodes: 2,
                failed: 0,
                duration_ms: 5,
            },
        );
        assert_eq!(history.append_event(&run, &finished).unwrap(), 2);

        let events = history.read_events(&run).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].seq, 1);
        assert!(events[1].is_finish());
    }

    #[test]
    fn finish_and_interrupt() {
        let (_dir, history) = history();
        let app = ExtensionId::new();
        let done = history.begin(app, "start", None).unwrap();
        let failed = history.begin(app, "start", None).unwrap();
        let dangling = history.begin(app, "start", None).unwrap();

        history.finish(&done, None).unwrap();
        history.finish(&failed, Some("boom".to_string())).unwrap();
        assert_eq!(history.mark_interrupted_runs().unwrap(), 1);

        assert_eq!(history.get_run(&done).unwrap().unwrap().status, RunStatus::Completed);
        assert_eq!(history.get_run(&failed).unwrap().unwrap().status, RunStatus::Failed);
        assert_eq!(
            history.get_run(&dangling).unwrap().unwrap().status,
            RunStatus::Interrupted
        );
        assert!(history.list_runs(Some(&ExtensionId::new())).unwrap().is_empty());
    }

    #[test]
    fn prune_keeps_newest() {
        let (_dir, history) = history();
        let app = ExtensionId::new();
        for _ in 0..4 {
            let run = history.begin(app, "start", None).unwrap();
            history
                .append_event(&run, &ProgressEvent::started(app, Phase::Load))
                .unwrap();
            history.finish(&run, None).unwrap();
        }
        assert_eq!(history.prune(2).unwrap(), 2);
        let remaining = history.list_runs(Some(&app)).unwrap();
        assert_eq!(remaining.len(), 2);
        for run in remaining {
            assert_eq!(history.read_events(&run.run_id).unwrap().len(), 1);
        }
    }
}
