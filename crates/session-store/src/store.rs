//! Filesystem-backed session store.

use crate::{StoreError, WorkflowRun, WorkflowSession};
use dashmap::DashMap;
use model::SessionState;
use parking_lot::Mutex;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Session store rooted at a data directory.
///
/// Layout: `<root>/sessions/<workflow_name>/<session_id>.json`. The
/// scheduler's non-overlap rule makes each key single-writer; the per-key
/// mutex here guards manual CLI runs racing a scheduled one.
pub struct SessionStore {
    root: PathBuf,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl SessionStore {
    /// Store rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: DashMap::new(),
        }
    }

    fn workflow_dir(&self, workflow: &str) -> PathBuf {
        self.root.join("sessions").join(workflow)
    }

    fn session_path(&self, workflow: &str, session_id: &str) -> PathBuf {
        self.workflow_dir(workflow).join(format!("{session_id}.json"))
    }

    fn key_lock(&self, workflow: &str, session_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(format!("{workflow}/{session_id}"))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Append a run and replace the session state in one atomic write.
    pub fn append_run(
        &self,
        workflow: &str,
        session_id: &str,
        run: WorkflowRun,
        new_state: SessionState,
        now_ms: i64,
    ) -> Result<(), StoreError> {
        if run.started_at_ms > run.ended_at_ms {
            return Err(StoreError::InvalidRun(format!(
                "run {} ends before it starts",
                run.run_id
            )));
        }

        let lock = self.key_lock(workflow, session_id);
        let _guard = lock.lock();

        let mut session = self
            .load_session(workflow, session_id)?
            .unwrap_or_else(|| WorkflowSession::new(workflow, session_id, now_ms));

        if let Some(last) = session.runs.last() {
            if run.started_at_ms < last.started_at_ms {
                return Err(StoreError::InvalidRun(format!(
                    "run {} starts before the previous run",
                    run.run_id
                )));
            }
        }

        session.runs.push(run);
        session.session_state = new_state;
        session.updated_at_ms = now_ms;

        self.write_atomic(&self.session_path(workflow, session_id), &session)?;
        debug!(workflow, session_id, runs = session.runs.len(), "run appended");
        Ok(())
    }

    /// Fetch a session (cross-workflow reads use the same call).
    pub fn get_session(
        &self,
        workflow: &str,
        session_id: &str,
    ) -> Result<Option<WorkflowSession>, StoreError> {
        self.load_session(workflow, session_id)
    }

    /// The committed session state for a key, empty when absent.
    pub fn session_state(
        &self,
        workflow: &str,
        session_id: &str,
    ) -> Result<SessionState, StoreError> {
        Ok(self
            .load_session(workflow, session_id)?
            .map(|s| s.session_state)
            .unwrap_or_default())
    }

    /// Last `n` runs for a workflow across sessions, in chronological order.
    pub fn last_runs(&self, workflow: &str, n: usize) -> Result<Vec<WorkflowRun>, StoreError> {
        let mut runs: Vec<WorkflowRun> = Vec::new();
        for session in self.all_sessions(workflow)? {
            runs.extend(session.runs);
        }
        runs.sort_by_key(|r| r.started_at_ms);
        let skip = runs.len().saturating_sub(n);
        Ok(runs.split_off(skip))
    }

    /// Sessions for a workflow whose session_id falls inside the inclusive
    /// date range, ordered by session_id.
    pub fn sessions_between(
        &self,
        workflow: &str,
        from: &str,
        to: &str,
    ) -> Result<Vec<WorkflowSession>, StoreError> {
        Ok(self
            .all_sessions(workflow)?
            .into_iter()
            .filter(|s| s.session_id.as_str() >= from && s.session_id.as_str() <= to)
            .collect())
    }

    fn all_sessions(&self, workflow: &str) -> Result<Vec<WorkflowSession>, StoreError> {
        let dir = self.workflow_dir(workflow);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut ids: Vec<String> = entries
            .filter_map(|entry| {
                let path = entry.ok()?.path();
                if path.extension().is_some_and(|ext| ext == "json") {
                    path.file_stem().map(|s| s.to_string_lossy().into_owned())
                } else {
                    None
                }
            })
            .collect();
        ids.sort();

        let mut sessions = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(session) = self.load_session(workflow, &id)? {
                sessions.push(session);
            }
        }
        Ok(sessions)
    }

    fn load_session(
        &self,
        workflow: &str,
        session_id: &str,
    ) -> Result<Option<WorkflowSession>, StoreError> {
        let path = self.session_path(workflow, session_id);
        let bytes = match fs::read(&path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    fn write_atomic(&self, path: &Path, session: &WorkflowSession) -> Result<(), StoreError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&serde_json::to_vec(session)?)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{RunStatus, StepRecord};
    use model::Artifact;

    fn run(run_id: &str, started_at_ms: i64) -> WorkflowRun {
        WorkflowRun {
            run_id: run_id.into(),
            started_at_ms,
            ended_at_ms: started_at_ms + 100,
            input: "input".into(),
            output: Some(Artifact::Report("done".into())),
            step_outputs: vec![StepRecord {
                name: "only".into(),
                artifact: Artifact::Report("done".into()),
                started_at_ms,
                ended_at_ms: started_at_ms + 100,
            }],
            state_snapshot: SessionState::new(),
            status: RunStatus::Ok,
            error: None,
        }
    }

    fn store() -> (SessionStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        (SessionStore::new(dir.path()), dir)
    }

    #[test]
    fn test_append_and_reload() {
        let (store, _dir) = store();
        let mut state = SessionState::new();
        state.set("note", Artifact::Report("hello".into()));

        store
            .append_run("intraday-analysis", "2025-01-06", run("r1", 1_000), state.clone(), 1_000)
            .unwrap();

        let session = store
            .get_session("intraday-analysis", "2025-01-06")
            .unwrap()
            .unwrap();
        assert_eq!(session.runs.len(), 1);
        assert_eq!(session.session_state, state);
    }

    #[test]
    fn test_state_roundtrip_byte_for_byte() {
        let (store, _dir) = store();
        let mut state = SessionState::new();
        state.set("b", Artifact::Report("two".into()));
        state.set("a", Artifact::Null);

        store
            .append_run("wf", "2025-01-06", run("r1", 1), state, 1)
            .unwrap();

        let first = store.session_state("wf", "2025-01-06").unwrap();
        let first_bytes = serde_json::to_vec(&first).unwrap();

        let second = store.session_state("wf", "2025-01-06").unwrap();
        let second_bytes = serde_json::to_vec(&second).unwrap();
        assert_eq!(first_bytes, second_bytes);
    }

    #[test]
    fn test_last_runs_across_sessions_ascending() {
        let (store, _dir) = store();
        store
            .append_run("wf", "2025-01-06", run("day1", 1_000), SessionState::new(), 1_000)
            .unwrap();
        store
            .append_run("wf", "2025-01-07", run("day2", 2_000), SessionState::new(), 2_000)
            .unwrap();
        store
            .append_run("wf", "2025-01-08", run("day3", 3_000), SessionState::new(), 3_000)
            .unwrap();

        let last_two = store.last_runs("wf", 2).unwrap();
        assert_eq!(last_two.len(), 2);
        assert_eq!(last_two[0].run_id, "day2");
        assert_eq!(last_two[1].run_id, "day3");

        // Later runs always observe earlier runs in their history.
        let all = store.last_runs("wf", 10).unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.windows(2).all(|w| w[0].started_at_ms <= w[1].started_at_ms));
    }

    #[test]
    fn test_sessions_between() {
        let (store, _dir) = store();
        for (day, ts) in [("2025-01-06", 1), ("2025-01-07", 2), ("2025-01-10", 3)] {
            store
                .append_run("wf", day, run(day, ts), SessionState::new(), ts)
                .unwrap();
        }

        let mid = store.sessions_between("wf", "2025-01-06", "2025-01-08").unwrap();
        assert_eq!(mid.len(), 2);
        assert_eq!(mid[0].session_id, "2025-01-06");
        assert_eq!(mid[1].session_id, "2025-01-07");
    }

    #[test]
    fn test_rejects_run_ending_before_start() {
        let (store, _dir) = store();
        let mut bad = run("r1", 1_000);
        bad.ended_at_ms = 500;
        let err = store
            .append_run("wf", "2025-01-06", bad, SessionState::new(), 1_000)
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidRun(_)));
    }

    #[test]
    fn test_stale_temp_file_is_ignored() {
        let (store, _dir) = store();
        store
            .append_run("wf", "2025-01-06", run("r1", 1), SessionState::new(), 1)
            .unwrap();

        // A crash can leave a half-written temp file behind; reads must not
        // pick it up.
        let tmp = store.session_path("wf", "2025-01-06").with_extension("json.tmp");
        fs::write(&tmp, b"{ truncated").unwrap();

        let session = store.get_session("wf", "2025-01-06").unwrap().unwrap();
        assert_eq!(session.runs.len(), 1);
    }

    #[test]
    fn test_cross_workflow_read() {
        let (store, _dir) = store();
        let mut state = SessionState::new();
        state.set("approved_orders", Artifact::ApprovedOrders(vec![]));
        store
            .append_run("intraday-analysis", "2025-01-06", run("r1", 1), state, 1)
            .unwrap();

        // The execution workflow reads the analysis session at the same id.
        let state = store
            .session_state("intraday-analysis", "2025-01-06")
            .unwrap();
        assert!(state.contains("approved_orders"));
        // And an absent session reads as empty, not an error.
        let empty = store.session_state("news-digest", "2025-01-06").unwrap();
        assert!(empty.is_empty());
    }
}
