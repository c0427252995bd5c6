use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::fs;

use autoloop_core::{ResourceUsage, SessionState};
use autoloop_types::{Envelope, SessionId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointKind {
    Manual,
    PreOperation,
    Vcs,
}

/// An operation-level checkpoint: a snapshot of session metadata plus
/// the set of files changed since the previous checkpoint, and,
/// for `CheckpointKind::Vcs`, a commit handle to restore to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: String,
    pub session_id: SessionId,
    pub kind: CheckpointKind,
    pub reason: String,
    pub session_snapshot: Value,
    pub changed_files: Vec<String>,
    pub commit: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Bookkeeping wrapper around a [`SessionCheckpoint`], §3's nested
/// `metadata { schema_version, created_at, last_modified_at, interrupt_reason }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionCheckpointMetadata {
    pub schema_version: u32,
    pub created_at: DateTime<Utc>,
    pub last_modified_at: DateTime<Utc>,
    pub interrupt_reason: Option<String>,
}

/// A whole-session recovery record, persisted as one file per session
/// so a crashed process can resume, §4.6.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionCheckpoint {
    pub session_id: SessionId,
    pub timestamp: DateTime<Utc>,
    pub state: SessionState,
    pub iteration: u32,
    pub pending_tasks: Vec<String>,
    pub completed_requirement_ids: Vec<String>,
    pub recent_error_messages: Vec<String>,
    pub resource_usage: ResourceUsage,
    pub working_directory: PathBuf,
    pub original_request: String,
    pub agent: Option<String>,
    pub metadata: SessionCheckpointMetadata,
}

impl SessionCheckpoint {
    /// Recoverable iff `state` is none of COMPLETED/FAILED/TERMINATED,
    /// the checkpoint is no older than `max_age`, and its working
    /// directory still exists. The directory test is existence only,
    /// not identity with the original session's directory — recorded
    /// in DESIGN.md.
    pub fn is_recoverable(&self, max_age: chrono::Duration) -> bool {
        !matches!(self.state, SessionState::Completed | SessionState::Failed | SessionState::Terminated)
            && self.working_directory.exists()
            && (Utc::now() - self.timestamp) <= max_age
    }
}

/// Writes through a temp-file-then-rename so a crash mid-write never
/// leaves a half-written checkpoint on disk.
pub async fn atomic_write(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, contents).await?;
    fs::rename(&tmp_path, path).await?;
    Ok(())
}

/// Persists [`Checkpoint`]s under `{dataDir}/checkpoints/{session}/` as
/// zero-padded sequence-numbered files, so "latest" is a lexicographic
/// filename scan with no extra index.
pub struct CheckpointStore {
    data_dir: PathBuf,
}

impl CheckpointStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    fn session_dir(&self, session_id: &SessionId) -> PathBuf {
        self.data_dir.join("checkpoints").join(session_id.as_str())
    }

    pub async fn create(
        &self,
        session_id: &SessionId,
        kind: CheckpointKind,
        reason: impl Into<String>,
        session_snapshot: Value,
        changed_files: Vec<String>,
        commit: Option<String>,
    ) -> anyhow::Result<Checkpoint> {
        let sequence = self.next_sequence(session_id).await?;
        let checkpoint = Checkpoint {
            id: format!("{:08}", sequence),
            session_id: session_id.clone(),
            kind,
            reason: reason.into(),
            session_snapshot,
            changed_files,
            commit,
            created_at: Utc::now(),
        };

        let path = self.session_dir(session_id).join(format!("{}.json", checkpoint.id));
        let envelope = Envelope::new(checkpoint.clone());
        let bytes = serde_json::to_vec_pretty(&envelope)?;
        atomic_write(&path, &bytes).await?;

        Ok(checkpoint)
    }

    async fn next_sequence(&self, session_id: &SessionId) -> anyhow::Result<u64> {
        let dir = self.session_dir(session_id);
        if !dir.exists() {
            return Ok(0);
        }
        let mut entries = fs::read_dir(&dir).await?;
        let mut max_seen: i64 = -1;
        while let Some(entry) = entries.next_entry().await? {
            if let Some(name) = entry.file_name().to_str() {
                if let Some(stem) = name.strip_suffix(".json") {
                    if let Ok(n) = stem.parse::<i64>() {
                        max_seen = max_seen.max(n);
                    }
                }
            }
        }
        Ok((max_seen + 1) as u64)
    }

    /// Returns the most recent checkpoint, i.e. the highest sequence
    /// number, via a lexicographic filename scan.
    pub async fn latest(&self, session_id: &SessionId) -> anyhow::Result<Option<Checkpoint>> {
        let dir = self.session_dir(session_id);
        if !dir.exists() {
            return Ok(None);
        }
        let mut names = Vec::new();
        let mut entries = fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if let Some(name) = entry.file_name().to_str() {
                if name.ends_with(".json") {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        let Some(last) = names.last() else {
            return Ok(None);
        };
        let bytes = fs::read(dir.join(last)).await?;
        let envelope: Envelope<Checkpoint> = serde_json::from_slice(&bytes)?;
        Ok(Some(envelope.payload))
    }
}

/// Persists [`SessionCheckpoint`]s as one JSON file per session id under
/// `{dataDir}/session_checkpoints/`, §4.6.
pub struct SessionCheckpointStore {
    data_dir: PathBuf,
}

impl SessionCheckpointStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self { data_dir: data_dir.into() }
    }

    fn dir(&self) -> PathBuf {
        self.data_dir.join("session_checkpoints")
    }

    fn path(&self, session_id: &SessionId) -> PathBuf {
        self.dir().join(format!("{}.json", session_id.as_str()))
    }

    pub async fn save(&self, checkpoint: &SessionCheckpoint) -> anyhow::Result<()> {
        let envelope = Envelope::new(checkpoint.clone());
        let bytes = serde_json::to_vec_pretty(&envelope)?;
        atomic_write(&self.path(&checkpoint.session_id), &bytes).await?;
        Ok(())
    }

    pub async fn load(&self, session_id: &SessionId) -> anyhow::Result<Option<SessionCheckpoint>> {
        let path = self.path(session_id);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&path).await?;
        let envelope: Envelope<SessionCheckpoint> = serde_json::from_slice(&bytes)?;
        Ok(Some(envelope.payload))
    }

    /// Every recoverable checkpoint across all sessions, sorted by
    /// timestamp descending.
    pub async fn list_recoverable(&self, max_age: chrono::Duration) -> anyhow::Result<Vec<SessionCheckpoint>> {
        let dir = self.dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut checkpoints = Vec::new();
        let mut entries = fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let bytes = fs::read(&path).await?;
            if let Ok(envelope) = serde_json::from_slice::<Envelope<SessionCheckpoint>>(&bytes) {
                if envelope.payload.is_recoverable(max_age) {
                    checkpoints.push(envelope.payload);
                }
            }
        }
        checkpoints.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(checkpoints)
    }

    /// Removes checkpoints older than `max_age` or beyond the
    /// `max_count` most recent (by timestamp), keeping the rest.
    /// Returns the number removed.
    pub async fn cleanup(&self, max_age: chrono::Duration, max_count: usize) -> anyhow::Result<usize> {
        let dir = self.dir();
        if !dir.exists() {
            return Ok(0);
        }
        let mut dated_paths = Vec::new();
        let mut entries = fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let bytes = fs::read(&path).await?;
            if let Ok(envelope) = serde_json::from_slice::<Envelope<SessionCheckpoint>>(&bytes) {
                dated_paths.push((envelope.payload.timestamp, path));
            }
        }
        dated_paths.sort_by(|a, b| b.0.cmp(&a.0));

        let now = Utc::now();
        let mut removed = 0;
        for (index, (timestamp, path)) in dated_paths.into_iter().enumerate() {
            if index >= max_count || now - timestamp > max_age {
                fs::remove_file(&path).await?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn latest_returns_highest_sequence() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        let session = SessionId::new();

        store
            .create(&session, CheckpointKind::Manual, "first", Value::Null, vec![], None)
            .await
            .unwrap();
        let second = store
            .create(&session, CheckpointKind::Manual, "second", Value::Null, vec![], None)
            .await
            .unwrap();

        let latest = store.latest(&session).await.unwrap().unwrap();
        assert_eq!(latest.id, second.id);
        assert_eq!(latest.reason, "second");
    }

    fn sample_checkpoint(working_directory: PathBuf, state: SessionState) -> SessionCheckpoint {
        let now = Utc::now();
        SessionCheckpoint {
            session_id: SessionId::new(),
            timestamp: now,
            state,
            iteration: 3,
            pending_tasks: vec!["task-1".to_string()],
            completed_requirement_ids: vec!["req-1".to_string()],
            recent_error_messages: vec![],
            resource_usage: Default::default(),
            working_directory,
            original_request: "build a thing".to_string(),
            agent: None,
            metadata: SessionCheckpointMetadata {
                schema_version: 1,
                created_at: now,
                last_modified_at: now,
                interrupt_reason: None,
            },
        }
    }

    #[test]
    fn session_checkpoint_requires_directory_to_exist_and_nonterminal_state() {
        let dir = tempdir().unwrap();
        let checkpoint = sample_checkpoint(dir.path().to_path_buf(), SessionState::Executing);
        assert!(checkpoint.is_recoverable(chrono::Duration::days(7)));

        let missing = SessionCheckpoint {
            working_directory: dir.path().join("does-not-exist"),
            ..checkpoint.clone()
        };
        assert!(!missing.is_recoverable(chrono::Duration::days(7)));

        let done = SessionCheckpoint { state: SessionState::Completed, ..checkpoint };
        assert!(!done.is_recoverable(chrono::Duration::days(7)));
    }

    #[tokio::test]
    async fn session_checkpoint_round_trips_through_save_and_load() {
        let dir = tempdir().unwrap();
        let store = SessionCheckpointStore::new(dir.path());
        let checkpoint = sample_checkpoint(dir.path().to_path_buf(), SessionState::Executing);

        store.save(&checkpoint).await.unwrap();
        let loaded = store.load(&checkpoint.session_id).await.unwrap().unwrap();
        assert_eq!(loaded.session_id, checkpoint.session_id);
        assert_eq!(loaded.pending_tasks, checkpoint.pending_tasks);
    }

    #[tokio::test]
    async fn list_recoverable_excludes_terminal_and_expired() {
        let dir = tempdir().unwrap();
        let store = SessionCheckpointStore::new(dir.path());

        let recoverable = sample_checkpoint(dir.path().to_path_buf(), SessionState::Paused);
        let completed = sample_checkpoint(dir.path().to_path_buf(), SessionState::Completed);
        let mut expired = sample_checkpoint(dir.path().to_path_buf(), SessionState::Executing);
        expired.timestamp = Utc::now() - chrono::Duration::days(30);

        store.save(&recoverable).await.unwrap();
        store.save(&completed).await.unwrap();
        store.save(&expired).await.unwrap();

        let found = store.list_recoverable(chrono::Duration::days(7)).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].session_id, recoverable.session_id);
    }

    #[tokio::test]
    async fn cleanup_removes_expired_and_beyond_max_count() {
        let dir = tempdir().unwrap();
        let store = SessionCheckpointStore::new(dir.path());

        let mut oldest = sample_checkpoint(dir.path().to_path_buf(), SessionState::Executing);
        oldest.timestamp = Utc::now() - chrono::Duration::days(1);
        let newest = sample_checkpoint(dir.path().to_path_buf(), SessionState::Executing);

        store.save(&oldest).await.unwrap();
        store.save(&newest).await.unwrap();

        let removed = store.cleanup(chrono::Duration::days(7), 1).await.unwrap();
        assert_eq!(removed, 1);
        assert!(store.load(&oldest.session_id).await.unwrap().is_none());
        assert!(store.load(&newest.session_id).await.unwrap().is_some());
    }
}
