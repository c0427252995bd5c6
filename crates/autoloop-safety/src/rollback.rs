use std::time::{Duration, Instant};

use serde_json::Value;

use autoloop_core::{ResourceAxis, VcsDriver};
use autoloop_types::SessionId;

use crate::checkpoint::{CheckpointKind, CheckpointStore};
use crate::loop_detection::LoopKind;

#[derive(Debug, Clone)]
pub struct RollbackOutcome {
    pub success: bool,
    pub checkpoint_id: Option<String>,
    pub files_restored: Vec<String>,
    pub retry_budget_remaining: bool,
}

/// `withRollback`: creates a pre-op checkpoint, executes `op`, and on
/// failure restores to that checkpoint. Bounded by `max_retries` with a
/// minimum delay enforced between consecutive rollbacks.
pub struct RollbackManager<V: VcsDriver> {
    checkpoints: CheckpointStore,
    vcs: V,
    max_retries: u32,
    min_delay: Duration,
    retries_used: u32,
    last_rollback: Option<Instant>,
}

impl<V: VcsDriver> RollbackManager<V> {
    pub fn new(checkpoints: CheckpointStore, vcs: V) -> Self {
        Self {
            checkpoints,
            vcs,
            max_retries: 2,
            min_delay: Duration::from_secs(1),
            retries_used: 0,
            last_rollback: None,
        }
    }

    fn retry_budget_remaining(&self) -> bool {
        self.retries_used < self.max_retries
    }

    async fn enforce_min_delay(&self) {
        if let Some(last) = self.last_rollback {
            let elapsed = last.elapsed();
            if elapsed < self.min_delay {
                tokio::time::sleep(self.min_delay - elapsed).await;
            }
        }
    }

    pub async fn with_rollback<F, Fut, T>(
        &mut self,
        session_id: &SessionId,
        trigger: &str,
        session_snapshot: Value,
        op: F,
    ) -> anyhow::Result<Result<T, RollbackOutcome>>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = anyhow::Result<T>>,
    {
        let pre_op = self
            .checkpoints
            .create(
                session_id,
                CheckpointKind::PreOperation,
                trigger,
                session_snapshot,
                vec![],
                None,
            )
            .await?;

        match op().await {
            Ok(value) => Ok(Ok(value)),
            Err(_) => Ok(Err(self.restore(session_id, &pre_op.id).await?)),
        }
    }

    async fn restore(&mut self, session_id: &SessionId, checkpoint_id: &str) -> anyhow::Result<RollbackOutcome> {
        self.enforce_min_delay().await;

        let latest = self.checkpoints.latest(session_id).await?;
        let success = match &latest {
            Some(checkpoint) => {
                if let Some(commit) = &checkpoint.commit {
                    self.vcs.reset_to_commit(commit, true).await.is_ok()
                } else {
                    true
                }
            }
            None => false,
        };

        self.retries_used += 1;
        self.last_rollback = Some(Instant::now());

        Ok(RollbackOutcome {
            success,
            checkpoint_id: Some(checkpoint_id.to_string()),
            files_restored: latest.map(|c| c.changed_files).unwrap_or_default(),
            retry_budget_remaining: self.retry_budget_remaining(),
        })
    }

    /// Rolls back only when the test failure rate exceeds 50%.
    pub fn should_rollback_test_failure(&self, failed: u32, total: u32) -> bool {
        total > 0 && (failed as f64 / total as f64) > 0.5
    }

    /// Rolls back on a type-check failure specifically.
    pub fn should_rollback_verification_failure(&self, typecheck_ok: bool) -> bool {
        !typecheck_ok
    }

    /// §4.6's third specialized trigger: any axis over its hard limit
    /// rolls back immediately rather than waiting for the next checkpoint.
    pub fn should_rollback_resource_exceeded(&self, exceeded_axes: &[ResourceAxis]) -> bool {
        !exceeded_axes.is_empty()
    }

    /// §4.6's fourth specialized trigger. `DecisionHesitation` alone
    /// doesn't warrant a rollback — there's no bad state to undo yet —
    /// but a repeated action or an oscillating session state means the
    /// last change made things worse.
    pub fn should_rollback_loop_detected(&self, kind: LoopKind) -> bool {
        matches!(kind, LoopKind::ExactRepeat | LoopKind::StateOscillation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autoloop_core::fakes::InMemoryVcsDriver;
    use tempfile::tempdir;

    #[tokio::test]
    async fn failing_op_restores_to_pre_op_checkpoint() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        let vcs = InMemoryVcsDriver::new();
        let mut manager = RollbackManager::new(store, vcs);
        let session = SessionId::new();

        let result: Result<(), RollbackOutcome> = manager
            .with_rollback(&session, "test", Value::Null, || async {
                anyhow::bail!("boom")
            })
            .await
            .unwrap();

        let outcome = result.unwrap_err();
        assert!(outcome.success);
        assert!(outcome.retry_budget_remaining);
    }

    #[test]
    fn rollback_triggers_above_fifty_percent_failure_rate() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        let manager = RollbackManager::new(store, InMemoryVcsDriver::new());
        assert!(manager.should_rollback_test_failure(6, 10));
        assert!(!manager.should_rollback_test_failure(4, 10));
    }

    #[test]
    fn resource_exceeded_rolls_back_only_when_an_axis_is_over() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        let manager = RollbackManager::new(store, InMemoryVcsDriver::new());
        assert!(!manager.should_rollback_resource_exceeded(&[]));
        assert!(manager.should_rollback_resource_exceeded(&[ResourceAxis::Tokens]));
    }

    #[test]
    fn loop_detected_rolls_back_for_repeats_and_oscillation_not_hesitation() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        let manager = RollbackManager::new(store, InMemoryVcsDriver::new());
        assert!(manager.should_rollback_loop_detected(LoopKind::ExactRepeat));
        assert!(manager.should_rollback_loop_detected(LoopKind::StateOscillation));
        assert!(!manager.should_rollback_loop_detected(LoopKind::DecisionHesitation));
    }
}
