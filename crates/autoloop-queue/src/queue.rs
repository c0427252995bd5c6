use chrono::Utc;
use serde_json::json;

use autoloop_core::EventBus;
use autoloop_types::{CoreEvent, SessionId, TaskId};

use crate::scheduler::{SchedulerError, TaskProgress, TaskScheduler};
use crate::task::{Task, TaskState};

/// Owns the task list for one session and exposes the mutating
/// operations the Orchestrator drives: `add`, `start`, `complete`,
/// `fail`, `skip`, `block`, `retry`. `start`/`complete`/`fail` each
/// publish the matching `task.*` event on the shared bus, per §4.2.
pub struct TaskQueue {
    tasks: Vec<Task>,
    max_concurrent: usize,
    session_id: SessionId,
    events: EventBus,
}

impl TaskQueue {
    pub fn new(session_id: SessionId, max_concurrent: usize, events: EventBus) -> Self {
        Self {
            tasks: Vec::new(),
            max_concurrent,
            session_id,
            events,
        }
    }

    fn publish(&self, event_type: &str, properties: serde_json::Value) {
        self.events
            .publish(CoreEvent::new(event_type, self.session_id.clone(), properties));
    }

    pub fn add(&mut self, task: Task) -> Result<(), SchedulerError> {
        let mut probe = self.tasks.clone();
        probe.push(task.clone());
        TaskScheduler::validate(&probe)?;

        for dep in &task.dependencies {
            if let Some(dependency) = self.tasks.iter_mut().find(|t| t.id == *dep) {
                dependency.dependent_ids.push(task.id.clone());
            }
        }
        self.tasks.push(task);
        Ok(())
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn get(&self, id: &TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| &t.id == id)
    }

    fn get_mut(&mut self, id: &TaskId) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| &t.id == id)
    }

    pub fn runnable(&self) -> Vec<&Task> {
        TaskScheduler::get_all_runnable(&self.tasks, self.max_concurrent)
    }

    pub fn start(&mut self, id: &TaskId) -> bool {
        let ok = match self.get_mut(id) {
            Some(task) if task.state == TaskState::Pending => {
                task.state = TaskState::Running;
                task.started_at = Some(Utc::now());
                true
            }
            _ => false,
        };
        if ok {
            self.publish("task.started", json!({"task_id": id.as_str()}));
        }
        ok
    }

    pub fn complete(&mut self, id: &TaskId, artifacts: Vec<String>) -> bool {
        let ok = match self.get_mut(id) {
            Some(task) => {
                task.state = TaskState::Completed;
                task.completed_at = Some(Utc::now());
                task.artifacts = artifacts;
                true
            }
            None => false,
        };
        if ok {
            TaskScheduler::update_blocked_tasks(&mut self.tasks);
            self.publish("task.completed", json!({"task_id": id.as_str()}));
        }
        ok
    }

    /// Atomically resolves a failed attempt: when `retryable` and the
    /// retry budget isn't exhausted, re-queues the task as `Pending`
    /// with its retry count incremented; otherwise marks it `Failed`.
    /// Always publishes `task.failed` — the event records the attempt
    /// that failed, not whether the task will retry.
    pub fn fail(&mut self, id: &TaskId, error: impl Into<String>, retryable: bool) -> bool {
        let error = error.into();
        let ok = match self.get_mut(id) {
            Some(task) => {
                task.error_message = Some(error.clone());
                if retryable && task.retry_count < task.max_retries {
                    task.retry_count += 1;
                    task.state = TaskState::Pending;
                    task.started_at = None;
                } else {
                    task.state = TaskState::Failed;
                }
                true
            }
            None => false,
        };
        if ok {
            TaskScheduler::update_blocked_tasks(&mut self.tasks);
            self.publish(
                "task.failed",
                json!({"task_id": id.as_str(), "error": error, "retryable": retryable}),
            );
        }
        ok
    }

    pub fn skip(&mut self, id: &TaskId) -> bool {
        match self.get_mut(id) {
            Some(task) => {
                task.state = TaskState::Skipped;
                true
            }
            None => false,
        }
    }

    pub fn block(&mut self, id: &TaskId) -> bool {
        match self.get_mut(id) {
            Some(task) if task.state != TaskState::Completed => {
                task.state = TaskState::Blocked;
                true
            }
            _ => false,
        }
    }

    /// Re-queues a failed task for another attempt outside of `fail`,
    /// bumping its retry count. Returns `false` once the retry budget is
    /// exhausted.
    pub fn retry(&mut self, id: &TaskId) -> bool {
        match self.get_mut(id) {
            Some(task) if task.state == TaskState::Failed && task.retry_count < task.max_retries => {
                task.retry_count += 1;
                task.state = TaskState::Pending;
                task.error_message = None;
                true
            }
            _ => false,
        }
    }

    pub fn progress(&self) -> TaskProgress {
        TaskScheduler::get_progress(&self.tasks)
    }

    pub fn all_completed(&self) -> bool {
        TaskScheduler::all_completed(&self.tasks)
    }

    pub fn any_failed(&self) -> bool {
        TaskScheduler::any_failed(&self.tasks)
    }

    pub fn has_deadlock(&self) -> bool {
        TaskScheduler::has_deadlock(&self.tasks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autoloop_types::TaskId;

    fn queue() -> TaskQueue {
        TaskQueue::new(SessionId::new(), 10, EventBus::new())
    }

    fn task(id: &str, deps: &[&str]) -> Task {
        Task::new(
            TaskId::from(id.to_string()),
            id.to_string(),
            deps.iter().map(|d| TaskId::from(d.to_string())).collect(),
        )
    }

    #[test]
    fn completing_a_task_unblocks_its_dependent() {
        let mut queue = queue();
        queue.add(task("a", &[])).unwrap();
        queue.add(task("b", &["a"])).unwrap();

        let a = TaskId::from("a".to_string());
        let b = TaskId::from("b".to_string());

        assert_eq!(queue.runnable().len(), 1);
        queue.start(&a);
        queue.complete(&a, vec!["src/lib.rs".to_string()]);
        assert!(queue.runnable().iter().any(|t| t.id == b));
    }

    #[test]
    fn adding_a_dependent_task_populates_the_dependency_s_dependent_ids() {
        let mut queue = queue();
        queue.add(task("a", &[])).unwrap();
        queue.add(task("b", &["a"])).unwrap();

        let a = TaskId::from("a".to_string());
        let b = TaskId::from("b".to_string());
        assert_eq!(queue.get(&a).unwrap().dependent_ids, vec![b]);
    }

    #[test]
    fn start_complete_and_fail_publish_their_task_events() {
        let mut queue = queue();
        queue.add(task("a", &[])).unwrap();
        let a = TaskId::from("a".to_string());

        let mut events = queue.events.subscribe();
        queue.start(&a);
        queue.fail(&a, "boom", false);

        let first = events.try_recv().unwrap();
        assert_eq!(first.event_type, "task.started");
        let second = events.try_recv().unwrap();
        assert_eq!(second.event_type, "task.failed");
    }

    #[test]
    fn retryable_failure_re_queues_until_budget_exhausted() {
        let mut queue = queue();
        queue.add(task("a", &[])).unwrap();
        let a = TaskId::from("a".to_string());

        queue.start(&a);
        assert!(queue.fail(&a, "boom", true));
        assert_eq!(queue.get(&a).unwrap().state, TaskState::Pending);
        assert_eq!(queue.get(&a).unwrap().retry_count, 1);

        queue.start(&a);
        queue.fail(&a, "boom again", true);
        assert_eq!(queue.get(&a).unwrap().retry_count, 2);

        queue.start(&a);
        queue.fail(&a, "boom thrice", true);
        assert_eq!(queue.get(&a).unwrap().state, TaskState::Failed);
    }

    #[test]
    fn non_retryable_failure_marks_failed_immediately() {
        let mut queue = queue();
        queue.add(task("a", &[])).unwrap();
        let a = TaskId::from("a".to_string());
        queue.start(&a);
        queue.fail(&a, "fatal", false);
        assert_eq!(queue.get(&a).unwrap().state, TaskState::Failed);
    }

    #[test]
    fn skip_leaves_completed_and_failed_counts_unchanged() {
        let mut queue = queue();
        queue.add(task("a", &[])).unwrap();
        let before = queue.progress();
        let a = TaskId::from("a".to_string());
        queue.skip(&a);
        let after = queue.progress();
        assert_eq!(before.done, after.done - 1);
        assert_eq!(before.failed, after.failed);
    }
}
