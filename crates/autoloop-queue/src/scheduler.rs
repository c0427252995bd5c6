use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use autoloop_types::TaskId;

use crate::task::{Task, TaskState};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    EmptyTaskList,
    DuplicateTaskId(TaskId),
    InvalidDependency { task_id: TaskId, dependency_id: TaskId },
    CycleDetected { path: Vec<TaskId> },
}

impl fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedulerError::EmptyTaskList => write!(f, "task list is empty"),
            SchedulerError::DuplicateTaskId(id) => write!(f, "duplicate task id: {id}"),
            SchedulerError::InvalidDependency { task_id, dependency_id } => write!(
                f,
                "task {task_id} depends on unknown task {dependency_id}"
            ),
            SchedulerError::CycleDetected { path } => {
                let rendered = path
                    .iter()
                    .map(|id| id.as_str())
                    .collect::<Vec<_>>()
                    .join(" -> ");
                write!(f, "cycle detected: {rendered}")
            }
        }
    }
}

impl std::error::Error for SchedulerError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskProgress {
    pub total: usize,
    pub pending: usize,
    pub in_progress: usize,
    pub blocked: usize,
    pub done: usize,
    pub failed: usize,
}

impl TaskProgress {
    pub fn completion_percentage(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        (self.done as f64 / self.total as f64) * 100.0
    }
}

/// Stateless DAG operations over a task slice. Mirrors the reference
/// orchestrator's scheduler: every method takes the task list by
/// reference rather than owning a queue, so callers can run it over
/// any snapshot.
pub struct TaskScheduler;

impl TaskScheduler {
    pub fn validate(tasks: &[Task]) -> Result<(), SchedulerError> {
        if tasks.is_empty() {
            return Err(SchedulerError::EmptyTaskList);
        }

        let mut seen = HashSet::new();
        for task in tasks {
            if !seen.insert(task.id.clone()) {
                return Err(SchedulerError::DuplicateTaskId(task.id.clone()));
            }
        }

        let ids: HashSet<&TaskId> = tasks.iter().map(|t| &t.id).collect();
        for task in tasks {
            for dep in &task.dependencies {
                if !ids.contains(dep) {
                    return Err(SchedulerError::InvalidDependency {
                        task_id: task.id.clone(),
                        dependency_id: dep.clone(),
                    });
                }
            }
        }

        if let Some(path) = Self::detect_cycle(tasks) {
            return Err(SchedulerError::CycleDetected { path });
        }

        Ok(())
    }

    pub fn detect_cycle(tasks: &[Task]) -> Option<Vec<TaskId>> {
        let adjacency: HashMap<&TaskId, &[TaskId]> = tasks
            .iter()
            .map(|t| (&t.id, t.dependencies.as_slice()))
            .collect();

        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Visiting,
            Done,
        }

        let mut marks: HashMap<&TaskId, Mark> = HashMap::new();
        let mut stack = Vec::new();

        fn dfs_cycle<'a>(
            node: &'a TaskId,
            adjacency: &HashMap<&'a TaskId, &'a [TaskId]>,
            marks: &mut HashMap<&'a TaskId, Mark>,
            stack: &mut Vec<TaskId>,
        ) -> Option<Vec<TaskId>> {
            if let Some(Mark::Done) = marks.get(node) {
                return None;
            }
            if let Some(Mark::Visiting) = marks.get(node) {
                let start = stack.iter().position(|id| id == node).unwrap_or(0);
                let mut cycle = stack[start..].to_vec();
                cycle.push(node.clone());
                return Some(cycle);
            }

            marks.insert(node, Mark::Visiting);
            stack.push(node.clone());

            if let Some(deps) = adjacency.get(node) {
                for dep in *deps {
                    if let Some(cycle) = dfs_cycle(dep, adjacency, marks, stack) {
                        return Some(cycle);
                    }
                }
            }

            stack.pop();
            marks.insert(node, Mark::Done);
            None
        }

        for task in tasks {
            if let Some(cycle) = dfs_cycle(&task.id, &adjacency, &mut marks, &mut stack) {
                return Some(cycle);
            }
        }

        None
    }

    pub fn get_next_runnable(tasks: &[Task], max_concurrent: usize) -> Option<&Task> {
        Self::get_all_runnable(tasks, max_concurrent).into_iter().next()
    }

    /// Pending tasks whose dependencies are all completed, sorted by
    /// priority descending (ties broken by creation time ascending) and
    /// truncated to the number of slots still free under
    /// `max_concurrent`, per §4.2's selection algorithm.
    pub fn get_all_runnable(tasks: &[Task], max_concurrent: usize) -> Vec<&Task> {
        let completed: HashSet<&TaskId> = tasks
            .iter()
            .filter(|t| t.state == TaskState::Completed)
            .map(|t| &t.id)
            .collect();

        let mut runnable: Vec<&Task> = tasks
            .iter()
            .filter(|t| t.is_runnable(&|dep| completed.contains(dep)))
            .collect();

        runnable.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.created_at.cmp(&b.created_at)));

        let running = tasks.iter().filter(|t| t.state == TaskState::Running).count();
        let slots = max_concurrent.saturating_sub(running);
        runnable.truncate(slots);
        runnable
    }

    pub fn all_completed(tasks: &[Task]) -> bool {
        tasks.iter().all(|t| {
            matches!(t.state, TaskState::Completed | TaskState::Skipped)
        })
    }

    pub fn any_failed(tasks: &[Task]) -> bool {
        tasks.iter().any(|t| t.state == TaskState::Failed)
    }

    /// A deadlock is any non-terminal task whose dependencies can never
    /// all complete, because at least one of them failed without a
    /// retry budget remaining.
    pub fn has_deadlock(tasks: &[Task]) -> bool {
        let failed: HashSet<&TaskId> = tasks
            .iter()
            .filter(|t| t.state == TaskState::Failed && t.retry_count >= t.max_retries)
            .map(|t| &t.id)
            .collect();

        if failed.is_empty() {
            return false;
        }

        tasks.iter().any(|t| {
            matches!(t.state, TaskState::Pending | TaskState::Blocked)
                && t.dependencies.iter().any(|dep| failed.contains(dep))
        })
    }

    /// Marks every pending task whose dependencies can never complete
    /// as `Blocked`, leaving runnable ones `Pending`.
    pub fn update_blocked_tasks(tasks: &mut [Task]) {
        let failed: HashSet<TaskId> = tasks
            .iter()
            .filter(|t| t.state == TaskState::Failed && t.retry_count >= t.max_retries)
            .map(|t| t.id.clone())
            .collect();

        for task in tasks.iter_mut() {
            if task.state == TaskState::Pending
                && task.dependencies.iter().any(|dep| failed.contains(dep))
            {
                task.state = TaskState::Blocked;
            }
        }
    }

    pub fn get_progress(tasks: &[Task]) -> TaskProgress {
        let mut progress = TaskProgress {
            total: tasks.len(),
            pending: 0,
            in_progress: 0,
            blocked: 0,
            done: 0,
            failed: 0,
        };
        for task in tasks {
            match task.state {
                TaskState::Pending => progress.pending += 1,
                TaskState::Running => progress.in_progress += 1,
                TaskState::Blocked => progress.blocked += 1,
                TaskState::Completed | TaskState::Skipped => progress.done += 1,
                TaskState::Failed => progress.failed += 1,
            }
        }
        progress
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autoloop_types::Priority;

    fn make_task(id: &str, deps: &[&str]) -> Task {
        Task::new(
            TaskId::from(id.to_string()),
            format!("Task {id}"),
            deps.iter().map(|d| TaskId::from(d.to_string())).collect(),
        )
    }

    #[test]
    fn empty_task_list_is_rejected() {
        assert_eq!(TaskScheduler::validate(&[]), Err(SchedulerError::EmptyTaskList));
    }

    #[test]
    fn self_referential_dependency_is_a_cycle() {
        let tasks = vec![make_task("a", &["a"])];
        assert!(matches!(
            TaskScheduler::validate(&tasks),
            Err(SchedulerError::CycleDetected { .. })
        ));
    }

    #[test]
    fn two_task_cycle_is_detected() {
        let mut a = make_task("a", &["b"]);
        let b = make_task("b", &["a"]);
        a.dependencies = vec![b.id.clone()];
        let tasks = vec![a, b];
        assert!(matches!(
            TaskScheduler::validate(&tasks),
            Err(SchedulerError::CycleDetected { .. })
        ));
    }

    #[test]
    fn runnable_respects_completed_dependencies() {
        let mut a = make_task("a", &[]);
        let b = make_task("b", &["a"]);
        let tasks_before = vec![a.clone(), b.clone()];
        assert_eq!(TaskScheduler::get_all_runnable(&tasks_before, 10).len(), 1);

        a.state = TaskState::Completed;
        let tasks_after = vec![a, b];
        let runnable = TaskScheduler::get_all_runnable(&tasks_after, 10);
        assert_eq!(runnable.len(), 1);
        assert_eq!(runnable[0].id.as_str(), "b");
    }

    #[test]
    fn runnable_is_sorted_by_priority_then_creation_time() {
        let mut low = make_task("low", &[]);
        low.priority = Priority::Low;
        let mut critical = make_task("critical", &[]);
        critical.priority = Priority::Critical;
        critical.created_at = low.created_at + chrono::Duration::seconds(1);

        let tasks = vec![low.clone(), critical.clone()];
        let runnable = TaskScheduler::get_all_runnable(&tasks, 10);
        assert_eq!(runnable[0].id.as_str(), "critical");
        assert_eq!(runnable[1].id.as_str(), "low");
    }

    #[test]
    fn runnable_is_truncated_to_free_concurrency_slots() {
        let mut a = make_task("a", &[]);
        a.state = TaskState::Running;
        let tasks = vec![a, make_task("b", &[]), make_task("c", &[])];
        let runnable = TaskScheduler::get_all_runnable(&tasks, 2);
        assert_eq!(runnable.len(), 1);
    }

    #[test]
    fn exhausted_retry_budget_blocks_dependents() {
        let mut a = make_task("a", &[]);
        a.state = TaskState::Failed;
        a.retry_count = a.max_retries;
        let mut tasks = vec![a, make_task("b", &["a"])];
        assert!(TaskScheduler::has_deadlock(&tasks));
        TaskScheduler::update_blocked_tasks(&mut tasks);
        assert_eq!(tasks[1].state, TaskState::Blocked);
    }

    #[test]
    fn progress_counts_every_state() {
        let mut tasks = vec![make_task("a", &[]), make_task("b", &[])];
        tasks[0].state = TaskState::Completed;
        tasks[1].state = TaskState::Failed;
        let progress = TaskScheduler::get_progress(&tasks);
        assert_eq!(progress.done, 1);
        assert_eq!(progress.failed, 1);
        assert_eq!(progress.completion_percentage(), 50.0);
    }
}
