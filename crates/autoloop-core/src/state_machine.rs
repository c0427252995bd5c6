use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::RwLock;

use autoloop_types::CoreEvent;

use crate::event_bus::EventBus;

/// Work states plus the terminal states, §4.1. `PAUSED` and `BLOCKED`
/// are terminal-but-recoverable: a resume is permitted from them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Planning,
    PlanApproved,
    Executing,
    Testing,
    Verifying,
    Deciding,
    DecisionMade,
    Fixing,
    Retrying,
    Evaluating,
    Scoring,
    Checkpointing,
    RollingBack,
    Continuing,
    Completed,
    Failed,
    Paused,
    Blocked,
    Terminated,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionState::Completed
                | SessionState::Failed
                | SessionState::Paused
                | SessionState::Blocked
                | SessionState::Terminated
        )
    }

    pub fn is_recoverable(self) -> bool {
        matches!(self, SessionState::Paused | SessionState::Blocked)
    }

    /// Fixed allow-list of successors, §4.1's transition table.
    fn allowed_successors(self) -> &'static [SessionState] {
        use SessionState::*;
        match self {
            Idle => &[Planning, Terminated],
            Planning => &[PlanApproved, Deciding, Failed, Paused],
            PlanApproved => &[Deciding, Failed, Paused],
            Deciding => &[DecisionMade, Paused, Blocked, Failed],
            DecisionMade => &[Executing, Paused, Blocked],
            Executing => &[Testing, Deciding, Checkpointing, Fixing, Failed, Paused],
            Testing => &[Verifying, Fixing, Failed, Paused],
            Fixing => &[Retrying, Testing, Failed, Paused],
            Retrying => &[Executing, Testing, Failed, Paused],
            Verifying => &[Evaluating, Fixing, RollingBack, Failed, Paused],
            Evaluating => &[Scoring, Continuing, Failed, Paused],
            Scoring => &[Completed, Continuing, Failed, Paused],
            Checkpointing => &[Executing, Testing, RollingBack, Failed, Paused],
            RollingBack => &[Executing, Planning, Failed, Paused],
            Continuing => &[Planning, Deciding, Executing, Completed, Paused],
            Completed => &[],
            Failed => &[],
            Paused => &[Executing, Planning, Deciding, Terminated],
            Blocked => &[Executing, Terminated],
            Terminated => &[],
        }
    }

    fn is_allowed(self, to: SessionState) -> bool {
        self.allowed_successors().contains(&to)
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid transition from {from:?} to {to:?}: {reason}")]
pub struct InvalidTransitionError {
    pub from: SessionState,
    pub to: SessionState,
    pub reason: String,
}

#[derive(Debug, Clone)]
struct TransitionRecord {
    state: SessionState,
    entered_at: DateTime<Utc>,
}

/// A state-change observer, awaited in registration order on every
/// successful transition (§4.1 contract).
#[async_trait]
pub trait StateChangeHandler: Send + Sync {
    async fn on_state_changed(&self, from: SessionState, to: SessionState);
}

/// Per-session finite-state machine. `transition` is the only mutator;
/// every other accessor is read-only.
pub struct StateMachine {
    session_id: autoloop_types::SessionId,
    current: RwLock<TransitionRecord>,
    previous: RwLock<Option<SessionState>>,
    handlers: RwLock<Vec<Arc<dyn StateChangeHandler>>>,
    history: RwLock<TransitionHistory>,
    events: EventBus,
}

impl StateMachine {
    pub fn new(session_id: autoloop_types::SessionId, events: EventBus) -> Self {
        Self {
            session_id,
            current: RwLock::new(TransitionRecord {
                state: SessionState::Idle,
                entered_at: Utc::now(),
            }),
            previous: RwLock::new(None),
            handlers: RwLock::new(Vec::new()),
            history: RwLock::new(TransitionHistory::default()),
            events,
        }
    }

    /// The last `n` `(from, to)` transitions, rendered as strings for
    /// the loop guard's oscillation check, §4.5b.
    pub async fn recent_transitions(&self, n: usize) -> Vec<(String, String)> {
        self.history
            .read()
            .await
            .last(n)
            .iter()
            .map(|(from, to)| (format!("{from:?}"), format!("{to:?}")))
            .collect()
    }

    pub async fn register_handler(&self, handler: Arc<dyn StateChangeHandler>) {
        self.handlers.write().await.push(handler);
    }

    pub async fn current(&self) -> SessionState {
        self.current.read().await.state
    }

    pub async fn transition(
        &self,
        to: SessionState,
        reason: &str,
        metadata: Value,
    ) -> Result<(), InvalidTransitionError> {
        let from = self.current.read().await.state;
        if !from.is_allowed(to) {
            self.events.publish(CoreEvent::new(
                "state.invalid_transition",
                self.session_id.clone(),
                json!({"from": from, "to": to, "reason": reason}),
            ));
            return Err(InvalidTransitionError {
                from,
                to,
                reason: reason.to_string(),
            });
        }

        {
            let mut current = self.current.write().await;
            *self.previous.write().await = Some(current.state);
            current.state = to;
            current.entered_at = Utc::now();
        }
        self.history.write().await.record(from, to);

        self.events.publish(CoreEvent::new(
            "state.changed",
            self.session_id.clone(),
            json!({"from": from, "to": to, "reason": reason, "metadata": metadata}),
        ));

        let handlers = self.handlers.read().await.clone();
        for handler in handlers.iter() {
            handler.on_state_changed(from, to).await;
        }

        Ok(())
    }
}

/// Recent history of `(from, to)` pairs, exposed for the loop-detection
/// guardrail in the safety crate (it needs the last six transitions to
/// spot A↔B oscillation, §4.5b).
#[derive(Debug, Default)]
pub struct TransitionHistory {
    recent: Vec<(SessionState, SessionState)>,
}

impl TransitionHistory {
    pub fn record(&mut self, from: SessionState, to: SessionState) {
        self.recent.push((from, to));
        if self.recent.len() > 64 {
            self.recent.remove(0);
        }
    }

    pub fn last(&self, n: usize) -> &[(SessionState, SessionState)] {
        let start = self.recent.len().saturating_sub(n);
        &self.recent[start..]
    }
}

pub type HandlerMap = HashMap<String, Arc<dyn StateChangeHandler>>;

#[cfg(test)]
mod tests {
    use super::*;
    use autoloop_types::SessionId;

    #[tokio::test]
    async fn idle_can_advance_to_planning() {
        let sm = StateMachine::new(SessionId::new(), EventBus::new());
        sm.transition(SessionState::Planning, "start", json!({}))
            .await
            .unwrap();
        assert_eq!(sm.current().await, SessionState::Planning);
    }

    #[tokio::test]
    async fn disallowed_transition_is_rejected_and_state_unchanged() {
        let sm = StateMachine::new(SessionId::new(), EventBus::new());
        let err = sm
            .transition(SessionState::Completed, "skip ahead", json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.from, SessionState::Idle);
        assert_eq!(sm.current().await, SessionState::Idle);
    }

    #[tokio::test]
    async fn terminated_has_no_successors() {
        let sm = StateMachine::new(SessionId::new(), EventBus::new());
        sm.transition(SessionState::Terminated, "stop", json!({}))
            .await
            .unwrap();
        let err = sm
            .transition(SessionState::Planning, "resume?", json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.from, SessionState::Terminated);
    }

    #[tokio::test]
    async fn recent_transitions_renders_from_to_pairs() {
        let sm = StateMachine::new(SessionId::new(), EventBus::new());
        sm.transition(SessionState::Planning, "start", json!({})).await.unwrap();
        sm.transition(SessionState::Deciding, "evaluate", json!({})).await.unwrap();

        let recent = sm.recent_transitions(10).await;
        assert_eq!(recent, vec![
            ("Idle".to_string(), "Planning".to_string()),
            ("Planning".to_string(), "Deciding".to_string()),
        ]);
    }

    #[tokio::test]
    async fn handlers_are_invoked_in_registration_order() {
        let sm = StateMachine::new(SessionId::new(), EventBus::new());
        let order = Arc::new(tokio::sync::Mutex::new(Vec::new()));

        struct Recorder(Arc<tokio::sync::Mutex<Vec<u8>>>, u8);
        #[async_trait]
        impl StateChangeHandler for Recorder {
            async fn on_state_changed(&self, _from: SessionState, _to: SessionState) {
                self.0.lock().await.push(self.1);
            }
        }

        sm.register_handler(Arc::new(Recorder(order.clone(), 1)))
            .await;
        sm.register_handler(Arc::new(Recorder(order.clone(), 2)))
            .await;

        sm.transition(SessionState::Planning, "start", json!({}))
            .await
            .unwrap();

        assert_eq!(*order.lock().await, vec![1, 2]);
    }
}
