//! CLOSE-rubric decision engine: scores a candidate action on five
//! weighted dimensions and selects proceed/pause/block/skip per the
//! session's autonomy level.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use autoloop_types::{new_id, AutonomyLevel, DecisionId, SessionId};

/// What kind of decision point this is, for grouping in the persisted
/// decision log at `autonomous/decisions/{projectId}/{decisionId}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionType {
    Architecture,
    Implementation,
    Refactor,
    Bugfix,
    Feature,
    Test,
    Rollback,
    Checkpoint,
    Resource,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Risk {
    Low,
    Medium,
    High,
}

/// Convergence (reversibility), Leverage (benefit/cost), Optionality
/// (keeps future options open), Surplus (remaining resources),
/// Evolution (learning value). Each in `[0, 10]`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CloseCriteria {
    pub convergence: f64,
    pub leverage: f64,
    pub optionality: f64,
    pub surplus: f64,
    pub evolution: f64,
}

#[derive(Debug, Clone, Copy)]
struct CloseWeights {
    convergence: f64,
    leverage: f64,
    optionality: f64,
    surplus: f64,
    evolution: f64,
}

const DEFAULT_WEIGHTS: CloseWeights = CloseWeights {
    convergence: 1.0,
    leverage: 1.2,
    optionality: 1.5,
    surplus: 1.3,
    evolution: 0.8,
};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CloseScore {
    pub total: f64,
    pub confidence: u32,
}

fn score(criteria: CloseCriteria) -> CloseScore {
    let w = DEFAULT_WEIGHTS;
    let weighted_sum = w.convergence * criteria.convergence
        + w.leverage * criteria.leverage
        + w.optionality * criteria.optionality
        + w.surplus * criteria.surplus
        + w.evolution * criteria.evolution;
    let weight_sum = w.convergence + w.leverage + w.optionality + w.surplus + w.evolution;

    let total = ((weighted_sum / (10.0 * weight_sum)) * 10.0 * 100.0).round() / 100.0;
    let confidence = (total.min(10.0) / 10.0 * 100.0).round() as u32;

    CloseScore { total, confidence }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Proceed,
    ProceedWithCaution,
    Pause,
    Block,
    Skip,
}

impl Action {
    /// `proceed` and `proceed_with_caution` are both treated as
    /// approved downstream; the Orchestrator never branches on which
    /// of the two it received.
    pub fn is_approved(self) -> bool {
        matches!(self, Action::Proceed | Action::ProceedWithCaution)
    }
}

/// One CLOSE-rubric evaluation, persisted immutably once created at
/// `autonomous/decisions/{projectId}/{decisionId}` — §6. `context` is a
/// snapshot of whatever state informed the decision (requirement under
/// evaluation, resource usage, recent errors), kept as `Value` since its
/// shape varies by `decision_type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub id: DecisionId,
    pub session_id: SessionId,
    pub decision_type: DecisionType,
    pub description: String,
    pub criteria: CloseCriteria,
    pub score: CloseScore,
    pub action: Action,
    pub risk: Risk,
    pub context: Value,
    pub reasoning: String,
    pub timestamp: DateTime<Utc>,
}

impl Decision {
    pub fn is_approved(&self) -> bool {
        self.action.is_approved()
    }
}

fn reasoning_for(action: Action, score: CloseScore, risk: Risk, recent_error_count: u32) -> String {
    match action {
        Action::Proceed => format!("CLOSE score {:.2} cleared the approval threshold", score.total),
        Action::ProceedWithCaution => format!(
            "CLOSE score {:.2} is below full approval but risk is {risk:?} with {recent_error_count} recent errors",
            score.total
        ),
        Action::Pause => format!(
            "risk {risk:?} or {recent_error_count} recent errors exceeded the autonomy level's tolerance"
        ),
        Action::Block => format!("medium risk under a timid autonomy level requires human approval"),
        Action::Skip => format!("CLOSE score {:.2} was too low to proceed and risk was acceptable to defer", score.total),
    }
}

/// Evaluates a candidate action's CLOSE criteria against the session's
/// autonomy-level thresholds and recent-error context, producing one
/// [`Decision`] record. `session_id`/`decision_type`/`description`/
/// `context` identify what this decision point was about; everything
/// else is the CLOSE machinery's own verdict.
#[allow(clippy::too_many_arguments)]
pub fn evaluate(
    session_id: SessionId,
    decision_type: DecisionType,
    description: impl Into<String>,
    context: Value,
    criteria: CloseCriteria,
    autonomy: AutonomyLevel,
    risk: Risk,
    recent_error_count: u32,
) -> Decision {
    let close_score = score(criteria);
    let (approval, caution) = autonomy.thresholds();

    let action = if close_score.total >= approval {
        Action::Proceed
    } else if close_score.total >= caution {
        Action::ProceedWithCaution
    } else if risk == Risk::Low && recent_error_count < 3 {
        Action::ProceedWithCaution
    } else if risk == Risk::High || recent_error_count >= 5 {
        Action::Pause
    } else if risk == Risk::Medium {
        if autonomy == AutonomyLevel::Timid {
            Action::Block
        } else {
            Action::Pause
        }
    } else {
        Action::Skip
    };
    let reasoning = reasoning_for(action, close_score, risk, recent_error_count);

    Decision {
        id: DecisionId::from(new_id()),
        session_id,
        decision_type,
        description: description.into(),
        criteria,
        score: close_score,
        action,
        risk,
        context,
        reasoning,
        timestamp: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_marks() -> CloseCriteria {
        CloseCriteria {
            convergence: 10.0,
            leverage: 10.0,
            optionality: 10.0,
            surplus: 10.0,
            evolution: 10.0,
        }
    }

    fn eval(criteria: CloseCriteria, autonomy: AutonomyLevel, risk: Risk, recent_error_count: u32) -> Decision {
        evaluate(
            SessionId::new(),
            DecisionType::Implementation,
            "test decision",
            Value::Null,
            criteria,
            autonomy,
            risk,
            recent_error_count,
        )
    }

    #[test]
    fn all_tens_yields_total_of_ten() {
        let decision = eval(full_marks(), AutonomyLevel::Bold, Risk::Low, 0);
        assert_eq!(decision.score.total, 10.0);
        assert_eq!(decision.action, Action::Proceed);
        assert!(decision.is_approved());
        assert!(!decision.reasoning.is_empty());
    }

    #[test]
    fn low_score_with_high_risk_pauses() {
        let criteria = CloseCriteria {
            convergence: 1.0,
            leverage: 1.0,
            optionality: 1.0,
            surplus: 1.0,
            evolution: 1.0,
        };
        let decision = eval(criteria, AutonomyLevel::Bold, Risk::High, 0);
        assert_eq!(decision.action, Action::Pause);
        assert!(!decision.is_approved());
    }

    #[test]
    fn medium_risk_blocks_only_under_timid_autonomy() {
        let criteria = CloseCriteria {
            convergence: 3.0,
            leverage: 3.0,
            optionality: 3.0,
            surplus: 3.0,
            evolution: 3.0,
        };
        let bold = eval(criteria, AutonomyLevel::Bold, Risk::Medium, 0);
        assert_eq!(bold.action, Action::Pause);

        let timid = eval(criteria, AutonomyLevel::Timid, Risk::Medium, 0);
        assert_eq!(timid.action, Action::Block);
    }

    #[test]
    fn looser_autonomy_approves_lower_scores() {
        let criteria = CloseCriteria {
            convergence: 6.0,
            leverage: 6.0,
            optionality: 6.0,
            surplus: 6.0,
            evolution: 6.0,
        };
        let lunatic = eval(criteria, AutonomyLevel::Lunatic, Risk::Low, 0);
        let timid = eval(criteria, AutonomyLevel::Timid, Risk::Low, 0);
        assert_eq!(lunatic.action, Action::Proceed);
        assert_ne!(timid.action, Action::Proceed);
    }

    #[test]
    fn decision_carries_its_identifying_fields() {
        let session_id = SessionId::new();
        let decision = evaluate(
            session_id.clone(),
            DecisionType::Rollback,
            "evaluating whether to roll back",
            serde_json::json!({"failed_tests": 3}),
            full_marks(),
            AutonomyLevel::Bold,
            Risk::Low,
            0,
        );
        assert_eq!(decision.session_id, session_id);
        assert_eq!(decision.decision_type, DecisionType::Rollback);
        assert_eq!(decision.description, "evaluating whether to roll back");
        assert_eq!(decision.context, serde_json::json!({"failed_tests": 3}));
    }
}
