use std::collections::{HashSet, VecDeque};
use std::time::{Duration, Instant};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

const RING_CAPACITY: usize = 64;
const DEFAULT_REPEAT_THRESHOLD: usize = 3;
const DEFAULT_WINDOW: Duration = Duration::from_secs(60);
const SIMILARITY_THRESHOLD: f64 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopKind {
    ExactRepeat,
    SimilarError,
    StateOscillation,
    DecisionHesitation,
}

struct ToolCallRecord {
    tool: String,
    input: String,
    at: Instant,
}

struct ErrorRecord {
    normalized: String,
    at: Instant,
}

/// (b) Guardrails / loop detection. Records tool calls, tool errors and
/// decisions into bounded rings and flags repeated or oscillating
/// behavior. `autoBreakLoops` suppresses re-reporting an already-broken
/// pattern.
pub struct LoopGuard {
    tool_calls: VecDeque<ToolCallRecord>,
    errors: VecDeque<ErrorRecord>,
    decisions: VecDeque<String>,
    repeat_threshold: usize,
    window: Duration,
    auto_break: bool,
    broken: HashSet<LoopKind>,
}

impl LoopGuard {
    pub fn new(auto_break: bool) -> Self {
        Self {
            tool_calls: VecDeque::with_capacity(RING_CAPACITY),
            errors: VecDeque::with_capacity(RING_CAPACITY),
            decisions: VecDeque::with_capacity(RING_CAPACITY),
            repeat_threshold: DEFAULT_REPEAT_THRESHOLD,
            window: DEFAULT_WINDOW,
            auto_break,
            broken: HashSet::new(),
        }
    }

    fn push_bounded<T>(ring: &mut VecDeque<T>, item: T) {
        if ring.len() == RING_CAPACITY {
            ring.pop_front();
        }
        ring.push_back(item);
    }

    pub fn record_tool_call(&mut self, tool: &str, serialized_input: &str) -> Option<LoopKind> {
        Self::push_bounded(
            &mut self.tool_calls,
            ToolCallRecord {
                tool: tool.to_string(),
                input: serialized_input.to_string(),
                at: Instant::now(),
            },
        );
        self.detect_exact_repeat(tool, serialized_input)
    }

    pub fn record_tool_error(&mut self, raw_message: &str) -> Option<LoopKind> {
        let normalized = normalize_error(raw_message);
        Self::push_bounded(
            &mut self.errors,
            ErrorRecord {
                normalized,
                at: Instant::now(),
            },
        );
        self.detect_similar_error()
    }

    pub fn record_decision(&mut self, action: &str) -> Option<LoopKind> {
        Self::push_bounded(&mut self.decisions, action.to_string());
        self.detect_hesitation()
    }

    fn detect_exact_repeat(&mut self, tool: &str, input: &str) -> Option<LoopKind> {
        let now = Instant::now();
        let matching = self
            .tool_calls
            .iter()
            .filter(|r| r.tool == tool && r.input == input && now.duration_since(r.at) <= self.window)
            .count();
        self.report(LoopKind::ExactRepeat, matching >= self.repeat_threshold)
    }

    fn detect_similar_error(&mut self) -> Option<LoopKind> {
        if self.errors.len() < self.repeat_threshold {
            return None;
        }
        let recent: Vec<&str> = self
            .errors
            .iter()
            .rev()
            .take(self.repeat_threshold)
            .map(|r| r.normalized.as_str())
            .collect();
        let anchor = recent[0];
        let all_similar = recent
            .iter()
            .all(|candidate| jaccard_similarity(anchor, candidate) >= SIMILARITY_THRESHOLD);
        self.report(LoopKind::SimilarError, all_similar)
    }

    /// A↔B pattern repeated in the last six transitions.
    pub fn detect_state_oscillation(&mut self, last_six: &[(String, String)]) -> Option<LoopKind> {
        if last_six.len() < 4 {
            return self.report(LoopKind::StateOscillation, false);
        }
        let oscillating = last_six.windows(2).all(|pair| {
            let (a_from, a_to) = &pair[0];
            let (b_from, b_to) = &pair[1];
            a_from == b_to && a_to == b_from
        });
        self.report(LoopKind::StateOscillation, oscillating)
    }

    fn detect_hesitation(&mut self) -> Option<LoopKind> {
        if self.decisions.len() < self.repeat_threshold {
            return None;
        }
        let all_same = self
            .decisions
            .iter()
            .rev()
            .take(self.repeat_threshold)
            .collect::<HashSet<_>>()
            .len()
            == 1;
        self.report(LoopKind::DecisionHesitation, all_same)
    }

    fn report(&mut self, kind: LoopKind, detected: bool) -> Option<LoopKind> {
        if !detected {
            return None;
        }
        if self.auto_break && self.broken.contains(&kind) {
            return None;
        }
        if self.auto_break {
            self.broken.insert(kind);
        }
        Some(kind)
    }
}

static DIGIT_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").unwrap());
static PATH_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(/[\w.\-]+)+").unwrap());
static QUOTED_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r#"'[^']*'|"[^"]*""#).unwrap());

fn normalize_error(message: &str) -> String {
    let step1 = PATH_PATTERN.replace_all(message, "/PATH");
    let step2 = QUOTED_PATTERN.replace_all(&step1, "STR");
    DIGIT_PATTERN.replace_all(&step2, "N").to_string()
}

fn jaccard_similarity(a: &str, b: &str) -> f64 {
    let tokens_a: HashSet<&str> = a.split_whitespace().collect();
    let tokens_b: HashSet<&str> = b.split_whitespace().collect();
    if tokens_a.is_empty() && tokens_b.is_empty() {
        return 1.0;
    }
    let intersection = tokens_a.intersection(&tokens_b).count() as f64;
    let union = tokens_a.union(&tokens_b).count() as f64;
    if union == 0.0 {
        0.0
    } else {
        intersection / union
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn three_identical_calls_within_window_trigger_exact_repeat() {
        let mut guard = LoopGuard::new(false);
        assert_eq!(guard.record_tool_call("write", "{\"path\":\"a\"}"), None);
        assert_eq!(guard.record_tool_call("write", "{\"path\":\"a\"}"), None);
        assert_eq!(
            guard.record_tool_call("write", "{\"path\":\"a\"}"),
            Some(LoopKind::ExactRepeat)
        );
    }

    #[test]
    fn auto_break_suppresses_repeat_reports_after_first() {
        let mut guard = LoopGuard::new(true);
        guard.record_tool_call("write", "x");
        guard.record_tool_call("write", "x");
        assert!(guard.record_tool_call("write", "x").is_some());
        assert!(guard.record_tool_call("write", "x").is_none());
    }

    #[test]
    fn similar_errors_after_normalization_trigger_loop() {
        let mut guard = LoopGuard::new(false);
        guard.record_tool_error("file '/tmp/data1' not found at line 10");
        guard.record_tool_error("file '/tmp/data2' not found at line 42");
        let result = guard.record_tool_error("file '/tmp/data3' not found at line 7");
        assert_eq!(result, Some(LoopKind::SimilarError));
    }

    #[test]
    fn state_oscillation_requires_ab_ab_pattern() {
        let mut guard = LoopGuard::new(false);
        let history = vec![
            ("A".to_string(), "B".to_string()),
            ("B".to_string(), "A".to_string()),
            ("A".to_string(), "B".to_string()),
            ("B".to_string(), "A".to_string()),
        ];
        assert_eq!(
            guard.detect_state_oscillation(&history),
            Some(LoopKind::StateOscillation)
        );
    }

    #[test]
    fn repeated_decision_type_triggers_hesitation() {
        let mut guard = LoopGuard::new(false);
        guard.record_decision("pause");
        guard.record_decision("pause");
        assert_eq!(guard.record_decision("pause"), Some(LoopKind::DecisionHesitation));
    }
}
