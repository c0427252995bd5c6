//! Extracts requirements from a free-text request and tracks their
//! completion status as acceptance criteria are checked off.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use autoloop_types::{new_id, Priority, RequirementId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptanceCriterion {
    pub description: String,
    pub passed: bool,
}

impl AcceptanceCriterion {
    fn pending(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            passed: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequirementStatus {
    Pending,
    InProgress,
    Completed,
    Blocked,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Requirement {
    pub id: RequirementId,
    pub description: String,
    pub priority: Priority,
    pub criteria: Vec<AcceptanceCriterion>,
    pub derived: bool,
    pub blocked: bool,
}

impl Requirement {
    fn new(description: impl Into<String>, priority: Priority, derived: bool) -> Self {
        let description = description.into();
        Self {
            id: RequirementId::from(new_id()),
            criteria: vec![
                AcceptanceCriterion::pending("implementation matches description"),
                AcceptanceCriterion::pending("code follows style"),
                AcceptanceCriterion::pending("tests cover the functionality"),
            ],
            description,
            priority,
            derived,
            blocked: false,
        }
    }

    /// `completed` iff every criterion passed; `blocked` iff any failed
    /// (modeled here as explicitly marked, see [`Requirement::mark_failed`]);
    /// else `in_progress` if any passed; else `pending`.
    pub fn status(&self) -> RequirementStatus {
        if self.blocked {
            return RequirementStatus::Blocked;
        }
        if self.criteria.iter().all(|c| c.passed) {
            RequirementStatus::Completed
        } else if self.criteria.iter().any(|c| c.passed) {
            RequirementStatus::InProgress
        } else {
            RequirementStatus::Pending
        }
    }

    pub fn mark_criterion(&mut self, index: usize, passed: bool) {
        if let Some(criterion) = self.criteria.get_mut(index) {
            criterion.passed = passed;
        }
    }

    pub fn mark_failed(&mut self) {
        self.blocked = true;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImplicitRequirement {
    pub description: String,
    pub keyword: &'static str,
}

static MUST_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(must|shall)\b[^.;\n]*").unwrap());
static SHOULD_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bshould\b[^.;\n]*").unwrap());
static COULD_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(could|nice.to.have)\b[^.;\n]*").unwrap());
static MIGHT_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(might|optional(?:ly)?)\b[^.;\n]*").unwrap());

const IMPLICIT_KEYWORDS: &[(&str, &str)] = &[
    ("test", "test coverage"),
    ("error", "error handling"),
    ("document", "documentation"),
];

/// Extracts explicit requirements from `text` by priority-tagged
/// patterns. Falls back to treating the whole request as a single
/// high-priority requirement when nothing matches. Implicit
/// requirements (informational only) are returned separately.
pub fn parse_requirements(text: &str) -> (Vec<Requirement>, Vec<ImplicitRequirement>) {
    let mut requirements = Vec::new();

    for capture in MUST_PATTERN.find_iter(text) {
        requirements.push(Requirement::new(capture.as_str().trim(), Priority::Critical, false));
    }
    for capture in SHOULD_PATTERN.find_iter(text) {
        requirements.push(Requirement::new(capture.as_str().trim(), Priority::High, false));
    }
    for capture in COULD_PATTERN.find_iter(text) {
        requirements.push(Requirement::new(capture.as_str().trim(), Priority::Medium, false));
    }
    for capture in MIGHT_PATTERN.find_iter(text) {
        requirements.push(Requirement::new(capture.as_str().trim(), Priority::Low, false));
    }

    if requirements.is_empty() {
        requirements.push(Requirement::new(text.trim(), Priority::High, false));
    }

    let lower = text.to_lowercase();
    let implicit = IMPLICIT_KEYWORDS
        .iter()
        .filter(|(keyword, _)| lower.contains(keyword))
        .map(|(keyword, description)| ImplicitRequirement {
            description: description.to_string(),
            keyword,
        })
        .collect();

    (requirements, implicit)
}

/// Appends a discovery made mid-session as a derived requirement.
pub fn add_derived_requirement(
    requirements: &mut Vec<Requirement>,
    description: impl Into<String>,
    priority: Priority,
) -> RequirementId {
    let requirement = Requirement::new(description, priority, true);
    let id = requirement.id.clone();
    requirements.push(requirement);
    id
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn must_clause_becomes_critical_requirement() {
        let (reqs, _) = parse_requirements("The API must return 200 on success.");
        assert_eq!(reqs[0].priority, Priority::Critical);
    }

    #[test]
    fn unmatched_text_becomes_single_high_priority_requirement() {
        let (reqs, _) = parse_requirements("implement add(a, b)");
        assert_eq!(reqs.len(), 1);
        assert_eq!(reqs[0].priority, Priority::High);
    }

    #[test]
    fn status_progresses_with_criteria() {
        let mut req = Requirement::new("x", Priority::High, false);
        assert_eq!(req.status(), RequirementStatus::Pending);
        req.mark_criterion(0, true);
        assert_eq!(req.status(), RequirementStatus::InProgress);
        req.mark_criterion(1, true);
        req.mark_criterion(2, true);
        assert_eq!(req.status(), RequirementStatus::Completed);
    }

    #[test]
    fn marking_failed_blocks_regardless_of_criteria() {
        let mut req = Requirement::new("x", Priority::High, false);
        req.mark_criterion(0, true);
        req.mark_failed();
        assert_eq!(req.status(), RequirementStatus::Blocked);
    }

    #[test]
    fn implicit_requirements_are_keyword_detected() {
        let (_, implicit) = parse_requirements("must add tests and handle errors");
        assert!(implicit.iter().any(|r| r.keyword == "test"));
        assert!(implicit.iter().any(|r| r.keyword == "error"));
    }
}
