use std::collections::HashSet;

use autoloop_core::{ResourceAxis, ResourceBudget, ResourceUsage};

use crate::errors::SafetyError;

/// (a) Resource guard. Refuses when any axis is at or over its limit
/// and emits a one-shot warning per axis the first time it crosses
/// `warn_threshold` (default 80%).
pub struct ResourceGuard {
    budget: ResourceBudget,
    warn_threshold: f64,
    warned: HashSet<ResourceAxis>,
}

impl ResourceGuard {
    pub fn new(budget: ResourceBudget, warn_threshold: f64) -> Self {
        Self {
            budget,
            warn_threshold,
            warned: HashSet::new(),
        }
    }

    /// Returns newly-crossed warning axes (to publish `resource.warning`
    /// for) and, if any axis is exhausted, the first exceeded error.
    pub fn check(&mut self, usage: &ResourceUsage) -> (Vec<ResourceAxis>, Option<SafetyError>) {
        let mut new_warnings = Vec::new();
        for axis in self.budget.axes_above(usage, self.warn_threshold) {
            if self.warned.insert(axis) {
                new_warnings.push(axis);
            }
        }

        let exceeded = self.budget.exceeded_axes(usage);
        let error = exceeded
            .first()
            .map(|axis| SafetyError::ResourceExceeded { axis: *axis });

        (new_warnings, error)
    }

    pub fn is_within_limits(&self, usage: &ResourceUsage) -> bool {
        self.budget.all_within_limits(usage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn budget() -> ResourceBudget {
        ResourceBudget {
            max_tokens: 1000,
            max_cost_usd: 10.0,
            max_elapsed_minutes: 60,
            max_files_changed: 50,
            max_actions: 100,
        }
    }

    #[test]
    fn warning_is_reported_once_per_axis() {
        let mut guard = ResourceGuard::new(budget(), 0.8);
        let usage = ResourceUsage {
            tokens_used: 900,
            ..Default::default()
        };
        let (warnings, error) = guard.check(&usage);
        assert_eq!(warnings, vec![ResourceAxis::Tokens]);
        assert!(error.is_none());

        let (warnings_again, _) = guard.check(&usage);
        assert!(warnings_again.is_empty());
    }

    #[test]
    fn exhausted_axis_yields_error() {
        let mut guard = ResourceGuard::new(budget(), 0.8);
        let usage = ResourceUsage {
            tokens_used: 1000,
            ..Default::default()
        };
        let (_, error) = guard.check(&usage);
        assert!(matches!(error, Some(SafetyError::ResourceExceeded { axis: ResourceAxis::Tokens })));
    }
}
