use serde::{Deserialize, Serialize};

use crate::config::ResourceBudgetConfig;

/// §3 `ResourceUsage`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ResourceUsage {
    pub tokens_used: u64,
    pub cost_usd: f64,
    pub elapsed_minutes: u64,
    pub files_changed: u64,
    pub actions_performed: u64,
}

/// §3 `ResourceBudget` plus the maxima; surplus ratio is the mean of
/// remaining/limit across every axis, clamped into [0,1].
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ResourceBudget {
    pub max_tokens: u64,
    pub max_cost_usd: f64,
    pub max_elapsed_minutes: u64,
    pub max_files_changed: u64,
    pub max_actions: u64,
}

impl From<ResourceBudgetConfig> for ResourceBudget {
    fn from(cfg: ResourceBudgetConfig) -> Self {
        Self {
            max_tokens: cfg.max_tokens,
            max_cost_usd: cfg.max_cost_usd,
            max_elapsed_minutes: cfg.max_elapsed_minutes,
            max_files_changed: cfg.max_files_changed,
            max_actions: cfg.max_actions,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourceAxis {
    Tokens,
    Cost,
    ElapsedMinutes,
    FilesChanged,
    Actions,
}

impl ResourceBudget {
    fn axis_ratio(&self, axis: ResourceAxis, usage: &ResourceUsage) -> f64 {
        let (used, limit) = match axis {
            ResourceAxis::Tokens => (usage.tokens_used as f64, self.max_tokens as f64),
            ResourceAxis::Cost => (usage.cost_usd, self.max_cost_usd),
            ResourceAxis::ElapsedMinutes => {
                (usage.elapsed_minutes as f64, self.max_elapsed_minutes as f64)
            }
            ResourceAxis::FilesChanged => {
                (usage.files_changed as f64, self.max_files_changed as f64)
            }
            ResourceAxis::Actions => (usage.actions_performed as f64, self.max_actions as f64),
        };
        if limit <= 0.0 {
            return 0.0;
        }
        (used / limit).clamp(0.0, f64::MAX)
    }

    pub fn all_axes() -> [ResourceAxis; 5] {
        [
            ResourceAxis::Tokens,
            ResourceAxis::Cost,
            ResourceAxis::ElapsedMinutes,
            ResourceAxis::FilesChanged,
            ResourceAxis::Actions,
        ]
    }

    /// True when every axis is strictly below its limit. Invariant 6 of
    /// §8 depends on this being the single source of truth for "safe".
    pub fn all_within_limits(&self, usage: &ResourceUsage) -> bool {
        Self::all_axes()
            .iter()
            .all(|axis| self.axis_ratio(*axis, usage) < 1.0)
    }

    pub fn exceeded_axes(&self, usage: &ResourceUsage) -> Vec<ResourceAxis> {
        Self::all_axes()
            .into_iter()
            .filter(|axis| self.axis_ratio(*axis, usage) >= 1.0)
            .collect()
    }

    pub fn axes_above(&self, usage: &ResourceUsage, threshold: f64) -> Vec<ResourceAxis> {
        Self::all_axes()
            .into_iter()
            .filter(|axis| self.axis_ratio(*axis, usage) >= threshold)
            .collect()
    }

    /// Mean of remaining/limit across axes, clamped to [0,1]; used by the
    /// Decision Engine's default CLOSE "surplus" dimension.
    pub fn surplus_ratio(&self, usage: &ResourceUsage) -> f64 {
        let sum: f64 = Self::all_axes()
            .iter()
            .map(|axis| (1.0 - self.axis_ratio(*axis, usage)).clamp(0.0, 1.0))
            .sum();
        sum / Self::all_axes().len() as f64
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
    fn empty_usage_has_full_surplus() {
        let usage = ResourceUsage::default();
        assert_eq!(budget().surplus_ratio(&usage), 1.0);
        assert!(budget().all_within_limits(&usage));
    }

    #[test]
    fn exhausted_axis_is_not_within_limits() {
        let usage = ResourceUsage {
            tokens_used: 1000,
            ..Default::default()
        };
        assert!(!budget().all_within_limits(&usage));
        assert_eq!(budget().exceeded_axes(&usage), vec![ResourceAxis::Tokens]);
    }

    #[test]
    fn warn_threshold_flags_axis_at_eighty_percent() {
        let usage = ResourceUsage {
            tokens_used: 850,
            ..Default::default()
        };
        assert_eq!(budget().axes_above(&usage, 0.8), vec![ResourceAxis::Tokens]);
    }
}
