use serde::{Deserialize, Serialize};

use autoloop_metrics::{CrazinessBreakdown, QualityBreakdown};

/// What one call to [`crate::Orchestrator::process`] settled on.
#[derive(Debug, Clone)]
pub enum SessionOutcome {
    Completed(SessionReport),
    Paused { reason: String },
    Blocked { reason: String },
    Failed { reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionReport {
    pub iterations: u32,
    pub quality: ReportScore,
    pub craziness: ReportScore,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportScore {
    pub total: f64,
}

impl From<&QualityBreakdown> for ReportScore {
    fn from(value: &QualityBreakdown) -> Self {
        Self { total: value.total }
    }
}

impl From<&CrazinessBreakdown> for ReportScore {
    fn from(value: &CrazinessBreakdown) -> Self {
        Self { total: value.total }
    }
}
