use serde::{Deserialize, Serialize};

/// Ordinal risk-tolerance setting, most to least aggressive. Governs the
/// Decision Engine's approval/caution thresholds and the craziness-score
/// level mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AutonomyLevel {
    Timid,
    Bold,
    Wild,
    Crazy,
    Insane,
    Lunatic,
}

impl AutonomyLevel {
    /// Approval/caution CLOSE-score thresholds, per §4.3.
    pub fn thresholds(self) -> (f64, f64) {
        match self {
            AutonomyLevel::Lunatic => (5.0, 3.0),
            AutonomyLevel::Insane => (5.5, 3.5),
            AutonomyLevel::Crazy => (6.0, 4.0),
            AutonomyLevel::Wild => (6.5, 4.5),
            AutonomyLevel::Bold => (7.0, 5.0),
            AutonomyLevel::Timid => (8.0, 6.0),
        }
    }

    pub fn is_unattended(self) -> bool {
        matches!(
            self,
            AutonomyLevel::Crazy | AutonomyLevel::Insane | AutonomyLevel::Lunatic
        )
    }
}

impl Default for AutonomyLevel {
    fn default() -> Self {
        AutonomyLevel::Bold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_is_risk_ascending() {
        assert!(AutonomyLevel::Timid < AutonomyLevel::Bold);
        assert!(AutonomyLevel::Bold < AutonomyLevel::Lunatic);
    }

    #[test]
    fn thresholds_loosen_with_autonomy() {
        let (timid_approval, _) = AutonomyLevel::Timid.thresholds();
        let (lunatic_approval, _) = AutonomyLevel::Lunatic.thresholds();
        assert!(lunatic_approval < timid_approval);
    }
}
