use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use autoloop_types::{AutonomyLevel, SessionId};

use crate::resource::ResourceUsage;
use crate::state_machine::SessionState;

/// Root aggregate, §3 `Session`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: SessionId,
    pub request_id: String,
    pub original_request: String,
    pub state: SessionState,
    pub started_at: DateTime<Utc>,
    pub resource_usage: ResourceUsage,
    pub iteration: u32,
    pub working_directory: PathBuf,
    pub autonomy: AutonomyLevel,
}

impl Session {
    pub fn new(original_request: impl Into<String>, working_directory: PathBuf, autonomy: AutonomyLevel) -> Self {
        Self {
            session_id: SessionId::new(),
            request_id: autoloop_types::new_id(),
            original_request: original_request.into(),
            state: SessionState::Idle,
            started_at: Utc::now(),
            resource_usage: ResourceUsage::default(),
            iteration: 0,
            working_directory,
            autonomy,
        }
    }
}
