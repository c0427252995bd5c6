use thiserror::Error;

use crate::loop_detection::LoopKind;
use autoloop_core::ResourceAxis;

#[derive(Debug, Error)]
pub enum SafetyError {
    #[error("resource axis {axis:?} is at or over its limit")]
    ResourceExceeded { axis: ResourceAxis },
    #[error("behavioral loop detected: {kind:?}")]
    LoopDetected { kind: LoopKind },
    #[error("destructive operation blocked: {reason}")]
    DestructiveBlocked { reason: String },
}
