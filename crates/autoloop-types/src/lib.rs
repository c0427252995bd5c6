//! Shared types consumed by every crate in the autonomous execution core.

mod autonomy;
mod envelope;
mod event;
mod ids;
mod metadata;
mod priority;

pub use autonomy::AutonomyLevel;
pub use envelope::{Envelope, CURRENT_SCHEMA_VERSION};
pub use event::{CoreEvent, EventPayload};
pub use ids::{new_id, DecisionId, RequirementId, RunId, SessionId, TaskId};
pub use metadata::MetadataValue;
pub use priority::Priority;
