use serde::{Deserialize, Serialize};
use std::fmt;

/// Generates a fresh opaque identifier. Session ids stay human-diffable in
/// logs, so this is a plain v4 UUID rendered as a string rather than a
/// typed newtype wrapping `Uuid` directly.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

macro_rules! opaque_id {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new() -> Self {
                Self(new_id())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

opaque_id!(SessionId);
opaque_id!(RunId);
opaque_id!(TaskId);
opaque_id!(RequirementId);
opaque_id!(DecisionId);
