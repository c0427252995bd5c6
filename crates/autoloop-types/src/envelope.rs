use serde::{Deserialize, Serialize};

/// Current on-disk schema version for every persisted record. Bump this
/// and add an explicit migration path before changing any persisted
/// struct's wire shape.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// Wraps a persisted payload with a schema version, per §3's "persisted
/// record envelope" and §6's versioning requirement. Readers reject a
/// `schema_version` newer than [`CURRENT_SCHEMA_VERSION`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub schema_version: u32,
    #[serde(flatten)]
    pub payload: T,
}

impl<T> Envelope<T> {
    pub fn new(payload: T) -> Self {
        Self {
            schema_version: CURRENT_SCHEMA_VERSION,
            payload,
        }
    }

    pub fn is_supported(&self) -> bool {
        self.schema_version <= CURRENT_SCHEMA_VERSION
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize as _;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Dummy {
        value: u32,
    }

    #[test]
    fn round_trips_through_json() {
        let env = Envelope::new(Dummy { value: 7 });
        let json = serde_json::to_string(&env).unwrap();
        let back: Envelope<Dummy> = serde_json::from_str(&json).unwrap();
        assert_eq!(back.payload, Dummy { value: 7 });
        assert!(back.is_supported());
    }

    #[test]
    fn rejects_future_schema_versions() {
        let mut env = Envelope::new(Dummy { value: 1 });
        env.schema_version = CURRENT_SCHEMA_VERSION + 1;
        assert!(!env.is_supported());
    }
}
