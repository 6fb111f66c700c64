use serde::{de::DeserializeOwned, Serialize};

/// Reasons a stored record is rejected on read. A rejected record is treated
/// as absent; it is never partially repaired.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IntegrityError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Signature mismatch")]
    SignatureMismatch,

    #[error("Malformed record: {0}")]
    Malformed(String),
}

/// A value the persistence layer is allowed to hand back to an engine.
///
/// `validate` runs after deserialization; the default accepts any value that
/// deserialized cleanly.
pub trait PersistedRecord: Serialize + DeserializeOwned + Send + Sync {
    fn validate(&self) -> Result<(), IntegrityError> {
        Ok(())
    }
}

impl PersistedRecord for String {}
