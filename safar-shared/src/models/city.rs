use serde::{Deserialize, Serialize};

use crate::record::{IntegrityError, PersistedRecord};

/// A terminal city picked as origin or destination.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct City {
    pub code: String,
    pub name: String,
}

impl City {
    pub fn new(code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
        }
    }
}

impl PersistedRecord for City {
    fn validate(&self) -> Result<(), IntegrityError> {
        if self.code.trim().is_empty() {
            return Err(IntegrityError::MissingField("code"));
        }
        Ok(())
    }
}
