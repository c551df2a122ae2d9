//! Entity tag domain type

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque version marker returned by the store with a query result
///
/// Kept verbatim (including any quotes or weak prefix) so it can be echoed
/// back in `If-None-Match` / `If-Match` headers without reinterpretation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityTag(String);

impl EntityTag {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityTag {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for EntityTag {
    fn from(value: String) -> Self {
        Self(value)
    }
}
