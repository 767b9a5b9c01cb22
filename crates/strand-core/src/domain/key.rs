//! Ordering key for key-sequenced tasks.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A strand key identifies the set of tasks that must run one at a time, in
/// arrival order (commonly a user id). Tasks without a key carry no ordering
/// constraint relative to anything else.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StrandKey(String);

impl StrandKey {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for StrandKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for StrandKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for StrandKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
