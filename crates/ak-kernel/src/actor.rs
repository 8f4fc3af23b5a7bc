// SPDX-License-Identifier: MIT OR Apache-2.0
//! `Actor` (design §3 additions): a non-empty identity newtype so a
//! malformed actor can't reach the gate at all, rather than being caught by
//! `Intent::is_well_formed` after the fact.

use std::fmt;

use ak_error::{AkError, ErrorCode};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Actor(String);

impl Actor {
    /// Construct an `Actor`, rejecting empty or whitespace-only identities.
    pub fn new(id: impl Into<String>) -> Result<Self, AkError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(AkError::new(ErrorCode::PolicyInvalidIntent, "actor identity must not be empty"));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Actor {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_and_whitespace() {
        assert!(Actor::new("").is_err());
        assert!(Actor::new("   ").is_err());
    }

    #[test]
    fn accepts_non_empty() {
        let actor = Actor::new("agent-1").unwrap();
        assert_eq!(actor.as_str(), "agent-1");
        assert_eq!(actor.to_string(), "agent-1");
    }
}
