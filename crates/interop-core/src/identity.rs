//! Endpoint and message identities.
//!
//! An [`EndpointId`] names one communicating process. It is any non-empty
//! string without whitespace; [`EndpointId::random`] produces a fresh one.
//! A [`MessageId`] names one message and is only ever used for correlating
//! a response with its request.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Identity of a process-level communication participant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EndpointId {
    name: String,
}

impl EndpointId {
    /// Create an endpoint identity from a name.
    ///
    /// Panics if the name is empty or contains whitespace; use
    /// [`str::parse`] for untrusted input.
    pub fn named(name: impl Into<String>) -> Self {
        let name = name.into();
        match validate(&name) {
            Ok(()) => Self { name },
            Err(e) => panic!("invalid endpoint name: {e}"),
        }
    }

    /// Create a fresh, never-before-used endpoint identity.
    pub fn random() -> Self {
        Self {
            name: Uuid::new_v4().simple().to_string(),
        }
    }

    /// The endpoint name.
    pub fn as_str(&self) -> &str {
        &self.name
    }
}

fn validate(name: &str) -> Result<(), EndpointIdParseError> {
    if name.is_empty() {
        return Err(EndpointIdParseError::Empty);
    }
    if name.chars().any(char::is_whitespace) {
        return Err(EndpointIdParseError::Whitespace(name.to_string()));
    }
    Ok(())
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl FromStr for EndpointId {
    type Err = EndpointIdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        validate(s)?;
        Ok(Self {
            name: s.to_string(),
        })
    }
}

impl TryFrom<String> for EndpointId {
    type Error = EndpointIdParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        validate(&s)?;
        Ok(Self { name: s })
    }
}

impl From<EndpointId> for String {
    fn from(id: EndpointId) -> Self {
        id.name
    }
}

/// Error parsing an endpoint identity.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EndpointIdParseError {
    #[error("endpoint id cannot be empty")]
    Empty,
    #[error("endpoint id cannot contain whitespace, got: {0:?}")]
    Whitespace(String),
}

/// Identity of a single message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(Uuid);

impl MessageId {
    /// Generate a fresh message id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_endpoint() {
        let id: EndpointId = "alpha".parse().unwrap();
        assert_eq!(id.as_str(), "alpha");
        assert_eq!(id, EndpointId::named("alpha"));
    }

    #[test]
    fn reject_empty_and_whitespace() {
        assert_eq!("".parse::<EndpointId>(), Err(EndpointIdParseError::Empty));
        assert!(matches!(
            "two words".parse::<EndpointId>(),
            Err(EndpointIdParseError::Whitespace(_))
        ));
    }

    #[test]
    fn random_endpoints_differ() {
        assert_ne!(EndpointId::random(), EndpointId::random());
    }

    #[test]
    fn serde_roundtrip() {
        let id = EndpointId::named("beta");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"beta\"");
        let back: EndpointId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
        assert!(serde_json::from_str::<EndpointId>("\"\"").is_err());
    }

    #[test]
    fn message_ids_are_fresh() {
        let a = MessageId::new();
        let b = MessageId::new();
        assert_ne!(a, b);
        assert_eq!(a, MessageId::from_uuid(*a.as_uuid()));
    }
}
