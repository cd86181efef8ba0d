//! Communication subjects and subject groups.

use crate::TypeFallback;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A named domain that partitions which commands and notifications are
/// relevant to an application purpose.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommunicationSubject(String);

impl CommunicationSubject {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CommunicationSubject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What one endpoint offers for one subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectGroup {
    pub subject: CommunicationSubject,
    pub commands: Vec<TypeFallback>,
    pub notifications: Vec<TypeFallback>,
}

impl SubjectGroup {
    pub fn new(subject: CommunicationSubject) -> Self {
        Self {
            subject,
            commands: Vec::new(),
            notifications: Vec::new(),
        }
    }
}

/// The subjects an endpoint participates in, sent during the handshake.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolDescription {
    pub subjects: Vec<CommunicationSubject>,
}

impl ProtocolDescription {
    pub fn new(subjects: Vec<CommunicationSubject>) -> Self {
        Self { subjects }
    }

    /// Subjects listed by both descriptions, in this description's order.
    pub fn shared_subjects(&self, other: &ProtocolDescription) -> Vec<CommunicationSubject> {
        self.subjects
            .iter()
            .filter(|s| other.subjects.contains(s))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_subjects() {
        let a = ProtocolDescription::new(vec![
            CommunicationSubject::new("build"),
            CommunicationSubject::new("deploy"),
        ]);
        let b = ProtocolDescription::new(vec![CommunicationSubject::new("deploy")]);
        assert_eq!(a.shared_subjects(&b), vec![CommunicationSubject::new("deploy")]);
        assert!(a.shared_subjects(&ProtocolDescription::default()).is_empty());
    }
}
