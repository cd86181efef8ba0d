//! Subject group evaluation.
//!
//! Each endpoint describes, per subject, the capabilities it provides and the
//! ones it wants from its peers. When a peer's offer arrives, the shared
//! subjects decide whether the two interact; within them, every local
//! requirement is matched against the offer by type fallback.

use interop_core::{
    CommunicationSubject, InteractionConnectionState, ProtocolDescription, SubjectGroup,
    TypeFallback,
};

#[derive(Debug, Clone, Default)]
pub struct CommunicationDescription {
    provided: Vec<SubjectGroup>,
    required: Vec<SubjectGroup>,
}

impl CommunicationDescription {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn provide_commands(&mut self, subject: CommunicationSubject, fallback: TypeFallback) {
        group_mut(&mut self.provided, subject).commands.push(fallback);
    }

    pub fn provide_notifications(&mut self, subject: CommunicationSubject, fallback: TypeFallback) {
        group_mut(&mut self.provided, subject).notifications.push(fallback);
    }

    pub fn require_commands(&mut self, subject: CommunicationSubject, fallback: TypeFallback) {
        group_mut(&mut self.required, subject).commands.push(fallback);
    }

    pub fn require_notifications(&mut self, subject: CommunicationSubject, fallback: TypeFallback) {
        group_mut(&mut self.required, subject).notifications.push(fallback);
    }

    pub fn provided(&self) -> &[SubjectGroup] {
        &self.provided
    }

    pub fn required(&self) -> &[SubjectGroup] {
        &self.required
    }

    /// One group per subject this endpoint takes part in, empty where it
    /// only consumes. Sent as its interaction information, so a pure
    /// consumer still shares its subjects.
    pub fn offered_groups(&self) -> Vec<SubjectGroup> {
        self.protocol_description()
            .subjects
            .into_iter()
            .map(|subject| {
                self.provided
                    .iter()
                    .find(|g| g.subject == subject)
                    .cloned()
                    .unwrap_or_else(|| SubjectGroup::new(subject))
            })
            .collect()
    }

    /// Every subject this endpoint takes part in, for the handshake.
    pub fn protocol_description(&self) -> ProtocolDescription {
        let mut subjects: Vec<CommunicationSubject> = self
            .provided
            .iter()
            .chain(&self.required)
            .map(|g| g.subject.clone())
            .collect();
        subjects.sort();
        subjects.dedup();
        ProtocolDescription::new(subjects)
    }

    /// Match a peer's offered groups against local requirements.
    pub fn evaluate(&self, offered: &[SubjectGroup]) -> InteractionEvaluation {
        let local = self.protocol_description();
        let mut evaluation = InteractionEvaluation::default();
        for group in offered {
            if !local.subjects.contains(&group.subject) {
                tracing::debug!("subject {} is not shared", group.subject);
                continue;
            }
            evaluation.shared_subjects.push(group.subject.clone());
            let required = self.required.iter().find(|g| g.subject == group.subject);
            let Some(required) = required else {
                continue;
            };
            partition(
                &required.commands,
                &group.commands,
                &mut evaluation.commands,
                &mut evaluation.missing_commands,
            );
            partition(
                &required.notifications,
                &group.notifications,
                &mut evaluation.notifications,
                &mut evaluation.missing_notifications,
            );
        }
        evaluation
    }
}

fn group_mut(groups: &mut Vec<SubjectGroup>, subject: CommunicationSubject) -> &mut SubjectGroup {
    let index = match groups.iter().position(|g| g.subject == subject) {
        Some(index) => index,
        None => {
            groups.push(SubjectGroup::new(subject));
            groups.len() - 1
        }
    };
    &mut groups[index]
}

/// Sort each requirement into matched (keeping the peer's offer) or missing.
fn partition(
    required: &[TypeFallback],
    offered: &[TypeFallback],
    matched: &mut Vec<TypeFallback>,
    missing: &mut Vec<TypeFallback>,
) {
    for want in required {
        match offered.iter().find(|o| want.is_partial_match(o)) {
            Some(offer) => {
                if let Some(hit) = want.first_match(offer) {
                    tracing::debug!("{} matched as {}", want, hit);
                }
                matched.push(offer.clone());
            }
            None => missing.push(want.clone()),
        }
    }
}

/// Result of matching one peer's offer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InteractionEvaluation {
    pub shared_subjects: Vec<CommunicationSubject>,
    /// Offered command fallbacks that satisfy a local requirement.
    pub commands: Vec<TypeFallback>,
    pub notifications: Vec<TypeFallback>,
    /// Local requirements in shared subjects that the peer does not offer.
    pub missing_commands: Vec<TypeFallback>,
    pub missing_notifications: Vec<TypeFallback>,
}

impl InteractionEvaluation {
    pub fn state(&self) -> InteractionConnectionState {
        if self.shared_subjects.is_empty() {
            InteractionConnectionState::Denied
        } else {
            InteractionConnectionState::Desired
        }
    }
}
