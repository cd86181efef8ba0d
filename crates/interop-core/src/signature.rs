//! Command and notification signatures.
//!
//! A command set or notification set is described by data rather than by a
//! Rust trait, so both the calling and the serving side can build dispatch
//! tables from the same description. Ids are derived from the signature, so
//! two endpoints that describe the same member compute the same id.

use crate::{TypeDescriptor, TypeFallback, Version};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identifier of one command, derived from its signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandId(String);

impl CommandId {
    /// Derive the id of `member` declared on `declaring`.
    pub fn from_signature(
        declaring: &TypeDescriptor,
        member: &str,
        parameters: &[TypeDescriptor],
        returns: Option<&TypeDescriptor>,
    ) -> Self {
        let parameters = parameters
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        let returns = returns.map_or_else(|| "()".to_string(), ToString::to_string);
        Self(format!("[{declaring}]::{member}({parameters}) -> {returns}"))
    }

    /// Rebuild an id from its canonical text, as carried on the wire.
    pub fn from_canonical(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Stable identifier of one notification event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NotificationId {
    interface: TypeDescriptor,
    event: String,
}

impl NotificationId {
    pub fn new(interface: TypeDescriptor, event: impl Into<String>) -> Self {
        Self {
            interface,
            event: event.into(),
        }
    }

    pub fn interface(&self) -> &TypeDescriptor {
        &self.interface
    }

    pub fn event(&self) -> &str {
        &self.event
    }
}

impl fmt::Display for NotificationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]::{}", self.interface, self.event)
    }
}

/// Name and type of one command parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParameterDefinition {
    pub name: String,
    pub ty: TypeDescriptor,
}

impl ParameterDefinition {
    pub fn new(name: impl Into<String>, ty: TypeDescriptor) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// One method of a command set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandDefinition {
    pub id: CommandId,
    pub name: String,
    pub parameters: Vec<ParameterDefinition>,
    /// `None` for commands that only signal completion.
    pub returns: Option<TypeDescriptor>,
}

impl CommandDefinition {
    /// The id this command has when declared on `declaring`, one of the
    /// fallback identities of its interface.
    pub fn id_on(&self, declaring: &TypeDescriptor) -> CommandId {
        let types: Vec<TypeDescriptor> = self.parameters.iter().map(|p| p.ty.clone()).collect();
        CommandId::from_signature(declaring, &self.name, &types, self.returns.as_ref())
    }
}

/// Description of a command interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSetDescriptor {
    interface: TypeDescriptor,
    fallback: TypeFallback,
    commands: Vec<CommandDefinition>,
}

impl CommandSetDescriptor {
    /// Start describing `interface` at `version`.
    pub fn new(interface: TypeDescriptor, version: Version) -> Self {
        Self {
            fallback: TypeFallback::single(interface.clone(), version),
            interface,
            commands: Vec::new(),
        }
    }

    /// Also answer to an older identity of this interface.
    pub fn with_fallback(mut self, descriptor: TypeDescriptor, version: Version) -> Self {
        self.fallback = self.fallback.with_fallback(descriptor, version);
        self
    }

    /// Add a command. Parameters are `(name, type)` pairs in call order.
    pub fn command(
        mut self,
        name: &str,
        parameters: Vec<(&str, TypeDescriptor)>,
        returns: Option<TypeDescriptor>,
    ) -> Self {
        let parameters: Vec<ParameterDefinition> = parameters
            .into_iter()
            .map(|(n, ty)| ParameterDefinition::new(n, ty))
            .collect();
        let types: Vec<TypeDescriptor> = parameters.iter().map(|p| p.ty.clone()).collect();
        let id = CommandId::from_signature(&self.interface, name, &types, returns.as_ref());
        self.commands.push(CommandDefinition {
            id,
            name: name.to_string(),
            parameters,
            returns,
        });
        self
    }

    pub fn interface(&self) -> &TypeDescriptor {
        &self.interface
    }

    pub fn fallback(&self) -> &TypeFallback {
        &self.fallback
    }

    pub fn commands(&self) -> &[CommandDefinition] {
        &self.commands
    }

    pub fn command_named(&self, name: &str) -> Option<&CommandDefinition> {
        self.commands.iter().find(|c| c.name == name)
    }

    pub fn command_by_id(&self, id: &CommandId) -> Option<&CommandDefinition> {
        self.commands.iter().find(|c| &c.id == id)
    }

    /// Every type that crosses the wire for this set.
    pub fn value_types(&self) -> impl Iterator<Item = &TypeDescriptor> {
        self.commands.iter().flat_map(|c| {
            c.parameters
                .iter()
                .map(|p| &p.ty)
                .chain(c.returns.as_ref())
        })
    }
}

/// One event of a notification set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationDefinition {
    pub id: NotificationId,
    pub name: String,
    pub arguments: TypeDescriptor,
}

impl NotificationDefinition {
    pub fn id_on(&self, declaring: &TypeDescriptor) -> NotificationId {
        NotificationId::new(declaring.clone(), self.name.clone())
    }
}

/// Description of a notification interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationSetDescriptor {
    interface: TypeDescriptor,
    fallback: TypeFallback,
    events: Vec<NotificationDefinition>,
}

impl NotificationSetDescriptor {
    pub fn new(interface: TypeDescriptor, version: Version) -> Self {
        Self {
            fallback: TypeFallback::single(interface.clone(), version),
            interface,
            events: Vec::new(),
        }
    }

    pub fn with_fallback(mut self, descriptor: TypeDescriptor, version: Version) -> Self {
        self.fallback = self.fallback.with_fallback(descriptor, version);
        self
    }

    /// Add an event whose handlers receive a value of type `arguments`.
    pub fn event(mut self, name: &str, arguments: TypeDescriptor) -> Self {
        self.events.push(NotificationDefinition {
            id: NotificationId::new(self.interface.clone(), name),
            name: name.to_string(),
            arguments,
        });
        self
    }

    pub fn interface(&self) -> &TypeDescriptor {
        &self.interface
    }

    pub fn fallback(&self) -> &TypeFallback {
        &self.fallback
    }

    pub fn events(&self) -> &[NotificationDefinition] {
        &self.events
    }

    pub fn event_named(&self, name: &str) -> Option<&NotificationDefinition> {
        self.events.iter().find(|e| e.name == name)
    }

    pub fn event_by_id(&self, id: &NotificationId) -> Option<&NotificationDefinition> {
        self.events.iter().find(|e| &e.id == id)
    }
}
