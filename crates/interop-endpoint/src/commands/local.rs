//! Serving command sets to remote endpoints.

use crate::dispatch::ProcessAction;
use crate::error::{ActionError, CommandError};
use crate::gateway::MessageGateway;
use async_trait::async_trait;
use futures_util::future::BoxFuture;
use interop_core::{
    CommandArgument, CommandDefinition, CommandId, CommandSetDescriptor, Message, MessageBody,
    MessageKind, ObjectValue,
};
use parking_lot::RwLock;
use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

/// What a command handler produces: the return value, or `None` for
/// commands without one.
pub type CommandFuture = BoxFuture<'static, Result<Option<ObjectValue>, ActionError>>;

type Handler = Arc<dyn Fn(CommandArguments) -> CommandFuture + Send + Sync>;

/// The arguments of one inbound call, by parameter name.
#[derive(Debug, Clone)]
pub struct CommandArguments {
    arguments: Vec<CommandArgument>,
}

impl CommandArguments {
    pub fn len(&self) -> usize {
        self.arguments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arguments.is_empty()
    }

    pub fn value(&self, name: &str) -> Option<&ObjectValue> {
        self.arguments
            .iter()
            .find(|a| a.parameter.name == name)
            .map(|a| &a.value)
    }

    /// The argument `name` as a `T`.
    pub fn get<T: Any + Clone>(&self, name: &str) -> Result<T, ActionError> {
        let value = self
            .value(name)
            .ok_or_else(|| ActionError::handler(format!("missing argument {name:?}")))?;
        value.cloned::<T>().ok_or_else(|| {
            ActionError::handler(format!(
                "argument {name:?} is a {}, not a {}",
                value.descriptor(),
                interop_core::TypeDescriptor::of::<T>()
            ))
        })
    }
}

/// A command set descriptor with a handler bound to every command.
pub struct LocalCommandSet {
    descriptor: Arc<CommandSetDescriptor>,
    handlers: HashMap<CommandId, Handler>,
}

impl LocalCommandSet {
    pub fn builder(descriptor: CommandSetDescriptor) -> LocalCommandSetBuilder {
        LocalCommandSetBuilder {
            descriptor,
            handlers: HashMap::new(),
            unknown: Vec::new(),
        }
    }

    pub fn descriptor(&self) -> &Arc<CommandSetDescriptor> {
        &self.descriptor
    }
}

pub struct LocalCommandSetBuilder {
    descriptor: CommandSetDescriptor,
    handlers: HashMap<CommandId, Handler>,
    unknown: Vec<String>,
}

impl LocalCommandSetBuilder {
    /// Bind an async handler to the command `name`.
    pub fn on<F, Fut>(mut self, name: &str, handler: F) -> Self
    where
        F: Fn(CommandArguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<ObjectValue>, ActionError>> + Send + 'static,
    {
        let handler: Handler = Arc::new(move |args| Box::pin(handler(args)));
        self.bind(name, handler);
        self
    }

    /// Bind a handler that completes without awaiting.
    pub fn on_sync<F>(mut self, name: &str, handler: F) -> Self
    where
        F: Fn(CommandArguments) -> Result<Option<ObjectValue>, ActionError> + Send + Sync + 'static,
    {
        let handler: Handler = Arc::new(move |args| {
            let result = handler(args);
            Box::pin(async move { result })
        });
        self.bind(name, handler);
        self
    }

    fn bind(&mut self, name: &str, handler: Handler) {
        match self.descriptor.command_named(name) {
            Some(command) => {
                self.handlers.insert(command.id.clone(), handler);
            }
            None => self.unknown.push(name.to_string()),
        }
    }

    /// Fails if a handler names an unknown command or a command has no handler.
    pub fn build(self) -> Result<LocalCommandSet, CommandError> {
        if let Some(command) = self.unknown.into_iter().next() {
            return Err(CommandError::CommandNotSupported {
                interface: self.descriptor.interface().clone(),
                command,
            });
        }
        if let Some(missing) = self
            .descriptor
            .commands()
            .iter()
            .find(|c| !self.handlers.contains_key(&c.id))
        {
            return Err(CommandError::MissingHandler(missing.name.clone()));
        }
        Ok(LocalCommandSet {
            descriptor: Arc::new(self.descriptor),
            handlers: self.handlers,
        })
    }
}

struct Entry {
    definition: CommandDefinition,
    handler: Handler,
}

/// Every command this endpoint serves, by id.
#[derive(Default)]
pub struct LocalCommandRegistry {
    sets: RwLock<Vec<Arc<CommandSetDescriptor>>>,
    commands: RwLock<HashMap<CommandId, Entry>>,
}

impl LocalCommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, set: LocalCommandSet) -> Result<(), CommandError> {
        let LocalCommandSet {
            descriptor,
            mut handlers,
        } = set;
        // Each command answers under every identity of its interface.
        let mut aliases = Vec::new();
        for definition in descriptor.commands() {
            let Some(handler) = handlers.remove(&definition.id) else {
                continue;
            };
            for identity in descriptor.fallback().types() {
                aliases.push((definition.id_on(&identity.descriptor), definition, handler.clone()));
            }
        }

        let mut commands = self.commands.write();
        if let Some((taken, _, _)) = aliases.iter().find(|(id, _, _)| commands.contains_key(id)) {
            return Err(CommandError::DuplicateCommand(taken.to_string()));
        }
        for (id, definition, handler) in aliases {
            commands.insert(
                id,
                Entry {
                    definition: definition.clone(),
                    handler,
                },
            );
        }
        drop(commands);
        tracing::debug!("serving {}", descriptor.interface());
        self.sets.write().push(descriptor);
        Ok(())
    }

    pub fn descriptors(&self) -> Vec<Arc<CommandSetDescriptor>> {
        self.sets.read().clone()
    }

    pub fn contains(&self, command: &CommandId) -> bool {
        self.commands.read().contains_key(command)
    }

    /// Run the handler of `command`.
    ///
    /// A command declared with a return type must produce a value of that
    /// type; one declared without returns `None`.
    pub async fn invoke(
        &self,
        command: &CommandId,
        arguments: Vec<CommandArgument>,
    ) -> Result<Option<ObjectValue>, ActionError> {
        let (definition, handler) = {
            let commands = self.commands.read();
            let entry = commands
                .get(command)
                .ok_or_else(|| CommandError::UnknownCommand(command.clone()))?;
            (entry.definition.clone(), entry.handler.clone())
        };
        if arguments.len() != definition.parameters.len() {
            return Err(CommandError::InvalidArgumentCount {
                command: definition.name,
                expected: definition.parameters.len(),
                actual: arguments.len(),
            }
            .into());
        }

        let result = handler(CommandArguments { arguments }).await?;
        match (&definition.returns, result) {
            (None, _) => Ok(None),
            (Some(expected), Some(value)) if value.descriptor() == expected => Ok(Some(value)),
            (Some(expected), value) => Err(CommandError::ResultType {
                command: definition.name,
                expected: expected.clone(),
                actual: value.map_or_else(interop_core::TypeDescriptor::of::<()>, |v| {
                    v.descriptor().clone()
                }),
            }
            .into()),
        }
    }
}

/// Runs inbound command calls and sends the one reply each call gets.
pub struct CommandInvokedAction(pub Arc<LocalCommandRegistry>);

#[async_trait]
impl ProcessAction for CommandInvokedAction {
    fn kind(&self) -> MessageKind {
        MessageKind::CommandInvoked
    }

    async fn process(
        &self,
        message: &Message,
        gateway: &MessageGateway,
    ) -> Result<(), ActionError> {
        let MessageBody::CommandInvoked { command, arguments } = &message.body else {
            return Err(ActionError::handler("not a command call"));
        };
        let reply = match self.0.invoke(command, arguments.clone()).await? {
            Some(result) => MessageBody::CommandInvokedResponse { result },
            None => MessageBody::Success,
        };
        gateway.reply(message, reply).await?;
        Ok(())
    }
}
