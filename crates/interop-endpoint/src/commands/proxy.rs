//! Local stand-ins for remote command sets.

use crate::error::CommandError;
use crate::gateway::{MessageGateway, PendingResponse};
use interop_core::{
    CommandArgument, CommandDefinition, CommandSetDescriptor, EndpointId, MessageBody, MessageId,
    ObjectValue, SerializerRegistry, TypeDescriptor,
};
use std::any::Any;
use std::sync::Arc;

/// A typed adapter over a [`CommandProxy`] for one command interface.
pub trait RemoteCommandSet: Sized + Send + Sync + 'static {
    fn descriptor() -> CommandSetDescriptor;

    fn from_proxy(proxy: CommandProxy) -> Self;
}

/// Calls the commands of one interface on one remote endpoint.
#[derive(Clone)]
pub struct CommandProxy {
    descriptor: Arc<CommandSetDescriptor>,
    endpoint: EndpointId,
    gateway: Arc<MessageGateway>,
    /// The identity of the interface the remote answers to.
    wire_interface: TypeDescriptor,
}

impl std::fmt::Debug for CommandProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandProxy")
            .field("interface", self.descriptor.interface())
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

impl CommandProxy {
    /// Build a proxy, checking that every value type of the interface can
    /// be put on the wire.
    pub fn build(
        descriptor: Arc<CommandSetDescriptor>,
        endpoint: EndpointId,
        gateway: Arc<MessageGateway>,
        serializers: &SerializerRegistry,
    ) -> Result<Self, CommandError> {
        if let Some(ty) = descriptor
            .value_types()
            .find(|ty| !serializers.has_serializer_for(ty))
        {
            return Err(CommandError::MissingObjectDataSerializer(ty.clone()));
        }
        Ok(Self {
            wire_interface: descriptor.interface().clone(),
            descriptor,
            endpoint,
            gateway,
        })
    }

    /// Address the remote's set under `interface`, an older identity from
    /// the fallback chain that it offered instead of the preferred one.
    pub fn speaking(mut self, interface: TypeDescriptor) -> Self {
        self.wire_interface = interface;
        self
    }

    pub fn wire_interface(&self) -> &TypeDescriptor {
        &self.wire_interface
    }

    pub fn descriptor(&self) -> &CommandSetDescriptor {
        &self.descriptor
    }

    pub fn endpoint(&self) -> &EndpointId {
        &self.endpoint
    }

    /// Send a call to `command` and return a handle to its outcome.
    pub async fn invoke(
        &self,
        command: &str,
        arguments: Vec<ObjectValue>,
    ) -> Result<PendingCommand, CommandError> {
        let definition = self.descriptor.command_named(command).ok_or_else(|| {
            CommandError::CommandNotSupported {
                interface: self.descriptor.interface().clone(),
                command: command.to_string(),
            }
        })?;
        if definition.parameters.len() != arguments.len() {
            return Err(CommandError::InvalidArgumentCount {
                command: command.to_string(),
                expected: definition.parameters.len(),
                actual: arguments.len(),
            });
        }
        let arguments = definition
            .parameters
            .iter()
            .zip(arguments)
            .map(|(parameter, value)| {
                if value.descriptor() != &parameter.ty {
                    return Err(CommandError::ArgumentType {
                        parameter: parameter.name.clone(),
                        expected: parameter.ty.clone(),
                        actual: value.descriptor().clone(),
                    });
                }
                Ok(CommandArgument {
                    parameter: parameter.clone(),
                    value,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let body = MessageBody::CommandInvoked {
            command: definition.id_on(&self.wire_interface),
            arguments,
        };
        let response = self.gateway.send_for_response(&self.endpoint, body).await?;
        Ok(PendingCommand {
            definition: definition.clone(),
            response,
        })
    }

    /// Call `command` and wait for its outcome.
    pub async fn call(
        &self,
        command: &str,
        arguments: Vec<ObjectValue>,
    ) -> Result<Option<ObjectValue>, CommandError> {
        self.invoke(command, arguments).await?.outcome().await
    }
}

/// A command call whose reply has not arrived yet.
pub struct PendingCommand {
    definition: CommandDefinition,
    response: PendingResponse,
}

impl PendingCommand {
    /// Id of the `CommandInvoked` message; its reply answers this id.
    pub fn request_id(&self) -> MessageId {
        self.response.request_id()
    }

    /// Wait for the reply. `None` for commands that only signal completion.
    pub async fn outcome(self) -> Result<Option<ObjectValue>, CommandError> {
        let name = self.definition.name;
        let reply = self.response.wait().await?;
        match (self.definition.returns, reply.body) {
            (None, MessageBody::Success) => Ok(None),
            (Some(expected), MessageBody::CommandInvokedResponse { result }) => {
                if result.descriptor() != &expected {
                    return Err(CommandError::ResultType {
                        command: name,
                        expected,
                        actual: result.descriptor().clone(),
                    });
                }
                Ok(Some(result))
            }
            (_, MessageBody::Failure) => Err(CommandError::CommandInvocationFailed(name)),
            (_, other) => Err(CommandError::UnexpectedResponse {
                command: name,
                kind: other.kind(),
            }),
        }
    }

    /// Wait for a command that returns nothing.
    pub async fn completion(self) -> Result<(), CommandError> {
        self.outcome().await.map(|_| ())
    }

    /// Wait for a command's return value as a `T`.
    pub async fn value<T: Any + Clone>(self) -> Result<T, CommandError> {
        let name = self.definition.name.clone();
        let result = self.outcome().await?;
        match result.as_ref().and_then(|v| v.cloned::<T>()) {
            Some(value) => Ok(value),
            None => Err(CommandError::ResultType {
                command: name,
                expected: TypeDescriptor::of::<T>(),
                actual: result.map_or_else(TypeDescriptor::of::<()>, |v| v.descriptor().clone()),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ChannelError;
    use crate::gateway::testing::{RecordingTransport, gateway};
    use interop_core::{Message, MessageKind, Version};

    fn descriptor() -> Arc<CommandSetDescriptor> {
        let string = TypeDescriptor::of::<String>();
        Arc::new(
            CommandSetDescriptor::new(
                TypeDescriptor::new("Acme.TestCommandSet", "acme"),
                Version::new(1, 0, 0),
            )
            .command("echo", vec![("name", string.clone())], None)
            .command("greet", vec![("name", string.clone())], Some(string)),
        )
    }

    fn remote() -> EndpointId {
        EndpointId::named("remote")
    }

    fn proxy(gateway: Arc<MessageGateway>) -> CommandProxy {
        CommandProxy::build(descriptor(), remote(), gateway, &SerializerRegistry::with_defaults())
            .unwrap()
    }

    #[tokio::test]
    async fn successful_call() {
        let (transport, mut sent) = RecordingTransport::new();
        let gateway = gateway(transport);
        let proxy = proxy(gateway.clone());

        let pending = proxy
            .invoke("echo", vec![ObjectValue::new(String::from("hi"))])
            .await
            .unwrap();
        let (to, call) = sent.recv().await.unwrap();
        assert_eq!(to, remote());
        assert_eq!(call.id, pending.request_id());
        let MessageBody::CommandInvoked { command, arguments } = &call.body else {
            panic!("expected a command call");
        };
        assert_eq!(command, &descriptor().command_named("echo").unwrap().id);
        assert_eq!(arguments[0].parameter.name, "name");
        assert_eq!(arguments[0].value.cloned::<String>().as_deref(), Some("hi"));

        assert!(gateway.try_complete(&Message::response(remote(), call.id, MessageBody::Success)));
        pending.completion().await.unwrap();
    }

    #[tokio::test]
    async fn typed_return() {
        let (transport, mut sent) = RecordingTransport::new();
        let gateway = gateway(transport);
        let pending = proxy(gateway.clone())
            .invoke("greet", vec![ObjectValue::new(String::from("bob"))])
            .await
            .unwrap();
        let (_, call) = sent.recv().await.unwrap();
        gateway.try_complete(&Message::response(
            remote(),
            call.id,
            MessageBody::CommandInvokedResponse {
                result: ObjectValue::new(String::from("hello bob")),
            },
        ));
        assert_eq!(pending.value::<String>().await.unwrap(), "hello bob");
    }

    #[tokio::test]
    async fn typed_return_fault() {
        let (transport, mut sent) = RecordingTransport::new();
        let gateway = gateway(transport);
        let pending = proxy(gateway.clone())
            .invoke("greet", vec![ObjectValue::new(String::from("bob"))])
            .await
            .unwrap();
        let (_, call) = sent.recv().await.unwrap();
        gateway.try_complete(&Message::response(remote(), call.id, MessageBody::Failure));
        assert!(matches!(
            pending.outcome().await,
            Err(CommandError::CommandInvocationFailed(name)) if name == "greet"
        ));
    }

    #[tokio::test]
    async fn unexpected_reply_kind() {
        let (transport, mut sent) = RecordingTransport::new();
        let gateway = gateway(transport);
        let pending = proxy(gateway.clone())
            .invoke("echo", vec![ObjectValue::new(String::from("x"))])
            .await
            .unwrap();
        let (_, call) = sent.recv().await.unwrap();
        gateway.try_complete(&Message::response(
            remote(),
            call.id,
            MessageBody::UnknownMessageType,
        ));
        assert!(matches!(
            pending.outcome().await,
            Err(CommandError::UnexpectedResponse {
                kind: MessageKind::UnknownMessageType,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn disconnect_faults_pending_call() {
        let (transport, _sent) = RecordingTransport::new();
        let gateway = gateway(transport);
        let pending = proxy(gateway.clone())
            .invoke("echo", vec![ObjectValue::new(String::from("x"))])
            .await
            .unwrap();
        gateway.fail_pending_for(&remote());
        assert!(matches!(
            pending.outcome().await,
            Err(CommandError::Channel(ChannelError::Disconnected(_)))
        ));
    }

    #[tokio::test]
    async fn call_validation() {
        let (transport, _sent) = RecordingTransport::new();
        let proxy = proxy(gateway(transport));
        assert!(matches!(
            proxy.invoke("shout", vec![]).await,
            Err(CommandError::CommandNotSupported { .. })
        ));
        assert!(matches!(
            proxy.invoke("echo", vec![]).await,
            Err(CommandError::InvalidArgumentCount {
                expected: 1,
                actual: 0,
                ..
            })
        ));
        assert!(matches!(
            proxy.invoke("echo", vec![ObjectValue::new(3i32)]).await,
            Err(CommandError::ArgumentType { .. })
        ));
    }

    #[tokio::test]
    async fn older_identity_on_the_wire() {
        let (transport, mut sent) = RecordingTransport::new();
        let old = TypeDescriptor::new("Acme.OldCommandSet", "acme");
        let proxy = proxy(gateway(transport)).speaking(old.clone());
        let _pending = proxy
            .invoke("echo", vec![ObjectValue::new(String::from("x"))])
            .await
            .unwrap();
        let (_, call) = sent.recv().await.unwrap();
        let MessageBody::CommandInvoked { command, .. } = &call.body else {
            panic!("expected a command call");
        };
        let echo = descriptor().command_named("echo").unwrap().clone();
        assert_eq!(command, &echo.id_on(&old));
        assert_ne!(command, &echo.id);
    }

    #[tokio::test]
    async fn build_requires_serializers() {
        let (transport, _sent) = RecordingTransport::new();
        let result = CommandProxy::build(
            descriptor(),
            remote(),
            gateway(transport),
            &SerializerRegistry::new(),
        );
        assert!(matches!(result, Err(CommandError::MissingObjectDataSerializer(_))));
    }
}
