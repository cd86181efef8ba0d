//! A complete endpoint: one gateway, one dispatcher, and the subsystems
//! hanging off them.

use crate::commands::{
    CommandInvokedAction, LocalCommandRegistry, LocalCommandSet, RemoteCommandHub,
};
use crate::config::EndpointConfig;
use crate::connection::{
    CommunicationDescription, ConnectionEvent, ConnectionManager, VerificationResponder,
    connection_actions, spawn_keep_alive,
};
use crate::dispatch::{Dispatched, MessageDispatcher, ProcessAction};
use crate::error::{CommandError, EndpointError, NotificationError};
use crate::gateway::{MessageGateway, MessageTransport};
use crate::notifications::{
    LocalNotificationRegistry, NotificationRaisedAction, RegisterForNotificationAction,
    RemoteNotificationHub, UnregisterFromNotificationAction,
};
use crate::transfer::{DataDownloadAction, DataTransfer, UploadTokenRegistry, request_download};
use interop_core::{
    CommandSetDescriptor, CommunicationSubject, EndpointId, HandshakeState, InteractionState,
    Message, NotificationId, NotificationSetDescriptor, ObjectValue, SerializerRegistry,
    UploadToken,
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub struct EndpointBuilder {
    id: EndpointId,
    config: EndpointConfig,
    serializers: SerializerRegistry,
    description: CommunicationDescription,
    command_sets: Vec<LocalCommandSet>,
    notification_sets: Vec<NotificationSetDescriptor>,
    required_commands: Vec<CommandSetDescriptor>,
    required_notifications: Vec<NotificationSetDescriptor>,
    transfer: Option<Arc<dyn DataTransfer>>,
    responder: Option<VerificationResponder>,
}

impl EndpointBuilder {
    pub fn config(mut self, config: EndpointConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the default serializers.
    pub fn serializers(mut self, serializers: SerializerRegistry) -> Self {
        self.serializers = serializers;
        self
    }

    /// Serve `set` to remotes interested in `subject`.
    pub fn provide_commands(mut self, subject: impl Into<String>, set: LocalCommandSet) -> Self {
        self.description.provide_commands(
            CommunicationSubject::new(subject.into()),
            set.descriptor().fallback().clone(),
        );
        self.command_sets.push(set);
        self
    }

    /// Raise the events of `set` to remotes interested in `subject`.
    pub fn provide_notifications(
        mut self,
        subject: impl Into<String>,
        set: NotificationSetDescriptor,
    ) -> Self {
        self.description.provide_notifications(
            CommunicationSubject::new(subject.into()),
            set.fallback().clone(),
        );
        self.notification_sets.push(set);
        self
    }

    /// Call `set` on remotes that offer it under `subject`.
    pub fn require_commands(
        mut self,
        subject: impl Into<String>,
        set: CommandSetDescriptor,
    ) -> Self {
        self.description.require_commands(
            CommunicationSubject::new(subject.into()),
            set.fallback().clone(),
        );
        self.required_commands.push(set);
        self
    }

    /// Subscribe to `set` on remotes that offer it under `subject`.
    pub fn require_notifications(
        mut self,
        subject: impl Into<String>,
        set: NotificationSetDescriptor,
    ) -> Self {
        self.description.require_notifications(
            CommunicationSubject::new(subject.into()),
            set.fallback().clone(),
        );
        self.required_notifications.push(set);
        self
    }

    /// Serve download requests through `transfer`. Without one, download
    /// requests are answered as unknown messages.
    pub fn data_transfer(mut self, transfer: Arc<dyn DataTransfer>) -> Self {
        self.transfer = Some(transfer);
        self
    }

    pub fn verification_responder(mut self, responder: VerificationResponder) -> Self {
        self.responder = Some(responder);
        self
    }

    /// Every value type of every set must have a serializer.
    fn validate(&self) -> Result<(), EndpointError> {
        let command_types = self
            .command_sets
            .iter()
            .map(|s| &**s.descriptor())
            .chain(&self.required_commands)
            .flat_map(|d| d.value_types());
        for ty in command_types {
            if !self.serializers.has_serializer_for(ty) {
                return Err(CommandError::MissingObjectDataSerializer(ty.clone()).into());
            }
        }
        let event_types = self
            .notification_sets
            .iter()
            .chain(&self.required_notifications)
            .flat_map(|d| d.events())
            .map(|e| &e.arguments);
        for ty in event_types {
            if !self.serializers.has_serializer_for(ty) {
                return Err(NotificationError::MissingObjectDataSerializer(ty.clone()).into());
            }
        }
        Ok(())
    }

    pub fn build(self, transport: Arc<dyn MessageTransport>) -> Result<Endpoint, EndpointError> {
        self.validate()?;
        let serializers = Arc::new(self.serializers);
        let gateway = Arc::new(MessageGateway::new(
            self.id.clone(),
            transport,
            self.config.response_timeout(),
        ));
        let connections = Arc::new(ConnectionManager::new(
            gateway.clone(),
            self.config.clone(),
            self.description,
        ));
        if let Some(responder) = self.responder {
            connections.set_verification_responder(responder);
        }

        let local_commands = Arc::new(LocalCommandRegistry::new());
        for set in self.command_sets {
            local_commands.register(set)?;
        }
        let local_notifications = Arc::new(LocalNotificationRegistry::new(gateway.clone()));
        for set in self.notification_sets {
            local_notifications.provide(set);
        }
        let commands = Arc::new(RemoteCommandHub::new(gateway.clone(), serializers.clone()));
        for set in self.required_commands {
            commands.add_known(set);
        }
        let notifications =
            Arc::new(RemoteNotificationHub::new(gateway.clone(), serializers.clone()));
        for set in self.required_notifications {
            notifications.add_known(set);
        }
        connections.add_listener(commands.clone());
        connections.add_listener(notifications.clone());
        connections.add_listener(local_notifications.clone());

        let cancel = CancellationToken::new();
        let uploads = Arc::new(UploadTokenRegistry::new());
        let mut actions: Vec<Arc<dyn ProcessAction>> = connection_actions(&connections);
        actions.push(Arc::new(CommandInvokedAction(local_commands.clone())));
        actions.push(Arc::new(RegisterForNotificationAction(local_notifications.clone())));
        actions.push(Arc::new(UnregisterFromNotificationAction(local_notifications.clone())));
        actions.push(Arc::new(NotificationRaisedAction(notifications.clone())));
        if let Some(transfer) = self.transfer {
            actions.push(Arc::new(DataDownloadAction::new(
                uploads.clone(),
                transfer,
                cancel.clone(),
            )));
        }
        let dispatcher = MessageDispatcher::new(gateway.clone());
        for action in actions {
            dispatcher.register(action)?;
        }

        tracing::info!("endpoint {} ready", self.id);
        Ok(Endpoint {
            id: self.id,
            config: self.config,
            serializers,
            gateway,
            dispatcher,
            connections,
            commands,
            notifications,
            local_commands,
            local_notifications,
            uploads,
            cancel,
        })
    }
}

pub struct Endpoint {
    id: EndpointId,
    config: EndpointConfig,
    serializers: Arc<SerializerRegistry>,
    gateway: Arc<MessageGateway>,
    dispatcher: MessageDispatcher,
    connections: Arc<ConnectionManager>,
    commands: Arc<RemoteCommandHub>,
    notifications: Arc<RemoteNotificationHub>,
    local_commands: Arc<LocalCommandRegistry>,
    local_notifications: Arc<LocalNotificationRegistry>,
    uploads: Arc<UploadTokenRegistry>,
    cancel: CancellationToken,
}

impl Endpoint {
    pub fn builder(id: EndpointId) -> EndpointBuilder {
        EndpointBuilder {
            id,
            config: EndpointConfig::default(),
            serializers: SerializerRegistry::with_defaults(),
            description: CommunicationDescription::new(),
            command_sets: Vec::new(),
            notification_sets: Vec::new(),
            required_commands: Vec::new(),
            required_notifications: Vec::new(),
            transfer: None,
            responder: None,
        }
    }

    pub fn id(&self) -> &EndpointId {
        &self.id
    }

    pub fn config(&self) -> &EndpointConfig {
        &self.config
    }

    pub fn serializers(&self) -> &Arc<SerializerRegistry> {
        &self.serializers
    }

    pub fn gateway(&self) -> &Arc<MessageGateway> {
        &self.gateway
    }

    /// Feed one inbound message from the transport.
    pub async fn receive(&self, message: Message) -> Dispatched {
        self.dispatcher.dispatch(message).await
    }

    pub async fn connect(&self, remote: &EndpointId) -> Result<(), EndpointError> {
        Ok(self.connections.connect(remote).await?)
    }

    pub async fn disconnect(&self, remote: &EndpointId, reason: &str) {
        self.connections.disconnect(remote, reason).await;
    }

    pub async fn verify(
        &self,
        remote: &EndpointId,
        custom_data: Option<ObjectValue>,
    ) -> Result<Option<ObjectValue>, EndpointError> {
        Ok(self.connections.verify(remote, custom_data).await?)
    }

    pub fn connection_state(
        &self,
        remote: &EndpointId,
    ) -> Option<(HandshakeState, InteractionState)> {
        self.connections.state(remote)
    }

    pub fn connected_endpoints(&self) -> Vec<EndpointId> {
        self.connections.connected_endpoints()
    }

    pub fn connections(&self) -> &Arc<ConnectionManager> {
        &self.connections
    }

    pub fn events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.connections.subscribe()
    }

    /// Remote command sets, per endpoint.
    pub fn commands(&self) -> &Arc<RemoteCommandHub> {
        &self.commands
    }

    /// Remote notification sets, per endpoint.
    pub fn notifications(&self) -> &Arc<RemoteNotificationHub> {
        &self.notifications
    }

    pub fn local_commands(&self) -> &Arc<LocalCommandRegistry> {
        &self.local_commands
    }

    pub fn local_notifications(&self) -> &Arc<LocalNotificationRegistry> {
        &self.local_notifications
    }

    /// Raise a local event to every remote registered for it.
    pub async fn raise(
        &self,
        notification: &NotificationId,
        arguments: ObjectValue,
    ) -> Result<usize, EndpointError> {
        Ok(self.local_notifications.raise(notification, arguments).await?)
    }

    pub fn uploads(&self) -> &Arc<UploadTokenRegistry> {
        &self.uploads
    }

    pub async fn request_download(
        &self,
        from: &EndpointId,
        token: UploadToken,
    ) -> Result<(), EndpointError> {
        Ok(request_download(&self.gateway, from, token).await?)
    }

    /// Verify connected remotes every keep-alive interval until shutdown.
    pub fn spawn_keep_alive(&self) -> JoinHandle<()> {
        spawn_keep_alive(
            self.connections.clone(),
            self.config.keep_alive_interval(),
            self.cancel.child_token(),
        )
    }

    /// Stop background work, cancel running transfers and disconnect from
    /// every remote.
    pub async fn shutdown(&self, reason: &str) {
        self.cancel.cancel();
        for remote in self.connections.connected_endpoints() {
            self.connections.disconnect(&remote, reason).await;
        }
        tracing::info!("endpoint {} shut down", self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::testing::RecordingTransport;
    use interop_core::{MessageBody, MessageKind, TypeDescriptor, Version};

    struct Opaque;

    fn opaque_commands() -> CommandSetDescriptor {
        CommandSetDescriptor::new(TypeDescriptor::new("Acme.Vault", "acme"), Version::new(1, 0, 0))
            .command("open", vec![("key", TypeDescriptor::of::<Opaque>())], None)
    }

    #[test]
    fn missing_serializers_fail_the_build() {
        let (transport, _sent) = RecordingTransport::new();
        let result = Endpoint::builder(EndpointId::named("alpha"))
            .require_commands("vault", opaque_commands())
            .build(transport);
        assert!(matches!(
            result,
            Err(EndpointError::Command(CommandError::MissingObjectDataSerializer(_)))
        ));

        let (transport, _sent) = RecordingTransport::new();
        let events = NotificationSetDescriptor::new(
            TypeDescriptor::new("Acme.Alarm", "acme"),
            Version::new(1, 0, 0),
        )
        .event("ring", TypeDescriptor::of::<Opaque>());
        let result = Endpoint::builder(EndpointId::named("alpha"))
            .provide_notifications("vault", events)
            .build(transport);
        assert!(matches!(
            result,
            Err(EndpointError::Notification(NotificationError::MissingObjectDataSerializer(_)))
        ));
    }

    #[tokio::test]
    async fn downloads_need_a_transfer() {
        let (transport, mut sent) = RecordingTransport::new();
        let endpoint = Endpoint::builder(EndpointId::named("alpha"))
            .build(transport)
            .unwrap();
        let request = Message::new(
            EndpointId::named("beta"),
            MessageBody::DataDownloadRequest {
                token: UploadToken::new(),
            },
        );
        assert_eq!(endpoint.receive(request).await, Dispatched::Unhandled);
        assert_eq!(sent.recv().await.unwrap().1.kind(), MessageKind::UnknownMessageType);
    }
}
