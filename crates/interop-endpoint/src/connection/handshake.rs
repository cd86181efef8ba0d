//! Connection handshake and per-remote connection state.

use super::interaction::{CommunicationDescription, InteractionEvaluation};
use crate::config::EndpointConfig;
use crate::dispatch::ProcessAction;
use crate::error::{ActionError, HandshakeError};
use crate::gateway::MessageGateway;
use async_trait::async_trait;
use interop_core::{
    DiscoveryInformation, EndpointConnect, EndpointId, HandshakeState, InteractionConnectionState,
    InteractionState, Message, MessageBody, MessageKind, ObjectValue, ProtocolInformation,
};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Reacts to remotes being approved or going away.
pub trait ConnectionListener: Send + Sync {
    fn on_approved(&self, endpoint: &EndpointId, evaluation: &InteractionEvaluation);

    fn on_disconnected(&self, endpoint: &EndpointId);
}

/// Connection lifecycle changes, for application code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    Connected(EndpointId),
    Approved(EndpointId),
    Denied(EndpointId),
    Disconnected { endpoint: EndpointId, reason: String },
}

/// What is known about one remote endpoint.
#[derive(Debug, Clone)]
pub struct RemoteEndpoint {
    pub id: EndpointId,
    pub handshake: HandshakeState,
    pub interaction: InteractionState,
    /// The remote's own connect payload, once received.
    pub info: Option<EndpointConnect>,
    /// The remote's verdict on our interaction information.
    pub remote_interest: Option<InteractionConnectionState>,
    missed_verifications: u32,
}

impl RemoteEndpoint {
    fn awaiting(id: EndpointId) -> Self {
        Self {
            id,
            handshake: HandshakeState::AwaitingResponse,
            interaction: InteractionState::Negotiating,
            info: None,
            remote_interest: None,
            missed_verifications: 0,
        }
    }
}

/// Produces the custom data of a verification response.
pub type VerificationResponder =
    Arc<dyn Fn(&EndpointId, Option<ObjectValue>) -> Option<ObjectValue> + Send + Sync>;

pub struct ConnectionManager {
    gateway: Arc<MessageGateway>,
    config: EndpointConfig,
    description: CommunicationDescription,
    remotes: RwLock<HashMap<EndpointId, RemoteEndpoint>>,
    listeners: RwLock<Vec<Arc<dyn ConnectionListener>>>,
    responder: RwLock<Option<VerificationResponder>>,
    events: broadcast::Sender<ConnectionEvent>,
}

impl ConnectionManager {
    pub fn new(
        gateway: Arc<MessageGateway>,
        config: EndpointConfig,
        description: CommunicationDescription,
    ) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            gateway,
            config,
            description,
            remotes: RwLock::new(HashMap::new()),
            listeners: RwLock::new(Vec::new()),
            responder: RwLock::new(None),
            events,
        }
    }

    pub fn add_listener(&self, listener: Arc<dyn ConnectionListener>) {
        self.listeners.write().push(listener);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.events.subscribe()
    }

    pub fn description(&self) -> &CommunicationDescription {
        &self.description
    }

    /// Replace the default echo for inbound verifications.
    pub fn set_verification_responder(&self, responder: VerificationResponder) {
        *self.responder.write() = Some(responder);
    }

    pub fn remote(&self, endpoint: &EndpointId) -> Option<RemoteEndpoint> {
        self.remotes.read().get(endpoint).cloned()
    }

    pub fn state(&self, endpoint: &EndpointId) -> Option<(HandshakeState, InteractionState)> {
        self.remotes
            .read()
            .get(endpoint)
            .map(|r| (r.handshake, r.interaction))
    }

    /// Remotes whose handshake completed.
    pub fn connected_endpoints(&self) -> Vec<EndpointId> {
        self.remotes
            .read()
            .values()
            .filter(|r| r.handshake == HandshakeState::Connected)
            .map(|r| r.id.clone())
            .collect()
    }

    /// The connect payload describing this endpoint.
    pub fn local_connect(&self) -> EndpointConnect {
        EndpointConnect {
            discovery: DiscoveryInformation {
                address: self.config.discovery_address.clone(),
            },
            protocol: ProtocolInformation {
                version: self.config.protocol_version,
                message_address: self.config.message_address.clone(),
                data_address: self.config.data_address.clone(),
            },
            description: self.description.protocol_description(),
        }
    }

    /// Open a connection to `remote` and exchange interaction information.
    pub async fn connect(&self, remote: &EndpointId) -> Result<(), HandshakeError> {
        if self.state(remote).map(|(h, _)| h) == Some(HandshakeState::Connected) {
            return Ok(());
        }
        self.remotes
            .write()
            .insert(remote.clone(), RemoteEndpoint::awaiting(remote.clone()));

        tracing::info!("connecting to {}", remote);
        let reply = match self
            .gateway
            .send_and_await_response(remote, MessageBody::EndpointConnect(self.local_connect()))
            .await
        {
            Ok(reply) => reply,
            Err(e) => {
                self.forget(remote);
                return Err(e.into());
            }
        };

        let info = match reply.body {
            MessageBody::EndpointConnect(info) => info,
            MessageBody::Failure => {
                self.forget(remote);
                tracing::warn!("{} refused the connection", remote);
                return Err(HandshakeError::Rejected(remote.clone()));
            }
            other => {
                self.forget(remote);
                return Err(HandshakeError::UnexpectedResponse(other.kind()));
            }
        };
        if !self.config.accepts(&info.protocol.version) {
            self.forget(remote);
            return Err(HandshakeError::IncompatibleVersion {
                remote: info.protocol.version,
                local: self.config.protocol_version,
            });
        }

        self.mark_connected(remote, info);
        if let Err(e) = self.send_interaction_information(remote).await {
            tracing::warn!("interaction exchange with {} failed: {}", remote, e);
        }
        Ok(())
    }

    /// Answer an inbound connect. Returns whether the remote was accepted.
    pub async fn accept(
        &self,
        request: &Message,
        info: &EndpointConnect,
    ) -> Result<bool, HandshakeError> {
        let remote = &request.sender;
        if !self.config.accepts(&info.protocol.version) {
            tracing::warn!(
                "rejecting {}: protocol {} is not compatible with {}",
                remote,
                info.protocol.version,
                self.config.protocol_version
            );
            self.gateway.reply(request, MessageBody::Failure).await?;
            return Ok(false);
        }
        // A connected remote starting over loses its previous session first.
        if self.state(remote).map(|(h, _)| h) == Some(HandshakeState::Connected) {
            self.handle_disconnect(remote, "reconnected");
        }
        self.remotes
            .write()
            .insert(remote.clone(), RemoteEndpoint::awaiting(remote.clone()));
        if let Err(e) = self
            .gateway
            .reply(request, MessageBody::EndpointConnect(self.local_connect()))
            .await
        {
            self.forget(remote);
            return Err(e.into());
        }
        self.mark_connected(remote, info.clone());
        Ok(true)
    }

    fn mark_connected(&self, remote: &EndpointId, info: EndpointConnect) {
        if let Some(record) = self.remotes.write().get_mut(remote) {
            record.handshake = HandshakeState::Connected;
            record.info = Some(info);
        }
        tracing::info!("connected to {}", remote);
        let _ = self.events.send(ConnectionEvent::Connected(remote.clone()));
    }

    fn forget(&self, remote: &EndpointId) {
        self.remotes.write().remove(remote);
    }

    /// Send our offered subject groups to `remote` and wait for its verdict.
    pub async fn send_interaction_information(
        &self,
        remote: &EndpointId,
    ) -> Result<InteractionConnectionState, HandshakeError> {
        let reply = self
            .gateway
            .send_and_await_response(
                remote,
                MessageBody::EndpointInteractionInformation {
                    groups: self.description.offered_groups(),
                },
            )
            .await?;
        let MessageBody::EndpointInteractionInformationResponse { state } = reply.body else {
            return Err(HandshakeError::UnexpectedResponse(reply.kind()));
        };
        if let Some(record) = self.remotes.write().get_mut(remote) {
            record.remote_interest = Some(state);
        }
        tracing::debug!("{} answered our interaction information with {:?}", remote, state);
        Ok(state)
    }

    /// Evaluate a remote's offered subject groups.
    pub fn evaluate_interaction(
        &self,
        remote: &EndpointId,
        groups: &[interop_core::SubjectGroup],
    ) -> Result<InteractionConnectionState, HandshakeError> {
        if self.state(remote).is_none() {
            return Err(HandshakeError::NotConnected(remote.clone()));
        }
        let evaluation = self.description.evaluate(groups);
        for missing in evaluation
            .missing_commands
            .iter()
            .chain(&evaluation.missing_notifications)
        {
            tracing::warn!("{} does not offer required {}", remote, missing);
        }

        let state = evaluation.state();
        let interaction = match state {
            InteractionConnectionState::Desired => InteractionState::Approved,
            InteractionConnectionState::Denied => InteractionState::Denied,
        };
        if let Some(record) = self.remotes.write().get_mut(remote) {
            record.interaction = interaction;
        }

        match state {
            InteractionConnectionState::Desired => {
                tracing::info!(
                    "approved {} ({} commands, {} notifications)",
                    remote,
                    evaluation.commands.len(),
                    evaluation.notifications.len()
                );
                let listeners = self.listeners.read().clone();
                for listener in listeners {
                    listener.on_approved(remote, &evaluation);
                }
                let _ = self.events.send(ConnectionEvent::Approved(remote.clone()));
            }
            InteractionConnectionState::Denied => {
                tracing::warn!("no shared subject with {}; nothing registered", remote);
                let _ = self.events.send(ConnectionEvent::Denied(remote.clone()));
            }
        }
        Ok(state)
    }

    /// Tell `remote` we are leaving, then drop it locally.
    pub async fn disconnect(&self, remote: &EndpointId, reason: &str) {
        let body = MessageBody::EndpointDisconnect {
            reason: reason.to_string(),
        };
        if let Err(e) = self.gateway.send(remote, body).await {
            tracing::warn!("could not notify {} of disconnect: {}", remote, e);
        }
        self.handle_disconnect(remote, reason);
    }

    /// Drop every trace of `remote`. Safe to call repeatedly; returns whether
    /// anything was known about it.
    pub fn handle_disconnect(&self, remote: &EndpointId, reason: &str) -> bool {
        let removed = self.remotes.write().remove(remote).is_some();
        let failed = self.gateway.fail_pending_for(remote);
        if !removed {
            return false;
        }
        tracing::info!(
            "disconnected from {}: {} ({} requests failed)",
            remote,
            reason,
            failed
        );
        let listeners = self.listeners.read().clone();
        for listener in listeners {
            listener.on_disconnected(remote);
        }
        let _ = self.events.send(ConnectionEvent::Disconnected {
            endpoint: remote.clone(),
            reason: reason.to_string(),
        });
        true
    }

    /// Round-trip `custom_data` through `remote` to check it is alive.
    ///
    /// Each failure counts against the remote; reaching the configured
    /// maximum disconnects it.
    pub async fn verify(
        &self,
        remote: &EndpointId,
        custom_data: Option<ObjectValue>,
    ) -> Result<Option<ObjectValue>, HandshakeError> {
        if self.state(remote).map(|(h, _)| h) != Some(HandshakeState::Connected) {
            return Err(HandshakeError::NotConnected(remote.clone()));
        }
        let result = self
            .gateway
            .send_and_await_response(remote, MessageBody::ConnectionVerification { custom_data })
            .await;
        let error = match result {
            Ok(Message {
                body: MessageBody::ConnectionVerificationResponse { custom_data },
                ..
            }) => {
                if let Some(record) = self.remotes.write().get_mut(remote) {
                    record.missed_verifications = 0;
                }
                return Ok(custom_data);
            }
            Ok(other) => HandshakeError::UnexpectedResponse(other.kind()),
            Err(e) => HandshakeError::Channel(e),
        };

        let missed = {
            let mut remotes = self.remotes.write();
            match remotes.get_mut(remote) {
                Some(record) => {
                    record.missed_verifications += 1;
                    record.missed_verifications
                }
                None => 0,
            }
        };
        tracing::warn!("verification of {} failed ({} missed): {}", remote, missed, error);
        if missed >= self.config.max_missed_verifications.max(1) {
            self.handle_disconnect(remote, "connection verification failed");
        }
        Err(error)
    }

    fn verification_reply(
        &self,
        remote: &EndpointId,
        custom_data: Option<ObjectValue>,
    ) -> Option<ObjectValue> {
        let responder = self.responder.read().clone();
        match responder {
            Some(responder) => responder(remote, custom_data),
            None => custom_data,
        }
    }
}

pub struct EndpointConnectAction(pub Arc<ConnectionManager>);

#[async_trait]
impl ProcessAction for EndpointConnectAction {
    fn kind(&self) -> MessageKind {
        MessageKind::EndpointConnect
    }

    async fn process(&self, message: &Message, _: &MessageGateway) -> Result<(), ActionError> {
        let MessageBody::EndpointConnect(info) = &message.body else {
            return Err(ActionError::handler("not a connect message"));
        };
        if self.0.accept(message, info).await? {
            let manager = self.0.clone();
            let remote = message.sender.clone();
            tokio::spawn(async move {
                if let Err(e) = manager.send_interaction_information(&remote).await {
                    tracing::warn!("interaction exchange with {} failed: {}", remote, e);
                }
            });
        }
        Ok(())
    }
}

pub struct EndpointDisconnectAction(pub Arc<ConnectionManager>);

#[async_trait]
impl ProcessAction for EndpointDisconnectAction {
    fn kind(&self) -> MessageKind {
        MessageKind::EndpointDisconnect
    }

    async fn process(&self, message: &Message, _: &MessageGateway) -> Result<(), ActionError> {
        let reason = match &message.body {
            MessageBody::EndpointDisconnect { reason } => reason.as_str(),
            _ => "",
        };
        self.0.handle_disconnect(&message.sender, reason);
        Ok(())
    }
}

pub struct InteractionInformationAction(pub Arc<ConnectionManager>);

#[async_trait]
impl ProcessAction for InteractionInformationAction {
    fn kind(&self) -> MessageKind {
        MessageKind::EndpointInteractionInformation
    }

    async fn process(
        &self,
        message: &Message,
        gateway: &MessageGateway,
    ) -> Result<(), ActionError> {
        let MessageBody::EndpointInteractionInformation { groups } = &message.body else {
            return Err(ActionError::handler("not interaction information"));
        };
        let state = self.0.evaluate_interaction(&message.sender, groups)?;
        gateway
            .reply(
                message,
                MessageBody::EndpointInteractionInformationResponse { state },
            )
            .await?;
        Ok(())
    }
}

pub struct ConnectionVerificationAction(pub Arc<ConnectionManager>);

#[async_trait]
impl ProcessAction for ConnectionVerificationAction {
    fn kind(&self) -> MessageKind {
        MessageKind::ConnectionVerification
    }

    async fn process(
        &self,
        message: &Message,
        gateway: &MessageGateway,
    ) -> Result<(), ActionError> {
        let MessageBody::ConnectionVerification { custom_data } = &message.body else {
            return Err(ActionError::handler("not a verification message"));
        };
        let custom_data = self.0.verification_reply(&message.sender, custom_data.clone());
        gateway
            .reply(
                message,
                MessageBody::ConnectionVerificationResponse { custom_data },
            )
            .await?;
        Ok(())
    }
}

/// The process actions that drive `manager`.
pub fn connection_actions(manager: &Arc<ConnectionManager>) -> Vec<Arc<dyn ProcessAction>> {
    vec![
        Arc::new(EndpointConnectAction(manager.clone())),
        Arc::new(EndpointDisconnectAction(manager.clone())),
        Arc::new(InteractionInformationAction(manager.clone())),
        Arc::new(ConnectionVerificationAction(manager.clone())),
    ]
}
