//! Notification sets this endpoint raises, and who listens to them.

use crate::connection::{ConnectionListener, InteractionEvaluation};
use crate::dispatch::ProcessAction;
use crate::error::{ActionError, NotificationError};
use crate::gateway::MessageGateway;
use async_trait::async_trait;
use interop_core::{
    EndpointId, Message, MessageBody, MessageKind, NotificationDefinition, NotificationId,
    NotificationSetDescriptor, ObjectValue, TypeDescriptor,
};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

pub struct LocalNotificationRegistry {
    gateway: Arc<MessageGateway>,
    sets: RwLock<Vec<Arc<NotificationSetDescriptor>>>,
    /// Keyed by the preferred identity of each event. Each listener keeps the
    /// interface identity it registered under.
    subscribers: RwLock<HashMap<NotificationId, BTreeMap<EndpointId, TypeDescriptor>>>,
}

impl LocalNotificationRegistry {
    pub fn new(gateway: Arc<MessageGateway>) -> Self {
        Self {
            gateway,
            sets: RwLock::new(Vec::new()),
            subscribers: RwLock::new(HashMap::new()),
        }
    }

    /// Start offering `descriptor`. Offering the same interface twice is a no-op.
    pub fn provide(&self, descriptor: NotificationSetDescriptor) {
        let mut sets = self.sets.write();
        if sets.iter().any(|d| d.interface() == descriptor.interface()) {
            return;
        }
        tracing::debug!("raising {}", descriptor.interface());
        sets.push(Arc::new(descriptor));
    }

    pub fn descriptors(&self) -> Vec<Arc<NotificationSetDescriptor>> {
        self.sets.read().clone()
    }

    /// The event `notification` names, under any identity of its interface.
    pub fn resolve(&self, notification: &NotificationId) -> Option<NotificationDefinition> {
        self.sets
            .read()
            .iter()
            .filter(|set| {
                set.fallback()
                    .types()
                    .iter()
                    .any(|t| &t.descriptor == notification.interface())
            })
            .find_map(|set| set.event_named(notification.event()).cloned())
    }

    fn resolve_or_err(
        &self,
        notification: &NotificationId,
    ) -> Result<NotificationDefinition, NotificationError> {
        self.resolve(notification)
            .ok_or_else(|| NotificationError::NotificationNotSupported {
                interface: notification.interface().clone(),
                event: notification.event().to_string(),
            })
    }

    /// Add `endpoint` as a listener. Raised events reach it under the identity
    /// it registered with. Registering again only updates that identity.
    pub fn register(
        &self,
        endpoint: &EndpointId,
        notification: &NotificationId,
    ) -> Result<NotificationId, NotificationError> {
        let definition = self.resolve_or_err(notification)?;
        self.subscribers
            .write()
            .entry(definition.id.clone())
            .or_default()
            .insert(endpoint.clone(), notification.interface().clone());
        tracing::debug!("{} listens to {} as {}", endpoint, definition.id, notification);
        Ok(definition.id)
    }

    /// Remove `endpoint` as a listener. Returns whether it was one.
    pub fn unregister(
        &self,
        endpoint: &EndpointId,
        notification: &NotificationId,
    ) -> Result<bool, NotificationError> {
        let definition = self.resolve_or_err(notification)?;
        let mut subscribers = self.subscribers.write();
        let Some(listeners) = subscribers.get_mut(&definition.id) else {
            return Ok(false);
        };
        let removed = listeners.remove(endpoint).is_some();
        if listeners.is_empty() {
            subscribers.remove(&definition.id);
        }
        Ok(removed)
    }

    pub fn subscribers_of(&self, notification: &NotificationId) -> Vec<EndpointId> {
        let Some(definition) = self.resolve(notification) else {
            return Vec::new();
        };
        self.subscribers
            .read()
            .get(&definition.id)
            .map(|s| s.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn listeners_of(
        &self,
        definition: &NotificationDefinition,
    ) -> Vec<(EndpointId, NotificationId)> {
        self.subscribers
            .read()
            .get(&definition.id)
            .map(|s| {
                s.iter()
                    .map(|(endpoint, interface)| (endpoint.clone(), definition.id_on(interface)))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Send `arguments` to every listener of `notification`. A listener that
    /// cannot be reached is logged and skipped. Returns how many were sent.
    pub async fn raise(
        &self,
        notification: &NotificationId,
        arguments: ObjectValue,
    ) -> Result<usize, NotificationError> {
        let definition = self.resolve_or_err(notification)?;
        if arguments.descriptor() != &definition.arguments {
            return Err(NotificationError::ArgumentType {
                event: definition.name,
                expected: definition.arguments,
                actual: arguments.descriptor().clone(),
            });
        }

        let mut sent = 0;
        for (endpoint, notification) in self.listeners_of(&definition) {
            let body = MessageBody::NotificationRaised {
                notification,
                arguments: arguments.clone(),
            };
            match self.gateway.send(&endpoint, body).await {
                Ok(_) => sent += 1,
                Err(e) => {
                    tracing::warn!("failed to raise {} on {}: {}", definition.id, endpoint, e)
                }
            }
        }
        Ok(sent)
    }

    /// Forget every registration of `endpoint`. Returns how many there were.
    pub fn drop_endpoint(&self, endpoint: &EndpointId) -> usize {
        let mut subscribers = self.subscribers.write();
        let mut dropped = 0;
        subscribers.retain(|_, listeners| {
            if listeners.remove(endpoint).is_some() {
                dropped += 1;
            }
            !listeners.is_empty()
        });
        dropped
    }
}

impl ConnectionListener for LocalNotificationRegistry {
    fn on_approved(&self, _endpoint: &EndpointId, _evaluation: &InteractionEvaluation) {}

    fn on_disconnected(&self, endpoint: &EndpointId) {
        let dropped = self.drop_endpoint(endpoint);
        if dropped > 0 {
            tracing::debug!("dropped {} registrations of {}", dropped, endpoint);
        }
    }
}

pub struct RegisterForNotificationAction(pub Arc<LocalNotificationRegistry>);

#[async_trait]
impl ProcessAction for RegisterForNotificationAction {
    fn kind(&self) -> MessageKind {
        MessageKind::RegisterForNotification
    }

    async fn process(
        &self,
        message: &Message,
        gateway: &MessageGateway,
    ) -> Result<(), ActionError> {
        let MessageBody::RegisterForNotification { notification } = &message.body else {
            return Err(ActionError::handler("not a registration"));
        };
        self.0.register(&message.sender, notification)?;
        gateway.reply(message, MessageBody::Success).await?;
        Ok(())
    }
}

pub struct UnregisterFromNotificationAction(pub Arc<LocalNotificationRegistry>);

#[async_trait]
impl ProcessAction for UnregisterFromNotificationAction {
    fn kind(&self) -> MessageKind {
        MessageKind::UnregisterFromNotification
    }

    async fn process(
        &self,
        message: &Message,
        gateway: &MessageGateway,
    ) -> Result<(), ActionError> {
        let MessageBody::UnregisterFromNotification { notification } = &message.body else {
            return Err(ActionError::handler("not an unregistration"));
        };
        self.0.unregister(&message.sender, notification)?;
        gateway.reply(message, MessageBody::Success).await?;
        Ok(())
    }
}
