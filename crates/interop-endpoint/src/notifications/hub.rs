//! Per-endpoint table of available remote notification sets.

use super::proxy::{NotificationProxy, RemoteNotificationSet};
use crate::connection::{ConnectionListener, InteractionEvaluation};
use crate::dispatch::ProcessAction;
use crate::error::ActionError;
use crate::gateway::MessageGateway;
use async_trait::async_trait;
use interop_core::{
    EndpointId, Message, MessageBody, MessageKind, NotificationId, NotificationSetDescriptor,
    ObjectValue, SerializerRegistry, TypeDescriptor, TypeFallback,
};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationHubEvent {
    Available {
        endpoint: EndpointId,
        interface: TypeDescriptor,
    },
    Unavailable(EndpointId),
}

pub struct RemoteNotificationHub {
    gateway: Arc<MessageGateway>,
    serializers: Arc<SerializerRegistry>,
    catalog: RwLock<Vec<Arc<NotificationSetDescriptor>>>,
    endpoints: RwLock<HashMap<EndpointId, HashMap<TypeDescriptor, Arc<NotificationProxy>>>>,
    events: broadcast::Sender<NotificationHubEvent>,
}

impl RemoteNotificationHub {
    pub fn new(gateway: Arc<MessageGateway>, serializers: Arc<SerializerRegistry>) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            gateway,
            serializers,
            catalog: RwLock::new(Vec::new()),
            endpoints: RwLock::new(HashMap::new()),
            events,
        }
    }

    /// Make `descriptor` subscribable once a remote offers it.
    pub fn add_known(&self, descriptor: NotificationSetDescriptor) {
        let mut catalog = self.catalog.write();
        if catalog.iter().any(|d| d.interface() == descriptor.interface()) {
            return;
        }
        catalog.push(Arc::new(descriptor));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NotificationHubEvent> {
        self.events.subscribe()
    }

    /// Register every known interface that `offered` matches for `endpoint`.
    /// An interface already registered keeps its proxy and subscriptions.
    pub fn on_received_notifications(
        &self,
        endpoint: &EndpointId,
        offered: &[TypeFallback],
    ) -> usize {
        let matched: Vec<(Arc<NotificationSetDescriptor>, TypeDescriptor)> = self
            .catalog
            .read()
            .iter()
            .filter_map(|d| {
                let wire = offered.iter().find_map(|o| d.fallback().first_match(o))?;
                Some((d.clone(), wire.descriptor.clone()))
            })
            .collect();

        let mut added = Vec::new();
        for (descriptor, wire) in matched {
            let interface = descriptor.interface().clone();
            if self.has_notifications_for(endpoint, &interface) {
                continue;
            }
            let proxy = match NotificationProxy::build(
                descriptor,
                endpoint.clone(),
                self.gateway.clone(),
                &self.serializers,
            ) {
                Ok(proxy) => proxy.speaking(wire),
                Err(e) => {
                    tracing::warn!("cannot use {} on {}: {}", interface, endpoint, e);
                    continue;
                }
            };
            self.endpoints
                .write()
                .entry(endpoint.clone())
                .or_default()
                .insert(interface.clone(), Arc::new(proxy));
            added.push(interface);
        }

        for interface in &added {
            tracing::debug!("{} offers notifications {}", endpoint, interface);
            let _ = self.events.send(NotificationHubEvent::Available {
                endpoint: endpoint.clone(),
                interface: interface.clone(),
            });
        }
        added.len()
    }

    pub fn has_notifications_for(&self, endpoint: &EndpointId, interface: &TypeDescriptor) -> bool {
        self.endpoints
            .read()
            .get(endpoint)
            .is_some_and(|sets| sets.contains_key(interface))
    }

    pub fn proxy_for(
        &self,
        endpoint: &EndpointId,
        interface: &TypeDescriptor,
    ) -> Option<Arc<NotificationProxy>> {
        self.endpoints.read().get(endpoint)?.get(interface).cloned()
    }

    pub fn notification_set<P: RemoteNotificationSet>(&self, endpoint: &EndpointId) -> Option<P> {
        let descriptor = P::descriptor();
        self.proxy_for(endpoint, descriptor.interface())
            .map(P::from_proxy)
    }

    pub fn endpoints_offering(&self, interface: &TypeDescriptor) -> Vec<EndpointId> {
        self.endpoints
            .read()
            .iter()
            .filter(|(_, sets)| sets.contains_key(interface))
            .map(|(endpoint, _)| endpoint.clone())
            .collect()
    }

    /// Hand a raised event from `sender` to the proxy whose interface, or
    /// one of its fallbacks, raised it. Returns how many handlers ran.
    pub fn route_raised(
        &self,
        sender: &EndpointId,
        notification: &NotificationId,
        arguments: &ObjectValue,
    ) -> usize {
        let proxy = self.endpoints.read().get(sender).and_then(|sets| {
            sets.values()
                .find(|p| {
                    p.descriptor()
                        .fallback()
                        .types()
                        .iter()
                        .any(|t| &t.descriptor == notification.interface())
                })
                .cloned()
        });
        match proxy {
            Some(proxy) => proxy.raise(notification.event(), arguments),
            None => {
                tracing::debug!("{} raised {} nobody subscribed to", sender, notification);
                0
            }
        }
    }

    /// Drop `endpoint`'s proxies; their subscriptions end without a word to
    /// the remote.
    pub fn on_endpoint_disconnected(&self, endpoint: &EndpointId) {
        let Some(sets) = self.endpoints.write().remove(endpoint) else {
            return;
        };
        for proxy in sets.values() {
            proxy.detach();
        }
        tracing::debug!("dropped notification sets of {}", endpoint);
        let _ = self
            .events
            .send(NotificationHubEvent::Unavailable(endpoint.clone()));
    }
}

impl ConnectionListener for RemoteNotificationHub {
    fn on_approved(&self, endpoint: &EndpointId, evaluation: &InteractionEvaluation) {
        self.on_received_notifications(endpoint, &evaluation.notifications);
    }

    fn on_disconnected(&self, endpoint: &EndpointId) {
        self.on_endpoint_disconnected(endpoint);
    }
}

/// Delivers inbound events. Events are never answered.
pub struct NotificationRaisedAction(pub Arc<RemoteNotificationHub>);

#[async_trait]
impl ProcessAction for NotificationRaisedAction {
    fn kind(&self) -> MessageKind {
        MessageKind::NotificationRaised
    }

    async fn process(
        &self,
        message: &Message,
        _gateway: &MessageGateway,
    ) -> Result<(), ActionError> {
        if let MessageBody::NotificationRaised {
            notification,
            arguments,
        } = &message.body
        {
            self.0.route_raised(&message.sender, notification, arguments);
        }
        Ok(())
    }
}
