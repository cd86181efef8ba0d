//! Per-endpoint table of available remote command sets.

use super::proxy::{CommandProxy, RemoteCommandSet};
use crate::connection::{ConnectionListener, InteractionEvaluation};
use crate::gateway::MessageGateway;
use interop_core::{
    CommandSetDescriptor, EndpointId, SerializerRegistry, TypeDescriptor, TypeFallback,
};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandHubEvent {
    Available {
        endpoint: EndpointId,
        interface: TypeDescriptor,
    },
    Disconnected(EndpointId),
}

pub struct RemoteCommandHub {
    gateway: Arc<MessageGateway>,
    serializers: Arc<SerializerRegistry>,
    /// Interfaces this endpoint knows how to call.
    catalog: RwLock<Vec<Arc<CommandSetDescriptor>>>,
    endpoints: RwLock<HashMap<EndpointId, HashMap<TypeDescriptor, CommandProxy>>>,
    events: broadcast::Sender<CommandHubEvent>,
}

impl RemoteCommandHub {
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

    /// Make `descriptor` callable once a remote offers it.
    pub fn add_known(&self, descriptor: CommandSetDescriptor) {
        let mut catalog = self.catalog.write();
        if catalog.iter().any(|d| d.interface() == descriptor.interface()) {
            return;
        }
        catalog.push(Arc::new(descriptor));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CommandHubEvent> {
        self.events.subscribe()
    }

    /// Register every known interface that `offered` matches for `endpoint`.
    /// Returns how many were registered.
    pub fn on_received_commands(&self, endpoint: &EndpointId, offered: &[TypeFallback]) -> usize {
        let matched: Vec<(Arc<CommandSetDescriptor>, TypeDescriptor)> = self
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
            let proxy = match CommandProxy::build(
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
                .insert(interface.clone(), proxy);
            added.push(interface);
        }

        for interface in &added {
            tracing::debug!("{} offers commands {}", endpoint, interface);
            let _ = self.events.send(CommandHubEvent::Available {
                endpoint: endpoint.clone(),
                interface: interface.clone(),
            });
        }
        added.len()
    }

    pub fn has_commands_for(&self, endpoint: &EndpointId, interface: &TypeDescriptor) -> bool {
        self.endpoints
            .read()
            .get(endpoint)
            .is_some_and(|sets| sets.contains_key(interface))
    }

    pub fn proxy_for(
        &self,
        endpoint: &EndpointId,
        interface: &TypeDescriptor,
    ) -> Option<CommandProxy> {
        self.endpoints.read().get(endpoint)?.get(interface).cloned()
    }

    /// A typed stand-in for `P` on `endpoint`, if it offers `P`.
    pub fn command_set<P: RemoteCommandSet>(&self, endpoint: &EndpointId) -> Option<P> {
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

    /// Purge `endpoint` and fail its outstanding calls.
    pub fn on_endpoint_disconnected(&self, endpoint: &EndpointId) {
        let removed = self.endpoints.write().remove(endpoint);
        self.gateway.fail_pending_for(endpoint);
        if removed.is_some() {
            tracing::debug!("dropped command sets of {}", endpoint);
            let _ = self
                .events
                .send(CommandHubEvent::Disconnected(endpoint.clone()));
        }
    }
}

impl ConnectionListener for RemoteCommandHub {
    fn on_approved(&self, endpoint: &EndpointId, evaluation: &InteractionEvaluation) {
        self.on_received_commands(endpoint, &evaluation.commands);
    }

    fn on_disconnected(&self, endpoint: &EndpointId) {
        self.on_endpoint_disconnected(endpoint);
    }
}
