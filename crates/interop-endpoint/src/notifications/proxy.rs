//! Subscriptions to the events of one remote notification set.
//!
//! The remote is told about a subscription once per event: the first local
//! handler for an event sends `RegisterForNotification`, the last one to go
//! sends `UnregisterFromNotification`. Registration changes are serialized
//! so concurrent subscribers never race each other onto the wire.

use crate::error::NotificationError;
use crate::gateway::MessageGateway;
use interop_core::{
    EndpointId, MessageBody, NotificationDefinition, NotificationId, NotificationSetDescriptor,
    ObjectValue, SerializerRegistry, TypeDescriptor,
};
use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Receives the arguments of one raised event.
pub type NotificationHandler = Arc<dyn Fn(&ObjectValue) + Send + Sync>;

/// A typed adapter over a [`NotificationProxy`] for one notification interface.
pub trait RemoteNotificationSet: Sized + Send + Sync + 'static {
    fn descriptor() -> NotificationSetDescriptor;

    fn from_proxy(proxy: Arc<NotificationProxy>) -> Self;
}

/// Handle for removing one subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscriber {
    id: SubscriptionId,
    handler: NotificationHandler,
}

pub struct NotificationProxy {
    descriptor: Arc<NotificationSetDescriptor>,
    endpoint: EndpointId,
    gateway: Arc<MessageGateway>,
    wire_interface: TypeDescriptor,
    next_id: AtomicU64,
    subscribers: Mutex<HashMap<NotificationId, Vec<Subscriber>>>,
    /// Held across the remote exchange of a registration change.
    registration: tokio::sync::Mutex<()>,
    detached: AtomicBool,
}

impl std::fmt::Debug for NotificationProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationProxy")
            .field("interface", self.descriptor.interface())
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

impl NotificationProxy {
    /// Build a proxy, checking that every event argument type can be read
    /// off the wire.
    pub fn build(
        descriptor: Arc<NotificationSetDescriptor>,
        endpoint: EndpointId,
        gateway: Arc<MessageGateway>,
        serializers: &SerializerRegistry,
    ) -> Result<Self, NotificationError> {
        if let Some(event) = descriptor
            .events()
            .iter()
            .find(|e| !serializers.has_serializer_for(&e.arguments))
        {
            return Err(NotificationError::MissingObjectDataSerializer(
                event.arguments.clone(),
            ));
        }
        Ok(Self {
            wire_interface: descriptor.interface().clone(),
            descriptor,
            endpoint,
            gateway,
            next_id: AtomicU64::new(1),
            subscribers: Mutex::new(HashMap::new()),
            registration: tokio::sync::Mutex::new(()),
            detached: AtomicBool::new(false),
        })
    }

    /// Register under `interface`, the identity from the fallback chain
    /// that the remote offered.
    pub fn speaking(mut self, interface: TypeDescriptor) -> Self {
        self.wire_interface = interface;
        self
    }

    pub fn wire_interface(&self) -> &TypeDescriptor {
        &self.wire_interface
    }

    pub fn descriptor(&self) -> &NotificationSetDescriptor {
        &self.descriptor
    }

    pub fn endpoint(&self) -> &EndpointId {
        &self.endpoint
    }

    fn definition(&self, event: &str) -> Result<&NotificationDefinition, NotificationError> {
        self.descriptor
            .event_named(event)
            .ok_or_else(|| NotificationError::NotificationNotSupported {
                interface: self.descriptor.interface().clone(),
                event: event.to_string(),
            })
    }

    /// Add a handler for `event`, registering with the remote if it is the
    /// first one.
    pub async fn subscribe<F>(
        &self,
        event: &str,
        handler: F,
    ) -> Result<SubscriptionId, NotificationError>
    where
        F: Fn(&ObjectValue) + Send + Sync + 'static,
    {
        let definition = self.definition(event)?;
        if self.detached.load(Ordering::Acquire) {
            return Err(self.disconnected());
        }

        let _registration = self.registration.lock().await;
        let first = self
            .subscribers
            .lock()
            .get(&definition.id)
            .is_none_or(|s| s.is_empty());
        if first {
            let reply = self
                .gateway
                .send_and_await_response(
                    &self.endpoint,
                    MessageBody::RegisterForNotification {
                        notification: definition.id_on(&self.wire_interface),
                    },
                )
                .await?;
            if !matches!(reply.body, MessageBody::Success) {
                return Err(NotificationError::RegistrationRejected {
                    event: event.to_string(),
                    kind: reply.kind(),
                });
            }
            tracing::debug!("registered for {} on {}", definition.id, self.endpoint);
        }

        // Checked under the subscriber lock, so a detach that ran during the
        // exchange wins over this subscription.
        let mut subscribers = self.subscribers.lock();
        if self.detached.load(Ordering::Acquire) {
            return Err(self.disconnected());
        }
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        subscribers
            .entry(definition.id.clone())
            .or_default()
            .push(Subscriber {
                id,
                handler: Arc::new(handler),
            });
        Ok(id)
    }

    fn disconnected(&self) -> NotificationError {
        NotificationError::Channel(crate::error::ChannelError::Disconnected(self.endpoint.clone()))
    }

    /// Like [`subscribe`](Self::subscribe), handing the handler the event
    /// arguments as a `T`.
    pub async fn subscribe_typed<T, F>(
        &self,
        event: &str,
        handler: F,
    ) -> Result<SubscriptionId, NotificationError>
    where
        T: Any + Clone,
        F: Fn(T) + Send + Sync + 'static,
    {
        let expected = TypeDescriptor::of::<T>();
        let definition = self.definition(event)?;
        if definition.arguments != expected {
            return Err(NotificationError::ArgumentType {
                event: event.to_string(),
                expected: definition.arguments.clone(),
                actual: expected,
            });
        }
        self.subscribe(event, move |arguments| match arguments.cloned::<T>() {
            Some(value) => handler(value),
            None => tracing::warn!("event arguments are not a {}", expected),
        })
        .await
    }

    /// Remove one handler. The remote is unregistered when its event has no
    /// handlers left; the local subscription is gone even if that fails.
    pub async fn unsubscribe(
        &self,
        subscription: SubscriptionId,
    ) -> Result<bool, NotificationError> {
        let _registration = self.registration.lock().await;
        let emptied = {
            let mut subscribers = self.subscribers.lock();
            let Some((event, list)) = subscribers
                .iter_mut()
                .find(|(_, list)| list.iter().any(|s| s.id == subscription))
            else {
                return Ok(false);
            };
            list.retain(|s| s.id != subscription);
            let event = event.clone();
            if list.is_empty() {
                subscribers.remove(&event);
                Some(event)
            } else {
                None
            }
        };

        if let Some(event) = emptied {
            if !self.detached.load(Ordering::Acquire) {
                self.unregister(&event).await?;
            }
        }
        Ok(true)
    }

    async fn unregister(&self, event: &NotificationId) -> Result<(), NotificationError> {
        let notification = NotificationId::new(self.wire_interface.clone(), event.event());
        let reply = self
            .gateway
            .send_and_await_response(
                &self.endpoint,
                MessageBody::UnregisterFromNotification { notification },
            )
            .await?;
        if !matches!(reply.body, MessageBody::Success) {
            tracing::warn!(
                "{} answered unregister of {} with {}",
                self.endpoint,
                event,
                reply.kind()
            );
        } else {
            tracing::debug!("unregistered from {} on {}", event, self.endpoint);
        }
        Ok(())
    }

    /// Drop every handler and unregister each event. Unregister failures
    /// are logged.
    pub async fn clear_all(&self) {
        let _registration = self.registration.lock().await;
        let events: Vec<NotificationId> = self.subscribers.lock().drain().map(|(e, _)| e).collect();
        if self.detached.load(Ordering::Acquire) {
            return;
        }
        for event in events {
            if let Err(e) = self.unregister(&event).await {
                tracing::warn!("failed to unregister {} on {}: {}", event, self.endpoint, e);
            }
        }
    }

    /// Forget every handler without telling the remote, which is gone.
    /// Subscriptions still waiting on the remote fail once it answers.
    pub fn detach(&self) {
        let mut subscribers = self.subscribers.lock();
        self.detached.store(true, Ordering::Release);
        subscribers.clear();
    }

    pub fn is_detached(&self) -> bool {
        self.detached.load(Ordering::Acquire)
    }

    pub fn subscriber_count(&self, event: &str) -> usize {
        let Some(definition) = self.descriptor.event_named(event) else {
            return 0;
        };
        self.subscribers
            .lock()
            .get(&definition.id)
            .map_or(0, Vec::len)
    }

    /// Whether the remote currently sends us `event`.
    pub fn is_registered(&self, event: &str) -> bool {
        self.subscriber_count(event) > 0
    }

    /// Hand a raised event to its handlers. Returns how many ran.
    ///
    /// `event` is the event name; the remote may have raised it under an
    /// older identity of the interface.
    pub fn raise(&self, event: &str, arguments: &ObjectValue) -> usize {
        let Some(definition) = self.descriptor.event_named(event) else {
            tracing::debug!("{} raised unknown event {:?}", self.endpoint, event);
            return 0;
        };
        if arguments.descriptor() != &definition.arguments {
            tracing::warn!(
                "{} raised {} with {}, expected {}",
                self.endpoint,
                definition.id,
                arguments.descriptor(),
                definition.arguments
            );
            return 0;
        }

        let handlers: Vec<NotificationHandler> = match self.subscribers.lock().get(&definition.id) {
            Some(list) => list.iter().map(|s| s.handler.clone()).collect(),
            None => return 0,
        };
        for handler in &handlers {
            if std::panic::catch_unwind(AssertUnwindSafe(|| handler(arguments))).is_err() {
                tracing::error!("handler for {} panicked", definition.id);
            }
        }
        handlers.len()
    }
}
