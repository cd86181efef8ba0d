//! An in-process network that still pushes every message through the wire
//! codec.

use async_trait::async_trait;
use interop_core::{EndpointId, Message, SerializerRegistry};
use interop_endpoint::{ChannelError, Endpoint, MessageTransport};
use interop_wire::{WireCodec, WireTranslator};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Default)]
pub struct Network {
    endpoints: RwLock<HashMap<EndpointId, Arc<Endpoint>>>,
}

impl Network {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A transport attached to this network.
    pub fn link(self: &Arc<Self>) -> Arc<Link> {
        let serializers = Arc::new(SerializerRegistry::with_defaults());
        Arc::new(Link {
            network: self.clone(),
            codec: WireCodec::new(Arc::new(WireTranslator::new(serializers))),
        })
    }

    pub fn join(&self, endpoint: Endpoint) -> Arc<Endpoint> {
        let endpoint = Arc::new(endpoint);
        self.endpoints
            .write()
            .insert(endpoint.id().clone(), endpoint.clone());
        endpoint
    }

    pub fn leave(&self, endpoint: &EndpointId) {
        self.endpoints.write().remove(endpoint);
    }
}

pub struct Link {
    network: Arc<Network>,
    codec: WireCodec,
}

#[async_trait]
impl MessageTransport for Link {
    async fn send(&self, endpoint: &EndpointId, message: Message) -> Result<(), ChannelError> {
        let bytes = self
            .codec
            .encode(&message)
            .map_err(|e| ChannelError::Transport(e.to_string()))?;
        let target = self
            .network
            .endpoints
            .read()
            .get(endpoint)
            .cloned()
            .ok_or_else(|| ChannelError::Transport(format!("no route to {endpoint}")))?;
        tracing::trace!("{} bytes to {}", bytes.len(), endpoint);

        let codec = self.codec.clone();
        tokio::spawn(async move {
            match codec.decode(&bytes) {
                Ok(message) => {
                    target.receive(message).await;
                }
                Err(e) => tracing::error!("dropping undecodable message: {}", e),
            }
        });
        Ok(())
    }
}
