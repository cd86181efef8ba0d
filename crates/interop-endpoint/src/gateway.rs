//! Outbound messages and response correlation.
//!
//! The gateway stamps outgoing messages with the local identity, hands them
//! to the [`MessageTransport`], and keeps a table of requests that are
//! waiting for a reply. A reply is matched by its `in_response_to` id and
//! removes its entry on the first match; later duplicates find nothing.

use crate::error::ChannelError;
use async_trait::async_trait;
use interop_core::{EndpointId, Message, MessageBody, MessageId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

/// The physical channel between endpoints.
#[async_trait]
pub trait MessageTransport: Send + Sync {
    /// Deliver `message` to `endpoint`.
    async fn send(&self, endpoint: &EndpointId, message: Message) -> Result<(), ChannelError>;
}

struct PendingEntry {
    endpoint: EndpointId,
    sender: oneshot::Sender<Message>,
}

type PendingMap = Mutex<HashMap<MessageId, PendingEntry>>;

pub struct MessageGateway {
    local: EndpointId,
    transport: Arc<dyn MessageTransport>,
    pending: Arc<PendingMap>,
    timeout: Duration,
}

impl MessageGateway {
    pub fn new(local: EndpointId, transport: Arc<dyn MessageTransport>, timeout: Duration) -> Self {
        Self {
            local,
            transport,
            pending: Arc::new(Mutex::new(HashMap::new())),
            timeout,
        }
    }

    pub fn local_id(&self) -> &EndpointId {
        &self.local
    }

    pub fn response_timeout(&self) -> Duration {
        self.timeout
    }

    /// Send a request without waiting for a reply. Returns its id.
    pub async fn send(
        &self,
        to: &EndpointId,
        body: MessageBody,
    ) -> Result<MessageId, ChannelError> {
        let message = Message::new(self.local.clone(), body);
        let id = message.id;
        tracing::debug!("-> {} {} ({})", to, message.kind(), id);
        self.transport.send(to, message).await?;
        Ok(id)
    }

    /// Answer `request`.
    pub async fn reply(&self, request: &Message, body: MessageBody) -> Result<(), ChannelError> {
        let message = Message::response(self.local.clone(), request.id, body);
        tracing::debug!("-> {} {} in response to {}", request.sender, message.kind(), request.id);
        self.transport.send(&request.sender, message).await
    }

    /// Send a request and return a handle to its reply.
    ///
    /// The pending entry exists before the message leaves, so a fast reply
    /// cannot overtake it. The entry goes away with the returned handle, or
    /// with this future if it is dropped mid-send.
    pub async fn send_for_response(
        &self,
        to: &EndpointId,
        body: MessageBody,
    ) -> Result<PendingResponse, ChannelError> {
        let message = Message::new(self.local.clone(), body);
        let id = message.id;
        let (sender, receiver) = oneshot::channel();
        self.pending.lock().insert(
            id,
            PendingEntry {
                endpoint: to.clone(),
                sender,
            },
        );
        let response = PendingResponse {
            request: id,
            endpoint: to.clone(),
            receiver,
            timeout: self.timeout,
            pending: self.pending.clone(),
        };
        tracing::debug!("-> {} {} ({}), awaiting reply", to, message.kind(), id);
        self.transport.send(to, message).await?;
        Ok(response)
    }

    pub async fn send_and_await_response(
        &self,
        to: &EndpointId,
        body: MessageBody,
    ) -> Result<Message, ChannelError> {
        self.send_for_response(to, body).await?.wait().await
    }

    /// Complete the request `message` answers, if one is waiting.
    ///
    /// Returns false for requests, for replies nobody waits for, and for
    /// replies from an endpoint other than the one the request went to.
    pub fn try_complete(&self, message: &Message) -> bool {
        let Some(request) = message.in_response_to else {
            return false;
        };
        let entry = {
            let mut pending = self.pending.lock();
            match pending.get(&request) {
                Some(entry) if entry.endpoint == message.sender => pending.remove(&request),
                Some(entry) => {
                    tracing::warn!(
                        "reply to {} came from {}, expected {}",
                        request,
                        message.sender,
                        entry.endpoint
                    );
                    None
                }
                None => None,
            }
        };
        match entry {
            Some(entry) => {
                if entry.sender.send(message.clone()).is_err() {
                    tracing::debug!("waiter for {} is gone", request);
                }
                true
            }
            None => false,
        }
    }

    /// Fail every request waiting on `endpoint`. Returns how many there were.
    pub fn fail_pending_for(&self, endpoint: &EndpointId) -> usize {
        let mut pending = self.pending.lock();
        let before = pending.len();
        pending.retain(|_, entry| &entry.endpoint != endpoint);
        before - pending.len()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }
}

/// The reply to one request, not yet arrived.
pub struct PendingResponse {
    request: MessageId,
    endpoint: EndpointId,
    receiver: oneshot::Receiver<Message>,
    timeout: Duration,
    pending: Arc<PendingMap>,
}

impl PendingResponse {
    pub fn request_id(&self) -> MessageId {
        self.request
    }

    pub fn endpoint(&self) -> &EndpointId {
        &self.endpoint
    }

    /// Wait for the reply, up to the gateway's response timeout.
    pub async fn wait(mut self) -> Result<Message, ChannelError> {
        match tokio::time::timeout(self.timeout, &mut self.receiver).await {
            Ok(Ok(message)) => Ok(message),
            Ok(Err(_)) => Err(ChannelError::Disconnected(self.endpoint.clone())),
            Err(_) => {
                tracing::debug!("request {} to {} timed out", self.request, self.endpoint);
                Err(ChannelError::Timeout {
                    endpoint: self.endpoint.clone(),
                    timeout: self.timeout,
                })
            }
        }
    }
}

impl Drop for PendingResponse {
    fn drop(&mut self) {
        self.pending.lock().remove(&self.request);
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use tokio::sync::mpsc;

    /// Captures every outbound message.
    pub struct RecordingTransport {
        sent: mpsc::UnboundedSender<(EndpointId, Message)>,
        fail: bool,
    }

    impl RecordingTransport {
        pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<(EndpointId, Message)>) {
            let (sent, rx) = mpsc::unbounded_channel();
            (Arc::new(Self { sent, fail: false }), rx)
        }

        /// A transport whose every send fails.
        pub fn failing() -> Arc<Self> {
            let (sent, _) = mpsc::unbounded_channel();
            Arc::new(Self { sent, fail: true })
        }
    }

    #[async_trait]
    impl MessageTransport for RecordingTransport {
        async fn send(&self, endpoint: &EndpointId, message: Message) -> Result<(), ChannelError> {
            if self.fail {
                return Err(ChannelError::Transport("link down".into()));
            }
            let _ = self.sent.send((endpoint.clone(), message));
            Ok(())
        }
    }

    pub fn gateway(transport: Arc<dyn MessageTransport>) -> Arc<MessageGateway> {
        Arc::new(MessageGateway::new(
            EndpointId::named("local"),
            transport,
            Duration::from_secs(5),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    #[tokio::test]
    async fn reply_completes_exactly_once() {
        let (transport, mut sent) = RecordingTransport::new();
        let gateway = gateway(transport);
        let remote = EndpointId::named("remote");

        let pending = gateway
            .send_for_response(&remote, MessageBody::Success)
            .await
            .unwrap();
        let (to, request) = sent.recv().await.unwrap();
        assert_eq!(to, remote);
        assert_eq!(request.id, pending.request_id());
        assert_eq!(gateway.pending_count(), 1);

        let reply = Message::response(remote.clone(), request.id, MessageBody::Failure);
        assert!(gateway.try_complete(&reply));
        assert!(!gateway.try_complete(&reply));
        assert_eq!(pending.wait().await.unwrap().kind(), interop_core::MessageKind::Failure);
        assert_eq!(gateway.pending_count(), 0);
    }

    #[tokio::test]
    async fn reply_from_wrong_sender_is_ignored() {
        let (transport, mut sent) = RecordingTransport::new();
        let gateway = gateway(transport);
        let _pending = gateway
            .send_for_response(&EndpointId::named("remote"), MessageBody::Success)
            .await
            .unwrap();
        let (_, request) = sent.recv().await.unwrap();
        let spoofed =
            Message::response(EndpointId::named("other"), request.id, MessageBody::Success);
        assert!(!gateway.try_complete(&spoofed));
        assert_eq!(gateway.pending_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_removes_entry() {
        let (transport, _sent) = RecordingTransport::new();
        let gateway = gateway(transport);
        let result = gateway
            .send_and_await_response(&EndpointId::named("remote"), MessageBody::Success)
            .await;
        assert!(matches!(result, Err(ChannelError::Timeout { .. })));
        assert_eq!(gateway.pending_count(), 0);
    }

    #[tokio::test]
    async fn disconnect_fails_waiters() {
        let (transport, _sent) = RecordingTransport::new();
        let gateway = gateway(transport);
        let remote = EndpointId::named("remote");
        let pending = gateway
            .send_for_response(&remote, MessageBody::Success)
            .await
            .unwrap();
        let _other = gateway
            .send_for_response(&EndpointId::named("other"), MessageBody::Success)
            .await
            .unwrap();
        assert_eq!(gateway.fail_pending_for(&remote), 1);
        assert!(matches!(pending.wait().await, Err(ChannelError::Disconnected(e)) if e == remote));
        assert_eq!(gateway.pending_count(), 1);
    }

    #[tokio::test]
    async fn failed_send_leaves_nothing_pending() {
        let gateway = gateway(RecordingTransport::failing());
        let result = gateway
            .send_for_response(&EndpointId::named("remote"), MessageBody::Success)
            .await;
        assert!(matches!(result, Err(ChannelError::Transport(_))));
        assert_eq!(gateway.pending_count(), 0);
    }

    struct StalledTransport;

    #[async_trait]
    impl MessageTransport for StalledTransport {
        async fn send(
            &self,
            _endpoint: &EndpointId,
            _message: Message,
        ) -> Result<(), ChannelError> {
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_send_removes_entry() {
        let gateway = gateway(Arc::new(StalledTransport));
        let remote = EndpointId::named("remote");
        let sending = gateway.send_for_response(&remote, MessageBody::Success);
        let result = tokio::time::timeout(Duration::from_millis(50), sending).await;
        assert!(result.is_err());
        assert_eq!(gateway.pending_count(), 0);
    }

    #[tokio::test]
    async fn dropped_handle_removes_entry() {
        let (transport, _sent) = RecordingTransport::new();
        let gateway = gateway(transport);
        let pending = gateway
            .send_for_response(&EndpointId::named("remote"), MessageBody::Success)
            .await
            .unwrap();
        drop(pending);
        assert_eq!(gateway.pending_count(), 0);
    }
}
