//! Inbound message dispatch.
//!
//! Replies are routed to the request waiting for them. Everything else goes
//! to the [`ProcessAction`] registered for its kind. An action that fails or
//! panics gets one `Failure` reply on its behalf; a message with no action
//! gets an `UnknownMessageType` reply, unless it is itself an
//! `UnknownMessageType` or `Failure`, which would only bounce back and forth.

use crate::error::{ActionError, DispatchError};
use crate::gateway::MessageGateway;
use async_trait::async_trait;
use futures_util::FutureExt;
use interop_core::{Message, MessageBody, MessageKind};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::Instrument;

/// Handles inbound requests of one kind.
///
/// An action that returns `Ok` has sent whatever reply its kind calls for.
/// An action that returns `Err` must not have replied yet.
#[async_trait]
pub trait ProcessAction: Send + Sync {
    fn kind(&self) -> MessageKind;

    async fn process(&self, message: &Message, gateway: &MessageGateway) -> Result<(), ActionError>;
}

/// What happened to one inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatched {
    /// A reply that completed a waiting request.
    Completed,
    /// A reply nobody was waiting for.
    Dropped,
    /// Handled by its action.
    Processed,
    /// No action; answered with `UnknownMessageType`.
    Unhandled,
    /// No action and no reply, to avoid a feedback loop.
    Ignored,
    /// The action failed; a `Failure` reply was attempted.
    Failed,
}

/// Answers messages nobody else handles.
pub struct UnknownMessageTypeAction;

impl UnknownMessageTypeAction {
    /// Whether a message of `kind` may be answered at all.
    pub fn should_reply(kind: MessageKind) -> bool {
        !matches!(kind, MessageKind::UnknownMessageType | MessageKind::Failure)
    }
}

#[async_trait]
impl ProcessAction for UnknownMessageTypeAction {
    fn kind(&self) -> MessageKind {
        MessageKind::UnknownMessageType
    }

    async fn process(
        &self,
        message: &Message,
        gateway: &MessageGateway,
    ) -> Result<(), ActionError> {
        if !Self::should_reply(message.kind()) {
            tracing::debug!("not answering {} from {}", message.kind(), message.sender);
            return Ok(());
        }
        gateway
            .reply(message, MessageBody::UnknownMessageType)
            .await?;
        Ok(())
    }
}

pub struct MessageDispatcher {
    gateway: Arc<MessageGateway>,
    actions: RwLock<HashMap<MessageKind, Arc<dyn ProcessAction>>>,
}

impl MessageDispatcher {
    pub fn new(gateway: Arc<MessageGateway>) -> Self {
        Self {
            gateway,
            actions: RwLock::new(HashMap::new()),
        }
    }

    pub fn gateway(&self) -> &Arc<MessageGateway> {
        &self.gateway
    }

    /// Install the action for its kind. Each kind takes one action.
    pub fn register(&self, action: Arc<dyn ProcessAction>) -> Result<(), DispatchError> {
        let kind = action.kind();
        let mut actions = self.actions.write();
        if actions.contains_key(&kind) {
            return Err(DispatchError::DuplicateAction(kind));
        }
        actions.insert(kind, action);
        Ok(())
    }

    pub fn has_action_for(&self, kind: MessageKind) -> bool {
        self.actions.read().contains_key(&kind)
    }

    /// Handle one inbound message. Never fails; problems are logged.
    pub async fn dispatch(&self, message: Message) -> Dispatched {
        let span = tracing::debug_span!(
            "dispatch",
            kind = %message.kind(),
            id = %message.id,
            sender = %message.sender
        );
        self.dispatch_inner(message).instrument(span).await
    }

    async fn dispatch_inner(&self, message: Message) -> Dispatched {
        if message.is_response() {
            if self.gateway.try_complete(&message) {
                return Dispatched::Completed;
            }
            tracing::debug!("dropping unmatched {} reply", message.kind());
            return Dispatched::Dropped;
        }

        let action = self.actions.read().get(&message.kind()).cloned();
        let Some(action) = action else {
            if !UnknownMessageTypeAction::should_reply(message.kind()) {
                tracing::debug!("ignoring unhandled {}", message.kind());
                return Dispatched::Ignored;
            }
            tracing::warn!("no action for {} from {}", message.kind(), message.sender);
            if let Err(e) = UnknownMessageTypeAction.process(&message, &self.gateway).await {
                tracing::error!("failed to answer unknown {}: {}", message.kind(), e);
            }
            return Dispatched::Unhandled;
        };

        let started = std::time::Instant::now();
        let outcome = AssertUnwindSafe(action.process(&message, &self.gateway))
            .catch_unwind()
            .await;
        tracing::debug!(elapsed_us = started.elapsed().as_micros() as u64, "action finished");
        let error = match outcome {
            Ok(Ok(())) => return Dispatched::Processed,
            Ok(Err(e)) => e.to_string(),
            Err(panic) => panic_message(panic.as_ref()),
        };
        tracing::warn!("{} from {} failed: {}", message.kind(), message.sender, error);
        if UnknownMessageTypeAction::should_reply(message.kind()) {
            if let Err(e) = self.gateway.reply(&message, MessageBody::Failure).await {
                tracing::error!("failed to send failure reply to {}: {}", message.sender, e);
            }
        }
        Dispatched::Failed
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::testing::{RecordingTransport, gateway};
    use interop_core::{EndpointId, MessageId};

    struct Echo;

    #[async_trait]
    impl ProcessAction for Echo {
        fn kind(&self) -> MessageKind {
            MessageKind::Success
        }

        async fn process(
            &self,
            message: &Message,
            gateway: &MessageGateway,
        ) -> Result<(), ActionError> {
            gateway.reply(message, MessageBody::Success).await?;
            Ok(())
        }
    }

    struct Broken {
        panic: bool,
    }

    #[async_trait]
    impl ProcessAction for Broken {
        fn kind(&self) -> MessageKind {
            MessageKind::DataDownloadRequest
        }

        async fn process(&self, _: &Message, _: &MessageGateway) -> Result<(), ActionError> {
            if self.panic {
                panic!("handler bug");
            }
            Err(ActionError::handler("no disk"))
        }
    }

    fn remote() -> EndpointId {
        EndpointId::named("remote")
    }

    fn download() -> MessageBody {
        MessageBody::DataDownloadRequest {
            token: interop_core::UploadToken::new(),
        }
    }

    #[tokio::test]
    async fn routes_to_action() {
        let (transport, mut sent) = RecordingTransport::new();
        let dispatcher = MessageDispatcher::new(gateway(transport));
        dispatcher.register(Arc::new(Echo)).unwrap();

        let request = Message::new(remote(), MessageBody::Success);
        assert_eq!(dispatcher.dispatch(request.clone()).await, Dispatched::Processed);
        let (to, reply) = sent.recv().await.unwrap();
        assert_eq!(to, remote());
        assert_eq!(reply.in_response_to, Some(request.id));
    }

    #[tokio::test]
    async fn duplicate_registration_fails() {
        let (transport, _sent) = RecordingTransport::new();
        let dispatcher = MessageDispatcher::new(gateway(transport));
        dispatcher.register(Arc::new(Echo)).unwrap();
        assert!(matches!(
            dispatcher.register(Arc::new(Echo)),
            Err(DispatchError::DuplicateAction(MessageKind::Success))
        ));
    }

    #[tokio::test]
    async fn unknown_kind_gets_unknown_reply() {
        let (transport, mut sent) = RecordingTransport::new();
        let dispatcher = MessageDispatcher::new(gateway(transport));
        let request = Message::new(remote(), download());
        assert_eq!(dispatcher.dispatch(request.clone()).await, Dispatched::Unhandled);
        let (_, reply) = sent.recv().await.unwrap();
        assert_eq!(reply.kind(), MessageKind::UnknownMessageType);
        assert_eq!(reply.in_response_to, Some(request.id));
    }

    #[tokio::test]
    async fn unknown_and_failure_are_never_answered() {
        let (transport, mut sent) = RecordingTransport::new();
        let dispatcher = MessageDispatcher::new(gateway(transport));
        for body in [MessageBody::UnknownMessageType, MessageBody::Failure] {
            let message = Message::new(remote(), body);
            assert_eq!(dispatcher.dispatch(message).await, Dispatched::Ignored);
        }
        drop(dispatcher);
        assert!(sent.recv().await.is_none());
    }

    #[tokio::test]
    async fn unmatched_reply_is_dropped() {
        let (transport, mut sent) = RecordingTransport::new();
        let dispatcher = MessageDispatcher::new(gateway(transport));
        let late = Message::response(remote(), MessageId::new(), MessageBody::Success);
        assert_eq!(dispatcher.dispatch(late).await, Dispatched::Dropped);
        drop(dispatcher);
        assert!(sent.recv().await.is_none());
    }

    #[tokio::test]
    async fn reply_completes_pending_request() {
        let (transport, mut sent) = RecordingTransport::new();
        let gateway = gateway(transport);
        let dispatcher = MessageDispatcher::new(gateway.clone());
        let pending = gateway
            .send_for_response(&remote(), MessageBody::Success)
            .await
            .unwrap();
        let (_, request) = sent.recv().await.unwrap();
        let reply = Message::response(remote(), request.id, MessageBody::Success);
        assert_eq!(dispatcher.dispatch(reply.clone()).await, Dispatched::Completed);
        assert_eq!(dispatcher.dispatch(reply).await, Dispatched::Dropped);
        assert_eq!(pending.wait().await.unwrap().kind(), MessageKind::Success);
    }

    #[tokio::test]
    async fn failing_action_gets_one_failure_reply() {
        for panic in [false, true] {
            let (transport, mut sent) = RecordingTransport::new();
            let dispatcher = MessageDispatcher::new(gateway(transport));
            dispatcher.register(Arc::new(Broken { panic })).unwrap();
            let request = Message::new(remote(), download());
            assert_eq!(dispatcher.dispatch(request.clone()).await, Dispatched::Failed);
            let (_, reply) = sent.recv().await.unwrap();
            assert_eq!(reply.kind(), MessageKind::Failure);
            assert_eq!(reply.in_response_to, Some(request.id));
            drop(dispatcher);
            assert!(sent.recv().await.is_none());
        }
    }

    #[tokio::test]
    async fn failed_failure_reply_is_swallowed() {
        let dispatcher = MessageDispatcher::new(gateway(RecordingTransport::failing()));
        dispatcher.register(Arc::new(Broken { panic: false })).unwrap();
        let request = Message::new(remote(), download());
        assert_eq!(dispatcher.dispatch(request).await, Dispatched::Failed);
    }
}
