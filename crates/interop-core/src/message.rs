//! Protocol messages.
//!
//! Every message is an envelope (`id`, `sender`, `in_response_to`) around a
//! kind-specific [`MessageBody`]. Messages are the in-memory form; the wire
//! form lives in `interop-wire`.

use crate::{
    CommandId, EndpointId, MessageId, NotificationId, ObjectValue, ParameterDefinition,
    ProtocolDescription, SubjectGroup, UploadToken, Version,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A message with its envelope.
#[derive(Debug, Clone)]
pub struct Message {
    pub id: MessageId,
    pub sender: EndpointId,
    /// `None` for requests, the request's id for responses.
    pub in_response_to: Option<MessageId>,
    pub body: MessageBody,
}

impl Message {
    /// Create a request with a fresh id.
    pub fn new(sender: EndpointId, body: MessageBody) -> Self {
        Self {
            id: MessageId::new(),
            sender,
            in_response_to: None,
            body,
        }
    }

    /// Create a response to `request` with a fresh id.
    pub fn response(sender: EndpointId, request: MessageId, body: MessageBody) -> Self {
        Self {
            id: MessageId::new(),
            sender,
            in_response_to: Some(request),
            body,
        }
    }

    /// The same envelope around an `UnknownMessageType` body.
    pub fn to_unknown(&self) -> Self {
        Self {
            id: self.id,
            sender: self.sender.clone(),
            in_response_to: self.in_response_to,
            body: MessageBody::UnknownMessageType,
        }
    }

    pub fn kind(&self) -> MessageKind {
        self.body.kind()
    }

    pub fn is_response(&self) -> bool {
        self.in_response_to.is_some()
    }
}

/// Kind-specific message payloads.
#[derive(Debug, Clone)]
pub enum MessageBody {
    /// Start of the handshake; also sent back as the handshake response.
    EndpointConnect(EndpointConnect),
    EndpointDisconnect {
        reason: String,
    },
    /// Liveness probe carrying opaque data that is echoed back.
    ConnectionVerification {
        custom_data: Option<ObjectValue>,
    },
    ConnectionVerificationResponse {
        custom_data: Option<ObjectValue>,
    },
    /// The subject groups the sender offers.
    EndpointInteractionInformation {
        groups: Vec<SubjectGroup>,
    },
    EndpointInteractionInformationResponse {
        state: InteractionConnectionState,
    },
    CommandInvoked {
        command: CommandId,
        arguments: Vec<CommandArgument>,
    },
    CommandInvokedResponse {
        result: ObjectValue,
    },
    RegisterForNotification {
        notification: NotificationId,
    },
    UnregisterFromNotification {
        notification: NotificationId,
    },
    NotificationRaised {
        notification: NotificationId,
        arguments: ObjectValue,
    },
    DataDownloadRequest {
        token: UploadToken,
    },
    Success,
    Failure,
    /// The receiver could not understand the message it answers.
    UnknownMessageType,
}

impl MessageBody {
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::EndpointConnect(_) => MessageKind::EndpointConnect,
            Self::EndpointDisconnect { .. } => MessageKind::EndpointDisconnect,
            Self::ConnectionVerification { .. } => MessageKind::ConnectionVerification,
            Self::ConnectionVerificationResponse { .. } => {
                MessageKind::ConnectionVerificationResponse
            }
            Self::EndpointInteractionInformation { .. } => {
                MessageKind::EndpointInteractionInformation
            }
            Self::EndpointInteractionInformationResponse { .. } => {
                MessageKind::EndpointInteractionInformationResponse
            }
            Self::CommandInvoked { .. } => MessageKind::CommandInvoked,
            Self::CommandInvokedResponse { .. } => MessageKind::CommandInvokedResponse,
            Self::RegisterForNotification { .. } => MessageKind::RegisterForNotification,
            Self::UnregisterFromNotification { .. } => MessageKind::UnregisterFromNotification,
            Self::NotificationRaised { .. } => MessageKind::NotificationRaised,
            Self::DataDownloadRequest { .. } => MessageKind::DataDownloadRequest,
            Self::Success => MessageKind::Success,
            Self::Failure => MessageKind::Failure,
            Self::UnknownMessageType => MessageKind::UnknownMessageType,
        }
    }
}

/// Discriminator of a message body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    EndpointConnect,
    EndpointDisconnect,
    ConnectionVerification,
    ConnectionVerificationResponse,
    EndpointInteractionInformation,
    EndpointInteractionInformationResponse,
    CommandInvoked,
    CommandInvokedResponse,
    RegisterForNotification,
    UnregisterFromNotification,
    NotificationRaised,
    DataDownloadRequest,
    Success,
    Failure,
    UnknownMessageType,
}

impl MessageKind {
    pub const ALL: [MessageKind; 15] = [
        Self::EndpointConnect,
        Self::EndpointDisconnect,
        Self::ConnectionVerification,
        Self::ConnectionVerificationResponse,
        Self::EndpointInteractionInformation,
        Self::EndpointInteractionInformationResponse,
        Self::CommandInvoked,
        Self::CommandInvokedResponse,
        Self::RegisterForNotification,
        Self::UnregisterFromNotification,
        Self::NotificationRaised,
        Self::DataDownloadRequest,
        Self::Success,
        Self::Failure,
        Self::UnknownMessageType,
    ];
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Handshake payload describing the sending endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointConnect {
    pub discovery: DiscoveryInformation,
    pub protocol: ProtocolInformation,
    pub description: ProtocolDescription,
}

/// Where the endpoint can be discovered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryInformation {
    pub address: String,
}

/// Protocol version and the addresses of the message and data channels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolInformation {
    pub version: Version,
    pub message_address: String,
    pub data_address: String,
}

/// One argument of a command call.
#[derive(Debug, Clone)]
pub struct CommandArgument {
    pub parameter: ParameterDefinition,
    pub value: ObjectValue,
}

/// Whether the receiver of interaction information wants to interact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionConnectionState {
    Desired,
    Denied,
}
