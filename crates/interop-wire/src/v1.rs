//! Version 1 data objects.
//!
//! These are flat, serde-friendly records. Identities are plain strings and
//! payload values are already-encoded bytes, so a record can always be parsed
//! even when the types it mentions are unknown to the receiver.

use interop_core::{
    EndpointId, MessageId, MessageKind, TypeDescriptor, TypeFallback, Version, VersionParseError,
    VersionedType,
};
use serde::{Deserialize, Serialize};

/// Version of the data object layout in this module.
pub const WIRE_VERSION: Version = Version::new(1, 0, 0);

/// Envelope fields carried by every record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataHeader {
    pub id: MessageId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_response_to: Option<MessageId>,
    pub sender: EndpointId,
}

/// A complete data record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataObject {
    pub header: DataHeader,
    pub body: DataBody,
}

impl DataObject {
    pub fn kind(&self) -> MessageKind {
        self.body.kind()
    }

    /// An `UnknownMessageType` record with the given envelope.
    pub fn unknown(header: DataHeader) -> Self {
        Self {
            header,
            body: DataBody::UnknownMessageType,
        }
    }
}

/// Kind-specific record contents.
///
/// Tags this version does not know deserialize to `UnknownMessageType`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DataBody {
    EndpointConnect(EndpointConnectData),
    EndpointDisconnect(EndpointDisconnectData),
    ConnectionVerification(ConnectionVerificationData),
    ConnectionVerificationResponse(ConnectionVerificationData),
    EndpointInteractionInformation(EndpointInteractionInformationData),
    EndpointInteractionInformationResponse(EndpointInteractionInformationResponseData),
    CommandInvoked(CommandInvokedData),
    CommandInvokedResponse(CommandInvokedResponseData),
    RegisterForNotification(NotificationRegistrationData),
    UnregisterFromNotification(NotificationRegistrationData),
    NotificationRaised(NotificationRaisedData),
    DataDownloadRequest(DataDownloadRequestData),
    Success,
    Failure,
    #[serde(other)]
    UnknownMessageType,
}

impl DataBody {
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::EndpointConnect(_) => MessageKind::EndpointConnect,
            Self::EndpointDisconnect(_) => MessageKind::EndpointDisconnect,
            Self::ConnectionVerification(_) => MessageKind::ConnectionVerification,
            Self::ConnectionVerificationResponse(_) => MessageKind::ConnectionVerificationResponse,
            Self::EndpointInteractionInformation(_) => MessageKind::EndpointInteractionInformation,
            Self::EndpointInteractionInformationResponse(_) => {
                MessageKind::EndpointInteractionInformationResponse
            }
            Self::CommandInvoked(_) => MessageKind::CommandInvoked,
            Self::CommandInvokedResponse(_) => MessageKind::CommandInvokedResponse,
            Self::RegisterForNotification(_) => MessageKind::RegisterForNotification,
            Self::UnregisterFromNotification(_) => MessageKind::UnregisterFromNotification,
            Self::NotificationRaised(_) => MessageKind::NotificationRaised,
            Self::DataDownloadRequest(_) => MessageKind::DataDownloadRequest,
            Self::Success => MessageKind::Success,
            Self::Failure => MessageKind::Failure,
            Self::UnknownMessageType => MessageKind::UnknownMessageType,
        }
    }
}

/// A type identity on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedType {
    pub full_name: String,
    pub module_name: String,
}

impl From<&TypeDescriptor> for SerializedType {
    fn from(descriptor: &TypeDescriptor) -> Self {
        Self {
            full_name: descriptor.full_name().to_string(),
            module_name: descriptor.module_name().to_string(),
        }
    }
}

impl From<&SerializedType> for TypeDescriptor {
    fn from(ty: &SerializedType) -> Self {
        TypeDescriptor::new(ty.full_name.clone(), ty.module_name.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedVersionedType {
    #[serde(rename = "type")]
    pub ty: SerializedType,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedTypeFallback {
    pub types: Vec<SerializedVersionedType>,
}

impl From<&TypeFallback> for SerializedTypeFallback {
    fn from(fallback: &TypeFallback) -> Self {
        Self {
            types: fallback
                .types()
                .iter()
                .map(|t| SerializedVersionedType {
                    ty: (&t.descriptor).into(),
                    version: t.version.to_string(),
                })
                .collect(),
        }
    }
}

impl TryFrom<&SerializedTypeFallback> for TypeFallback {
    type Error = VersionParseError;

    fn try_from(data: &SerializedTypeFallback) -> Result<Self, Self::Error> {
        let types = data
            .types
            .iter()
            .map(|t| Ok(VersionedType::new((&t.ty).into(), t.version.parse()?)))
            .collect::<Result<Vec<_>, VersionParseError>>()?;
        Ok(TypeFallback::new(types))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointConnectData {
    pub discovery_address: String,
    pub protocol_version: String,
    pub message_address: String,
    pub data_address: String,
    pub subjects: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointDisconnectData {
    pub reason: String,
}

/// Shared by verification requests and responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionVerificationData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<SerializedType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_data: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedSubjectGroup {
    pub subject: String,
    pub commands: Vec<SerializedTypeFallback>,
    pub notifications: Vec<SerializedTypeFallback>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointInteractionInformationData {
    pub groups: Vec<SerializedSubjectGroup>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionStateData {
    Desired,
    Denied,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointInteractionInformationResponseData {
    pub state: InteractionStateData,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandInvokedData {
    pub command_id: String,
    pub parameter_types: Vec<SerializedType>,
    pub parameter_names: Vec<String>,
    pub parameter_values: Vec<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandInvokedResponseData {
    pub returned_type: SerializedType,
    pub result: Vec<u8>,
}

/// Shared by register and unregister records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRegistrationData {
    pub interface_type: SerializedType,
    pub event_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRaisedData {
    pub interface_type: SerializedType,
    pub event_name: String,
    pub event_arguments_type: SerializedType,
    pub event_arguments: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataDownloadRequestData {
    pub token: String,
}
