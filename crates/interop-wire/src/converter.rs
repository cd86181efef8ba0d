//! The converter contract.
//!
//! A converter translates one message kind between its in-memory form and
//! its data record. Most converters fail closed: anything they cannot
//! translate comes back as `UnknownMessageType` with the envelope intact.
//! Handshake converters (connect, disconnect, verification) return an error
//! instead, since an unknown-type reply cannot stand in for them.

use crate::v1::{DataHeader, DataObject};
use interop_core::{
    Message, MessageBody, MessageKind, SerializationError, TypeDescriptor, VersionParseError,
};

/// Translates one message kind.
pub trait MessageConverter: Send + Sync {
    /// The kind this converter handles.
    fn kind(&self) -> MessageKind;

    fn to_message(&self, data: &DataObject) -> Result<Message, ConversionError>;

    fn from_message(&self, message: &Message) -> Result<DataObject, ConversionError>;
}

/// Error translating between a message and its data record.
#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    #[error("converter for {expected} was given a {actual}")]
    KindMismatch {
        expected: MessageKind,
        actual: MessageKind,
    },
    #[error("no serializer registered for {0}")]
    MissingSerializer(TypeDescriptor),
    #[error("invalid {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },
    #[error(transparent)]
    Serialization(SerializationError),
    #[error(transparent)]
    Version(#[from] VersionParseError),
    #[error("malformed data object: {0}")]
    Malformed(#[from] serde_json::Error),
}

impl From<SerializationError> for ConversionError {
    fn from(e: SerializationError) -> Self {
        match e {
            SerializationError::MissingSerializer(ty) => Self::MissingSerializer(ty),
            other => Self::Serialization(other),
        }
    }
}

pub(crate) fn header_of(message: &Message) -> DataHeader {
    DataHeader {
        id: message.id,
        in_response_to: message.in_response_to,
        sender: message.sender.clone(),
    }
}

pub(crate) fn envelope(header: &DataHeader, body: MessageBody) -> Message {
    Message {
        id: header.id,
        sender: header.sender.clone(),
        in_response_to: header.in_response_to,
        body,
    }
}

pub(crate) fn kind_mismatch(expected: MessageKind, actual: MessageKind) -> ConversionError {
    ConversionError::KindMismatch { expected, actual }
}

/// Degrade a failed data-to-message conversion to an unknown-type message.
pub(crate) fn or_unknown_message(
    kind: MessageKind,
    header: &DataHeader,
    result: Result<Message, ConversionError>,
) -> Message {
    result.unwrap_or_else(|e| {
        tracing::debug!("{} record degraded to unknown type: {}", kind, e);
        envelope(header, MessageBody::UnknownMessageType)
    })
}

/// Degrade a failed message-to-data conversion to an unknown-type record.
pub(crate) fn or_unknown_data(
    kind: MessageKind,
    message: &Message,
    result: Result<DataObject, ConversionError>,
) -> DataObject {
    result.unwrap_or_else(|e| {
        tracing::debug!("{} message degraded to unknown type: {}", kind, e);
        DataObject::unknown(header_of(message))
    })
}
