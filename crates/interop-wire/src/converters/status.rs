//! Body-less status replies.

use crate::converter::{
    ConversionError, MessageConverter, envelope, header_of, kind_mismatch, or_unknown_data,
    or_unknown_message,
};
use crate::v1::{DataBody, DataObject};
use interop_core::{Message, MessageBody, MessageKind};

/// Converts `Success`, `Failure` or `UnknownMessageType`.
pub struct StatusConverter {
    kind: MessageKind,
}

impl StatusConverter {
    pub fn success() -> Self {
        Self {
            kind: MessageKind::Success,
        }
    }

    pub fn failure() -> Self {
        Self {
            kind: MessageKind::Failure,
        }
    }

    pub fn unknown() -> Self {
        Self {
            kind: MessageKind::UnknownMessageType,
        }
    }
}

impl MessageConverter for StatusConverter {
    fn kind(&self) -> MessageKind {
        self.kind
    }

    fn to_message(&self, data: &DataObject) -> Result<Message, ConversionError> {
        let result = match (&data.body, self.kind) {
            (DataBody::Success, MessageKind::Success) => Ok(MessageBody::Success),
            (DataBody::Failure, MessageKind::Failure) => Ok(MessageBody::Failure),
            (DataBody::UnknownMessageType, MessageKind::UnknownMessageType) => {
                Ok(MessageBody::UnknownMessageType)
            }
            _ => Err(kind_mismatch(self.kind, data.kind())),
        }
        .map(|body| envelope(&data.header, body));
        Ok(or_unknown_message(self.kind, &data.header, result))
    }

    fn from_message(&self, message: &Message) -> Result<DataObject, ConversionError> {
        let result = match (&message.body, self.kind) {
            (MessageBody::Success, MessageKind::Success) => Ok(DataBody::Success),
            (MessageBody::Failure, MessageKind::Failure) => Ok(DataBody::Failure),
            (MessageBody::UnknownMessageType, MessageKind::UnknownMessageType) => {
                Ok(DataBody::UnknownMessageType)
            }
            _ => Err(kind_mismatch(self.kind, message.kind())),
        }
        .map(|body| DataObject {
            header: header_of(message),
            body,
        });
        Ok(or_unknown_data(self.kind, message, result))
    }
}
