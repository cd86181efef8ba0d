//! Connection verification converters.
//!
//! The custom data is opaque to the protocol but must be encodable; a
//! missing serializer is an error rather than a degradation because a lost
//! keep-alive looks exactly like a dead peer.

use crate::converter::{ConversionError, MessageConverter, envelope, header_of, kind_mismatch};
use crate::v1::{ConnectionVerificationData, DataBody, DataObject};
use interop_core::{
    Message, MessageBody, MessageKind, ObjectValue, SerializerRegistry, TypeDescriptor,
};
use std::sync::Arc;

/// Handles both `ConnectionVerification` and `ConnectionVerificationResponse`.
pub struct ConnectionVerificationConverter {
    serializers: Arc<SerializerRegistry>,
    response: bool,
}

impl ConnectionVerificationConverter {
    pub fn request(serializers: Arc<SerializerRegistry>) -> Self {
        Self {
            serializers,
            response: false,
        }
    }

    pub fn response(serializers: Arc<SerializerRegistry>) -> Self {
        Self {
            serializers,
            response: true,
        }
    }

    fn decode(
        &self,
        data: &ConnectionVerificationData,
    ) -> Result<Option<ObjectValue>, ConversionError> {
        match (&data.data_type, &data.custom_data) {
            (Some(ty), Some(bytes)) => {
                let descriptor = TypeDescriptor::from(ty);
                Ok(Some(self.serializers.decode(&descriptor, bytes)?))
            }
            (None, None) => Ok(None),
            _ => Err(ConversionError::InvalidField {
                field: "custom_data",
                reason: "data type and data must be present together".into(),
            }),
        }
    }

    fn encode(
        &self,
        value: Option<&ObjectValue>,
    ) -> Result<ConnectionVerificationData, ConversionError> {
        let Some(value) = value else {
            return Ok(ConnectionVerificationData {
                data_type: None,
                custom_data: None,
            });
        };
        let bytes = self.serializers.encode(value.descriptor(), value)?;
        Ok(ConnectionVerificationData {
            data_type: Some(value.descriptor().into()),
            custom_data: Some(bytes),
        })
    }
}

impl MessageConverter for ConnectionVerificationConverter {
    fn kind(&self) -> MessageKind {
        if self.response {
            MessageKind::ConnectionVerificationResponse
        } else {
            MessageKind::ConnectionVerification
        }
    }

    fn to_message(&self, data: &DataObject) -> Result<Message, ConversionError> {
        let body = match (&data.body, self.response) {
            (DataBody::ConnectionVerification(v), false) => MessageBody::ConnectionVerification {
                custom_data: self.decode(v)?,
            },
            (DataBody::ConnectionVerificationResponse(v), true) => {
                MessageBody::ConnectionVerificationResponse {
                    custom_data: self.decode(v)?,
                }
            }
            _ => return Err(kind_mismatch(self.kind(), data.kind())),
        };
        Ok(envelope(&data.header, body))
    }

    fn from_message(&self, message: &Message) -> Result<DataObject, ConversionError> {
        let body = match (&message.body, self.response) {
            (MessageBody::ConnectionVerification { custom_data }, false) => {
                DataBody::ConnectionVerification(self.encode(custom_data.as_ref())?)
            }
            (MessageBody::ConnectionVerificationResponse { custom_data }, true) => {
                DataBody::ConnectionVerificationResponse(self.encode(custom_data.as_ref())?)
            }
            _ => return Err(kind_mismatch(self.kind(), message.kind())),
        };
        Ok(DataObject {
            header: header_of(message),
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use interop_core::{EndpointId, MessageId};

    fn registry() -> Arc<SerializerRegistry> {
        Arc::new(SerializerRegistry::with_defaults())
    }

    #[test]
    fn request_roundtrip_with_data() {
        let converter = ConnectionVerificationConverter::request(registry());
        let message = Message::new(
            EndpointId::named("alpha"),
            MessageBody::ConnectionVerification {
                custom_data: Some(ObjectValue::new(42u64)),
            },
        );
        let data = converter.from_message(&message).unwrap();
        let back = converter.to_message(&data).unwrap();
        assert_eq!(back.id, message.id);
        let MessageBody::ConnectionVerification { custom_data } = back.body else {
            panic!("expected verification");
        };
        assert_eq!(custom_data.and_then(|v| v.cloned::<u64>()), Some(42));
    }

    #[test]
    fn response_roundtrip_without_data() {
        let converter = ConnectionVerificationConverter::response(registry());
        let message = Message::response(
            EndpointId::named("beta"),
            MessageId::new(),
            MessageBody::ConnectionVerificationResponse { custom_data: None },
        );
        let data = converter.from_message(&message).unwrap();
        let back = converter.to_message(&data).unwrap();
        assert_eq!(back.in_response_to, message.in_response_to);
        assert!(matches!(
            back.body,
            MessageBody::ConnectionVerificationResponse { custom_data: None }
        ));
    }

    #[test]
    fn missing_serializer_is_an_error() {
        #[derive(Clone)]
        struct Opaque;
        let converter = ConnectionVerificationConverter::request(registry());
        let message = Message::new(
            EndpointId::named("alpha"),
            MessageBody::ConnectionVerification {
                custom_data: Some(ObjectValue::new(Opaque)),
            },
        );
        assert!(matches!(
            converter.from_message(&message),
            Err(ConversionError::MissingSerializer(_))
        ));
    }

    #[test]
    fn request_converter_refuses_response() {
        let converter = ConnectionVerificationConverter::request(registry());
        let message = Message::new(
            EndpointId::named("alpha"),
            MessageBody::ConnectionVerificationResponse { custom_data: None },
        );
        assert!(converter.from_message(&message).is_err());
    }
}
