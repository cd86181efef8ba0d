//! Handshake converters: connect and disconnect.
//!
//! Neither degrades; a handshake record that cannot be translated is an error.

use crate::converter::{ConversionError, MessageConverter, envelope, header_of, kind_mismatch};
use crate::v1::{DataBody, DataObject, EndpointConnectData, EndpointDisconnectData};
use interop_core::{
    CommunicationSubject, DiscoveryInformation, EndpointConnect, Message, MessageBody, MessageKind,
    ProtocolDescription, ProtocolInformation,
};

pub struct EndpointConnectConverter;

impl MessageConverter for EndpointConnectConverter {
    fn kind(&self) -> MessageKind {
        MessageKind::EndpointConnect
    }

    fn to_message(&self, data: &DataObject) -> Result<Message, ConversionError> {
        let DataBody::EndpointConnect(connect) = &data.body else {
            return Err(kind_mismatch(self.kind(), data.kind()));
        };
        let body = EndpointConnect {
            discovery: DiscoveryInformation {
                address: connect.discovery_address.clone(),
            },
            protocol: ProtocolInformation {
                version: connect.protocol_version.parse()?,
                message_address: connect.message_address.clone(),
                data_address: connect.data_address.clone(),
            },
            description: ProtocolDescription::new(
                connect
                    .subjects
                    .iter()
                    .map(CommunicationSubject::new)
                    .collect(),
            ),
        };
        Ok(envelope(&data.header, MessageBody::EndpointConnect(body)))
    }

    fn from_message(&self, message: &Message) -> Result<DataObject, ConversionError> {
        let MessageBody::EndpointConnect(connect) = &message.body else {
            return Err(kind_mismatch(self.kind(), message.kind()));
        };
        let data = EndpointConnectData {
            discovery_address: connect.discovery.address.clone(),
            protocol_version: connect.protocol.version.to_string(),
            message_address: connect.protocol.message_address.clone(),
            data_address: connect.protocol.data_address.clone(),
            subjects: connect
                .description
                .subjects
                .iter()
                .map(|s| s.as_str().to_string())
                .collect(),
        };
        Ok(DataObject {
            header: header_of(message),
            body: DataBody::EndpointConnect(data),
        })
    }
}

pub struct EndpointDisconnectConverter;

impl MessageConverter for EndpointDisconnectConverter {
    fn kind(&self) -> MessageKind {
        MessageKind::EndpointDisconnect
    }

    fn to_message(&self, data: &DataObject) -> Result<Message, ConversionError> {
        let DataBody::EndpointDisconnect(disconnect) = &data.body else {
            return Err(kind_mismatch(self.kind(), data.kind()));
        };
        Ok(envelope(
            &data.header,
            MessageBody::EndpointDisconnect {
                reason: disconnect.reason.clone(),
            },
        ))
    }

    fn from_message(&self, message: &Message) -> Result<DataObject, ConversionError> {
        let MessageBody::EndpointDisconnect { reason } = &message.body else {
            return Err(kind_mismatch(self.kind(), message.kind()));
        };
        Ok(DataObject {
            header: header_of(message),
            body: DataBody::EndpointDisconnect(EndpointDisconnectData {
                reason: reason.clone(),
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use interop_core::{EndpointId, Version};

    fn connect_message() -> Message {
        Message::new(
            EndpointId::named("alpha"),
            MessageBody::EndpointConnect(EndpointConnect {
                discovery: DiscoveryInformation {
                    address: "mem://alpha".into(),
                },
                protocol: ProtocolInformation {
                    version: Version::new(1, 2, 0),
                    message_address: "mem://alpha/messages".into(),
                    data_address: "mem://alpha/data".into(),
                },
                description: ProtocolDescription::new(vec![CommunicationSubject::new("demo")]),
            }),
        )
    }

    #[test]
    fn connect_roundtrip() {
        let message = connect_message();
        let data = EndpointConnectConverter.from_message(&message).unwrap();
        let back = EndpointConnectConverter.to_message(&data).unwrap();
        assert_eq!(back.id, message.id);
        assert_eq!(back.sender, message.sender);
        assert_eq!(back.in_response_to, None);
        match (back.body, message.body) {
            (MessageBody::EndpointConnect(a), MessageBody::EndpointConnect(b)) => assert_eq!(a, b),
            _ => panic!("expected connect bodies"),
        }
        let again = EndpointConnectConverter.to_message(&data).unwrap();
        assert_eq!(EndpointConnectConverter.from_message(&again).unwrap(), data);
    }

    #[test]
    fn connect_rejects_bad_version() {
        let mut data = EndpointConnectConverter
            .from_message(&connect_message())
            .unwrap();
        if let DataBody::EndpointConnect(c) = &mut data.body {
            c.protocol_version = "one".into();
        }
        assert!(matches!(
            EndpointConnectConverter.to_message(&data),
            Err(ConversionError::Version(_))
        ));
    }

    #[test]
    fn connect_rejects_other_kinds() {
        let message = Message::new(EndpointId::named("alpha"), MessageBody::Success);
        assert!(matches!(
            EndpointConnectConverter.from_message(&message),
            Err(ConversionError::KindMismatch { .. })
        ));
    }

    #[test]
    fn disconnect_roundtrip() {
        let message = Message::new(
            EndpointId::named("alpha"),
            MessageBody::EndpointDisconnect {
                reason: "shutting down".into(),
            },
        );
        let data = EndpointDisconnectConverter.from_message(&message).unwrap();
        let back = EndpointDisconnectConverter.to_message(&data).unwrap();
        assert!(matches!(
            back.body,
            MessageBody::EndpointDisconnect { ref reason } if reason == "shutting down"
        ));
        assert_eq!(back.id, message.id);
        let unknown = DataObject::unknown(data.header);
        assert!(EndpointDisconnectConverter.to_message(&unknown).is_err());
    }
}
