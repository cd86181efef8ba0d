//! Converter aggregate and the JSON codec.

use crate::converter::{ConversionError, MessageConverter, envelope, header_of};
use crate::converters::{
    CommandInvokedConverter, CommandInvokedResponseConverter, ConnectionVerificationConverter,
    DataDownloadRequestConverter, EndpointConnectConverter, EndpointDisconnectConverter,
    InteractionInformationConverter, InteractionInformationResponseConverter,
    NotificationRaisedConverter, NotificationRegistrationConverter, StatusConverter,
};
use crate::v1::{DataBody, DataHeader, DataObject};
use interop_core::{Message, MessageBody, MessageKind, SerializerRegistry};
use std::collections::HashMap;
use std::sync::Arc;

/// Picks the converter for a message or record by its kind.
#[derive(Clone)]
pub struct WireTranslator {
    converters: HashMap<MessageKind, Arc<dyn MessageConverter>>,
}

impl WireTranslator {
    /// A translator with every v1 converter, encoding payload values through
    /// `serializers`.
    pub fn new(serializers: Arc<SerializerRegistry>) -> Self {
        let mut translator = Self::empty();
        translator.register(EndpointConnectConverter);
        translator.register(EndpointDisconnectConverter);
        translator.register(ConnectionVerificationConverter::request(serializers.clone()));
        translator.register(ConnectionVerificationConverter::response(serializers.clone()));
        translator.register(InteractionInformationConverter);
        translator.register(InteractionInformationResponseConverter);
        translator.register(CommandInvokedConverter::new(serializers.clone()));
        translator.register(CommandInvokedResponseConverter::new(serializers.clone()));
        translator.register(NotificationRegistrationConverter::register());
        translator.register(NotificationRegistrationConverter::unregister());
        translator.register(NotificationRaisedConverter::new(serializers));
        translator.register(DataDownloadRequestConverter);
        translator.register(StatusConverter::success());
        translator.register(StatusConverter::failure());
        translator.register(StatusConverter::unknown());
        translator
    }

    /// A translator with no converters; every kind degrades.
    pub fn empty() -> Self {
        Self {
            converters: HashMap::new(),
        }
    }

    /// Install `converter`, replacing any previous one for its kind.
    pub fn register(&mut self, converter: impl MessageConverter + 'static) {
        self.converters.insert(converter.kind(), Arc::new(converter));
    }

    pub fn converter_for(&self, kind: MessageKind) -> Option<&Arc<dyn MessageConverter>> {
        self.converters.get(&kind)
    }

    pub fn to_message(&self, data: &DataObject) -> Result<Message, ConversionError> {
        match self.converters.get(&data.kind()) {
            Some(converter) => converter.to_message(data),
            None => {
                tracing::debug!("no converter for {} record", data.kind());
                Ok(envelope(&data.header, MessageBody::UnknownMessageType))
            }
        }
    }

    pub fn from_message(&self, message: &Message) -> Result<DataObject, ConversionError> {
        match self.converters.get(&message.kind()) {
            Some(converter) => converter.from_message(message),
            None => {
                tracing::debug!("no converter for {} message", message.kind());
                Ok(DataObject {
                    header: header_of(message),
                    body: DataBody::UnknownMessageType,
                })
            }
        }
    }
}

/// Body tags whose records must decode exactly; a reply of unknown type
/// cannot stand in for them.
const STRICT_TAGS: [&str; 4] = [
    "endpoint_connect",
    "endpoint_disconnect",
    "connection_verification",
    "connection_verification_response",
];

#[derive(serde::Deserialize)]
struct RawDataObject {
    header: DataHeader,
    body: serde_json::Value,
}

/// Encodes messages as JSON data objects.
#[derive(Clone)]
pub struct WireCodec {
    translator: Arc<WireTranslator>,
}

impl WireCodec {
    pub fn new(translator: Arc<WireTranslator>) -> Self {
        Self { translator }
    }

    pub fn translator(&self) -> &WireTranslator {
        &self.translator
    }

    pub fn encode(&self, message: &Message) -> Result<Vec<u8>, ConversionError> {
        let data = self.translator.from_message(message)?;
        Ok(serde_json::to_vec(&data)?)
    }

    /// Decode a record. Only bytes without a readable header are malformed;
    /// a body that does not parse degrades to `UnknownMessageType`, except
    /// for the handshake kinds.
    pub fn decode(&self, bytes: &[u8]) -> Result<Message, ConversionError> {
        let RawDataObject { header, body } = serde_json::from_slice(bytes)?;
        let tag = body.get("type").and_then(|t| t.as_str()).map(str::to_owned);
        let data = match serde_json::from_value::<DataBody>(body) {
            Ok(body) => DataObject { header, body },
            Err(e) => {
                if tag.as_deref().is_some_and(|t| STRICT_TAGS.contains(&t)) {
                    return Err(e.into());
                }
                tracing::debug!("undecodable {:?} record degraded to unknown type: {}", tag, e);
                DataObject::unknown(header)
            }
        };
        self.translator.to_message(&data)
    }
}
