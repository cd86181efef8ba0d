//! Command call and command result converters.

use crate::converter::{
    ConversionError, MessageConverter, envelope, header_of, kind_mismatch, or_unknown_data,
    or_unknown_message,
};
use crate::v1::{CommandInvokedData, CommandInvokedResponseData, DataBody, DataObject};
use interop_core::{
    CommandArgument, CommandId, Message, MessageBody, MessageKind, ParameterDefinition,
    SerializerRegistry, TypeDescriptor,
};
use std::sync::Arc;

pub struct CommandInvokedConverter {
    serializers: Arc<SerializerRegistry>,
}

impl CommandInvokedConverter {
    pub fn new(serializers: Arc<SerializerRegistry>) -> Self {
        Self { serializers }
    }

    fn try_to_message(&self, data: &DataObject) -> Result<Message, ConversionError> {
        let DataBody::CommandInvoked(call) = &data.body else {
            return Err(kind_mismatch(self.kind(), data.kind()));
        };
        let count = call.parameter_types.len();
        if call.parameter_names.len() != count || call.parameter_values.len() != count {
            return Err(ConversionError::InvalidField {
                field: "parameters",
                reason: format!(
                    "{} types, {} names, {} values",
                    count,
                    call.parameter_names.len(),
                    call.parameter_values.len()
                ),
            });
        }
        let arguments = call
            .parameter_types
            .iter()
            .zip(&call.parameter_names)
            .zip(&call.parameter_values)
            .map(|((ty, name), bytes)| {
                let ty = TypeDescriptor::from(ty);
                let value = self.serializers.decode(&ty, bytes)?;
                Ok(CommandArgument {
                    parameter: ParameterDefinition::new(name.clone(), ty),
                    value,
                })
            })
            .collect::<Result<Vec<_>, ConversionError>>()?;
        Ok(envelope(
            &data.header,
            MessageBody::CommandInvoked {
                command: CommandId::from_canonical(call.command_id.clone()),
                arguments,
            },
        ))
    }

    fn try_from_message(&self, message: &Message) -> Result<DataObject, ConversionError> {
        let MessageBody::CommandInvoked { command, arguments } = &message.body else {
            return Err(kind_mismatch(self.kind(), message.kind()));
        };
        let mut data = CommandInvokedData {
            command_id: command.as_str().to_string(),
            parameter_types: Vec::with_capacity(arguments.len()),
            parameter_names: Vec::with_capacity(arguments.len()),
            parameter_values: Vec::with_capacity(arguments.len()),
        };
        for argument in arguments {
            let bytes = self
                .serializers
                .encode(&argument.parameter.ty, &argument.value)?;
            data.parameter_types.push((&argument.parameter.ty).into());
            data.parameter_names.push(argument.parameter.name.clone());
            data.parameter_values.push(bytes);
        }
        Ok(DataObject {
            header: header_of(message),
            body: DataBody::CommandInvoked(data),
        })
    }
}

impl MessageConverter for CommandInvokedConverter {
    fn kind(&self) -> MessageKind {
        MessageKind::CommandInvoked
    }

    fn to_message(&self, data: &DataObject) -> Result<Message, ConversionError> {
        Ok(or_unknown_message(self.kind(), &data.header, self.try_to_message(data)))
    }

    fn from_message(&self, message: &Message) -> Result<DataObject, ConversionError> {
        Ok(or_unknown_data(self.kind(), message, self.try_from_message(message)))
    }
}

pub struct CommandInvokedResponseConverter {
    serializers: Arc<SerializerRegistry>,
}

impl CommandInvokedResponseConverter {
    pub fn new(serializers: Arc<SerializerRegistry>) -> Self {
        Self { serializers }
    }

    fn try_to_message(&self, data: &DataObject) -> Result<Message, ConversionError> {
        let DataBody::CommandInvokedResponse(response) = &data.body else {
            return Err(kind_mismatch(self.kind(), data.kind()));
        };
        let ty = TypeDescriptor::from(&response.returned_type);
        let result = self.serializers.decode(&ty, &response.result)?;
        Ok(envelope(
            &data.header,
            MessageBody::CommandInvokedResponse { result },
        ))
    }

    fn try_from_message(&self, message: &Message) -> Result<DataObject, ConversionError> {
        let MessageBody::CommandInvokedResponse { result } = &message.body else {
            return Err(kind_mismatch(self.kind(), message.kind()));
        };
        let bytes = self.serializers.encode(result.descriptor(), result)?;
        Ok(DataObject {
            header: header_of(message),
            body: DataBody::CommandInvokedResponse(CommandInvokedResponseData {
                returned_type: result.descriptor().into(),
                result: bytes,
            }),
        })
    }
}

impl MessageConverter for CommandInvokedResponseConverter {
    fn kind(&self) -> MessageKind {
        MessageKind::CommandInvokedResponse
    }

    fn to_message(&self, data: &DataObject) -> Result<Message, ConversionError> {
        Ok(or_unknown_message(self.kind(), &data.header, self.try_to_message(data)))
    }

    fn from_message(&self, message: &Message) -> Result<DataObject, ConversionError> {
        Ok(or_unknown_data(self.kind(), message, self.try_from_message(message)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use interop_core::{EndpointId, MessageId, ObjectValue};

    fn registry() -> Arc<SerializerRegistry> {
        Arc::new(SerializerRegistry::with_defaults())
    }

    fn echo_call(value: ObjectValue) -> Message {
        let string = TypeDescriptor::of::<String>();
        Message::new(
            EndpointId::named("local"),
            MessageBody::CommandInvoked {
                command: CommandId::from_signature(
                    &TypeDescriptor::new("Acme.TestCommandSet", "acme"),
                    "echo",
                    &[string.clone()],
                    None,
                ),
                arguments: vec![CommandArgument {
                    parameter: ParameterDefinition::new("name", string),
                    value,
                }],
            },
        )
    }

    #[test]
    fn call_roundtrip() {
        let converter = CommandInvokedConverter::new(registry());
        let message = echo_call(ObjectValue::new(String::from("hi")));
        let data = converter.from_message(&message).unwrap();
        assert!(matches!(data.body, DataBody::CommandInvoked(_)));

        let back = converter.to_message(&data).unwrap();
        let MessageBody::CommandInvoked { command, arguments: args } = &back.body else {
            panic!("expected a command call");
        };
        let MessageBody::CommandInvoked { command: sent, .. } = &message.body else {
            unreachable!()
        };
        assert_eq!(command, sent);
        assert_eq!(args.len(), 1);
        assert_eq!(args[0].parameter.name, "name");
        assert_eq!(args[0].value.cloned::<String>().as_deref(), Some("hi"));
        assert_eq!(back.id, message.id);
        assert_eq!(back.sender, message.sender);
    }

    #[test]
    fn call_with_unencodable_value_degrades() {
        let converter = CommandInvokedConverter::new(registry());
        let message = echo_call(ObjectValue::new(17i32));
        let data = converter.from_message(&message).unwrap();
        assert_eq!(data.body, DataBody::UnknownMessageType);
        assert_eq!(data.header.id, message.id);
    }

    #[test]
    fn call_with_unknown_type_degrades() {
        let converter = CommandInvokedConverter::new(registry());
        let message = echo_call(ObjectValue::new(String::from("hi")));
        let mut data = converter.from_message(&message).unwrap();
        if let DataBody::CommandInvoked(call) = &mut data.body {
            call.parameter_types[0].full_name = "Acme.Unknown".into();
        }
        let back = converter.to_message(&data).unwrap();
        assert_eq!(back.kind(), MessageKind::UnknownMessageType);
        assert_eq!(back.id, message.id);
    }

    #[test]
    fn call_with_ragged_parameters_degrades() {
        let converter = CommandInvokedConverter::new(registry());
        let mut data = converter
            .from_message(&echo_call(ObjectValue::new(String::from("hi"))))
            .unwrap();
        if let DataBody::CommandInvoked(call) = &mut data.body {
            call.parameter_names.clear();
        }
        assert_eq!(
            converter.to_message(&data).unwrap().kind(),
            MessageKind::UnknownMessageType
        );
    }

    #[test]
    fn response_roundtrip() {
        let converter = CommandInvokedResponseConverter::new(registry());
        let message = Message::response(
            EndpointId::named("other"),
            MessageId::new(),
            MessageBody::CommandInvokedResponse {
                result: ObjectValue::new(7i32),
            },
        );
        let data = converter.from_message(&message).unwrap();
        let back = converter.to_message(&data).unwrap();
        assert_eq!(back.in_response_to, message.in_response_to);
        let MessageBody::CommandInvokedResponse { result } = back.body else {
            panic!("expected a command response");
        };
        assert_eq!(result.cloned::<i32>(), Some(7));
    }

    #[test]
    fn wrong_kind_degrades_with_envelope() {
        let converter = CommandInvokedResponseConverter::new(registry());
        let message =
            Message::response(EndpointId::named("other"), MessageId::new(), MessageBody::Failure);
        let data = converter.from_message(&message).unwrap();
        assert_eq!(data.body, DataBody::UnknownMessageType);
        assert_eq!(data.header.id, message.id);
        assert_eq!(data.header.sender, message.sender);
        assert_eq!(data.header.in_response_to, message.in_response_to);
    }
}
