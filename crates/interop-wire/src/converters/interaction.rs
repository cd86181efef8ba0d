//! Subject group exchange converters.

use crate::converter::{
    ConversionError, MessageConverter, envelope, header_of, kind_mismatch, or_unknown_data,
    or_unknown_message,
};
use crate::v1::{
    DataBody, DataObject, EndpointInteractionInformationData,
    EndpointInteractionInformationResponseData, InteractionStateData, SerializedSubjectGroup,
    SerializedTypeFallback,
};
use interop_core::{
    CommunicationSubject, InteractionConnectionState, Message, MessageBody, MessageKind,
    SubjectGroup, TypeFallback,
};

pub struct InteractionInformationConverter;

impl InteractionInformationConverter {
    fn try_to_message(&self, data: &DataObject) -> Result<Message, ConversionError> {
        let DataBody::EndpointInteractionInformation(info) = &data.body else {
            return Err(kind_mismatch(self.kind(), data.kind()));
        };
        let groups = info
            .groups
            .iter()
            .map(|g| {
                Ok(SubjectGroup {
                    subject: CommunicationSubject::new(g.subject.clone()),
                    commands: fallbacks(&g.commands)?,
                    notifications: fallbacks(&g.notifications)?,
                })
            })
            .collect::<Result<Vec<_>, ConversionError>>()?;
        Ok(envelope(
            &data.header,
            MessageBody::EndpointInteractionInformation { groups },
        ))
    }

    fn try_from_message(&self, message: &Message) -> Result<DataObject, ConversionError> {
        let MessageBody::EndpointInteractionInformation { groups } = &message.body else {
            return Err(kind_mismatch(self.kind(), message.kind()));
        };
        let groups = groups
            .iter()
            .map(|g| SerializedSubjectGroup {
                subject: g.subject.as_str().to_string(),
                commands: g.commands.iter().map(SerializedTypeFallback::from).collect(),
                notifications: g
                    .notifications
                    .iter()
                    .map(SerializedTypeFallback::from)
                    .collect(),
            })
            .collect();
        Ok(DataObject {
            header: header_of(message),
            body: DataBody::EndpointInteractionInformation(EndpointInteractionInformationData {
                groups,
            }),
        })
    }
}

fn fallbacks(data: &[SerializedTypeFallback]) -> Result<Vec<TypeFallback>, ConversionError> {
    data.iter()
        .map(|f| TypeFallback::try_from(f).map_err(ConversionError::from))
        .collect()
}

impl MessageConverter for InteractionInformationConverter {
    fn kind(&self) -> MessageKind {
        MessageKind::EndpointInteractionInformation
    }

    fn to_message(&self, data: &DataObject) -> Result<Message, ConversionError> {
        Ok(or_unknown_message(self.kind(), &data.header, self.try_to_message(data)))
    }

    fn from_message(&self, message: &Message) -> Result<DataObject, ConversionError> {
        Ok(or_unknown_data(self.kind(), message, self.try_from_message(message)))
    }
}

pub struct InteractionInformationResponseConverter;

impl MessageConverter for InteractionInformationResponseConverter {
    fn kind(&self) -> MessageKind {
        MessageKind::EndpointInteractionInformationResponse
    }

    fn to_message(&self, data: &DataObject) -> Result<Message, ConversionError> {
        let result = match &data.body {
            DataBody::EndpointInteractionInformationResponse(response) => {
                let state = match response.state {
                    InteractionStateData::Desired => InteractionConnectionState::Desired,
                    InteractionStateData::Denied => InteractionConnectionState::Denied,
                };
                Ok(envelope(
                    &data.header,
                    MessageBody::EndpointInteractionInformationResponse { state },
                ))
            }
            _ => Err(kind_mismatch(self.kind(), data.kind())),
        };
        Ok(or_unknown_message(self.kind(), &data.header, result))
    }

    fn from_message(&self, message: &Message) -> Result<DataObject, ConversionError> {
        let result = match &message.body {
            MessageBody::EndpointInteractionInformationResponse { state } => {
                let state = match state {
                    InteractionConnectionState::Desired => InteractionStateData::Desired,
                    InteractionConnectionState::Denied => InteractionStateData::Denied,
                };
                Ok(DataObject {
                    header: header_of(message),
                    body: DataBody::EndpointInteractionInformationResponse(
                        EndpointInteractionInformationResponseData { state },
                    ),
                })
            }
            _ => Err(kind_mismatch(self.kind(), message.kind())),
        };
        Ok(or_unknown_data(self.kind(), message, result))
    }
}
