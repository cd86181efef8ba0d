//! Notification subscription and delivery converters.

use crate::converter::{
    ConversionError, MessageConverter, envelope, header_of, kind_mismatch, or_unknown_data,
    or_unknown_message,
};
use crate::v1::{DataBody, DataObject, NotificationRaisedData, NotificationRegistrationData};
use interop_core::{
    Message, MessageBody, MessageKind, NotificationId, SerializerRegistry, TypeDescriptor,
};
use std::sync::Arc;

fn registration_data(notification: &NotificationId) -> NotificationRegistrationData {
    NotificationRegistrationData {
        interface_type: notification.interface().into(),
        event_name: notification.event().to_string(),
    }
}

fn notification_of(data: &NotificationRegistrationData) -> NotificationId {
    NotificationId::new((&data.interface_type).into(), data.event_name.clone())
}

/// Handles both subscribe and unsubscribe records, which share a layout.
pub struct NotificationRegistrationConverter {
    register: bool,
}

impl NotificationRegistrationConverter {
    pub fn register() -> Self {
        Self { register: true }
    }

    pub fn unregister() -> Self {
        Self { register: false }
    }
}

impl MessageConverter for NotificationRegistrationConverter {
    fn kind(&self) -> MessageKind {
        if self.register {
            MessageKind::RegisterForNotification
        } else {
            MessageKind::UnregisterFromNotification
        }
    }

    fn to_message(&self, data: &DataObject) -> Result<Message, ConversionError> {
        let body = match (&data.body, self.register) {
            (DataBody::RegisterForNotification(r), true) => {
                Ok(MessageBody::RegisterForNotification {
                    notification: notification_of(r),
                })
            }
            (DataBody::UnregisterFromNotification(r), false) => {
                Ok(MessageBody::UnregisterFromNotification {
                    notification: notification_of(r),
                })
            }
            _ => Err(kind_mismatch(self.kind(), data.kind())),
        };
        let result = body.map(|body| envelope(&data.header, body));
        Ok(or_unknown_message(self.kind(), &data.header, result))
    }

    fn from_message(&self, message: &Message) -> Result<DataObject, ConversionError> {
        let body = match (&message.body, self.register) {
            (MessageBody::RegisterForNotification { notification }, true) => {
                Ok(DataBody::RegisterForNotification(registration_data(notification)))
            }
            (MessageBody::UnregisterFromNotification { notification }, false) => {
                Ok(DataBody::UnregisterFromNotification(registration_data(notification)))
            }
            _ => Err(kind_mismatch(self.kind(), message.kind())),
        };
        let result = body.map(|body| DataObject {
            header: header_of(message),
            body,
        });
        Ok(or_unknown_data(self.kind(), message, result))
    }
}

pub struct NotificationRaisedConverter {
    serializers: Arc<SerializerRegistry>,
}

impl NotificationRaisedConverter {
    pub fn new(serializers: Arc<SerializerRegistry>) -> Self {
        Self { serializers }
    }

    fn try_to_message(&self, data: &DataObject) -> Result<Message, ConversionError> {
        let DataBody::NotificationRaised(raised) = &data.body else {
            return Err(kind_mismatch(self.kind(), data.kind()));
        };
        let ty = TypeDescriptor::from(&raised.event_arguments_type);
        let arguments = self.serializers.decode(&ty, &raised.event_arguments)?;
        Ok(envelope(
            &data.header,
            MessageBody::NotificationRaised {
                notification: NotificationId::new(
                    (&raised.interface_type).into(),
                    raised.event_name.clone(),
                ),
                arguments,
            },
        ))
    }

    fn try_from_message(&self, message: &Message) -> Result<DataObject, ConversionError> {
        let MessageBody::NotificationRaised {
            notification,
            arguments,
        } = &message.body
        else {
            return Err(kind_mismatch(self.kind(), message.kind()));
        };
        let bytes = self.serializers.encode(arguments.descriptor(), arguments)?;
        Ok(DataObject {
            header: header_of(message),
            body: DataBody::NotificationRaised(NotificationRaisedData {
                interface_type: notification.interface().into(),
                event_name: notification.event().to_string(),
                event_arguments_type: arguments.descriptor().into(),
                event_arguments: bytes,
            }),
        })
    }
}

impl MessageConverter for NotificationRaisedConverter {
    fn kind(&self) -> MessageKind {
        MessageKind::NotificationRaised
    }

    fn to_message(&self, data: &DataObject) -> Result<Message, ConversionError> {
        Ok(or_unknown_message(self.kind(), &data.header, self.try_to_message(data)))
    }

    fn from_message(&self, message: &Message) -> Result<DataObject, ConversionError> {
        Ok(or_unknown_data(self.kind(), message, self.try_from_message(message)))
    }
}
