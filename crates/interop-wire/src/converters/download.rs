//! Data download request converter.

use crate::converter::{
    ConversionError, MessageConverter, envelope, header_of, kind_mismatch, or_unknown_data,
    or_unknown_message,
};
use crate::v1::{DataBody, DataDownloadRequestData, DataObject};
use interop_core::{Message, MessageBody, MessageKind, UploadToken};

pub struct DataDownloadRequestConverter;

impl MessageConverter for DataDownloadRequestConverter {
    fn kind(&self) -> MessageKind {
        MessageKind::DataDownloadRequest
    }

    fn to_message(&self, data: &DataObject) -> Result<Message, ConversionError> {
        let result = match &data.body {
            DataBody::DataDownloadRequest(request) => request
                .token
                .parse::<UploadToken>()
                .map(|token| envelope(&data.header, MessageBody::DataDownloadRequest { token }))
                .map_err(|e| ConversionError::InvalidField {
                    field: "token",
                    reason: e.to_string(),
                }),
            _ => Err(kind_mismatch(self.kind(), data.kind())),
        };
        Ok(or_unknown_message(self.kind(), &data.header, result))
    }

    fn from_message(&self, message: &Message) -> Result<DataObject, ConversionError> {
        let result = match &message.body {
            MessageBody::DataDownloadRequest { token } => Ok(DataObject {
                header: header_of(message),
                body: DataBody::DataDownloadRequest(DataDownloadRequestData {
                    token: token.to_string(),
                }),
            }),
            _ => Err(kind_mismatch(self.kind(), message.kind())),
        };
        Ok(or_unknown_data(self.kind(), message, result))
    }
}
