//! One converter per message kind.

mod command;
mod connect;
mod download;
mod interaction;
mod notification;
mod status;
mod verification;

pub use command::{CommandInvokedConverter, CommandInvokedResponseConverter};
pub use connect::{EndpointConnectConverter, EndpointDisconnectConverter};
pub use download::DataDownloadRequestConverter;
pub use interaction::{InteractionInformationConverter, InteractionInformationResponseConverter};
pub use notification::{NotificationRaisedConverter, NotificationRegistrationConverter};
pub use status::StatusConverter;
pub use verification::ConnectionVerificationConverter;
