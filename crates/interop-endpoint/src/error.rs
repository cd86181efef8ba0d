//! Error types for the endpoint runtime.

use interop_core::{CommandId, EndpointId, MessageKind, TypeDescriptor, UploadToken, Version};
use std::path::PathBuf;
use std::time::Duration;

/// Failure to deliver a message or to get its reply.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ChannelError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("no reply from {endpoint} within {timeout:?}")]
    Timeout {
        endpoint: EndpointId,
        timeout: Duration,
    },
    #[error("endpoint {0} disconnected")]
    Disconnected(EndpointId),
}

/// Errors from remote command calls and local command sets.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("command {command:?} is not part of {interface}")]
    CommandNotSupported {
        interface: TypeDescriptor,
        command: String,
    },
    #[error("no serializer registered for {0}")]
    MissingObjectDataSerializer(TypeDescriptor),
    #[error("command {command:?} takes {expected} arguments, got {actual}")]
    InvalidArgumentCount {
        command: String,
        expected: usize,
        actual: usize,
    },
    #[error("argument {parameter:?} should be {expected}, got {actual}")]
    ArgumentType {
        parameter: String,
        expected: TypeDescriptor,
        actual: TypeDescriptor,
    },
    #[error("remote command {0:?} failed")]
    CommandInvocationFailed(String),
    #[error("unexpected {kind} reply to command {command:?}")]
    UnexpectedResponse { command: String, kind: MessageKind },
    #[error("command {command:?} returned {actual}, expected {expected}")]
    ResultType {
        command: String,
        expected: TypeDescriptor,
        actual: TypeDescriptor,
    },
    #[error("no local command {0}")]
    UnknownCommand(CommandId),
    #[error("command {0:?} has no handler")]
    MissingHandler(String),
    #[error("command {0} is registered twice")]
    DuplicateCommand(String),
    #[error(transparent)]
    Channel(#[from] ChannelError),
}

/// Errors from remote and local notification sets.
#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("event {event:?} is not part of {interface}")]
    NotificationNotSupported {
        interface: TypeDescriptor,
        event: String,
    },
    #[error("no serializer registered for {0}")]
    MissingObjectDataSerializer(TypeDescriptor),
    #[error("registration for {event:?} answered with {kind}")]
    RegistrationRejected { event: String, kind: MessageKind },
    #[error("event {event:?} carries {expected}, got {actual}")]
    ArgumentType {
        event: String,
        expected: TypeDescriptor,
        actual: TypeDescriptor,
    },
    #[error(transparent)]
    Channel(#[from] ChannelError),
}

/// Errors from the connect, disconnect and verification exchanges.
#[derive(Debug, thiserror::Error)]
pub enum HandshakeError {
    #[error("{0} refused the connection")]
    Rejected(EndpointId),
    #[error("remote protocol version {remote} is not compatible with {local}")]
    IncompatibleVersion { remote: Version, local: Version },
    #[error("unexpected {0} reply during handshake")]
    UnexpectedResponse(MessageKind),
    #[error("{0} is not connected")]
    NotConnected(EndpointId),
    #[error(transparent)]
    Channel(#[from] ChannelError),
}

/// Errors from the upload registry and data transfers.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("no upload registered for token {0}")]
    UnknownToken(UploadToken),
    #[error("transfer cancelled")]
    Cancelled,
    #[error("download of {token} answered with {kind}")]
    Rejected { token: UploadToken, kind: MessageKind },
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Channel(#[from] ChannelError),
}

/// Failure inside a process action. The dispatcher answers it with a
/// `Failure` reply.
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error("{0}")]
    Handler(String),
    #[error(transparent)]
    Channel(#[from] ChannelError),
    #[error(transparent)]
    Command(#[from] CommandError),
    #[error(transparent)]
    Notification(#[from] NotificationError),
    #[error(transparent)]
    Handshake(#[from] HandshakeError),
    #[error(transparent)]
    Transfer(#[from] TransferError),
}

impl ActionError {
    /// A handler failure with a message.
    pub fn handler(message: impl Into<String>) -> Self {
        Self::Handler(message.into())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("an action for {0} is already registered")]
    DuplicateAction(MessageKind),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Errors assembling or driving an [`Endpoint`](crate::Endpoint).
#[derive(Debug, thiserror::Error)]
pub enum EndpointError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error(transparent)]
    Command(#[from] CommandError),
    #[error(transparent)]
    Notification(#[from] NotificationError),
    #[error(transparent)]
    Handshake(#[from] HandshakeError),
    #[error(transparent)]
    Transfer(#[from] TransferError),
}
