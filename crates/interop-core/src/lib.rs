//! Core types for Interop.
//!
//! This crate provides the protocol primitives shared by both halves of a
//! connection: identities, capability descriptions, the type fallback
//! matcher, payload values and the message envelope. It knows nothing about
//! transports or the wire format.

mod identity;
mod message;
mod signature;
mod subject;
mod transfer;
mod types;
mod value;
mod version;

pub use identity::{EndpointId, EndpointIdParseError, MessageId};
pub use message::{
    CommandArgument, DiscoveryInformation, EndpointConnect, InteractionConnectionState, Message,
    MessageBody, MessageKind, ProtocolInformation,
};
pub use signature::{
    CommandDefinition, CommandId, CommandSetDescriptor, NotificationDefinition, NotificationId,
    NotificationSetDescriptor, ParameterDefinition,
};
pub use subject::{CommunicationSubject, ProtocolDescription, SubjectGroup};
pub use transfer::UploadToken;
pub use types::{TypeDescriptor, TypeFallback, VersionedType};
pub use value::{
    JsonSerializer, ObjectSerializer, ObjectValue, SerializationError, SerializerRegistry,
};
pub use version::{Version, VersionParseError};

/// Protocol version spoken by this implementation.
pub const PROTOCOL_VERSION: Version = Version::new(1, 0, 0);

/// Handshake state of a remote endpoint at the protocol layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    /// Connect sent, waiting for the remote's reply.
    AwaitingResponse,
    /// Protocol versions agreed.
    Connected,
    /// The remote refused, or its version is incompatible.
    Rejected,
}

/// Interaction state of a remote endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractionState {
    /// Connected, subject groups not yet evaluated.
    Negotiating,
    /// At least one subject shared; capabilities registered.
    Approved,
    /// No shared subject; the connection stays up with nothing registered.
    Denied,
    /// Gone.
    Disconnected,
}
