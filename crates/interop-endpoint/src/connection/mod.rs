//! Handshake, interaction negotiation and liveness of remote endpoints.

mod handshake;
mod interaction;
mod keep_alive;

pub use handshake::{
    ConnectionEvent, ConnectionListener, ConnectionManager, ConnectionVerificationAction,
    EndpointConnectAction, EndpointDisconnectAction, InteractionInformationAction,
    RemoteEndpoint, VerificationResponder, connection_actions,
};
pub use interaction::{CommunicationDescription, InteractionEvaluation};
pub use keep_alive::spawn_keep_alive;
