//! Endpoint runtime for Interop.
//!
//! An [`Endpoint`] connects to remote endpoints over a caller-supplied
//! [`MessageTransport`], negotiates which command and notification sets the
//! two sides share, and then lets application code call remote commands,
//! subscribe to remote events, serve its own sets and hand out files by
//! upload token.
//!
//! Inbound messages are fed to [`Endpoint::receive`]; replies are matched to
//! the requests waiting for them, everything else goes to the process action
//! for its kind.

pub mod commands;
mod config;
pub mod connection;
mod dispatch;
mod endpoint;
mod error;
mod gateway;
pub mod notifications;
pub mod transfer;

pub use config::EndpointConfig;
pub use dispatch::{Dispatched, MessageDispatcher, ProcessAction, UnknownMessageTypeAction};
pub use endpoint::{Endpoint, EndpointBuilder};
pub use error::{
    ActionError, ChannelError, CommandError, ConfigError, DispatchError, EndpointError,
    HandshakeError, NotificationError, TransferError,
};
pub use gateway::{MessageGateway, MessageTransport, PendingResponse};
