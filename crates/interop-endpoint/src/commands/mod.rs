//! Calling remote command sets and serving local ones.

mod hub;
mod local;
mod proxy;

pub use hub::{CommandHubEvent, RemoteCommandHub};
pub use local::{
    CommandArguments, CommandFuture, CommandInvokedAction, LocalCommandRegistry, LocalCommandSet,
    LocalCommandSetBuilder,
};
pub use proxy::{CommandProxy, PendingCommand, RemoteCommandSet};
