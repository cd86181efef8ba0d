//! Subscribing to remote notification sets and raising local ones.

mod hub;
mod local;
mod proxy;

pub use hub::{NotificationHubEvent, NotificationRaisedAction, RemoteNotificationHub};
pub use local::{
    LocalNotificationRegistry, RegisterForNotificationAction, UnregisterFromNotificationAction,
};
pub use proxy::{NotificationHandler, NotificationProxy, RemoteNotificationSet, SubscriptionId};
