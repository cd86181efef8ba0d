//! The capabilities the two demo endpoints share.

use interop_core::{
    CommandSetDescriptor, NotificationId, NotificationSetDescriptor, ObjectValue, TypeDescriptor,
    Version,
};
use interop_endpoint::CommandError;
use interop_endpoint::commands::{CommandProxy, LocalCommandSet, RemoteCommandSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

pub const SUBJECT: &str = "demo";

pub fn greeter() -> CommandSetDescriptor {
    let string = TypeDescriptor::of::<String>();
    CommandSetDescriptor::new(TypeDescriptor::new("Demo.Greeter", "demo"), Version::new(1, 0, 0))
        .command("greet", vec![("name", string.clone())], Some(string))
        .command("count", vec![], Some(TypeDescriptor::of::<u64>()))
}

pub fn clock() -> NotificationSetDescriptor {
    NotificationSetDescriptor::new(TypeDescriptor::new("Demo.Clock", "demo"), Version::new(1, 0, 0))
        .event("tick", TypeDescriptor::of::<u64>())
}

pub fn tick() -> NotificationId {
    NotificationId::new(clock().interface().clone(), "tick")
}

/// The serving side of the greeter.
pub fn greeter_service() -> Result<LocalCommandSet, CommandError> {
    let greeted = Arc::new(AtomicU64::new(0));
    let counter = greeted.clone();
    LocalCommandSet::builder(greeter())
        .on("greet", move |args| {
            let greeted = greeted.clone();
            async move {
                let name: String = args.get("name")?;
                greeted.fetch_add(1, Ordering::Relaxed);
                Ok(Some(ObjectValue::new(format!("Hello, {name}!"))))
            }
        })
        .on_sync("count", move |_| {
            Ok(Some(ObjectValue::new(counter.load(Ordering::Relaxed))))
        })
        .build()
}

/// Typed calls into a remote greeter.
pub struct Greeter(CommandProxy);

impl RemoteCommandSet for Greeter {
    fn descriptor() -> CommandSetDescriptor {
        greeter()
    }

    fn from_proxy(proxy: CommandProxy) -> Self {
        Self(proxy)
    }
}

impl Greeter {
    pub async fn greet(&self, name: &str) -> Result<String, CommandError> {
        self.0
            .invoke("greet", vec![ObjectValue::new(name.to_string())])
            .await?
            .value()
            .await
    }

    pub async fn count(&self) -> Result<u64, CommandError> {
        self.0.invoke("count", vec![]).await?.value().await
    }
}
