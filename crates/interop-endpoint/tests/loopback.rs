//! Two endpoints talking through the JSON wire codec.

use async_trait::async_trait;
use interop_core::{
    CommandSetDescriptor, EndpointId, HandshakeState, InteractionState, Message, NotificationId,
    NotificationSetDescriptor, ObjectValue, SerializerRegistry, TypeDescriptor, Version,
};
use interop_endpoint::commands::LocalCommandSet;
use interop_endpoint::connection::ConnectionEvent;
use interop_endpoint::transfer::DirectoryTransfer;
use interop_endpoint::{ChannelError, Endpoint, EndpointConfig, MessageTransport};
use interop_wire::{WireCodec, WireTranslator};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};

/// Routes encoded messages between endpoints in one process.
#[derive(Default)]
struct Network {
    endpoints: RwLock<HashMap<EndpointId, Arc<Endpoint>>>,
}

struct Link {
    network: Arc<Network>,
    codec: WireCodec,
}

#[async_trait]
impl MessageTransport for Link {
    async fn send(&self, endpoint: &EndpointId, message: Message) -> Result<(), ChannelError> {
        let bytes = self
            .codec
            .encode(&message)
            .map_err(|e| ChannelError::Transport(e.to_string()))?;
        let target = self
            .network
            .endpoints
            .read()
            .get(endpoint)
            .cloned()
            .ok_or_else(|| ChannelError::Transport(format!("no route to {endpoint}")))?;
        let codec = self.codec.clone();
        tokio::spawn(async move {
            match codec.decode(&bytes) {
                Ok(message) => {
                    target.receive(message).await;
                }
                Err(e) => panic!("undecodable message: {e}"),
            }
        });
        Ok(())
    }
}

fn greeter() -> CommandSetDescriptor {
    let string = TypeDescriptor::of::<String>();
    CommandSetDescriptor::new(TypeDescriptor::new("Demo.Greeter", "demo"), Version::new(1, 0, 0))
        .command("greet", vec![("name", string.clone())], Some(string.clone()))
        .command("wave", vec![("name", string)], None)
}

fn clock() -> NotificationSetDescriptor {
    NotificationSetDescriptor::new(TypeDescriptor::new("Demo.Clock", "demo"), Version::new(1, 0, 0))
        .event("tick", TypeDescriptor::of::<u64>())
}

fn link(network: &Arc<Network>) -> Arc<Link> {
    let serializers = Arc::new(SerializerRegistry::with_defaults());
    Arc::new(Link {
        network: network.clone(),
        codec: WireCodec::new(Arc::new(WireTranslator::new(serializers))),
    })
}

fn config() -> EndpointConfig {
    EndpointConfig {
        response_timeout_ms: 2_000,
        ..EndpointConfig::default()
    }
}

fn join(network: &Arc<Network>, endpoint: Endpoint) -> Arc<Endpoint> {
    let endpoint = Arc::new(endpoint);
    network
        .endpoints
        .write()
        .insert(endpoint.id().clone(), endpoint.clone());
    endpoint
}

async fn wait_for(
    events: &mut broadcast::Receiver<ConnectionEvent>,
    wanted: impl Fn(&ConnectionEvent) -> bool,
) -> ConnectionEvent {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = events.recv().await.unwrap();
            if wanted(&event) {
                return event;
            }
        }
    })
    .await
    .unwrap()
}

/// `alpha` serves the greeter and clock; `beta` uses them.
fn pair(network: &Arc<Network>, inbox: &std::path::Path) -> (Arc<Endpoint>, Arc<Endpoint>) {
    let greeter_set = LocalCommandSet::builder(greeter())
        .on("greet", |args| async move {
            let name: String = args.get("name")?;
            Ok(Some(ObjectValue::new(format!("hello {name}"))))
        })
        .on_sync("wave", |_| Ok(None))
        .build()
        .unwrap();
    let alpha = Endpoint::builder(EndpointId::named("alpha"))
        .config(config())
        .provide_commands("demo", greeter_set)
        .provide_notifications("demo", clock())
        .data_transfer(Arc::new(DirectoryTransfer::new(inbox)))
        .build(link(network))
        .unwrap();
    let beta = Endpoint::builder(EndpointId::named("beta"))
        .config(config())
        .require_commands("demo", greeter())
        .require_notifications("demo", clock())
        .build(link(network))
        .unwrap();
    (join(network, alpha), join(network, beta))
}

#[tokio::test]
async fn full_session() {
    let network = Arc::new(Network::default());
    let scratch = tempfile::tempdir().unwrap();
    let (alpha, beta) = pair(&network, &scratch.path().join("inbox"));
    let alpha_id = alpha.id().clone();
    let beta_id = beta.id().clone();

    let mut alpha_events = alpha.events();
    let mut beta_events = beta.events();
    beta.connect(&alpha_id).await.unwrap();
    wait_for(&mut beta_events, |e| *e == ConnectionEvent::Approved(alpha_id.clone())).await;
    wait_for(&mut alpha_events, |e| *e == ConnectionEvent::Approved(beta_id.clone())).await;
    assert_eq!(
        beta.connection_state(&alpha_id),
        Some((HandshakeState::Connected, InteractionState::Approved))
    );

    // Commands.
    let proxy = beta
        .commands()
        .proxy_for(&alpha_id, greeter().interface())
        .unwrap();
    let reply = proxy
        .invoke("greet", vec![ObjectValue::new(String::from("bob"))])
        .await
        .unwrap()
        .value::<String>()
        .await
        .unwrap();
    assert_eq!(reply, "hello bob");
    assert_eq!(
        proxy
            .call("wave", vec![ObjectValue::new(String::from("bob"))])
            .await
            .unwrap()
            .map(|v| v.descriptor().clone()),
        None
    );

    // Notifications.
    let (ticks_tx, mut ticks) = mpsc::unbounded_channel();
    let clock_proxy = beta
        .notifications()
        .proxy_for(&alpha_id, clock().interface())
        .unwrap();
    clock_proxy
        .subscribe_typed("tick", move |n: u64| {
            let _ = ticks_tx.send(n);
        })
        .await
        .unwrap();
    assert_eq!(
        alpha.local_notifications().subscribers_of(&tick()),
        vec![beta_id.clone()]
    );
    assert_eq!(alpha.raise(&tick(), ObjectValue::new(7u64)).await.unwrap(), 1);
    let tick_value = tokio::time::timeout(Duration::from_secs(5), ticks.recv())
        .await
        .unwrap();
    assert_eq!(tick_value, Some(7));

    // Download.
    let report = scratch.path().join("report.txt");
    std::fs::write(&report, "numbers").unwrap();
    let token = alpha.uploads().register(&report);
    beta.request_download(&alpha_id, token).await.unwrap();
    let copied = scratch.path().join("inbox").join("beta").join("report.txt");
    assert_eq!(std::fs::read_to_string(copied).unwrap(), "numbers");
    assert!(beta.request_download(&alpha_id, token).await.is_err());

    // Liveness.
    assert!(beta.verify(&alpha_id, None).await.unwrap().is_none());

    // Disconnect.
    beta.disconnect(&alpha_id, "done").await;
    wait_for(&mut alpha_events, |e| {
        matches!(e, ConnectionEvent::Disconnected { endpoint, .. } if *endpoint == beta_id)
    })
    .await;
    assert!(beta.connection_state(&alpha_id).is_none());
    assert!(beta.commands().proxy_for(&alpha_id, greeter().interface()).is_none());
    assert!(clock_proxy.is_detached());
    assert!(alpha.local_notifications().subscribers_of(&tick()).is_empty());
}

fn tick() -> NotificationId {
    NotificationId::new(clock().interface().clone(), "tick")
}

#[tokio::test]
async fn no_shared_subject_is_denied() {
    let network = Arc::new(Network::default());
    let scratch = tempfile::tempdir().unwrap();
    let (alpha, _beta) = pair(&network, scratch.path());
    let gamma = join(
        &network,
        Endpoint::builder(EndpointId::named("gamma"))
            .config(config())
            .require_commands("weather", greeter())
            .build(link(&network))
            .unwrap(),
    );

    let mut events = gamma.events();
    gamma.connect(alpha.id()).await.unwrap();
    wait_for(&mut events, |e| matches!(e, ConnectionEvent::Denied(_))).await;
    assert_eq!(
        gamma.connection_state(alpha.id()),
        Some((HandshakeState::Connected, InteractionState::Denied))
    );
    assert!(gamma.commands().proxy_for(alpha.id(), greeter().interface()).is_none());
}

#[tokio::test]
async fn incompatible_version_is_refused() {
    let network = Arc::new(Network::default());
    let scratch = tempfile::tempdir().unwrap();
    let (alpha, _beta) = pair(&network, scratch.path());
    let future = join(
        &network,
        Endpoint::builder(EndpointId::named("future"))
            .config(EndpointConfig {
                protocol_version: Version::new(9, 0, 0),
                ..config()
            })
            .build(link(&network))
            .unwrap(),
    );

    assert!(future.connect(alpha.id()).await.is_err());
    assert!(future.connection_state(alpha.id()).is_none());
    assert!(alpha.connection_state(future.id()).is_none());
}
