//! Two endpoints in one process.
//!
//! `alpha` serves a greeter and a clock; `beta` connects, calls the greeter,
//! listens to the clock and downloads a file from `alpha`. Every message
//! goes through the JSON wire codec.
//!
//!   cargo run -p interop-demo-loopback -- --calls 3 --log debug

mod network;
mod protocol;

use anyhow::Context;
use clap::Parser;
use interop_core::{EndpointId, ObjectValue};
use interop_endpoint::connection::ConnectionEvent;
use interop_endpoint::transfer::DirectoryTransfer;
use interop_endpoint::{Endpoint, EndpointConfig};
use network::Network;
use protocol::{Greeter, SUBJECT};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "loopback")]
struct Cli {
    /// Greeter calls and clock ticks to make.
    #[arg(long, default_value_t = 3)]
    calls: u64,

    /// Log filter, e.g. `info` or `interop_endpoint=debug`.
    #[arg(long, default_value = "info")]
    log: String,

    /// Endpoint config file (TOML).
    #[arg(long)]
    config: Option<std::path::PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&cli.log)?)
        .init();

    let config = match &cli.config {
        Some(path) => EndpointConfig::load(path)?,
        None => EndpointConfig::default(),
    };
    let scratch = tempfile::tempdir()?;
    let network = Network::new();

    let alpha = network.join(
        Endpoint::builder(EndpointId::named("alpha"))
            .config(config.clone())
            .provide_commands(SUBJECT, protocol::greeter_service()?)
            .provide_notifications(SUBJECT, protocol::clock())
            .data_transfer(Arc::new(DirectoryTransfer::new(scratch.path().join("inbox"))))
            .build(network.link())?,
    );
    let beta = network.join(
        Endpoint::builder(EndpointId::named("beta"))
            .config(config)
            .require_commands(SUBJECT, protocol::greeter())
            .require_notifications(SUBJECT, protocol::clock())
            .build(network.link())?,
    );
    let keep_alive = beta.spawn_keep_alive();

    let mut events = beta.events();
    beta.connect(alpha.id()).await?;
    tokio::time::timeout(Duration::from_secs(5), approval(&mut events, alpha.id()))
        .await
        .context("interaction with alpha never settled")??;

    let greeter: Greeter = beta
        .commands()
        .command_set(alpha.id())
        .context("alpha does not offer the greeter")?;
    for i in 0..cli.calls {
        let reply = greeter.greet(&format!("caller {i}")).await?;
        tracing::info!("alpha says: {}", reply);
    }
    tracing::info!("alpha has greeted {} callers", greeter.count().await?);

    let clock = beta
        .notifications()
        .proxy_for(alpha.id(), protocol::clock().interface())
        .context("alpha does not offer the clock")?;
    let (ticks_tx, mut ticks) = tokio::sync::mpsc::unbounded_channel();
    let subscription = clock
        .subscribe_typed("tick", move |n: u64| {
            let _ = ticks_tx.send(n);
        })
        .await?;
    for n in 0..cli.calls {
        alpha.raise(&protocol::tick(), ObjectValue::new(n)).await?;
    }
    for _ in 0..cli.calls {
        let tick = tokio::time::timeout(Duration::from_secs(5), ticks.recv())
            .await?
            .context("clock went quiet")?;
        tracing::info!("tick {}", tick);
    }
    clock.unsubscribe(subscription).await?;

    let report = scratch.path().join("report.txt");
    std::fs::write(&report, "hello from alpha\n")?;
    let token = alpha.uploads().register(&report);
    beta.request_download(alpha.id(), token).await?;
    let copied = scratch.path().join("inbox").join(beta.id().as_str()).join("report.txt");
    tracing::info!("downloaded {:?}", std::fs::read_to_string(copied)?);

    beta.shutdown("demo finished").await;
    keep_alive.await?;
    network.leave(beta.id());
    network.leave(alpha.id());
    Ok(())
}

async fn approval(
    events: &mut broadcast::Receiver<ConnectionEvent>,
    remote: &EndpointId,
) -> anyhow::Result<()> {
    loop {
        match events.recv().await? {
            ConnectionEvent::Approved(id) if &id == remote => return Ok(()),
            ConnectionEvent::Denied(id) if &id == remote => anyhow::bail!("{id} shares no subject"),
            _ => {}
        }
    }
}
