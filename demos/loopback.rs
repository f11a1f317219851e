//! Loopback demo: a producer and a consumer bridged over the in-process
//! memory transport.
//!
//! Run with `RUST_LOG=debug cargo run --example loopback` to see the bridge
//! lifecycle events.

use std::sync::Arc;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use tracing::info;
use wirebridge::{
    BridgeSettings,
    ConsumerBridge,
    ProducerBridge,
    TracingConfig,
    queue::InputQueue,
    transport::memory::MemoryTransport,
};

const MESSAGES: usize = 20;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let transport = Arc::new(MemoryTransport::new());
    let settings = BridgeSettings::new("memory:loopback", 10);
    let config = settings
        .into_config(Arc::clone(&transport))?
        .with_tracing(TracingConfig::default().with_payload_preview(true));
    let shutdown = CancellationToken::new();

    let (consumer, mut output) = ConsumerBridge::new(config.clone());
    let consumer = consumer.spawn_with_shutdown(&shutdown);

    let (tx, input) = InputQueue::bounded(8);
    let producer = ProducerBridge::new(config, input).spawn_with_shutdown(&shutdown);

    for index in 0..MESSAGES {
        tx.send(Bytes::from(format!("loopback message {index}")))
            .await?;
    }
    drop(tx);

    for _ in 0..MESSAGES {
        let Some(message) = output.recv().await else {
            break;
        };
        info!(message = %String::from_utf8_lossy(&message), "received");
    }

    let sent = producer.join().await?;
    shutdown.cancel();
    let received = consumer.join().await?;
    info!(
        sent = sent.messages,
        received = received.messages,
        "loopback finished"
    );
    Ok(())
}
