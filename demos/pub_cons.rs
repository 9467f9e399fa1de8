mod common;

use anyhow::Result;
use burrow_client::descriptor::{self, MessageDescriptor};
use burrow_client::{AsyncClient, ExchangeType, Verdict};
use clap::Parser;
use log::info;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Notify;

#[tokio::main]
async fn main() -> Result<()> {
    common::setup_logger();

    let cli = common::Cli::parse();
    let message_count = cli.count;
    let client = AsyncClient::new(cli.client_config()?);

    let received = Arc::new(AtomicU32::new(0));
    let done = Arc::new(Notify::new());

    let desc = {
        let received = received.clone();
        let done = done.clone();

        MessageDescriptor::new("pubsub")
            .exchange("x_pubsub", ExchangeType::Direct)
            .queue("q_pubsub")
            .routing_key("")
            .prefetch(0, 100, false)
            .callback(move |_, _, _| {
                if received.fetch_add(1, Ordering::SeqCst) + 1 == message_count {
                    done.notify_one();
                }

                Verdict::Ack
            })
    };

    let consumer_tag = descriptor::consume(&client, &desc).await?;

    info!("Consuming with {}", consumer_tag);

    let channel = client.channel().await?;
    let message = b"This will be the test message what we send over multiple times";
    let start = Instant::now();

    for _ in 0..message_count {
        channel
            .basic_publish("x_pubsub", "", message, &desc.properties, false, false)
            .await?;
    }

    done.notified().await;

    println!(
        "Send and receive {} messages: {:?}",
        message_count,
        Instant::elapsed(&start)
    );

    channel.close().await?;
    client.close().await?;

    Ok(())
}
