mod common;

use anyhow::Result;
use burrow_client::{AsyncClient, DeliveryMode, ExchangeType, MessageProperties};
use clap::Parser;

#[tokio::main]
async fn main() -> Result<()> {
    let exchange = "test-xchg";
    let queue = "test-queue";

    common::setup_logger();

    let cli = common::Cli::parse();
    let client = AsyncClient::new(cli.client_config()?);

    client.connect().await?;

    let channel = client.channel().await?;

    channel
        .exchange_declare(exchange, ExchangeType::Fanout, None, None)
        .await?;
    channel.queue_declare(queue, None, None).await?;
    channel.queue_bind(queue, exchange, "", false, None).await?;

    let properties = MessageProperties::default()
        .content_type("text/plain")
        .delivery_mode(DeliveryMode::Persistent);

    channel
        .basic_publish(exchange, "no-key", b"Hey man", &properties, false, false)
        .await?;

    channel.close().await?;
    client.close().await?;

    Ok(())
}
