mod common;

use anyhow::Result;
use burrow_client::blocking::Client;
use burrow_client::descriptor::{self, MessageDescriptor};
use clap::Parser;
use log::info;
use std::time::Duration;

fn main() -> Result<()> {
    common::setup_logger();

    let cli = common::Cli::parse();
    let mut client = Client::new(cli.client_config()?).with_heartbeat_callback(|_, connected| {
        info!("Heartbeat sent, connected {}", connected);
    });

    let desc = MessageDescriptor::new("blocking-demo").body("Hello from the blocking client");

    // declares the exchange and the queue, and leaves the connection open
    descriptor::produce(&mut client, &desc, false)?;

    {
        let mut channel = client.open_channel()?;

        while let Some(message) = channel.basic_get(&desc.queue, false)? {
            info!("Got {:?}", message.body_str());

            channel.ack(&message)?;
        }

        channel.close()?;
    }

    client.run(Some(Duration::from_secs(3)))?;

    Ok(())
}
