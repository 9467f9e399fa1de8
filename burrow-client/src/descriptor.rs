//! Message descriptors and the publish and consume workflows built on them.
//!
//! A descriptor collects everything needed to declare the exchange and the queue, bind them,
//! publish a message or start a consumer. The workflows only borrow it for the duration of
//! one operation chain.
//!
//! ```no_run
//! use burrow_client::descriptor::{self, MessageDescriptor};
//! use burrow_client::{AsyncClient, Config, Verdict};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let client = AsyncClient::new(Config::default());
//! let orders = MessageDescriptor::new("orders")
//!     .body("hello")
//!     .callback(|delivery, _channel, _client| {
//!         println!("{:?}", delivery.body_str());
//!         Verdict::Ack
//!     });
//!
//! descriptor::produce_async(&client, &orders, false).await?;
//! descriptor::consume(&client, &orders).await?;
//! # Ok(())
//! # }
//! ```
use crate::blocking;
use crate::channel_api::Channel;
use crate::client_api::{AsyncClient, ConsumeCallback};
use crate::error::{to_client_error, ClientError, ErrorKind};
use crate::message::{Delivery, DeliveryMode, MessageProperties, Verdict};
use crate::model::ExchangeType;
use anyhow::Result;
use burrow_codec::frame::{BasicConsumeFlags, ExchangeDeclareFlags, FieldTable, QueueDeclareFlags};
use log::{debug, warn};
use std::fmt;
use std::sync::Arc;

#[derive(Clone)]
pub struct MessageDescriptor {
    pub queue: String,
    pub queue_flags: QueueDeclareFlags,
    pub queue_args: Option<FieldTable>,
    pub exchange: String,
    pub exchange_type: ExchangeType,
    pub exchange_flags: ExchangeDeclareFlags,
    pub exchange_args: Option<FieldTable>,
    pub routing_key: String,
    pub bind_args: Option<FieldTable>,
    pub body: Vec<u8>,
    pub properties: MessageProperties,
    pub mandatory: bool,
    pub immediate: bool,
    pub consumer_tag: String,
    pub consume_flags: BasicConsumeFlags,
    pub consume_args: Option<FieldTable>,
    pub prefetch_size: u32,
    pub prefetch_count: u16,
    pub prefetch_global: bool,
    callback: Option<ConsumeCallback>,
}

impl fmt::Debug for MessageDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageDescriptor")
            .field("queue", &self.queue)
            .field("exchange", &self.exchange)
            .field("exchange_type", &self.exchange_type)
            .field("routing_key", &self.routing_key)
            .field("consumer_tag", &self.consumer_tag)
            .field("body_len", &self.body.len())
            .finish()
    }
}

impl Default for MessageDescriptor {
    fn default() -> Self {
        Self {
            queue: String::new(),
            queue_flags: QueueDeclareFlags::DURABLE,
            queue_args: None,
            exchange: String::new(),
            exchange_type: ExchangeType::Direct,
            exchange_flags: ExchangeDeclareFlags::DURABLE,
            exchange_args: None,
            routing_key: String::new(),
            bind_args: None,
            body: vec![],
            properties: MessageProperties::default()
                .content_type("text/plain")
                .delivery_mode(DeliveryMode::Persistent),
            mandatory: false,
            immediate: false,
            consumer_tag: String::new(),
            consume_flags: BasicConsumeFlags::default(),
            consume_args: None,
            prefetch_size: 0,
            prefetch_count: 0,
            prefetch_global: false,
            callback: None,
        }
    }
}

impl MessageDescriptor {
    /// Descriptor which uses `name` as the queue, the exchange, the routing key and the
    /// consumer tag.
    pub fn new(name: &str) -> Self {
        Self {
            queue: name.to_string(),
            exchange: name.to_string(),
            routing_key: name.to_string(),
            consumer_tag: name.to_string(),
            ..Default::default()
        }
    }

    pub fn queue(mut self, queue: &str) -> Self {
        self.queue = queue.to_string();
        self
    }

    pub fn exchange(mut self, exchange: &str, exchange_type: ExchangeType) -> Self {
        self.exchange = exchange.to_string();
        self.exchange_type = exchange_type;
        self
    }

    pub fn routing_key(mut self, routing_key: &str) -> Self {
        self.routing_key = routing_key.to_string();
        self
    }

    pub fn consumer_tag(mut self, consumer_tag: &str) -> Self {
        self.consumer_tag = consumer_tag.to_string();
        self
    }

    /// Sets or clears the durable flag of both the exchange and the queue.
    pub fn durable(mut self, durable: bool) -> Self {
        self.queue_flags.set(QueueDeclareFlags::DURABLE, durable);
        self.exchange_flags.set(ExchangeDeclareFlags::DURABLE, durable);
        self
    }

    pub fn no_ack(mut self, no_ack: bool) -> Self {
        self.consume_flags.set(BasicConsumeFlags::NO_ACK, no_ack);
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn properties(mut self, properties: MessageProperties) -> Self {
        self.properties = properties;
        self
    }

    pub fn prefetch(mut self, prefetch_size: u32, prefetch_count: u16, global: bool) -> Self {
        self.prefetch_size = prefetch_size;
        self.prefetch_count = prefetch_count;
        self.prefetch_global = global;
        self
    }

    pub fn callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Delivery, &Channel, &AsyncClient) -> Verdict + Send + Sync + 'static,
    {
        self.callback = Some(Arc::new(callback));
        self
    }

    /// Callback which takes the verdict as a string, "ack", "nack" or anything else for
    /// requeue.
    pub fn text_callback<F>(self, callback: F) -> Self
    where
        F: Fn(&Delivery, &Channel, &AsyncClient) -> String + Send + Sync + 'static,
    {
        self.callback(move |delivery, channel, client| Verdict::from(callback(delivery, channel, client).as_str()))
    }

    fn has_exchange(&self) -> bool {
        !self.exchange.is_empty()
    }
}

/// Declare the exchange and the queue, bind them and publish the message of the descriptor
/// with a blocking client. The client connects if it isn't connected yet. With `close` the
/// client disconnects after publishing.
pub fn produce(client: &mut blocking::Client, desc: &MessageDescriptor, close: bool) -> Result<()> {
    if !client.is_connected() {
        client.connect()?;
    }

    {
        let mut channel = client.open_channel()?;

        if desc.has_exchange() {
            channel.exchange_declare(
                &desc.exchange,
                desc.exchange_type,
                Some(desc.exchange_flags),
                desc.exchange_args.clone(),
            )?;
        }

        channel.queue_declare(&desc.queue, Some(desc.queue_flags), desc.queue_args.clone())?;

        if desc.has_exchange() {
            channel.queue_bind(
                &desc.queue,
                &desc.exchange,
                &desc.routing_key,
                false,
                desc.bind_args.clone(),
            )?;
        }

        channel.basic_publish(
            &desc.exchange,
            &desc.routing_key,
            &desc.body,
            &desc.properties,
            desc.mandatory,
            desc.immediate,
        )?;

        channel.close()?;
    }

    if close {
        client.close()?;
    }

    Ok(())
}

/// The async version of [`produce`]. Failures are reported to the error hook of the client
/// before they are returned.
pub async fn produce_async(client: &AsyncClient, desc: &MessageDescriptor, close: bool) -> Result<()> {
    let channel = connect_and_declare(client, desc).await?;

    let published = channel
        .basic_publish(
            &desc.exchange,
            &desc.routing_key,
            &desc.body,
            &desc.properties,
            desc.mandatory,
            desc.immediate,
        )
        .await;

    if let Err(e) = published {
        return Err(fail(client, e).await);
    }

    debug!("Published {} bytes to {}/{}", desc.body.len(), desc.exchange, desc.routing_key);

    if let Err(e) = channel.close().await {
        return Err(fail(client, e).await);
    }

    if close {
        client.close().await?;
    }

    Ok(())
}

/// Start consuming the queue of the descriptor with its callback. Returns the consumer tag.
pub async fn consume(client: &AsyncClient, desc: &MessageDescriptor) -> Result<String> {
    let callback = match &desc.callback {
        Some(callback) => callback.clone(),
        None => {
            return Err(anyhow::Error::new(ClientError::usage(format!(
                "Descriptor of queue {} has no callback",
                desc.queue
            ))))
        }
    };

    let channel = connect_and_declare(client, desc).await?;

    let consumed = async {
        if desc.prefetch_size > 0 || desc.prefetch_count > 0 {
            channel
                .basic_qos(desc.prefetch_size, desc.prefetch_count, desc.prefetch_global)
                .await?;
        }

        channel
            .consume_with(
                &desc.queue,
                &desc.consumer_tag,
                Some(desc.consume_flags),
                desc.consume_args.clone(),
                callback,
            )
            .await
    }
    .await;

    match consumed {
        Ok(tag) => Ok(tag),
        Err(e) => Err(fail(client, e).await),
    }
}

async fn connect_and_declare(client: &AsyncClient, desc: &MessageDescriptor) -> Result<Channel> {
    if !client.is_connected() {
        // a failed connect is reported by the client itself
        client.connect().await?;
    }

    let declared = async {
        let channel = client.channel().await?;

        if desc.has_exchange() {
            channel
                .exchange_declare(
                    &desc.exchange,
                    desc.exchange_type,
                    Some(desc.exchange_flags),
                    desc.exchange_args.clone(),
                )
                .await?;
        }

        channel
            .queue_declare(&desc.queue, Some(desc.queue_flags), desc.queue_args.clone())
            .await?;

        if desc.has_exchange() {
            channel
                .queue_bind(
                    &desc.queue,
                    &desc.exchange,
                    &desc.routing_key,
                    false,
                    desc.bind_args.clone(),
                )
                .await?;
        }

        Ok::<_, anyhow::Error>(channel)
    }
    .await;

    match declared {
        Ok(channel) => Ok(channel),
        Err(e) => Err(fail(client, e).await),
    }
}

/// Report the failure and close the connection, the connection is not trusted after a
/// failed operation chain.
async fn fail(client: &AsyncClient, err: anyhow::Error) -> anyhow::Error {
    let client_err = to_client_error(&err);

    client.report(&client_err);

    if client_err.kind != ErrorKind::Usage {
        if let Err(e) = client.close().await {
            warn!("Closing the connection after {} failed {:?}", client_err, e);
        }
    }

    err
}
