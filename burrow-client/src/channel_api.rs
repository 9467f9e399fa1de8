use crate::client_api::{AsyncClient, ConsumeCallback};
use crate::error::ClientError;
use crate::message::{Delivery, MessageProperties, Verdict};
use crate::model::{ChannelError, ChannelNumber, ClassMethod, ExchangeType};
use crate::pending;
use crate::processor::{self, Command, WaitFor};
use anyhow::Result;
use burrow_codec::frame::{
    self, AMQPFrame, BasicCancelArgs, BasicConsumeArgs, BasicConsumeFlags, BasicPublishArgs, BasicQosArgs,
    ExchangeDeclareArgs, ExchangeDeclareFlags, ExchangeDeleteArgs, FieldTable, MethodFrameArgs, QueueBindArgs,
    QueueDeclareArgs, QueueDeclareFlags, QueueDeclareOkArgs, QueueDeleteArgs, QueuePurgeArgs, QueueUnbindArgs,
};
use std::fmt;
use std::sync::Arc;
use tokio::sync::oneshot;

/// A channel of an async client. Handles are cheap to clone and keep the client alive.
#[derive(Clone)]
pub struct Channel {
    pub(crate) channel: ChannelNumber,
    client: AsyncClient,
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Channel{{{}}}", self.channel)
    }
}

/// Generate a consumer tag for consumers which didn't name themselves.
pub(crate) fn generate_consumer_tag() -> String {
    format!("burrow-{:016x}", rand::random::<u64>())
}

impl Channel {
    pub(crate) fn new(channel: ChannelNumber, client: AsyncClient) -> Channel {
        Channel { channel, client }
    }

    pub fn id(&self) -> ChannelNumber {
        self.channel
    }

    pub fn client(&self) -> &AsyncClient {
        &self.client
    }

    /// Declare exchange.
    pub async fn exchange_declare(
        &self,
        exchange_name: &str,
        exchange_type: ExchangeType,
        flags: Option<ExchangeDeclareFlags>,
        args: Option<FieldTable>,
    ) -> Result<()> {
        let flags = flags.unwrap_or_default();
        let frame = ExchangeDeclareArgs::default()
            .exchange_name(exchange_name)
            .exchange_type(exchange_type.as_str())
            .flags(flags)
            .args(args)
            .frame(self.channel);

        if flags.contains(ExchangeDeclareFlags::NO_WAIT) {
            return self.send(vec![frame]).await;
        }

        self.call(frame, frame::EXCHANGE_DECLARE_OK).await?;

        Ok(())
    }

    /// Delete exchange.
    pub async fn exchange_delete(&self, exchange_name: &str, if_unused: bool) -> Result<()> {
        let frame = ExchangeDeleteArgs::default()
            .exchange_name(exchange_name)
            .if_unused(if_unused)
            .frame(self.channel);

        self.call(frame, frame::EXCHANGE_DELETE_OK).await?;

        Ok(())
    }

    /// Declare queue. The broker generates a name if `queue_name` is empty, it is in the
    /// returned declare-ok.
    pub async fn queue_declare(
        &self,
        queue_name: &str,
        flags: Option<QueueDeclareFlags>,
        args: Option<FieldTable>,
    ) -> Result<QueueDeclareOkArgs> {
        let flags = flags.unwrap_or_default();
        let frame = QueueDeclareArgs::default()
            .name(queue_name)
            .flags(flags)
            .args(args)
            .frame(self.channel);

        if flags.contains(QueueDeclareFlags::NO_WAIT) {
            self.send(vec![frame]).await?;

            return Ok(QueueDeclareOkArgs::default().name(queue_name));
        }

        match self.call(frame, frame::QUEUE_DECLARE_OK).await? {
            AMQPFrame::Method(_, _, MethodFrameArgs::QueueDeclareOk(args)) => Ok(args),
            _ => Ok(QueueDeclareOkArgs::default().name(queue_name)),
        }
    }

    /// Routes the messages of `exchange_name` matching `routing_key` to the queue.
    pub async fn queue_bind(
        &self,
        queue_name: &str,
        exchange_name: &str,
        routing_key: &str,
        no_wait: bool,
        args: Option<FieldTable>,
    ) -> Result<()> {
        let frame = QueueBindArgs::new(queue_name, exchange_name)
            .routing_key(routing_key)
            .no_wait(no_wait)
            .args(args)
            .frame(self.channel);

        if no_wait {
            return self.send(vec![frame]).await;
        }

        self.call(frame, frame::QUEUE_BIND_OK).await?;

        Ok(())
    }

    pub async fn queue_unbind(&self, queue_name: &str, exchange_name: &str, routing_key: &str) -> Result<()> {
        let frame = QueueUnbindArgs::new(queue_name, exchange_name)
            .routing_key(routing_key)
            .frame(self.channel);

        self.call(frame, frame::QUEUE_UNBIND_OK).await?;

        Ok(())
    }

    /// Purge the messages of the queue, returns the number of purged messages.
    pub async fn queue_purge(&self, queue_name: &str) -> Result<u32> {
        let frame = QueuePurgeArgs::default().queue_name(queue_name).frame(self.channel);

        match self.call(frame, frame::QUEUE_PURGE_OK).await? {
            AMQPFrame::Method(_, _, MethodFrameArgs::QueuePurgeOk(args)) => Ok(args.message_count),
            _ => Ok(0),
        }
    }

    /// Delete the queue, returns the number of deleted messages.
    pub async fn queue_delete(&self, queue_name: &str, if_unused: bool, if_empty: bool) -> Result<u32> {
        let frame = QueueDeleteArgs::default()
            .queue_name(queue_name)
            .if_unused(if_unused)
            .if_empty(if_empty)
            .frame(self.channel);

        match self.call(frame, frame::QUEUE_DELETE_OK).await? {
            AMQPFrame::Method(_, _, MethodFrameArgs::QueueDeleteOk(args)) => Ok(args.message_count),
            _ => Ok(0),
        }
    }

    /// Set the prefetch limits of the channel.
    pub async fn basic_qos(&self, prefetch_size: u32, prefetch_count: u16, global: bool) -> Result<()> {
        let frame = BasicQosArgs::new(prefetch_size, prefetch_count, global).frame(self.channel);

        self.call(frame, frame::BASIC_QOS_OK).await?;

        Ok(())
    }

    /// Publish a message. The body is split into frames by the negotiated frame size, the
    /// call returns when the frames are written out.
    pub async fn basic_publish(
        &self,
        exchange_name: &str,
        routing_key: &str,
        body: &[u8],
        properties: &MessageProperties,
        mandatory: bool,
        immediate: bool,
    ) -> Result<()> {
        let frame_max = self.client.tuning().map(|t| t.frame_max).unwrap_or_default();

        let mut frames = vec![BasicPublishArgs::new(exchange_name)
            .routing_key(routing_key)
            .mandatory(mandatory)
            .immediate(immediate)
            .frame(self.channel)];

        frames.extend(frame::content_frames(self.channel, properties.to_header(), body, frame_max));

        self.send(frames).await
    }

    /// Start consuming the queue. The callback is called with every delivered message and
    /// its verdict settles the message. An empty consumer tag is replaced by a generated one,
    /// the tag in use is returned.
    pub async fn basic_consume<F>(
        &self,
        queue_name: &str,
        consumer_tag: &str,
        flags: Option<BasicConsumeFlags>,
        args: Option<FieldTable>,
        callback: F,
    ) -> Result<String>
    where
        F: Fn(&Delivery, &Channel, &AsyncClient) -> Verdict + Send + Sync + 'static,
    {
        self.consume_with(queue_name, consumer_tag, flags, args, Arc::new(callback))
            .await
    }

    pub(crate) async fn consume_with(
        &self,
        queue_name: &str,
        consumer_tag: &str,
        flags: Option<BasicConsumeFlags>,
        args: Option<FieldTable>,
        callback: ConsumeCallback,
    ) -> Result<String> {
        let consumer_tag = match consumer_tag {
            "" => generate_consumer_tag(),
            tag => tag.to_string(),
        };
        let flags = flags.unwrap_or_default();
        let frame = BasicConsumeArgs::default()
            .queue(queue_name)
            .consumer_tag(&consumer_tag)
            .flags(flags)
            .args(args)
            .frame(self.channel);

        let sink = self.client.sink()?;

        if flags.contains(BasicConsumeFlags::NO_WAIT) {
            let (tx, rx) = oneshot::channel();

            sink.send(Command::Consume {
                channel: self.channel,
                consumer_tag: consumer_tag.clone(),
                no_ack: flags.contains(BasicConsumeFlags::NO_ACK),
                callback,
                frames: vec![frame],
                wait_for: WaitFor::SentOut(tx),
            })
            .map_err(|_| processor::connection_gone())?;

            rx.await.map_err(|_| processor::connection_gone())??;
        } else {
            let (tx, rx) = oneshot::channel();

            sink.send(Command::Consume {
                channel: self.channel,
                consumer_tag: consumer_tag.clone(),
                no_ack: flags.contains(BasicConsumeFlags::NO_ACK),
                callback,
                frames: vec![frame],
                wait_for: WaitFor::Frame {
                    channel: self.channel,
                    matcher: pending::expect(self.channel, frame::BASIC_CONSUME_OK),
                    responder: tx,
                },
            })
            .map_err(|_| processor::connection_gone())?;

            rx.await.map_err(|_| processor::connection_gone())??;
        }

        Ok(consumer_tag)
    }

    /// Stop the consumer. Deliveries arriving before the broker confirms the cancel still
    /// reach the callback.
    pub async fn basic_cancel(&self, consumer_tag: &str) -> Result<()> {
        let frame = BasicCancelArgs::new(consumer_tag).frame(self.channel);

        self.call(frame, frame::BASIC_CANCEL_OK).await?;

        Ok(())
    }

    pub async fn ack(&self, message: &Delivery) -> Result<()> {
        self.send(vec![Verdict::Ack.frame(self.channel, message.delivery_tag)])
            .await
    }

    /// Negative acknowledge with requeue.
    pub async fn nack(&self, message: &Delivery) -> Result<()> {
        self.send(vec![Verdict::Nack.frame(self.channel, message.delivery_tag)])
            .await
    }

    /// Reject with requeue.
    pub async fn reject(&self, message: &Delivery) -> Result<()> {
        self.send(vec![Verdict::Requeue.frame(self.channel, message.delivery_tag)])
            .await
    }

    /// Close the channel.
    pub async fn close(self) -> Result<()> {
        self.into_close().await?;

        Ok(())
    }

    pub(crate) async fn into_close(self) -> Result<(), ClientError> {
        let sink = self.client.sink()?;
        let frame = frame::channel_close(self.channel, ChannelError::Success as u16, "Normal close", 0);

        processor::call(
            &sink,
            vec![frame],
            self.channel,
            pending::expect(self.channel, frame::CHANNEL_CLOSE_OK),
        )
        .await?;

        Ok(())
    }

    async fn call(&self, frame: AMQPFrame, reply: ClassMethod) -> Result<AMQPFrame> {
        let sink = self.client.sink()?;

        Ok(processor::call(&sink, vec![frame], self.channel, pending::expect(self.channel, reply)).await?)
    }

    async fn send(&self, frames: Vec<AMQPFrame>) -> Result<()> {
        let sink = self.client.sink()?;

        processor::send(&sink, frames).await?;

        Ok(())
    }
}
