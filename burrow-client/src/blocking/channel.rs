use super::Client;
use crate::channel_api::generate_consumer_tag;
use crate::error::ClientError;
use crate::message::{Delivery, MessageProperties, Verdict};
use crate::model::{ChannelNumber, ClassMethod, ExchangeType};
use anyhow::Result;
use burrow_codec::frame::{
    self, AMQPFrame, BasicCancelArgs, BasicConsumeArgs, BasicConsumeFlags, BasicGetArgs, BasicPublishArgs,
    BasicQosArgs, ExchangeDeclareArgs, ExchangeDeclareFlags, ExchangeDeleteArgs, FieldTable, MethodFrameArgs,
    QueueBindArgs, QueueDeclareArgs, QueueDeclareFlags, QueueDeclareOkArgs, QueueDeleteArgs, QueuePurgeArgs,
    QueueUnbindArgs,
};
use std::fmt;

/// Channel of a blocking client. It borrows the client so only one operation runs at a time.
pub struct Channel<'a> {
    id: ChannelNumber,
    client: &'a mut Client,
}

impl fmt::Debug for Channel<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Channel{{{}}}", self.id)
    }
}

impl<'a> Channel<'a> {
    pub(super) fn new(id: ChannelNumber, client: &'a mut Client) -> Self {
        Self { id, client }
    }

    pub fn id(&self) -> ChannelNumber {
        self.id
    }

    pub fn exchange_declare(
        &mut self,
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
            .frame(self.id);

        if flags.contains(ExchangeDeclareFlags::NO_WAIT) {
            return self.send(frame);
        }

        self.call(frame, frame::EXCHANGE_DECLARE_OK)?;

        Ok(())
    }

    pub fn exchange_delete(&mut self, exchange_name: &str, if_unused: bool) -> Result<()> {
        let frame = ExchangeDeleteArgs::default()
            .exchange_name(exchange_name)
            .if_unused(if_unused)
            .frame(self.id);

        self.call(frame, frame::EXCHANGE_DELETE_OK)?;

        Ok(())
    }

    pub fn queue_declare(
        &mut self,
        queue_name: &str,
        flags: Option<QueueDeclareFlags>,
        args: Option<FieldTable>,
    ) -> Result<QueueDeclareOkArgs> {
        let flags = flags.unwrap_or_default();
        let frame = QueueDeclareArgs::default()
            .name(queue_name)
            .flags(flags)
            .args(args)
            .frame(self.id);

        if flags.contains(QueueDeclareFlags::NO_WAIT) {
            self.send(frame)?;

            return Ok(QueueDeclareOkArgs::default().name(queue_name));
        }

        match self.call(frame, frame::QUEUE_DECLARE_OK)? {
            AMQPFrame::Method(_, _, MethodFrameArgs::QueueDeclareOk(args)) => Ok(args),
            _ => Ok(QueueDeclareOkArgs::default().name(queue_name)),
        }
    }

    pub fn queue_bind(
        &mut self,
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
            .frame(self.id);

        if no_wait {
            return self.send(frame);
        }

        self.call(frame, frame::QUEUE_BIND_OK)?;

        Ok(())
    }

    pub fn queue_unbind(&mut self, queue_name: &str, exchange_name: &str, routing_key: &str) -> Result<()> {
        let frame = QueueUnbindArgs::new(queue_name, exchange_name)
            .routing_key(routing_key)
            .frame(self.id);

        self.call(frame, frame::QUEUE_UNBIND_OK)?;

        Ok(())
    }

    pub fn queue_purge(&mut self, queue_name: &str) -> Result<u32> {
        let frame = QueuePurgeArgs::default().queue_name(queue_name).frame(self.id);

        match self.call(frame, frame::QUEUE_PURGE_OK)? {
            AMQPFrame::Method(_, _, MethodFrameArgs::QueuePurgeOk(args)) => Ok(args.message_count),
            _ => Ok(0),
        }
    }

    pub fn queue_delete(&mut self, queue_name: &str, if_unused: bool, if_empty: bool) -> Result<u32> {
        let frame = QueueDeleteArgs::default()
            .queue_name(queue_name)
            .if_unused(if_unused)
            .if_empty(if_empty)
            .frame(self.id);

        match self.call(frame, frame::QUEUE_DELETE_OK)? {
            AMQPFrame::Method(_, _, MethodFrameArgs::QueueDeleteOk(args)) => Ok(args.message_count),
            _ => Ok(0),
        }
    }

    pub fn basic_qos(&mut self, prefetch_size: u32, prefetch_count: u16, global: bool) -> Result<()> {
        let frame = BasicQosArgs::new(prefetch_size, prefetch_count, global).frame(self.id);

        self.call(frame, frame::BASIC_QOS_OK)?;

        Ok(())
    }

    /// Publish a message, returns when the frames are written to the socket.
    pub fn basic_publish(
        &mut self,
        exchange_name: &str,
        routing_key: &str,
        body: &[u8],
        properties: &MessageProperties,
        mandatory: bool,
        immediate: bool,
    ) -> Result<()> {
        let mut frames = vec![BasicPublishArgs::new(exchange_name)
            .routing_key(routing_key)
            .mandatory(mandatory)
            .immediate(immediate)
            .frame(self.id)];

        frames.extend(frame::content_frames(
            self.id,
            properties.to_header(),
            body,
            self.client.frame_max(),
        ));

        self.client.call(frames, self.id, &[])?;

        Ok(())
    }

    /// Register a consumer. Deliveries are passed to the callback while the client processes
    /// events, see [`Client::process_events`] and [`Client::run`].
    pub fn basic_consume<F>(
        &mut self,
        queue_name: &str,
        consumer_tag: &str,
        flags: Option<BasicConsumeFlags>,
        args: Option<FieldTable>,
        callback: F,
    ) -> Result<String>
    where
        F: FnMut(&Delivery) -> Verdict + Send + 'static,
    {
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
            .frame(self.id);

        // deliveries may follow consume-ok in the same read
        self.client.add_consumer(
            self.id,
            &consumer_tag,
            flags.contains(BasicConsumeFlags::NO_ACK),
            Box::new(callback),
        );

        let replies: &[ClassMethod] = if flags.contains(BasicConsumeFlags::NO_WAIT) {
            &[]
        } else {
            &[frame::BASIC_CONSUME_OK]
        };

        if let Err(e) = self.client.call(vec![frame], self.id, replies) {
            self.client.remove_consumer(self.id, &consumer_tag);

            return Err(anyhow::Error::new(e));
        }

        Ok(consumer_tag)
    }

    pub fn basic_cancel(&mut self, consumer_tag: &str) -> Result<()> {
        let frame = BasicCancelArgs::new(consumer_tag).frame(self.id);

        self.call(frame, frame::BASIC_CANCEL_OK)?;
        self.client.remove_consumer(self.id, consumer_tag);

        Ok(())
    }

    /// Fetch one message from the queue, `None` if the queue is empty.
    pub fn basic_get(&mut self, queue_name: &str, no_ack: bool) -> Result<Option<Delivery>> {
        let frame = BasicGetArgs::new(queue_name).no_ack(no_ack).frame(self.id);

        let reply = self
            .client
            .call(vec![frame], self.id, &[frame::BASIC_GET_OK, frame::BASIC_GET_EMPTY])?;

        match reply {
            Some(get_ok @ AMQPFrame::Method(_, frame::BASIC_GET_OK, _)) => {
                self.client.dispatch(get_ok)?;

                let (delivery, _) = self.client.wait_fetched(self.id)?;

                Ok(Some(delivery))
            }
            _ => Ok(None),
        }
    }

    pub fn ack(&mut self, message: &Delivery) -> Result<()> {
        self.settle(Verdict::Ack, message)
    }

    /// Negative acknowledge with requeue.
    pub fn nack(&mut self, message: &Delivery) -> Result<()> {
        self.settle(Verdict::Nack, message)
    }

    /// Reject with requeue.
    pub fn reject(&mut self, message: &Delivery) -> Result<()> {
        self.settle(Verdict::Requeue, message)
    }

    pub fn close(self) -> Result<()> {
        self.client.close_channel(self.id)?;

        Ok(())
    }

    fn settle(&mut self, verdict: Verdict, message: &Delivery) -> Result<()> {
        self.send(verdict.frame(self.id, message.delivery_tag))
    }

    fn call(&mut self, frame: AMQPFrame, reply: ClassMethod) -> Result<AMQPFrame, ClientError> {
        match self.client.call(vec![frame], self.id, &[reply])? {
            Some(frame) => Ok(frame),
            None => Err(ClientError::closed("No reply arrived")),
        }
    }

    fn send(&mut self, frame: AMQPFrame) -> Result<()> {
        self.client.call(vec![frame], self.id, &[])?;

        Ok(())
    }
}
