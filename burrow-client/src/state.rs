//! Reassembly of messages from method, content header and content body frames.
use crate::error::ClientError;
use crate::message::{Delivery, MessageProperties, ReturnedMessage};
use crate::model::{ChannelNumber, ConnectionError};
use burrow_codec::frame::{
    AMQPFrame, BasicDeliverArgs, BasicGetOkArgs, BasicReturnArgs, ContentBodyFrame, ContentHeaderFrame,
    MethodFrameArgs,
};
use log::trace;
use std::collections::HashMap;

/// Largest message body accepted from the broker.
const MAX_BODY_SIZE: u64 = 512 * 1024 * 1024;
/// The body buffer grows with the received frames beyond this.
const RESERVE_LIMIT: usize = 128 * 1024;

/// What a channel frame resulted in.
#[derive(Debug)]
pub(crate) enum Event {
    Delivered(Delivery),
    Returned(ReturnedMessage),
    /// Message fetched by a get with the number of messages left in the queue.
    Got(Delivery, u32),
    /// The frame is part of a message which is not complete yet.
    InProgress,
    /// Not a content related frame.
    Unhandled(AMQPFrame),
}

#[derive(Debug)]
enum ContentStart {
    Deliver(BasicDeliverArgs),
    Return(BasicReturnArgs),
    GetOk(BasicGetOkArgs),
}

#[derive(Debug)]
struct InDelivery {
    start: ContentStart,
    header: Option<ContentHeaderFrame>,
    body: Vec<u8>,
}

#[derive(Debug, Default)]
pub(crate) struct ChannelState {
    in_delivery: HashMap<ChannelNumber, InDelivery>,
}

impl ChannelState {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn handle_frame(&mut self, frame: AMQPFrame) -> Result<Event, ClientError> {
        match frame {
            AMQPFrame::Method(ch, _, MethodFrameArgs::BasicDeliver(args)) => self.start(ch, ContentStart::Deliver(args)),
            AMQPFrame::Method(ch, _, MethodFrameArgs::BasicReturn(args)) => self.start(ch, ContentStart::Return(args)),
            AMQPFrame::Method(ch, _, MethodFrameArgs::BasicGetOk(args)) => self.start(ch, ContentStart::GetOk(args)),
            AMQPFrame::ContentHeader(header) => self.content_header(header),
            AMQPFrame::ContentBody(body) => self.content_body(body),
            other => {
                if self.in_delivery.contains_key(&other.channel()) {
                    return Err(unexpected(other.channel(), "Method frame in the middle of a content"));
                }

                Ok(Event::Unhandled(other))
            }
        }
    }

    /// Forget the half received message of a closed channel.
    pub(crate) fn drop_channel(&mut self, channel: ChannelNumber) {
        self.in_delivery.remove(&channel);
    }

    pub(crate) fn clear(&mut self) {
        self.in_delivery.clear();
    }

    fn start(&mut self, channel: ChannelNumber, start: ContentStart) -> Result<Event, ClientError> {
        if self.in_delivery.contains_key(&channel) {
            return Err(unexpected(channel, "New message started before the previous was complete"));
        }

        self.in_delivery.insert(
            channel,
            InDelivery {
                start,
                header: None,
                body: vec![],
            },
        );

        Ok(Event::InProgress)
    }

    fn content_header(&mut self, header: ContentHeaderFrame) -> Result<Event, ClientError> {
        let channel = header.channel;

        match self.in_delivery.get_mut(&channel) {
            Some(dc) if dc.header.is_none() => {
                let size = header.body_size;

                if size > MAX_BODY_SIZE {
                    return Err(ClientError::protocol(
                        ConnectionError::FrameError as u16,
                        format!("Content body of {} bytes is over the limit of {}", size, MAX_BODY_SIZE),
                    )
                    .on_channel(channel));
                }

                dc.body.reserve((size as usize).min(RESERVE_LIMIT));
                dc.header = Some(header);

                if size == 0 {
                    self.complete(channel)
                } else {
                    Ok(Event::InProgress)
                }
            }
            _ => Err(unexpected(channel, "Content header without a method frame")),
        }
    }

    fn content_body(&mut self, body: ContentBodyFrame) -> Result<Event, ClientError> {
        let channel = body.channel;

        let (received, expected) = match self.in_delivery.get_mut(&channel) {
            Some(InDelivery {
                header: Some(header),
                body: buf,
                ..
            }) => {
                buf.extend_from_slice(&body.body);

                (buf.len() as u64, header.body_size)
            }
            _ => return Err(unexpected(channel, "Content body without a content header")),
        };

        trace!("Channel {} received {}/{} bytes of content", channel, received, expected);

        match received.cmp(&expected) {
            std::cmp::Ordering::Less => Ok(Event::InProgress),
            std::cmp::Ordering::Equal => self.complete(channel),
            std::cmp::Ordering::Greater => Err(unexpected(channel, "Content body is longer than declared")),
        }
    }

    fn complete(&mut self, channel: ChannelNumber) -> Result<Event, ClientError> {
        let dc = match self.in_delivery.remove(&channel) {
            Some(dc) => dc,
            None => return Err(unexpected(channel, "No message in progress")),
        };

        let properties = dc.header.map(MessageProperties::from).unwrap_or_default();

        let event = match dc.start {
            ContentStart::Deliver(args) => Event::Delivered(Delivery {
                channel,
                consumer_tag: args.consumer_tag,
                delivery_tag: args.delivery_tag,
                redelivered: args.redelivered,
                exchange: args.exchange_name,
                routing_key: args.routing_key,
                properties,
                body: dc.body,
            }),
            ContentStart::Return(args) => Event::Returned(ReturnedMessage {
                channel,
                reply_code: args.reply_code,
                reply_text: args.reply_text,
                exchange: args.exchange_name,
                routing_key: args.routing_key,
                properties,
                body: dc.body,
            }),
            ContentStart::GetOk(args) => Event::Got(
                Delivery {
                    channel,
                    consumer_tag: String::new(),
                    delivery_tag: args.delivery_tag,
                    redelivered: args.redelivered,
                    exchange: args.exchange_name,
                    routing_key: args.routing_key,
                    properties,
                    body: dc.body,
                },
                args.message_count,
            ),
        };

        Ok(event)
    }
}

fn unexpected(channel: ChannelNumber, message: &str) -> ClientError {
    ClientError::protocol(ConnectionError::UnexpectedFrame as u16, message).on_channel(channel)
}
