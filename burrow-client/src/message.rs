use crate::model::ChannelNumber;
use burrow_codec::frame::{
    AMQPFieldValue, AMQPFrame, BasicAckArgs, BasicNackArgs, BasicRejectArgs, ContentHeaderFrame, FieldTable,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeliveryMode {
    Transient = 1,
    Persistent = 2,
}

impl DeliveryMode {
    fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(DeliveryMode::Transient),
            2 => Some(DeliveryMode::Persistent),
            _ => None,
        }
    }
}

/// Basic content properties of a message.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MessageProperties {
    pub content_type: Option<String>,
    pub content_encoding: Option<String>,
    pub headers: Option<FieldTable>,
    pub delivery_mode: Option<DeliveryMode>,
    pub priority: Option<u8>,
    pub correlation_id: Option<String>,
    pub reply_to: Option<String>,
    pub expiration: Option<String>,
    pub message_id: Option<String>,
    pub timestamp: Option<u64>,
    pub message_type: Option<String>,
    pub user_id: Option<String>,
    pub app_id: Option<String>,
    pub cluster_id: Option<String>,
}

impl MessageProperties {
    pub fn content_type(mut self, content_type: &str) -> Self {
        self.content_type = Some(content_type.to_string());
        self
    }

    pub fn delivery_mode(mut self, mode: DeliveryMode) -> Self {
        self.delivery_mode = Some(mode);
        self
    }

    pub fn header(mut self, name: &str, value: AMQPFieldValue) -> Self {
        self.headers.get_or_insert_with(FieldTable::new).insert(name.to_string(), value);
        self
    }

    pub fn message_id(mut self, message_id: &str) -> Self {
        self.message_id = Some(message_id.to_string());
        self
    }

    pub fn correlation_id(mut self, correlation_id: &str) -> Self {
        self.correlation_id = Some(correlation_id.to_string());
        self
    }

    pub fn reply_to(mut self, reply_to: &str) -> Self {
        self.reply_to = Some(reply_to.to_string());
        self
    }

    pub(crate) fn to_header(&self) -> ContentHeaderFrame {
        ContentHeaderFrame {
            content_type: self.content_type.clone(),
            content_encoding: self.content_encoding.clone(),
            headers: self.headers.clone(),
            delivery_mode: self.delivery_mode.map(|m| m as u8),
            priority: self.priority,
            correlation_id: self.correlation_id.clone(),
            reply_to: self.reply_to.clone(),
            expiration: self.expiration.clone(),
            message_id: self.message_id.clone(),
            timestamp: self.timestamp,
            message_type: self.message_type.clone(),
            user_id: self.user_id.clone(),
            app_id: self.app_id.clone(),
            cluster_id: self.cluster_id.clone(),
            ..Default::default()
        }
    }
}

impl From<ContentHeaderFrame> for MessageProperties {
    fn from(hf: ContentHeaderFrame) -> Self {
        Self {
            content_type: hf.content_type,
            content_encoding: hf.content_encoding,
            headers: hf.headers,
            delivery_mode: hf.delivery_mode.and_then(DeliveryMode::from_u8),
            priority: hf.priority,
            correlation_id: hf.correlation_id,
            reply_to: hf.reply_to,
            expiration: hf.expiration,
            message_id: hf.message_id,
            timestamp: hf.timestamp,
            message_type: hf.message_type,
            user_id: hf.user_id,
            app_id: hf.app_id,
            cluster_id: hf.cluster_id,
        }
    }
}

/// Message delivered to a consumer or fetched by a get.
#[derive(Clone, Debug)]
pub struct Delivery {
    pub channel: ChannelNumber,
    /// Empty for messages fetched with a get.
    pub consumer_tag: String,
    pub delivery_tag: u64,
    pub redelivered: bool,
    pub exchange: String,
    pub routing_key: String,
    pub properties: MessageProperties,
    pub body: Vec<u8>,
}

impl Delivery {
    pub fn body_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }
}

/// Mandatory or immediate message which the broker couldn't route.
#[derive(Clone, Debug)]
pub struct ReturnedMessage {
    pub channel: ChannelNumber,
    pub reply_code: u16,
    pub reply_text: String,
    pub exchange: String,
    pub routing_key: String,
    pub properties: MessageProperties,
    pub body: Vec<u8>,
}

/// The answer of a consumer callback to a delivery.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    /// Acknowledge the message.
    Ack,
    /// Negative acknowledge, the broker requeues the message.
    Nack,
    /// Reject the message and put it back to the queue.
    Requeue,
}

impl From<&str> for Verdict {
    /// Unknown words requeue the message.
    fn from(value: &str) -> Self {
        match value {
            "ack" => Verdict::Ack,
            "nack" => Verdict::Nack,
            _ => Verdict::Requeue,
        }
    }
}

impl Verdict {
    /// The frame which settles the delivery.
    pub fn frame(self, channel: ChannelNumber, delivery_tag: u64) -> AMQPFrame {
        match self {
            Verdict::Ack => BasicAckArgs::default().delivery_tag(delivery_tag).frame(channel),
            Verdict::Nack => BasicNackArgs::default()
                .delivery_tag(delivery_tag)
                .requeue(true)
                .frame(channel),
            Verdict::Requeue => BasicRejectArgs::default()
                .delivery_tag(delivery_tag)
                .requeue(true)
                .frame(channel),
        }
    }
}
