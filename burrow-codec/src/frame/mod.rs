/// Implements `frame(channel)` for the argument types of channel level methods.
macro_rules! method_frame {
    ($($args:ident => $variant:ident @ $cm:ident),+ $(,)?) => {
        $(
            impl $args {
                pub fn frame(self, channel: $crate::frame::Channel) -> $crate::frame::AMQPFrame {
                    $crate::frame::AMQPFrame::Method(channel, $crate::frame::$cm, $crate::frame::MethodFrameArgs::$variant(self))
                }
            }
        )+
    };
}

/// Functions building the frames of methods which have no arguments.
macro_rules! bare_method {
    ($($name:ident => $variant:ident @ $cm:ident),+ $(,)?) => {
        $(
            pub fn $name(channel: $crate::frame::Channel) -> $crate::frame::AMQPFrame {
                $crate::frame::AMQPFrame::Method(channel, $crate::frame::$cm, $crate::frame::MethodFrameArgs::$variant)
            }
        )+
    };
}

mod basic;
mod channel;
mod connection;
mod exchange;
mod queue;

pub use self::{
    basic::{
        basic_get_empty, basic_qos_ok, confirm_select, confirm_select_ok, BasicAckArgs, BasicCancelArgs,
        BasicCancelOkArgs, BasicConsumeArgs, BasicConsumeFlags, BasicConsumeOkArgs, BasicDeliverArgs, BasicGetArgs,
        BasicGetOkArgs, BasicNackArgs, BasicNackFlags, BasicPublishArgs, BasicPublishFlags, BasicQosArgs,
        BasicRejectArgs, BasicReturnArgs, ConfirmSelectArgs,
    },
    channel::{channel_close, channel_close_ok, channel_open, channel_open_ok, ChannelCloseArgs},
    connection::{
        connection_close, connection_close_ok, connection_open_ok, ConnectionCloseArgs, ConnectionOpenArgs,
        ConnectionStartArgs, ConnectionStartOkArgs, ConnectionTuneArgs, ConnectionTuneOkArgs,
    },
    exchange::{
        exchange_declare_ok, exchange_delete_ok, ExchangeDeclareArgs, ExchangeDeclareFlags, ExchangeDeleteArgs,
        ExchangeDeleteFlags,
    },
    queue::{
        queue_bind_ok, queue_unbind_ok, QueueBindArgs, QueueDeclareArgs, QueueDeclareFlags, QueueDeclareOkArgs,
        QueueDeleteArgs, QueueDeleteFlags, QueueDeleteOkArgs, QueuePurgeArgs, QueuePurgeOkArgs, QueueUnbindArgs,
    },
};
use std::collections::HashMap;
use std::fmt;

pub const CONNECTION_CLASS: ClassId = 10;
pub const CHANNEL_CLASS: ClassId = 20;
pub const EXCHANGE_CLASS: ClassId = 40;
pub const QUEUE_CLASS: ClassId = 50;
pub const BASIC_CLASS: ClassId = 60;
pub const CONFIRM_CLASS: ClassId = 85;

pub const CONNECTION_START: ClassMethod = unify_class_method(CONNECTION_CLASS, 10);
pub const CONNECTION_START_OK: ClassMethod = unify_class_method(CONNECTION_CLASS, 11);
pub const CONNECTION_TUNE: ClassMethod = unify_class_method(CONNECTION_CLASS, 30);
pub const CONNECTION_TUNE_OK: ClassMethod = unify_class_method(CONNECTION_CLASS, 31);
pub const CONNECTION_OPEN: ClassMethod = unify_class_method(CONNECTION_CLASS, 40);
pub const CONNECTION_OPEN_OK: ClassMethod = unify_class_method(CONNECTION_CLASS, 41);
pub const CONNECTION_CLOSE: ClassMethod = unify_class_method(CONNECTION_CLASS, 50);
pub const CONNECTION_CLOSE_OK: ClassMethod = unify_class_method(CONNECTION_CLASS, 51);

pub const CHANNEL_OPEN: ClassMethod = unify_class_method(CHANNEL_CLASS, 10);
pub const CHANNEL_OPEN_OK: ClassMethod = unify_class_method(CHANNEL_CLASS, 11);
pub const CHANNEL_CLOSE: ClassMethod = unify_class_method(CHANNEL_CLASS, 40);
pub const CHANNEL_CLOSE_OK: ClassMethod = unify_class_method(CHANNEL_CLASS, 41);

pub const EXCHANGE_DECLARE: ClassMethod = unify_class_method(EXCHANGE_CLASS, 10);
pub const EXCHANGE_DECLARE_OK: ClassMethod = unify_class_method(EXCHANGE_CLASS, 11);
pub const EXCHANGE_DELETE: ClassMethod = unify_class_method(EXCHANGE_CLASS, 20);
pub const EXCHANGE_DELETE_OK: ClassMethod = unify_class_method(EXCHANGE_CLASS, 21);

pub const QUEUE_DECLARE: ClassMethod = unify_class_method(QUEUE_CLASS, 10);
pub const QUEUE_DECLARE_OK: ClassMethod = unify_class_method(QUEUE_CLASS, 11);
pub const QUEUE_BIND: ClassMethod = unify_class_method(QUEUE_CLASS, 20);
pub const QUEUE_BIND_OK: ClassMethod = unify_class_method(QUEUE_CLASS, 21);
pub const QUEUE_PURGE: ClassMethod = unify_class_method(QUEUE_CLASS, 30);
pub const QUEUE_PURGE_OK: ClassMethod = unify_class_method(QUEUE_CLASS, 31);
pub const QUEUE_DELETE: ClassMethod = unify_class_method(QUEUE_CLASS, 40);
pub const QUEUE_DELETE_OK: ClassMethod = unify_class_method(QUEUE_CLASS, 41);
pub const QUEUE_UNBIND: ClassMethod = unify_class_method(QUEUE_CLASS, 50);
pub const QUEUE_UNBIND_OK: ClassMethod = unify_class_method(QUEUE_CLASS, 51);

pub const BASIC_QOS: ClassMethod = unify_class_method(BASIC_CLASS, 10);
pub const BASIC_QOS_OK: ClassMethod = unify_class_method(BASIC_CLASS, 11);
pub const BASIC_CONSUME: ClassMethod = unify_class_method(BASIC_CLASS, 20);
pub const BASIC_CONSUME_OK: ClassMethod = unify_class_method(BASIC_CLASS, 21);
pub const BASIC_CANCEL: ClassMethod = unify_class_method(BASIC_CLASS, 30);
pub const BASIC_CANCEL_OK: ClassMethod = unify_class_method(BASIC_CLASS, 31);
pub const BASIC_PUBLISH: ClassMethod = unify_class_method(BASIC_CLASS, 40);
pub const BASIC_RETURN: ClassMethod = unify_class_method(BASIC_CLASS, 50);
pub const BASIC_DELIVER: ClassMethod = unify_class_method(BASIC_CLASS, 60);
pub const BASIC_GET: ClassMethod = unify_class_method(BASIC_CLASS, 70);
pub const BASIC_GET_OK: ClassMethod = unify_class_method(BASIC_CLASS, 71);
pub const BASIC_GET_EMPTY: ClassMethod = unify_class_method(BASIC_CLASS, 72);
pub const BASIC_ACK: ClassMethod = unify_class_method(BASIC_CLASS, 80);
pub const BASIC_REJECT: ClassMethod = unify_class_method(BASIC_CLASS, 90);
pub const BASIC_NACK: ClassMethod = unify_class_method(BASIC_CLASS, 120);

pub const CONFIRM_SELECT: ClassMethod = unify_class_method(CONFIRM_CLASS, 10);
pub const CONFIRM_SELECT_OK: ClassMethod = unify_class_method(CONFIRM_CLASS, 11);

/// Bytes a frame adds around its payload: type, channel, size and the frame-end octet.
pub const FRAME_OVERHEAD: usize = 8;

pub type Channel = u16;
pub type ClassMethod = u32;
pub type ClassId = u16;
pub type Weight = u16;

/// One unit of the wire protocol.
#[derive(Clone, PartialEq)]
pub enum AMQPFrame {
    /// The `AMQP 0-9-1` protocol header, the first bytes the client writes.
    Header,
    /// Method call on a channel, channel 0 carries the connection methods.
    Method(Channel, ClassMethod, MethodFrameArgs),
    ContentHeader(ContentHeaderFrame),
    ContentBody(ContentBodyFrame),
    Heartbeat(Channel),
}

impl AMQPFrame {
    /// The channel the frame is addressed to. The protocol header belongs to the connection.
    pub fn channel(&self) -> Channel {
        match self {
            AMQPFrame::Header => 0,
            AMQPFrame::Method(channel, ..) | AMQPFrame::Heartbeat(channel) => *channel,
            AMQPFrame::ContentHeader(header) => header.channel,
            AMQPFrame::ContentBody(body) => body.channel,
        }
    }

    pub fn class_method(&self) -> Option<ClassMethod> {
        match self {
            AMQPFrame::Method(_, cm, _) => Some(*cm),
            _ => None,
        }
    }
}

impl fmt::Debug for AMQPFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AMQPFrame::Header => f.write_str("ProtocolHeader"),
            AMQPFrame::Method(channel, cm, args) => write!(f, "Method[{channel}] {cm:08X} {args:?}"),
            AMQPFrame::ContentHeader(header) => write!(f, "ContentHeader[{}] {header:?}", header.channel),
            AMQPFrame::ContentBody(body) => write!(f, "ContentBody[{}] {body:?}", body.channel),
            AMQPFrame::Heartbeat(channel) => write!(f, "Heartbeat[{channel}]"),
        }
    }
}

/// Arguments of the method frames, one variant per supported method.
#[derive(Clone, Debug, PartialEq)]
pub enum MethodFrameArgs {
    ConnectionStart(ConnectionStartArgs),
    ConnectionStartOk(ConnectionStartOkArgs),
    ConnectionTune(ConnectionTuneArgs),
    ConnectionTuneOk(ConnectionTuneOkArgs),
    ConnectionOpen(ConnectionOpenArgs),
    ConnectionOpenOk,
    ConnectionClose(ConnectionCloseArgs),
    ConnectionCloseOk,
    ChannelOpen,
    ChannelOpenOk,
    ChannelClose(ChannelCloseArgs),
    ChannelCloseOk,
    ExchangeDeclare(ExchangeDeclareArgs),
    ExchangeDeclareOk,
    ExchangeDelete(ExchangeDeleteArgs),
    ExchangeDeleteOk,
    QueueDeclare(QueueDeclareArgs),
    QueueDeclareOk(QueueDeclareOkArgs),
    QueueBind(QueueBindArgs),
    QueueBindOk,
    QueuePurge(QueuePurgeArgs),
    QueuePurgeOk(QueuePurgeOkArgs),
    QueueDelete(QueueDeleteArgs),
    QueueDeleteOk(QueueDeleteOkArgs),
    QueueUnbind(QueueUnbindArgs),
    QueueUnbindOk,
    BasicQos(BasicQosArgs),
    BasicQosOk,
    BasicConsume(BasicConsumeArgs),
    BasicConsumeOk(BasicConsumeOkArgs),
    BasicCancel(BasicCancelArgs),
    BasicCancelOk(BasicCancelOkArgs),
    BasicGet(BasicGetArgs),
    BasicGetOk(BasicGetOkArgs),
    BasicGetEmpty,
    BasicPublish(BasicPublishArgs),
    BasicReturn(BasicReturnArgs),
    BasicDeliver(BasicDeliverArgs),
    BasicAck(BasicAckArgs),
    BasicReject(BasicRejectArgs),
    BasicNack(BasicNackArgs),
    ConfirmSelect(ConfirmSelectArgs),
    ConfirmSelectOk,
}

bitflags! {
    /// Presence bits of the basic content properties, highest bit first on the wire.
    #[derive(Copy, Clone, Debug, Default, PartialEq)]
    pub struct HeaderPropertyFlags: u16 {
        const CONTENT_TYPE = 1 << 15;
        const CONTENT_ENCODING = 1 << 14;
        const HEADERS = 1 << 13;
        const DELIVERY_MODE = 1 << 12;
        const PRIORITY = 1 << 11;
        const CORRELATION_ID = 1 << 10;
        const REPLY_TO = 1 << 9;
        const EXPIRATION = 1 << 8;
        const MESSAGE_ID = 1 << 7;
        const TIMESTAMP = 1 << 6;
        const MESSAGE_TYPE = 1 << 5;
        const USER_ID = 1 << 4;
        const APP_ID = 1 << 3;
        const CLUSTER_ID = 1 << 2;
    }
}

/// Content header with the basic class properties. The property flags on the wire are
/// derived from which `Option` fields are set.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ContentHeaderFrame {
    pub channel: Channel,
    pub class_id: ClassId,
    pub weight: Weight,
    pub body_size: u64,
    pub content_type: Option<String>,
    pub content_encoding: Option<String>,
    pub headers: Option<FieldTable>,
    pub delivery_mode: Option<u8>,
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

impl ContentHeaderFrame {
    pub fn with_content_type(mut self, content_type: &str) -> Self {
        self.content_type = Some(content_type.to_string());
        self
    }

    pub fn with_delivery_mode(mut self, delivery_mode: u8) -> Self {
        self.delivery_mode = Some(delivery_mode);
        self
    }

    /// Calculate the property flags from the present properties.
    pub fn prop_flags(&self) -> HeaderPropertyFlags {
        let mut flags = HeaderPropertyFlags::empty();

        flags.set(HeaderPropertyFlags::CONTENT_TYPE, self.content_type.is_some());
        flags.set(HeaderPropertyFlags::CONTENT_ENCODING, self.content_encoding.is_some());
        flags.set(HeaderPropertyFlags::HEADERS, self.headers.is_some());
        flags.set(HeaderPropertyFlags::DELIVERY_MODE, self.delivery_mode.is_some());
        flags.set(HeaderPropertyFlags::PRIORITY, self.priority.is_some());
        flags.set(HeaderPropertyFlags::CORRELATION_ID, self.correlation_id.is_some());
        flags.set(HeaderPropertyFlags::REPLY_TO, self.reply_to.is_some());
        flags.set(HeaderPropertyFlags::EXPIRATION, self.expiration.is_some());
        flags.set(HeaderPropertyFlags::MESSAGE_ID, self.message_id.is_some());
        flags.set(HeaderPropertyFlags::TIMESTAMP, self.timestamp.is_some());
        flags.set(HeaderPropertyFlags::MESSAGE_TYPE, self.message_type.is_some());
        flags.set(HeaderPropertyFlags::USER_ID, self.user_id.is_some());
        flags.set(HeaderPropertyFlags::APP_ID, self.app_id.is_some());
        flags.set(HeaderPropertyFlags::CLUSTER_ID, self.cluster_id.is_some());

        flags
    }

    pub fn frame(self) -> AMQPFrame {
        AMQPFrame::ContentHeader(self)
    }
}

#[derive(Clone, PartialEq)]
pub struct ContentBodyFrame {
    pub channel: Channel,
    pub body: Vec<u8>,
}

impl ContentBodyFrame {
    pub fn frame(self) -> AMQPFrame {
        AMQPFrame::ContentBody(self)
    }
}

/// Only the beginning of the body is printed.
impl fmt::Debug for ContentBodyFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const SHOWN: usize = 64;

        let shown = &self.body[..self.body.len().min(SHOWN)];

        write!(f, "{} bytes {:?}", self.body.len(), String::from_utf8_lossy(shown))
    }
}

/// Argument table of methods and the `headers` property of messages.
pub type FieldTable = HashMap<String, AMQPFieldValue>;

/// Values of field tables and field arrays.
#[derive(Clone, Debug, PartialEq)]
pub enum AMQPFieldValue {
    Bool(bool),
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    F32(f32),
    F64(f64),
    Decimal(u8, u32),
    Timestamp(u64),
    LongString(String),
    ByteArray(Vec<u8>),
    FieldArray(Vec<AMQPFieldValue>),
    FieldTable(Box<FieldTable>),
    Void,
}

impl From<ContentHeaderFrame> for AMQPFrame {
    fn from(header: ContentHeaderFrame) -> Self {
        header.frame()
    }
}

impl From<ContentBodyFrame> for AMQPFrame {
    fn from(body: ContentBodyFrame) -> Self {
        body.frame()
    }
}

/// Build the content header and the content body frames of a message. The body is split
/// so that no body frame exceeds `frame_max` bytes including the frame overhead. A zero
/// `frame_max` means there is no limit. An empty body doesn't have body frames.
pub fn content_frames(channel: Channel, mut header: ContentHeaderFrame, body: &[u8], frame_max: u32) -> Vec<AMQPFrame> {
    header.channel = channel;
    header.class_id = BASIC_CLASS;
    header.body_size = body.len() as u64;

    let mut frames = vec![AMQPFrame::ContentHeader(header)];

    let chunk_size = match frame_max as usize {
        0 => body.len().max(1),
        max => max.saturating_sub(FRAME_OVERHEAD).max(1),
    };

    for chunk in body.chunks(chunk_size) {
        frames.push(AMQPFrame::ContentBody(ContentBodyFrame {
            channel,
            body: chunk.to_vec(),
        }));
    }

    frames
}

/// The class id and the method id of a combined class method.
pub const fn split_class_method(cm: ClassMethod) -> (ClassId, u16) {
    ((cm >> 16) as ClassId, cm as u16)
}

/// Class id in the high, method id in the low 16 bits.
pub const fn unify_class_method(class: ClassId, method: u16) -> ClassMethod {
    (class as u32) << 16 | method as u32
}

pub fn heartbeat() -> AMQPFrame {
    AMQPFrame::Heartbeat(0)
}
