use crate::frame::*;
use crate::{frame_error, FrameError, Result, COMMAND_INVALID, FRAME_ERROR, SYNTAX_ERROR};
use bytes::{Buf, BufMut, BytesMut};
use std::collections::HashMap;
use tokio_util::codec::{Decoder, Encoder};

const FRAME_METHOD_FRAME: u8 = 0x01;
const FRAME_CONTENT_HEADER: u8 = 0x02;
const FRAME_CONTENT_BODY: u8 = 0x03;
const FRAME_HEARTBEAT: u8 = 0x08;
const FRAME_AMQP_VERSION: u8 = 0x41;
const FRAME_END: u8 = 0xCE;

/// Size of the type, channel and payload size fields of a frame.
const FRAME_HEADER_SIZE: usize = 7;

pub const PROTOCOL_HEADER: &[u8; 8] = b"AMQP\x00\x00\x09\x01";

/// Frames before the tuning must fit in this many bytes.
pub const FRAME_MIN_SIZE: u32 = 4096;

/// The buffer grows with the received bytes beyond this while a frame is incomplete.
const RESERVE_LIMIT: usize = 128 * 1024;

/// AMQP encoder and decoder. If `frame_max` is set, the decoder refuses frames which
/// are bigger than that.
#[derive(Debug, Default)]
pub struct AMQPCodec {
    frame_max: usize,
}

impl AMQPCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_frame_max(frame_max: u32) -> Self {
        Self {
            frame_max: frame_max as usize,
        }
    }

    /// Change the frame size limit after the connection tuning.
    pub fn set_frame_max(&mut self, frame_max: u32) {
        self.frame_max = frame_max as usize;
    }
}

/// Unit of encoding. Content frames of a message are sent as `Frames` so they
/// end up in the buffer next to each other.
#[derive(Debug)]
pub enum Frame {
    Frame(AMQPFrame),
    Frames(Vec<AMQPFrame>),
}

impl From<AMQPFrame> for Frame {
    fn from(frame: AMQPFrame) -> Self {
        Frame::Frame(frame)
    }
}

impl From<Vec<AMQPFrame>> for Frame {
    fn from(frames: Vec<AMQPFrame>) -> Self {
        Frame::Frames(frames)
    }
}

impl Encoder<Frame> for AMQPCodec {
    type Error = FrameError;

    fn encode(&mut self, event: Frame, buf: &mut BytesMut) -> Result<()> {
        match event {
            Frame::Frame(frame) => encode_amqp_frame(buf, &frame),
            Frame::Frames(frames) => {
                for frame in &frames {
                    encode_amqp_frame(buf, frame)?;
                }

                Ok(())
            }
        }
    }
}

impl Decoder for AMQPCodec {
    type Item = AMQPFrame;
    type Error = FrameError;

    /// Decode one frame from the front of the buffer. If the frame is not complete yet,
    /// nothing is consumed and `None` is returned.
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        if src.is_empty() {
            return Ok(None);
        }

        match src[0] {
            FRAME_AMQP_VERSION => {
                if src.len() < PROTOCOL_HEADER.len() {
                    return Ok(None);
                }

                if &src[..PROTOCOL_HEADER.len()] != PROTOCOL_HEADER {
                    return frame_error!(FRAME_ERROR, "Unsupported protocol version");
                }

                src.advance(PROTOCOL_HEADER.len());

                Ok(Some(AMQPFrame::Header))
            }
            FRAME_METHOD_FRAME | FRAME_CONTENT_HEADER | FRAME_CONTENT_BODY | FRAME_HEARTBEAT => {
                if src.len() < FRAME_HEADER_SIZE {
                    return Ok(None);
                }

                let size = u32::from_be_bytes([src[3], src[4], src[5], src[6]]) as usize;
                let total = size + FRAME_OVERHEAD;

                if self.frame_max > 0 && total > self.frame_max {
                    return frame_error!(
                        FRAME_ERROR,
                        format!("Frame size {} exceeds frame max {}", total, self.frame_max)
                    );
                }

                if src.len() < total {
                    src.reserve((total - src.len()).min(RESERVE_LIMIT));

                    return Ok(None);
                }

                if src[total - 1] != FRAME_END {
                    return frame_error!(FRAME_ERROR, format!("Invalid frame end {:02X}", src[total - 1]));
                }

                let frame_type = src.get_u8();
                let channel = src.get_u16();
                src.advance(4);

                let mut payload = src.split_to(size);
                src.advance(1);

                let frame = match frame_type {
                    FRAME_METHOD_FRAME => decode_method_frame(&mut payload, channel)?,
                    FRAME_CONTENT_HEADER => decode_content_header_frame(&mut payload, channel)?,
                    FRAME_CONTENT_BODY => AMQPFrame::ContentBody(ContentBodyFrame {
                        channel,
                        body: payload.to_vec(),
                    }),
                    _ => AMQPFrame::Heartbeat(channel),
                };

                Ok(Some(frame))
            }
            f => frame_error!(FRAME_ERROR, format!("Unknown frame type {:02X}", f)),
        }
    }
}

fn need(buf: &BytesMut, len: usize) -> Result<()> {
    if buf.remaining() < len {
        return frame_error!(
            SYNTAX_ERROR,
            format!("Frame is truncated, needed {} bytes, got {}", len, buf.remaining())
        );
    }

    Ok(())
}

fn read_u8(buf: &mut BytesMut) -> Result<u8> {
    need(buf, 1)?;
    Ok(buf.get_u8())
}

fn read_u16(buf: &mut BytesMut) -> Result<u16> {
    need(buf, 2)?;
    Ok(buf.get_u16())
}

fn read_u32(buf: &mut BytesMut) -> Result<u32> {
    need(buf, 4)?;
    Ok(buf.get_u32())
}

fn read_u64(buf: &mut BytesMut) -> Result<u64> {
    need(buf, 8)?;
    Ok(buf.get_u64())
}

fn read_bool(buf: &mut BytesMut) -> Result<bool> {
    Ok(read_u8(buf)? & 0x01 != 0)
}

fn decode_method_frame(src: &mut BytesMut, channel: u16) -> Result<AMQPFrame> {
    let class_method = read_u32(src)?;

    let method_frame_args = match class_method {
        CONNECTION_START => decode_connection_start(src)?,
        CONNECTION_START_OK => decode_connection_start_ok(src)?,
        CONNECTION_TUNE => MethodFrameArgs::ConnectionTune(ConnectionTuneArgs {
            channel_max: read_u16(src)?,
            frame_max: read_u32(src)?,
            heartbeat: read_u16(src)?,
        }),
        CONNECTION_TUNE_OK => MethodFrameArgs::ConnectionTuneOk(ConnectionTuneOkArgs {
            channel_max: read_u16(src)?,
            frame_max: read_u32(src)?,
            heartbeat: read_u16(src)?,
        }),
        CONNECTION_OPEN => decode_connection_open(src)?,
        CONNECTION_OPEN_OK => {
            decode_short_string(src)?;
            MethodFrameArgs::ConnectionOpenOk
        }
        CONNECTION_CLOSE => MethodFrameArgs::ConnectionClose(ConnectionCloseArgs {
            code: read_u16(src)?,
            text: decode_short_string(src)?,
            class_id: read_u16(src)?,
            method_id: read_u16(src)?,
        }),
        CONNECTION_CLOSE_OK => MethodFrameArgs::ConnectionCloseOk,
        CHANNEL_OPEN => {
            decode_short_string(src)?;
            MethodFrameArgs::ChannelOpen
        }
        CHANNEL_OPEN_OK => {
            decode_long_string(src)?;
            MethodFrameArgs::ChannelOpenOk
        }
        CHANNEL_CLOSE => MethodFrameArgs::ChannelClose(ChannelCloseArgs {
            code: read_u16(src)?,
            text: decode_short_string(src)?,
            class_id: read_u16(src)?,
            method_id: read_u16(src)?,
        }),
        CHANNEL_CLOSE_OK => MethodFrameArgs::ChannelCloseOk,
        EXCHANGE_DECLARE => decode_exchange_declare(src)?,
        EXCHANGE_DECLARE_OK => MethodFrameArgs::ExchangeDeclareOk,
        EXCHANGE_DELETE => decode_exchange_delete(src)?,
        EXCHANGE_DELETE_OK => MethodFrameArgs::ExchangeDeleteOk,
        QUEUE_DECLARE => decode_queue_declare(src)?,
        QUEUE_DECLARE_OK => MethodFrameArgs::QueueDeclareOk(QueueDeclareOkArgs {
            name: decode_short_string(src)?,
            message_count: read_u32(src)?,
            consumer_count: read_u32(src)?,
        }),
        QUEUE_BIND => decode_queue_bind(src)?,
        QUEUE_BIND_OK => MethodFrameArgs::QueueBindOk,
        QUEUE_PURGE => decode_queue_purge(src)?,
        QUEUE_PURGE_OK => MethodFrameArgs::QueuePurgeOk(QueuePurgeOkArgs {
            message_count: read_u32(src)?,
        }),
        QUEUE_DELETE => decode_queue_delete(src)?,
        QUEUE_DELETE_OK => MethodFrameArgs::QueueDeleteOk(QueueDeleteOkArgs {
            message_count: read_u32(src)?,
        }),
        QUEUE_UNBIND => decode_queue_unbind(src)?,
        QUEUE_UNBIND_OK => MethodFrameArgs::QueueUnbindOk,
        BASIC_QOS => MethodFrameArgs::BasicQos(BasicQosArgs {
            prefetch_size: read_u32(src)?,
            prefetch_count: read_u16(src)?,
            global: read_bool(src)?,
        }),
        BASIC_QOS_OK => MethodFrameArgs::BasicQosOk,
        BASIC_CONSUME => decode_basic_consume(src)?,
        BASIC_CONSUME_OK => MethodFrameArgs::BasicConsumeOk(BasicConsumeOkArgs {
            consumer_tag: decode_short_string(src)?,
        }),
        BASIC_CANCEL => MethodFrameArgs::BasicCancel(BasicCancelArgs {
            consumer_tag: decode_short_string(src)?,
            no_wait: read_bool(src)?,
        }),
        BASIC_CANCEL_OK => MethodFrameArgs::BasicCancelOk(BasicCancelOkArgs {
            consumer_tag: decode_short_string(src)?,
        }),
        BASIC_GET => decode_basic_get(src)?,
        BASIC_GET_OK => MethodFrameArgs::BasicGetOk(BasicGetOkArgs {
            delivery_tag: read_u64(src)?,
            redelivered: read_bool(src)?,
            exchange_name: decode_short_string(src)?,
            routing_key: decode_short_string(src)?,
            message_count: read_u32(src)?,
        }),
        BASIC_GET_EMPTY => {
            decode_short_string(src)?;
            MethodFrameArgs::BasicGetEmpty
        }
        BASIC_PUBLISH => decode_basic_publish(src)?,
        BASIC_RETURN => MethodFrameArgs::BasicReturn(BasicReturnArgs {
            reply_code: read_u16(src)?,
            reply_text: decode_short_string(src)?,
            exchange_name: decode_short_string(src)?,
            routing_key: decode_short_string(src)?,
        }),
        BASIC_DELIVER => MethodFrameArgs::BasicDeliver(BasicDeliverArgs {
            consumer_tag: decode_short_string(src)?,
            delivery_tag: read_u64(src)?,
            redelivered: read_bool(src)?,
            exchange_name: decode_short_string(src)?,
            routing_key: decode_short_string(src)?,
        }),
        BASIC_ACK => MethodFrameArgs::BasicAck(BasicAckArgs {
            delivery_tag: read_u64(src)?,
            multiple: read_bool(src)?,
        }),
        BASIC_REJECT => MethodFrameArgs::BasicReject(BasicRejectArgs {
            delivery_tag: read_u64(src)?,
            requeue: read_bool(src)?,
        }),
        BASIC_NACK => MethodFrameArgs::BasicNack(BasicNackArgs {
            delivery_tag: read_u64(src)?,
            flags: BasicNackFlags::from_bits_truncate(read_u8(src)?),
        }),
        CONFIRM_SELECT => MethodFrameArgs::ConfirmSelect(ConfirmSelectArgs {
            no_wait: read_bool(src)?,
        }),
        CONFIRM_SELECT_OK => MethodFrameArgs::ConfirmSelectOk,
        _ => return frame_error!(COMMAND_INVALID, format!("Unknown class method {:08X}", class_method)),
    };

    Ok(AMQPFrame::Method(channel, class_method, method_frame_args))
}

fn decode_connection_start(src: &mut BytesMut) -> Result<MethodFrameArgs> {
    Ok(MethodFrameArgs::ConnectionStart(ConnectionStartArgs {
        version_major: read_u8(src)?,
        version_minor: read_u8(src)?,
        properties: decode_field_table(src)?,
        mechanisms: decode_long_string(src)?,
        locales: decode_long_string(src)?,
    }))
}

fn decode_connection_start_ok(src: &mut BytesMut) -> Result<MethodFrameArgs> {
    Ok(MethodFrameArgs::ConnectionStartOk(ConnectionStartOkArgs {
        properties: decode_field_table(src)?,
        mechanism: decode_short_string(src)?,
        response: decode_long_string(src)?,
        locale: decode_short_string(src)?,
    }))
}

fn decode_connection_open(src: &mut BytesMut) -> Result<MethodFrameArgs> {
    let virtual_host = decode_short_string(src)?;
    let _reserved = decode_short_string(src)?;
    let insist = read_bool(src)?;

    Ok(MethodFrameArgs::ConnectionOpen(ConnectionOpenArgs { virtual_host, insist }))
}

fn decode_exchange_declare(src: &mut BytesMut) -> Result<MethodFrameArgs> {
    let _reserved = read_u16(src)?;

    Ok(MethodFrameArgs::ExchangeDeclare(ExchangeDeclareArgs {
        exchange_name: decode_short_string(src)?,
        exchange_type: decode_short_string(src)?,
        flags: ExchangeDeclareFlags::from_bits_truncate(read_u8(src)?),
        args: decode_field_table(src)?,
    }))
}

fn decode_exchange_delete(src: &mut BytesMut) -> Result<MethodFrameArgs> {
    let _reserved = read_u16(src)?;

    Ok(MethodFrameArgs::ExchangeDelete(ExchangeDeleteArgs {
        exchange_name: decode_short_string(src)?,
        flags: ExchangeDeleteFlags::from_bits_truncate(read_u8(src)?),
    }))
}

fn decode_queue_declare(src: &mut BytesMut) -> Result<MethodFrameArgs> {
    let _reserved = read_u16(src)?;

    Ok(MethodFrameArgs::QueueDeclare(QueueDeclareArgs {
        name: decode_short_string(src)?,
        flags: QueueDeclareFlags::from_bits_truncate(read_u8(src)?),
        args: decode_field_table(src)?,
    }))
}

fn decode_queue_bind(src: &mut BytesMut) -> Result<MethodFrameArgs> {
    let _reserved = read_u16(src)?;

    Ok(MethodFrameArgs::QueueBind(QueueBindArgs {
        queue_name: decode_short_string(src)?,
        exchange_name: decode_short_string(src)?,
        routing_key: decode_short_string(src)?,
        no_wait: read_bool(src)?,
        args: decode_field_table(src)?,
    }))
}

fn decode_queue_purge(src: &mut BytesMut) -> Result<MethodFrameArgs> {
    let _reserved = read_u16(src)?;

    Ok(MethodFrameArgs::QueuePurge(QueuePurgeArgs {
        queue_name: decode_short_string(src)?,
        no_wait: read_bool(src)?,
    }))
}

fn decode_queue_delete(src: &mut BytesMut) -> Result<MethodFrameArgs> {
    let _reserved = read_u16(src)?;

    Ok(MethodFrameArgs::QueueDelete(QueueDeleteArgs {
        queue_name: decode_short_string(src)?,
        flags: QueueDeleteFlags::from_bits_truncate(read_u8(src)?),
    }))
}

fn decode_queue_unbind(src: &mut BytesMut) -> Result<MethodFrameArgs> {
    let _reserved = read_u16(src)?;

    Ok(MethodFrameArgs::QueueUnbind(QueueUnbindArgs {
        queue_name: decode_short_string(src)?,
        exchange_name: decode_short_string(src)?,
        routing_key: decode_short_string(src)?,
        args: decode_field_table(src)?,
    }))
}

fn decode_basic_consume(src: &mut BytesMut) -> Result<MethodFrameArgs> {
    let _reserved = read_u16(src)?;

    Ok(MethodFrameArgs::BasicConsume(BasicConsumeArgs {
        queue: decode_short_string(src)?,
        consumer_tag: decode_short_string(src)?,
        flags: BasicConsumeFlags::from_bits_truncate(read_u8(src)?),
        args: decode_field_table(src)?,
    }))
}

fn decode_basic_get(src: &mut BytesMut) -> Result<MethodFrameArgs> {
    let _reserved = read_u16(src)?;

    Ok(MethodFrameArgs::BasicGet(BasicGetArgs {
        queue: decode_short_string(src)?,
        no_ack: read_bool(src)?,
    }))
}

fn decode_basic_publish(src: &mut BytesMut) -> Result<MethodFrameArgs> {
    let _reserved = read_u16(src)?;

    Ok(MethodFrameArgs::BasicPublish(BasicPublishArgs {
        exchange_name: decode_short_string(src)?,
        routing_key: decode_short_string(src)?,
        flags: BasicPublishFlags::from_bits_truncate(read_u8(src)?),
    }))
}

/// Decode the content header. Properties follow each other in the order of their
/// flag bits, starting from the highest bit.
fn decode_content_header_frame(src: &mut BytesMut, channel: u16) -> Result<AMQPFrame> {
    let mut hf = ContentHeaderFrame {
        channel,
        class_id: read_u16(src)?,
        weight: read_u16(src)?,
        body_size: read_u64(src)?,
        ..Default::default()
    };

    let flags = HeaderPropertyFlags::from_bits_truncate(read_u16(src)?);

    if flags.contains(HeaderPropertyFlags::CONTENT_TYPE) {
        hf.content_type = Some(decode_short_string(src)?);
    }
    if flags.contains(HeaderPropertyFlags::CONTENT_ENCODING) {
        hf.content_encoding = Some(decode_short_string(src)?);
    }
    if flags.contains(HeaderPropertyFlags::HEADERS) {
        hf.headers = Some(decode_field_table(src)?.unwrap_or_default());
    }
    if flags.contains(HeaderPropertyFlags::DELIVERY_MODE) {
        hf.delivery_mode = Some(read_u8(src)?);
    }
    if flags.contains(HeaderPropertyFlags::PRIORITY) {
        hf.priority = Some(read_u8(src)?);
    }
    if flags.contains(HeaderPropertyFlags::CORRELATION_ID) {
        hf.correlation_id = Some(decode_short_string(src)?);
    }
    if flags.contains(HeaderPropertyFlags::REPLY_TO) {
        hf.reply_to = Some(decode_short_string(src)?);
    }
    if flags.contains(HeaderPropertyFlags::EXPIRATION) {
        hf.expiration = Some(decode_short_string(src)?);
    }
    if flags.contains(HeaderPropertyFlags::MESSAGE_ID) {
        hf.message_id = Some(decode_short_string(src)?);
    }
    if flags.contains(HeaderPropertyFlags::TIMESTAMP) {
        hf.timestamp = Some(read_u64(src)?);
    }
    if flags.contains(HeaderPropertyFlags::MESSAGE_TYPE) {
        hf.message_type = Some(decode_short_string(src)?);
    }
    if flags.contains(HeaderPropertyFlags::USER_ID) {
        hf.user_id = Some(decode_short_string(src)?);
    }
    if flags.contains(HeaderPropertyFlags::APP_ID) {
        hf.app_id = Some(decode_short_string(src)?);
    }
    if flags.contains(HeaderPropertyFlags::CLUSTER_ID) {
        hf.cluster_id = Some(decode_short_string(src)?);
    }

    Ok(AMQPFrame::ContentHeader(hf))
}

fn decode_value(buf: &mut BytesMut) -> Result<AMQPFieldValue> {
    let value = match read_u8(buf)? {
        b't' => AMQPFieldValue::Bool(read_u8(buf)? != 0),
        b'b' => AMQPFieldValue::I8(read_u8(buf)? as i8),
        b'B' => AMQPFieldValue::U8(read_u8(buf)?),
        b's' => AMQPFieldValue::I16(read_u16(buf)? as i16),
        b'u' => AMQPFieldValue::U16(read_u16(buf)?),
        b'I' => AMQPFieldValue::I32(read_u32(buf)? as i32),
        b'i' => AMQPFieldValue::U32(read_u32(buf)?),
        b'l' => AMQPFieldValue::I64(read_u64(buf)? as i64),
        b'f' => AMQPFieldValue::F32(f32::from_bits(read_u32(buf)?)),
        b'd' => AMQPFieldValue::F64(f64::from_bits(read_u64(buf)?)),
        b'D' => AMQPFieldValue::Decimal(read_u8(buf)?, read_u32(buf)?),
        b'T' => AMQPFieldValue::Timestamp(read_u64(buf)?),
        b'S' => AMQPFieldValue::LongString(decode_long_string(buf)?),
        b'x' => {
            let len = read_u32(buf)? as usize;
            need(buf, len)?;

            AMQPFieldValue::ByteArray(buf.split_to(len).to_vec())
        }
        b'A' => {
            let len = read_u32(buf)? as usize;
            need(buf, len)?;

            let mut array_buf = buf.split_to(len);
            let mut values = vec![];

            while array_buf.has_remaining() {
                values.push(decode_value(&mut array_buf)?);
            }

            AMQPFieldValue::FieldArray(values)
        }
        b'F' => AMQPFieldValue::FieldTable(Box::new(decode_field_table(buf)?.unwrap_or_default())),
        b'V' => AMQPFieldValue::Void,
        t => return frame_error!(SYNTAX_ERROR, format!("Unknown field value type {:02X}", t)),
    };

    Ok(value)
}

fn decode_short_string(buf: &mut BytesMut) -> Result<String> {
    let len = read_u8(buf)? as usize;
    need(buf, len)?;

    let sb = buf.split_to(len);

    String::from_utf8(sb.to_vec()).or_else(|_| frame_error!(SYNTAX_ERROR, "Short string is not valid UTF-8"))
}

fn decode_long_string(buf: &mut BytesMut) -> Result<String> {
    let len = read_u32(buf)? as usize;
    need(buf, len)?;

    let sb = buf.split_to(len);

    String::from_utf8(sb.to_vec()).or_else(|_| frame_error!(SYNTAX_ERROR, "Long string is not valid UTF-8"))
}

/// Decode a field table
///
/// Reads a length prefixed field table. A zero length table comes back as `None`.
fn decode_field_table(buf: &mut BytesMut) -> Result<Option<FieldTable>> {
    let ft_len = read_u32(buf)? as usize;

    if ft_len == 0 {
        return Ok(None);
    }

    need(buf, ft_len)?;

    let mut ft_buf = buf.split_to(ft_len);
    let mut table = HashMap::new();

    while ft_buf.has_remaining() {
        let field_name = decode_short_string(&mut ft_buf)?;
        let field_value = decode_value(&mut ft_buf)?;

        table.insert(field_name, field_value);
    }

    Ok(Some(table))
}

/// Encode a single frame and append it to the buffer. The buffer is not touched
/// if the frame cannot be encoded.
pub fn encode_amqp_frame(buf: &mut BytesMut, frame: &AMQPFrame) -> Result<()> {
    match frame {
        AMQPFrame::Header => buf.put(&PROTOCOL_HEADER[..]),

        AMQPFrame::Method(ch, cm, args) => {
            let mut fr = BytesMut::with_capacity(256);
            fr.put_u32(*cm);
            encode_method_args(&mut fr, args)?;

            put_frame(buf, FRAME_METHOD_FRAME, *ch, &fr);
        }

        AMQPFrame::ContentHeader(header_frame) => {
            let mut fr = BytesMut::with_capacity(256);
            encode_content_header(&mut fr, header_frame)?;

            put_frame(buf, FRAME_CONTENT_HEADER, header_frame.channel, &fr);
        }

        AMQPFrame::ContentBody(body_frame) => {
            put_frame(buf, FRAME_CONTENT_BODY, body_frame.channel, &body_frame.body);
        }

        AMQPFrame::Heartbeat(channel) => put_frame(buf, FRAME_HEARTBEAT, *channel, &[]),
    }

    Ok(())
}

fn put_frame(buf: &mut BytesMut, frame_type: u8, channel: Channel, payload: &[u8]) {
    buf.reserve(payload.len() + FRAME_OVERHEAD);
    buf.put_u8(frame_type);
    buf.put_u16(channel);
    buf.put_u32(payload.len() as u32);
    buf.put(payload);
    buf.put_u8(FRAME_END);
}

fn encode_method_args(buf: &mut BytesMut, args: &MethodFrameArgs) -> Result<()> {
    match args {
        MethodFrameArgs::ConnectionStart(args) => {
            buf.put_u8(args.version_major);
            buf.put_u8(args.version_minor);
            encode_field_table(buf, args.properties.as_ref())?;
            encode_long_string(buf, &args.mechanisms);
            encode_long_string(buf, &args.locales);
        }
        MethodFrameArgs::ConnectionStartOk(args) => {
            encode_field_table(buf, args.properties.as_ref())?;
            encode_short_string(buf, &args.mechanism)?;
            encode_long_string(buf, &args.response);
            encode_short_string(buf, &args.locale)?;
        }
        MethodFrameArgs::ConnectionTune(args) => {
            buf.put_u16(args.channel_max);
            buf.put_u32(args.frame_max);
            buf.put_u16(args.heartbeat);
        }
        MethodFrameArgs::ConnectionTuneOk(args) => {
            buf.put_u16(args.channel_max);
            buf.put_u32(args.frame_max);
            buf.put_u16(args.heartbeat);
        }
        MethodFrameArgs::ConnectionOpen(args) => {
            encode_short_string(buf, &args.virtual_host)?;
            encode_short_string(buf, "")?;
            buf.put_u8(args.insist as u8);
        }
        // reserved short strings
        MethodFrameArgs::ConnectionOpenOk | MethodFrameArgs::ChannelOpen | MethodFrameArgs::BasicGetEmpty => {
            buf.put_u8(0)
        }
        MethodFrameArgs::ConnectionClose(args) => {
            buf.put_u16(args.code);
            encode_short_string(buf, &args.text)?;
            buf.put_u16(args.class_id);
            buf.put_u16(args.method_id);
        }
        MethodFrameArgs::ChannelOpenOk => buf.put_u32(0),
        MethodFrameArgs::ChannelClose(args) => {
            buf.put_u16(args.code);
            encode_short_string(buf, &args.text)?;
            buf.put_u16(args.class_id);
            buf.put_u16(args.method_id);
        }
        MethodFrameArgs::ExchangeDeclare(args) => {
            buf.put_u16(0);
            encode_short_string(buf, &args.exchange_name)?;
            encode_short_string(buf, &args.exchange_type)?;
            buf.put_u8(args.flags.bits());
            encode_field_table(buf, args.args.as_ref())?;
        }
        MethodFrameArgs::ExchangeDelete(args) => {
            buf.put_u16(0);
            encode_short_string(buf, &args.exchange_name)?;
            buf.put_u8(args.flags.bits());
        }
        MethodFrameArgs::QueueDeclare(args) => {
            buf.put_u16(0);
            encode_short_string(buf, &args.name)?;
            buf.put_u8(args.flags.bits());
            encode_field_table(buf, args.args.as_ref())?;
        }
        MethodFrameArgs::QueueDeclareOk(args) => {
            encode_short_string(buf, &args.name)?;
            buf.put_u32(args.message_count);
            buf.put_u32(args.consumer_count);
        }
        MethodFrameArgs::QueueBind(args) => {
            buf.put_u16(0);
            encode_short_string(buf, &args.queue_name)?;
            encode_short_string(buf, &args.exchange_name)?;
            encode_short_string(buf, &args.routing_key)?;
            buf.put_u8(args.no_wait as u8);
            encode_field_table(buf, args.args.as_ref())?;
        }
        MethodFrameArgs::QueuePurge(args) => {
            buf.put_u16(0);
            encode_short_string(buf, &args.queue_name)?;
            buf.put_u8(args.no_wait as u8);
        }
        MethodFrameArgs::QueuePurgeOk(args) => buf.put_u32(args.message_count),
        MethodFrameArgs::QueueDelete(args) => {
            buf.put_u16(0);
            encode_short_string(buf, &args.queue_name)?;
            buf.put_u8(args.flags.bits());
        }
        MethodFrameArgs::QueueDeleteOk(args) => buf.put_u32(args.message_count),
        MethodFrameArgs::QueueUnbind(args) => {
            buf.put_u16(0);
            encode_short_string(buf, &args.queue_name)?;
            encode_short_string(buf, &args.exchange_name)?;
            encode_short_string(buf, &args.routing_key)?;
            encode_field_table(buf, args.args.as_ref())?;
        }
        MethodFrameArgs::BasicQos(args) => {
            buf.put_u32(args.prefetch_size);
            buf.put_u16(args.prefetch_count);
            buf.put_u8(args.global as u8);
        }
        MethodFrameArgs::BasicConsume(args) => {
            buf.put_u16(0);
            encode_short_string(buf, &args.queue)?;
            encode_short_string(buf, &args.consumer_tag)?;
            buf.put_u8(args.flags.bits());
            encode_field_table(buf, args.args.as_ref())?;
        }
        MethodFrameArgs::BasicConsumeOk(args) => encode_short_string(buf, &args.consumer_tag)?,
        MethodFrameArgs::BasicCancel(args) => {
            encode_short_string(buf, &args.consumer_tag)?;
            buf.put_u8(args.no_wait as u8);
        }
        MethodFrameArgs::BasicCancelOk(args) => encode_short_string(buf, &args.consumer_tag)?,
        MethodFrameArgs::BasicGet(args) => {
            buf.put_u16(0);
            encode_short_string(buf, &args.queue)?;
            buf.put_u8(args.no_ack as u8);
        }
        MethodFrameArgs::BasicGetOk(args) => {
            buf.put_u64(args.delivery_tag);
            buf.put_u8(args.redelivered as u8);
            encode_short_string(buf, &args.exchange_name)?;
            encode_short_string(buf, &args.routing_key)?;
            buf.put_u32(args.message_count);
        }
        MethodFrameArgs::BasicPublish(args) => {
            buf.put_u16(0);
            encode_short_string(buf, &args.exchange_name)?;
            encode_short_string(buf, &args.routing_key)?;
            buf.put_u8(args.flags.bits());
        }
        MethodFrameArgs::BasicReturn(args) => {
            buf.put_u16(args.reply_code);
            encode_short_string(buf, &args.reply_text)?;
            encode_short_string(buf, &args.exchange_name)?;
            encode_short_string(buf, &args.routing_key)?;
        }
        MethodFrameArgs::BasicDeliver(args) => {
            encode_short_string(buf, &args.consumer_tag)?;
            buf.put_u64(args.delivery_tag);
            buf.put_u8(args.redelivered as u8);
            encode_short_string(buf, &args.exchange_name)?;
            encode_short_string(buf, &args.routing_key)?;
        }
        MethodFrameArgs::BasicAck(args) => {
            buf.put_u64(args.delivery_tag);
            buf.put_u8(args.multiple as u8);
        }
        MethodFrameArgs::BasicReject(args) => {
            buf.put_u64(args.delivery_tag);
            buf.put_u8(args.requeue as u8);
        }
        MethodFrameArgs::BasicNack(args) => {
            buf.put_u64(args.delivery_tag);
            buf.put_u8(args.flags.bits());
        }
        MethodFrameArgs::ConfirmSelect(args) => buf.put_u8(args.no_wait as u8),
        MethodFrameArgs::ConnectionCloseOk
        | MethodFrameArgs::ChannelCloseOk
        | MethodFrameArgs::ExchangeDeclareOk
        | MethodFrameArgs::ExchangeDeleteOk
        | MethodFrameArgs::QueueBindOk
        | MethodFrameArgs::QueueUnbindOk
        | MethodFrameArgs::BasicQosOk
        | MethodFrameArgs::ConfirmSelectOk => (),
    }

    Ok(())
}

fn encode_content_header(buf: &mut BytesMut, hf: &ContentHeaderFrame) -> Result<()> {
    buf.put_u16(hf.class_id);
    buf.put_u16(hf.weight);
    buf.put_u64(hf.body_size);
    buf.put_u16(hf.prop_flags().bits());

    if let Some(s) = &hf.content_type {
        encode_short_string(buf, s)?;
    }
    if let Some(s) = &hf.content_encoding {
        encode_short_string(buf, s)?;
    }
    if let Some(headers) = &hf.headers {
        encode_field_table(buf, Some(headers))?;
    }
    if let Some(v) = hf.delivery_mode {
        buf.put_u8(v);
    }
    if let Some(v) = hf.priority {
        buf.put_u8(v);
    }
    for s in [&hf.correlation_id, &hf.reply_to, &hf.expiration, &hf.message_id]
        .into_iter()
        .flatten()
    {
        encode_short_string(buf, s)?;
    }
    if let Some(v) = hf.timestamp {
        buf.put_u64(v);
    }
    for s in [&hf.message_type, &hf.user_id, &hf.app_id, &hf.cluster_id]
        .into_iter()
        .flatten()
    {
        encode_short_string(buf, s)?;
    }

    Ok(())
}

fn encode_short_string(buf: &mut BytesMut, s: &str) -> Result<()> {
    if s.len() > u8::MAX as usize {
        return frame_error!(
            SYNTAX_ERROR,
            format!("Short string is longer than 255 bytes ({})", s.len())
        );
    }

    buf.put_u8(s.len() as u8);
    buf.put(s.as_bytes());

    Ok(())
}

fn encode_long_string(buf: &mut BytesMut, s: &str) {
    buf.put_u32(s.len() as u32);
    buf.put(s.as_bytes());
}

fn encode_field_table(buf: &mut BytesMut, ft: Option<&FieldTable>) -> Result<()> {
    match ft {
        None => buf.put_u32(0),
        Some(t) => {
            let mut ft_buf = BytesMut::with_capacity(256);

            for (name, value) in t {
                encode_short_string(&mut ft_buf, name)?;
                encode_value(&mut ft_buf, value)?;
            }

            buf.put_u32(ft_buf.len() as u32);
            buf.put(ft_buf);
        }
    }

    Ok(())
}

fn encode_value(buf: &mut BytesMut, value: &AMQPFieldValue) -> Result<()> {
    match value {
        AMQPFieldValue::Bool(v) => {
            buf.put_u8(b't');
            buf.put_u8(*v as u8);
        }
        AMQPFieldValue::I8(v) => {
            buf.put_u8(b'b');
            buf.put_i8(*v);
        }
        AMQPFieldValue::U8(v) => {
            buf.put_u8(b'B');
            buf.put_u8(*v);
        }
        AMQPFieldValue::I16(v) => {
            buf.put_u8(b's');
            buf.put_i16(*v);
        }
        AMQPFieldValue::U16(v) => {
            buf.put_u8(b'u');
            buf.put_u16(*v);
        }
        AMQPFieldValue::I32(v) => {
            buf.put_u8(b'I');
            buf.put_i32(*v);
        }
        AMQPFieldValue::U32(v) => {
            buf.put_u8(b'i');
            buf.put_u32(*v);
        }
        AMQPFieldValue::I64(v) => {
            buf.put_u8(b'l');
            buf.put_i64(*v);
        }
        AMQPFieldValue::F32(v) => {
            buf.put_u8(b'f');
            buf.put_f32(*v);
        }
        AMQPFieldValue::F64(v) => {
            buf.put_u8(b'd');
            buf.put_f64(*v);
        }
        AMQPFieldValue::Decimal(scale, v) => {
            buf.put_u8(b'D');
            buf.put_u8(*scale);
            buf.put_u32(*v);
        }
        AMQPFieldValue::Timestamp(v) => {
            buf.put_u8(b'T');
            buf.put_u64(*v);
        }
        AMQPFieldValue::LongString(v) => {
            buf.put_u8(b'S');
            encode_long_string(buf, v);
        }
        AMQPFieldValue::ByteArray(v) => {
            buf.put_u8(b'x');
            buf.put_u32(v.len() as u32);
            buf.put(v.as_slice());
        }
        AMQPFieldValue::FieldArray(values) => {
            let mut array_buf = BytesMut::with_capacity(64);

            for v in values {
                encode_value(&mut array_buf, v)?;
            }

            buf.put_u8(b'A');
            buf.put_u32(array_buf.len() as u32);
            buf.put(array_buf);
        }
        AMQPFieldValue::FieldTable(v) => {
            buf.put_u8(b'F');
            encode_field_table(buf, Some(v))?;
        }
        AMQPFieldValue::Void => buf.put_u8(b'V'),
    }

    Ok(())
}
