use super::FieldTable;

bitflags! {
    #[derive(Copy, Clone, Debug, Default, PartialEq)]
    pub struct BasicConsumeFlags: u8 {
        const NO_LOCAL = 1 << 0;
        const NO_ACK = 1 << 1;
        const EXCLUSIVE = 1 << 2;
        const NO_WAIT = 1 << 3;
    }
}

bitflags! {
    #[derive(Copy, Clone, Debug, Default, PartialEq)]
    pub struct BasicPublishFlags: u8 {
        const MANDATORY = 1 << 0;
        const IMMEDIATE = 1 << 1;
    }
}

bitflags! {
    #[derive(Copy, Clone, Debug, Default, PartialEq)]
    pub struct BasicNackFlags: u8 {
        const MULTIPLE = 1 << 0;
        const REQUEUE = 1 << 1;
    }
}

/// Prefetch limits of a channel, or of the connection if `global` is set.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BasicQosArgs {
    pub prefetch_size: u32,
    pub prefetch_count: u16,
    pub global: bool,
}

impl BasicQosArgs {
    pub fn new(prefetch_size: u32, prefetch_count: u16, global: bool) -> Self {
        Self {
            prefetch_size,
            prefetch_count,
            global,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct BasicConsumeArgs {
    pub queue: String,
    pub consumer_tag: String,
    pub flags: BasicConsumeFlags,
    pub args: Option<FieldTable>,
}

impl BasicConsumeArgs {
    pub fn queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = queue.into();
        self
    }

    pub fn consumer_tag(mut self, consumer_tag: impl Into<String>) -> Self {
        self.consumer_tag = consumer_tag.into();
        self
    }

    pub fn flags(mut self, flags: BasicConsumeFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn args(mut self, args: Option<FieldTable>) -> Self {
        self.args = args;
        self
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct BasicConsumeOkArgs {
    pub consumer_tag: String,
}

impl BasicConsumeOkArgs {
    pub fn new(consumer_tag: impl Into<String>) -> Self {
        Self {
            consumer_tag: consumer_tag.into(),
        }
    }
}

/// Cancel of a consumer. The broker sends it too when the queue of the consumer is gone.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BasicCancelArgs {
    pub consumer_tag: String,
    pub no_wait: bool,
}

impl BasicCancelArgs {
    pub fn new(consumer_tag: impl Into<String>) -> Self {
        Self {
            consumer_tag: consumer_tag.into(),
            ..Default::default()
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct BasicCancelOkArgs {
    pub consumer_tag: String,
}

impl BasicCancelOkArgs {
    pub fn new(consumer_tag: impl Into<String>) -> Self {
        Self {
            consumer_tag: consumer_tag.into(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct BasicGetArgs {
    pub queue: String,
    pub no_ack: bool,
}

impl BasicGetArgs {
    pub fn new(queue: impl Into<String>) -> Self {
        Self {
            queue: queue.into(),
            ..Default::default()
        }
    }

    pub fn no_ack(mut self, no_ack: bool) -> Self {
        self.no_ack = no_ack;
        self
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct BasicGetOkArgs {
    pub delivery_tag: u64,
    pub redelivered: bool,
    pub exchange_name: String,
    pub routing_key: String,
    /// Messages left in the queue.
    pub message_count: u32,
}

impl BasicGetOkArgs {
    pub fn new(delivery_tag: u64, exchange_name: impl Into<String>) -> Self {
        Self {
            delivery_tag,
            exchange_name: exchange_name.into(),
            ..Default::default()
        }
    }

    pub fn routing_key(mut self, routing_key: impl Into<String>) -> Self {
        self.routing_key = routing_key.into();
        self
    }

    pub fn message_count(mut self, message_count: u32) -> Self {
        self.message_count = message_count;
        self
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct BasicPublishArgs {
    pub exchange_name: String,
    pub routing_key: String,
    pub flags: BasicPublishFlags,
}

impl BasicPublishArgs {
    pub fn new(exchange_name: impl Into<String>) -> Self {
        Self {
            exchange_name: exchange_name.into(),
            ..Default::default()
        }
    }

    pub fn routing_key(mut self, routing_key: impl Into<String>) -> Self {
        self.routing_key = routing_key.into();
        self
    }

    /// Ask the broker to return the message if it cannot be routed to a queue.
    pub fn mandatory(mut self, mandatory: bool) -> Self {
        self.flags.set(BasicPublishFlags::MANDATORY, mandatory);
        self
    }

    pub fn immediate(mut self, immediate: bool) -> Self {
        self.flags.set(BasicPublishFlags::IMMEDIATE, immediate);
        self
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct BasicReturnArgs {
    pub reply_code: u16,
    pub reply_text: String,
    pub exchange_name: String,
    pub routing_key: String,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct BasicDeliverArgs {
    pub consumer_tag: String,
    pub delivery_tag: u64,
    pub redelivered: bool,
    pub exchange_name: String,
    pub routing_key: String,
}

impl BasicDeliverArgs {
    pub fn new(consumer_tag: impl Into<String>, delivery_tag: u64, exchange_name: impl Into<String>) -> Self {
        Self {
            consumer_tag: consumer_tag.into(),
            delivery_tag,
            exchange_name: exchange_name.into(),
            ..Default::default()
        }
    }

    pub fn routing_key(mut self, routing_key: impl Into<String>) -> Self {
        self.routing_key = routing_key.into();
        self
    }

    pub fn redelivered(mut self, redelivered: bool) -> Self {
        self.redelivered = redelivered;
        self
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct BasicAckArgs {
    pub delivery_tag: u64,
    pub multiple: bool,
}

impl BasicAckArgs {
    pub fn delivery_tag(mut self, delivery_tag: u64) -> Self {
        self.delivery_tag = delivery_tag;
        self
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct BasicRejectArgs {
    pub delivery_tag: u64,
    pub requeue: bool,
}

impl BasicRejectArgs {
    pub fn delivery_tag(mut self, delivery_tag: u64) -> Self {
        self.delivery_tag = delivery_tag;
        self
    }

    pub fn requeue(mut self, requeue: bool) -> Self {
        self.requeue = requeue;
        self
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct BasicNackArgs {
    pub delivery_tag: u64,
    pub flags: BasicNackFlags,
}

impl BasicNackArgs {
    pub fn delivery_tag(mut self, delivery_tag: u64) -> Self {
        self.delivery_tag = delivery_tag;
        self
    }

    pub fn requeue(mut self, requeue: bool) -> Self {
        self.flags.set(BasicNackFlags::REQUEUE, requeue);
        self
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConfirmSelectArgs {
    pub no_wait: bool,
}

method_frame! {
    BasicQosArgs => BasicQos @ BASIC_QOS,
    BasicConsumeArgs => BasicConsume @ BASIC_CONSUME,
    BasicConsumeOkArgs => BasicConsumeOk @ BASIC_CONSUME_OK,
    BasicCancelArgs => BasicCancel @ BASIC_CANCEL,
    BasicCancelOkArgs => BasicCancelOk @ BASIC_CANCEL_OK,
    BasicGetArgs => BasicGet @ BASIC_GET,
    BasicGetOkArgs => BasicGetOk @ BASIC_GET_OK,
    BasicPublishArgs => BasicPublish @ BASIC_PUBLISH,
    BasicReturnArgs => BasicReturn @ BASIC_RETURN,
    BasicDeliverArgs => BasicDeliver @ BASIC_DELIVER,
    BasicAckArgs => BasicAck @ BASIC_ACK,
    BasicRejectArgs => BasicReject @ BASIC_REJECT,
    BasicNackArgs => BasicNack @ BASIC_NACK,
    ConfirmSelectArgs => ConfirmSelect @ CONFIRM_SELECT,
}

bare_method! {
    basic_qos_ok => BasicQosOk @ BASIC_QOS_OK,
    basic_get_empty => BasicGetEmpty @ BASIC_GET_EMPTY,
    confirm_select_ok => ConfirmSelectOk @ CONFIRM_SELECT_OK,
}

pub fn confirm_select(channel: super::Channel) -> super::AMQPFrame {
    ConfirmSelectArgs::default().frame(channel)
}
