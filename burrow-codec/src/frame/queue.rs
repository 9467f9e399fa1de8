use super::FieldTable;

bitflags! {
    #[derive(Copy, Clone, Debug, Default, PartialEq)]
    pub struct QueueDeclareFlags: u8 {
        const PASSIVE = 1 << 0;
        const DURABLE = 1 << 1;
        const EXCLUSIVE = 1 << 2;
        const AUTO_DELETE = 1 << 3;
        const NO_WAIT = 1 << 4;
    }
}

bitflags! {
    #[derive(Copy, Clone, Debug, Default, PartialEq)]
    pub struct QueueDeleteFlags: u8 {
        const IF_UNUSED = 1 << 0;
        const IF_EMPTY = 1 << 1;
        const NO_WAIT = 1 << 2;
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueueDeclareArgs {
    pub name: String,
    pub flags: QueueDeclareFlags,
    pub args: Option<FieldTable>,
}

impl QueueDeclareArgs {
    /// An empty name asks the broker to generate one.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn flags(mut self, flags: QueueDeclareFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn durable(mut self, durable: bool) -> Self {
        self.flags.set(QueueDeclareFlags::DURABLE, durable);
        self
    }

    pub fn args(mut self, args: Option<FieldTable>) -> Self {
        self.args = args;
        self
    }
}

/// The broker's answer to a queue declare, with the name it actually used.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueueDeclareOkArgs {
    pub name: String,
    pub message_count: u32,
    pub consumer_count: u32,
}

impl QueueDeclareOkArgs {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueueBindArgs {
    pub queue_name: String,
    pub exchange_name: String,
    pub routing_key: String,
    pub no_wait: bool,
    pub args: Option<FieldTable>,
}

impl QueueBindArgs {
    pub fn new(queue_name: impl Into<String>, exchange_name: impl Into<String>) -> Self {
        Self {
            queue_name: queue_name.into(),
            exchange_name: exchange_name.into(),
            ..Default::default()
        }
    }

    pub fn routing_key(mut self, routing_key: impl Into<String>) -> Self {
        self.routing_key = routing_key.into();
        self
    }

    pub fn no_wait(mut self, no_wait: bool) -> Self {
        self.no_wait = no_wait;
        self
    }

    pub fn args(mut self, args: Option<FieldTable>) -> Self {
        self.args = args;
        self
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueueUnbindArgs {
    pub queue_name: String,
    pub exchange_name: String,
    pub routing_key: String,
    pub args: Option<FieldTable>,
}

impl QueueUnbindArgs {
    pub fn new(queue_name: impl Into<String>, exchange_name: impl Into<String>) -> Self {
        Self {
            queue_name: queue_name.into(),
            exchange_name: exchange_name.into(),
            ..Default::default()
        }
    }

    pub fn routing_key(mut self, routing_key: impl Into<String>) -> Self {
        self.routing_key = routing_key.into();
        self
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueuePurgeArgs {
    pub queue_name: String,
    pub no_wait: bool,
}

impl QueuePurgeArgs {
    pub fn queue_name(mut self, queue_name: impl Into<String>) -> Self {
        self.queue_name = queue_name.into();
        self
    }
}

/// Number of purged messages.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueuePurgeOkArgs {
    pub message_count: u32,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueueDeleteArgs {
    pub queue_name: String,
    pub flags: QueueDeleteFlags,
}

impl QueueDeleteArgs {
    pub fn queue_name(mut self, queue_name: impl Into<String>) -> Self {
        self.queue_name = queue_name.into();
        self
    }

    pub fn if_unused(mut self, if_unused: bool) -> Self {
        self.flags.set(QueueDeleteFlags::IF_UNUSED, if_unused);
        self
    }

    pub fn if_empty(mut self, if_empty: bool) -> Self {
        self.flags.set(QueueDeleteFlags::IF_EMPTY, if_empty);
        self
    }
}

/// Number of messages deleted with the queue.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueueDeleteOkArgs {
    pub message_count: u32,
}

method_frame! {
    QueueDeclareArgs => QueueDeclare @ QUEUE_DECLARE,
    QueueDeclareOkArgs => QueueDeclareOk @ QUEUE_DECLARE_OK,
    QueueBindArgs => QueueBind @ QUEUE_BIND,
    QueueUnbindArgs => QueueUnbind @ QUEUE_UNBIND,
    QueuePurgeArgs => QueuePurge @ QUEUE_PURGE,
    QueuePurgeOkArgs => QueuePurgeOk @ QUEUE_PURGE_OK,
    QueueDeleteArgs => QueueDelete @ QUEUE_DELETE,
    QueueDeleteOkArgs => QueueDeleteOk @ QUEUE_DELETE_OK,
}

bare_method! {
    queue_bind_ok => QueueBindOk @ QUEUE_BIND_OK,
    queue_unbind_ok => QueueUnbindOk @ QUEUE_UNBIND_OK,
}
