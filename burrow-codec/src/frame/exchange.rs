use super::FieldTable;

bitflags! {
    #[derive(Copy, Clone, Debug, Default, PartialEq)]
    pub struct ExchangeDeclareFlags: u8 {
        const PASSIVE = 1 << 0;
        const DURABLE = 1 << 1;
        const AUTO_DELETE = 1 << 2;
        const INTERNAL = 1 << 3;
        const NO_WAIT = 1 << 4;
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExchangeDeclareArgs {
    pub exchange_name: String,
    pub exchange_type: String,
    pub flags: ExchangeDeclareFlags,
    pub args: Option<FieldTable>,
}

impl ExchangeDeclareArgs {
    pub fn exchange_name(mut self, exchange_name: impl Into<String>) -> Self {
        self.exchange_name = exchange_name.into();
        self
    }

    /// Type name on the wire like `direct` or `topic`.
    pub fn exchange_type(mut self, exchange_type: impl Into<String>) -> Self {
        self.exchange_type = exchange_type.into();
        self
    }

    pub fn flags(mut self, flags: ExchangeDeclareFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn durable(mut self, durable: bool) -> Self {
        self.flags.set(ExchangeDeclareFlags::DURABLE, durable);
        self
    }

    pub fn args(mut self, args: Option<FieldTable>) -> Self {
        self.args = args;
        self
    }
}

bitflags! {
    #[derive(Copy, Clone, Debug, Default, PartialEq)]
    pub struct ExchangeDeleteFlags: u8 {
        const IF_UNUSED = 1 << 0;
        const NO_WAIT = 1 << 1;
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExchangeDeleteArgs {
    pub exchange_name: String,
    pub flags: ExchangeDeleteFlags,
}

impl ExchangeDeleteArgs {
    pub fn exchange_name(mut self, exchange_name: impl Into<String>) -> Self {
        self.exchange_name = exchange_name.into();
        self
    }

    /// Delete only if the exchange has no bindings.
    pub fn if_unused(mut self, if_unused: bool) -> Self {
        self.flags.set(ExchangeDeleteFlags::IF_UNUSED, if_unused);
        self
    }
}

method_frame! {
    ExchangeDeclareArgs => ExchangeDeclare @ EXCHANGE_DECLARE,
    ExchangeDeleteArgs => ExchangeDelete @ EXCHANGE_DELETE,
}

bare_method! {
    exchange_declare_ok => ExchangeDeclareOk @ EXCHANGE_DECLARE_OK,
    exchange_delete_ok => ExchangeDeleteOk @ EXCHANGE_DELETE_OK,
}
