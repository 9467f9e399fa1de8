use super::{split_class_method, AMQPFieldValue, AMQPFrame, ClassMethod, FieldTable, MethodFrameArgs};

/// Connection methods always travel on channel 0.
fn connection_frame(class_method: ClassMethod, args: MethodFrameArgs) -> AMQPFrame {
    AMQPFrame::Method(0, class_method, args)
}

fn capabilities() -> FieldTable {
    ["authentication_failure_close", "basic.nack", "consumer_cancel_notify"]
        .into_iter()
        .map(|cap| (cap.to_string(), AMQPFieldValue::Bool(true)))
        .collect()
}

fn long_string(value: &str) -> AMQPFieldValue {
    AMQPFieldValue::LongString(value.to_string())
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConnectionStartArgs {
    pub version_major: u8,
    pub version_minor: u8,
    pub properties: Option<FieldTable>,
    /// Space separated list of the offered SASL mechanisms.
    pub mechanisms: String,
    pub locales: String,
}

impl ConnectionStartArgs {
    /// Start arguments as a broker sends them, offering PLAIN authentication.
    pub fn new() -> Self {
        let server_properties = FieldTable::from([
            ("product".to_string(), long_string("AMQP broker")),
            (
                "capabilities".to_string(),
                AMQPFieldValue::FieldTable(Box::new(capabilities())),
            ),
        ]);

        Self {
            version_major: 0,
            version_minor: 9,
            properties: Some(server_properties),
            mechanisms: "AMQPLAIN PLAIN".into(),
            locales: "en_US".into(),
        }
    }

    pub fn mechanisms(mut self, mechanisms: impl Into<String>) -> Self {
        self.mechanisms = mechanisms.into();
        self
    }

    pub fn frame(self) -> AMQPFrame {
        connection_frame(super::CONNECTION_START, MethodFrameArgs::ConnectionStart(self))
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConnectionStartOkArgs {
    pub properties: Option<FieldTable>,
    pub mechanism: String,
    pub response: String,
    pub locale: String,
}

impl ConnectionStartOkArgs {
    /// PLAIN authentication response with the client properties.
    pub fn new(username: &str, password: &str) -> Self {
        let client_properties = FieldTable::from([
            ("product".to_string(), long_string("burrow")),
            ("platform".to_string(), long_string("Rust")),
            ("version".to_string(), long_string(env!("CARGO_PKG_VERSION"))),
            (
                "capabilities".to_string(),
                AMQPFieldValue::FieldTable(Box::new(capabilities())),
            ),
        ]);

        Self {
            properties: Some(client_properties),
            mechanism: "PLAIN".into(),
            response: format!("\u{0}{username}\u{0}{password}"),
            locale: "en_US".into(),
        }
    }

    pub fn frame(self) -> AMQPFrame {
        connection_frame(super::CONNECTION_START_OK, MethodFrameArgs::ConnectionStartOk(self))
    }
}

/// Limits proposed by the broker. Zero means no limit.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConnectionTuneArgs {
    pub channel_max: u16,
    pub frame_max: u32,
    pub heartbeat: u16,
}

impl ConnectionTuneArgs {
    pub fn frame(self) -> AMQPFrame {
        connection_frame(super::CONNECTION_TUNE, MethodFrameArgs::ConnectionTune(self))
    }
}

/// Limits the client settled on.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConnectionTuneOkArgs {
    pub channel_max: u16,
    pub frame_max: u32,
    pub heartbeat: u16,
}

impl ConnectionTuneOkArgs {
    pub fn frame(self) -> AMQPFrame {
        connection_frame(super::CONNECTION_TUNE_OK, MethodFrameArgs::ConnectionTuneOk(self))
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConnectionOpenArgs {
    pub virtual_host: String,
    pub insist: bool,
}

impl ConnectionOpenArgs {
    pub fn virtual_host(mut self, virtual_host: impl Into<String>) -> Self {
        self.virtual_host = virtual_host.into();
        self
    }

    pub fn frame(self) -> AMQPFrame {
        connection_frame(super::CONNECTION_OPEN, MethodFrameArgs::ConnectionOpen(self))
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConnectionCloseArgs {
    pub code: u16,
    pub text: String,
    pub class_id: u16,
    pub method_id: u16,
}

impl ConnectionCloseArgs {
    pub fn frame(self) -> AMQPFrame {
        connection_frame(super::CONNECTION_CLOSE, MethodFrameArgs::ConnectionClose(self))
    }
}

pub fn connection_open_ok() -> AMQPFrame {
    connection_frame(super::CONNECTION_OPEN_OK, MethodFrameArgs::ConnectionOpenOk)
}

pub fn connection_close(code: u16, text: &str, class_method: ClassMethod) -> AMQPFrame {
    let (class_id, method_id) = split_class_method(class_method);

    ConnectionCloseArgs {
        code,
        text: text.to_string(),
        class_id,
        method_id,
    }
    .frame()
}

pub fn connection_close_ok() -> AMQPFrame {
    connection_frame(super::CONNECTION_CLOSE_OK, MethodFrameArgs::ConnectionCloseOk)
}
