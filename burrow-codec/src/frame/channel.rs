use super::{split_class_method, AMQPFrame, Channel, ClassMethod};

/// Close of a channel. A non-zero class method names the method which caused the close.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChannelCloseArgs {
    pub code: u16,
    pub text: String,
    pub class_id: u16,
    pub method_id: u16,
}

impl ChannelCloseArgs {
    pub fn new(code: u16, text: impl Into<String>, class_method: ClassMethod) -> Self {
        let (class_id, method_id) = split_class_method(class_method);

        Self {
            code,
            text: text.into(),
            class_id,
            method_id,
        }
    }
}

method_frame!(ChannelCloseArgs => ChannelClose @ CHANNEL_CLOSE);

bare_method! {
    channel_open => ChannelOpen @ CHANNEL_OPEN,
    channel_open_ok => ChannelOpenOk @ CHANNEL_OPEN_OK,
    channel_close_ok => ChannelCloseOk @ CHANNEL_CLOSE_OK,
}

pub fn channel_close(channel: Channel, code: u16, text: &str, class_method: ClassMethod) -> AMQPFrame {
    ChannelCloseArgs::new(code, text, class_method).frame(channel)
}
