use burrow_codec::frame;
use std::fmt;

pub type ChannelNumber = frame::Channel;
/// Class id and method id packed in one number, see `frame::unify_class_method`.
pub type ClassMethod = frame::ClassMethod;

/// Lifecycle of a connection. Only a `NotConnected` client can connect and only a
/// `Connected` client can start disconnecting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    NotConnected,
    Connecting,
    Connected,
    Disconnecting,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::NotConnected => "not connected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnecting => "disconnecting",
        };

        f.write_str(name)
    }
}

/// Reply codes of `connection.close`.
#[derive(Debug)]
pub enum ConnectionError {
    ConnectionForced = 320,
    /// Unknown virtual host.
    InvalidPath = 402,
    AccessRefused = 403,
    FrameError = 501,
    SyntaxError = 502,
    /// Method out of sequence.
    CommandInvalid = 503,
    /// Frame on a channel which isn't open.
    ChannelError = 504,
    UnexpectedFrame = 505,
    /// Over the negotiated channel max or frame max.
    ResourceError = 506,
    NotImplemented = 540,
    InternalError = 541,
}

/// Reply codes of `channel.close`.
#[derive(Debug)]
pub enum ChannelError {
    /// Orderly close.
    Success = 200,
    NoRoute = 312,
    NoConsumers = 313,
    NotFound = 404,
    PreconditionFailed = 406,
}

/// Reply codes which close a connection or a channel in an orderly way. Zero is
/// accepted as a synonym of 200.
pub fn is_normal_close(reply_code: u16) -> bool {
    reply_code == 0 || reply_code == ChannelError::Success as u16
}

/// Exchange types supported by the brokers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ExchangeType {
    #[default]
    Direct,
    Fanout,
    Topic,
    Headers,
}

impl ExchangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExchangeType::Direct => "direct",
            ExchangeType::Fanout => "fanout",
            ExchangeType::Topic => "topic",
            ExchangeType::Headers => "headers",
        }
    }
}

impl fmt::Display for ExchangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ExchangeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "direct" => Ok(ExchangeType::Direct),
            "fanout" => Ok(ExchangeType::Fanout),
            "topic" => Ok(ExchangeType::Topic),
            "headers" | "header" => Ok(ExchangeType::Headers),
            other => Err(format!("Unknown exchange type {other}")),
        }
    }
}
