use crate::model::{self, ChannelNumber, ClassMethod};
use burrow_codec::frame::{self, ChannelCloseArgs, ConnectionCloseArgs};
use burrow_codec::FrameError;
use log::error;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

/// The layer an error comes from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// The API was called in a state which doesn't allow the call. No I/O happened.
    Usage,
    /// Socket level failure, connection refused or closed by the peer.
    Transport,
    /// The peer violated the protocol or sent undecodable data.
    Protocol,
    /// The broker closed the connection or a channel.
    Broker,
    /// Sending a heartbeat failed.
    Heartbeat,
}

/// Error of a client operation. A `None` channel means the whole connection is affected.
#[derive(Clone, Debug)]
pub struct ClientError {
    pub kind: ErrorKind,
    pub channel: Option<ChannelNumber>,
    pub code: u16,
    pub message: String,
    pub class_method: ClassMethod,
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientError")
            .field("kind", &self.kind)
            .field("channel", &self.channel)
            .field("code", &self.code)
            .field("message", &self.message)
            .field("class_method", &format!("{:08X}", &self.class_method))
            .finish()
    }
}

impl std::error::Error for ClientError {}

impl ClientError {
    pub fn new(kind: ErrorKind, code: u16, message: impl Into<String>) -> Self {
        Self {
            kind,
            channel: None,
            code,
            message: message.into(),
            class_method: 0,
        }
    }

    pub fn usage(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Usage, 0, message)
    }

    pub fn protocol(code: u16, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Protocol, code, message)
    }

    /// Wrap an I/O failure, keeping the OS error code if there is any.
    pub fn transport(err: &std::io::Error) -> Self {
        let code = err.raw_os_error().map(|c| c as u16).unwrap_or_default();

        Self::new(ErrorKind::Transport, code, err.to_string())
    }

    pub fn closed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transport, 0, message)
    }

    pub fn on_channel(mut self, channel: ChannelNumber) -> Self {
        self.channel = Some(channel);
        self
    }

    pub fn with_kind(mut self, kind: ErrorKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn is_usage(&self) -> bool {
        self.kind == ErrorKind::Usage
    }

    pub(crate) fn from_connection_close(args: &ConnectionCloseArgs) -> Self {
        Self {
            kind: ErrorKind::Broker,
            channel: None,
            code: args.code,
            message: args.text.clone(),
            class_method: frame::unify_class_method(args.class_id, args.method_id),
        }
    }

    pub(crate) fn from_channel_close(channel: ChannelNumber, args: &ChannelCloseArgs) -> Self {
        Self {
            kind: ErrorKind::Broker,
            channel: Some(channel),
            code: args.code,
            message: args.text.clone(),
            class_method: frame::unify_class_method(args.class_id, args.method_id),
        }
    }
}

impl From<FrameError> for ClientError {
    fn from(err: FrameError) -> Self {
        match err.code {
            0 => ClientError::new(ErrorKind::Transport, 0, err.message),
            code => ClientError::protocol(code, err.message),
        }
    }
}

/// Get the `ClientError` out of an `anyhow::Error`. Foreign errors are treated as transport
/// errors.
pub fn to_client_error(err: &anyhow::Error) -> ClientError {
    match err.downcast_ref::<ClientError>() {
        Some(ce) => ce.clone(),
        None => match err.downcast_ref::<std::io::Error>() {
            Some(ioe) => ClientError::transport(ioe),
            None => ClientError::closed(err.to_string()),
        },
    }
}

/// Returns early with a `ClientError` wrapped in `anyhow::Error`.
#[macro_export]
macro_rules! client_error {
    ($kind:expr, $channel:expr, $code:expr, $message:expr, $cm:expr) => {
        ::std::result::Result::Err(::anyhow::Error::new($crate::ClientError {
            kind: $kind,
            channel: $channel,
            code: $code,
            message: ::std::string::String::from($message),
            class_method: $cm,
        }))
    };
}

/// Failure which reached the error hook because it had no caller to be returned to, or
/// because it terminated the connection.
#[derive(Clone, Debug)]
pub struct FailureRecord {
    pub kind: ErrorKind,
    pub channel: Option<ChannelNumber>,
    pub code: u16,
    pub message: String,
    /// Where the failure was reported from.
    pub origin: &'static Location<'static>,
}

impl FailureRecord {
    #[track_caller]
    pub fn new(err: &ClientError) -> Self {
        Self {
            kind: err.kind,
            channel: err.channel,
            code: err.code,
            message: err.message.clone(),
            origin: Location::caller(),
        }
    }
}

impl fmt::Display for FailureRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:?}] {}:{} (at {})",
            self.kind, self.code, self.message, self.origin
        )
    }
}

pub type ErrorHook = Arc<dyn Fn(&FailureRecord) + Send + Sync>;

/// The hook installed when the user doesn't provide one.
pub fn default_error_hook() -> ErrorHook {
    Arc::new(|record: &FailureRecord| {
        error!("{}", record);
    })
}

/// Error returned when a client is asked to connect in a state other than not connected.
pub(crate) fn already_connecting(state: model::ConnectionState) -> ClientError {
    ClientError::usage(format!("Client is {state}, cannot connect"))
}

pub(crate) fn not_connected(state: model::ConnectionState) -> ClientError {
    ClientError::usage(format!("Client is {state}"))
}
