//! Wire level types of AMQP 0-9-1.
//!
//! [`frame`] has the frame and method argument types together with small builders,
//! [`codec::AMQPCodec`] turns them into bytes and back.
pub mod codec;
pub mod frame;


#[macro_use]
extern crate bitflags;

use std::fmt;

/// The peer sent a frame which cannot be parsed at the framing level.
pub const FRAME_ERROR: u16 = 501;
/// The peer sent a frame with erroneous field values.
pub const SYNTAX_ERROR: u16 = 502;
/// The peer sent a method we don't know or a frame type which is out of order.
pub const COMMAND_INVALID: u16 = 503;

pub type Result<T> = std::result::Result<T, FrameError>;

/// Failure of encoding or decoding. The `code` is the reply code the connection
/// should be closed with, or 0 when the stream itself failed.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameError {
    pub code: u16,
    pub message: String,
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}

impl std::error::Error for FrameError {}

impl From<std::io::Error> for FrameError {
    fn from(err: std::io::Error) -> Self {
        FrameError {
            code: 0,
            message: err.to_string(),
        }
    }
}

/// Returns early with an `Err(FrameError)`.
///
/// ```
/// use burrow_codec::{frame_error, FrameError};
/// use burrow_codec::frame::AMQPFieldValue;
///
/// fn as_string(val: AMQPFieldValue) -> Result<String, FrameError> {
///     if let AMQPFieldValue::LongString(s) = val {
///         return Ok(s);
///     }
///
///     frame_error!(burrow_codec::SYNTAX_ERROR, "Value cannot be converted to string")
/// }
///
/// assert!(as_string(AMQPFieldValue::Bool(true)).is_err());
/// ```
#[macro_export]
macro_rules! frame_error {
    ($code:expr, $message:expr) => {
        ::std::result::Result::Err($crate::FrameError {
            code: $code,
            message: ::std::string::String::from($message),
        })
    };
}
