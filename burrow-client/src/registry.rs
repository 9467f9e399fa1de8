use crate::error::ClientError;
use crate::model::{ChannelNumber, ConnectionError};
use burrow_codec::frame::AMQPFrame;
use std::collections::BTreeSet;

/// Destination of an incoming frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Route {
    Connection,
    Channel(ChannelNumber),
    /// The client sent `channel.close` and waits for the `close-ok`.
    Closing(ChannelNumber),
}

/// Keeps track of the open channels of a connection and hands out channel numbers. A
/// channel being closed by the client keeps its number until the broker confirms the close.
#[derive(Debug)]
pub struct ChannelRegistry {
    channel_max: u16,
    open: BTreeSet<ChannelNumber>,
    closing: BTreeSet<ChannelNumber>,
}

impl ChannelRegistry {
    pub fn new(channel_max: u16) -> Self {
        Self {
            channel_max: if channel_max == 0 { u16::MAX } else { channel_max },
            open: BTreeSet::new(),
            closing: BTreeSet::new(),
        }
    }

    pub fn set_channel_max(&mut self, channel_max: u16) {
        self.channel_max = if channel_max == 0 { u16::MAX } else { channel_max };
    }

    /// Register the lowest free channel number.
    pub fn allocate(&mut self) -> Result<ChannelNumber, ClientError> {
        let free = (1..=self.channel_max).find(|id| !self.open.contains(id) && !self.closing.contains(id));

        match free {
            Some(id) => {
                self.open.insert(id);

                Ok(id)
            }
            None => Err(ClientError::protocol(
                ConnectionError::ResourceError as u16,
                format!("All the {} channels are in use", self.channel_max),
            )),
        }
    }

    pub fn release(&mut self, channel: ChannelNumber) -> bool {
        let open = self.open.remove(&channel);

        self.closing.remove(&channel) || open
    }

    /// The client sent `channel.close`. The channel can't be used any more but its number
    /// is reserved until `release`.
    pub fn start_closing(&mut self, channel: ChannelNumber) {
        if self.open.remove(&channel) {
            self.closing.insert(channel);
        }
    }

    pub fn is_closing(&self, channel: ChannelNumber) -> bool {
        self.closing.contains(&channel)
    }

    pub fn is_open(&self, channel: ChannelNumber) -> bool {
        self.open.contains(&channel)
    }

    pub fn open_channels(&self) -> Vec<ChannelNumber> {
        self.open.iter().copied().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.open.is_empty()
    }

    pub fn clear(&mut self) {
        self.open.clear();
        self.closing.clear();
    }

    /// Decide where a frame belongs. Frames on channels which are neither open nor closing
    /// are fatal.
    pub fn route(&self, frame: &AMQPFrame) -> Result<Route, ClientError> {
        match frame.channel() {
            0 => Ok(Route::Connection),
            ch if self.open.contains(&ch) => Ok(Route::Channel(ch)),
            ch if self.closing.contains(&ch) => Ok(Route::Closing(ch)),
            ch => Err(ClientError::protocol(
                ConnectionError::ChannelError as u16,
                format!("Received {:?} on channel {} which is not open", frame, ch),
            )
            .on_channel(ch)),
        }
    }
}
