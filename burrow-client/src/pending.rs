use crate::error::ClientError;
use crate::model::{ChannelNumber, ClassMethod};
use burrow_codec::frame::AMQPFrame;
use log::trace;
use std::collections::VecDeque;
use tokio::sync::oneshot;

pub(crate) type Matcher = Box<dyn Fn(&AMQPFrame) -> bool + Send>;
pub(crate) type Responder = oneshot::Sender<Result<AMQPFrame, ClientError>>;

/// An operation which waits for a frame of the broker.
pub(crate) struct PendingOperation {
    channel: ChannelNumber,
    matcher: Matcher,
    responder: Responder,
}

/// Operations waiting for their replies, in registration order.
#[derive(Default)]
pub(crate) struct AwaitQueue {
    ops: VecDeque<PendingOperation>,
}

impl AwaitQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register(&mut self, channel: ChannelNumber, matcher: Matcher, responder: Responder) {
        self.ops.push_back(PendingOperation {
            channel,
            matcher,
            responder,
        });
    }

    /// Give the frame to the oldest operation which accepts it. If nobody accepts it the frame
    /// is given back.
    pub(crate) fn offer(&mut self, frame: AMQPFrame) -> Option<AMQPFrame> {
        match self.ops.iter().position(|op| (op.matcher)(&frame)) {
            Some(pos) => {
                if let Some(op) = self.ops.remove(pos) {
                    trace!("Frame {:?} completes an operation on channel {}", frame, op.channel);

                    // the caller may have given up waiting, the frame is consumed anyway
                    let _ = op.responder.send(Ok(frame));
                }

                None
            }
            None => Some(frame),
        }
    }

    /// Fail every operation waiting on the channel. Returns how many were failed.
    pub(crate) fn reject_channel(&mut self, channel: ChannelNumber, err: &ClientError) -> usize {
        let (rejected, kept): (VecDeque<_>, VecDeque<_>) = self.ops.drain(..).partition(|op| op.channel == channel);

        self.ops = kept;

        let n = rejected.len();

        for op in rejected {
            let _ = op.responder.send(Err(err.clone()));
        }

        n
    }

    pub(crate) fn reject_all(&mut self, err: &ClientError) -> usize {
        let n = self.ops.len();

        for op in self.ops.drain(..) {
            let _ = op.responder.send(Err(err.clone()));
        }

        n
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.ops.len()
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Match a method frame on the channel.
pub(crate) fn expect(channel: ChannelNumber, class_method: ClassMethod) -> Matcher {
    Box::new(move |f| matches!(f, AMQPFrame::Method(ch, cm, _) if *ch == channel && *cm == class_method))
}
