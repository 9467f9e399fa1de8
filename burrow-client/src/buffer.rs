//! Byte buffers between the frame codec and the socket. Frames are encoded into the
//! write buffer and flushed later, so several frames leave in one write. The read
//! buffer accumulates socket reads and hands out frames once they are complete.
use burrow_codec::codec::{encode_amqp_frame, AMQPCodec, FRAME_MIN_SIZE};
use burrow_codec::frame::AMQPFrame;
use burrow_codec::FrameError;
use bytes::{Buf, BytesMut};
use std::io;
use tokio_util::codec::Decoder;

const INITIAL_CAPACITY: usize = 8 * 1024;

#[derive(Debug)]
pub struct WriteBuffer {
    buf: BytesMut,
}

impl Default for WriteBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl WriteBuffer {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(INITIAL_CAPACITY),
        }
    }

    /// Encode a frame at the end of the buffer. On error the buffer is left as it was.
    pub fn append(&mut self, frame: &AMQPFrame) -> Result<(), FrameError> {
        encode_amqp_frame(&mut self.buf, frame)
    }

    /// Encode all the frames or none of them.
    pub fn append_all(&mut self, frames: &[AMQPFrame]) -> Result<(), FrameError> {
        let mark = self.buf.len();

        for f in frames {
            if let Err(e) = self.append(f) {
                self.buf.truncate(mark);

                return Err(e);
            }
        }

        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..]
    }

    /// Drop the first `n` bytes which have been written out.
    pub fn consume(&mut self, n: usize) {
        self.buf.advance(n.min(self.buf.len()));
    }

    /// Drop the buffered bytes and go back to the limit of an untuned connection.
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    pub(crate) fn bytes_mut(&mut self) -> &mut BytesMut {
        &mut self.buf
    }

    /// Write out the whole buffer to a blocking writer.
    pub fn flush_to<W: io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        while !self.buf.is_empty() {
            match writer.write(&self.buf[..]) {
                Ok(0) => return Err(io::Error::new(io::ErrorKind::WriteZero, "Socket doesn't accept more data")),
                Ok(n) => self.consume(n),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }

        writer.flush()
    }
}

#[derive(Debug)]
pub struct ReadBuffer {
    buf: BytesMut,
    codec: AMQPCodec,
}

impl Default for ReadBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadBuffer {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(INITIAL_CAPACITY),
            codec: AMQPCodec::with_frame_max(FRAME_MIN_SIZE),
        }
    }

    /// Raise the frame limit to the negotiated one, 0 means no limit.
    pub fn set_frame_max(&mut self, frame_max: u32) {
        self.codec.set_frame_max(frame_max);
    }

    pub fn extend(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Take the next complete frame. Incomplete frames stay in the buffer until more bytes
    /// arrive.
    pub fn next_frame(&mut self) -> Result<Option<AMQPFrame>, FrameError> {
        self.codec.decode(&mut self.buf)
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn clear(&mut self) {
        self.buf.clear();
        self.codec.set_frame_max(FRAME_MIN_SIZE);
    }

    pub(crate) fn bytes_mut(&mut self) -> &mut BytesMut {
        &mut self.buf
    }

    /// Read once from a blocking reader, returning the number of bytes read.
    pub fn read_from<R: io::Read>(&mut self, reader: &mut R) -> io::Result<usize> {
        let mut chunk = [0u8; INITIAL_CAPACITY];
        let n = reader.read(&mut chunk)?;

        self.buf.extend_from_slice(&chunk[..n]);

        Ok(n)
    }
}
