//! The connection driver of the async client. One task owns the socket and multiplexes
//! the commands of the client handles, the incoming frames, the flushing of the write
//! buffer and the heartbeat timer.
use crate::buffer::{ReadBuffer, WriteBuffer};
use crate::channel_api::Channel;
use crate::client_api::{AsyncClient, ConsumeCallback, Inner};
use crate::error::{ClientError, ErrorKind};
use crate::handshake::Tuning;
use crate::heartbeat;
use crate::message::Delivery;
use crate::model::ChannelNumber;
use crate::pending::{AwaitQueue, Matcher, Responder};
use crate::registry::{ChannelRegistry, Route};
use crate::state::{ChannelState, Event};
use burrow_codec::frame::{self, AMQPFrame, BasicCancelOkArgs, MethodFrameArgs};
use log::{debug, error, info, trace, warn};
use std::collections::HashMap;
use std::fmt;
use std::sync::Weak;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{self, Duration, Instant, Interval, MissedTickBehavior};

/// How long the driver tries to write out the last frames when it stops.
const FLUSH_GRACE: Duration = Duration::from_secs(1);

pub(crate) type CommandSink = mpsc::UnboundedSender<Command>;

/// What the sender of a command waits for.
pub(crate) enum WaitFor {
    /// The frames have been written to the socket.
    SentOut(oneshot::Sender<Result<(), ClientError>>),
    /// A frame of the broker accepted by the matcher.
    Frame {
        channel: ChannelNumber,
        matcher: Matcher,
        responder: Responder,
    },
}

/// Requests of the client handles to the driver.
pub(crate) enum Command {
    Call {
        frames: Vec<AMQPFrame>,
        wait_for: WaitFor,
    },
    Consume {
        channel: ChannelNumber,
        consumer_tag: String,
        no_ack: bool,
        callback: ConsumeCallback,
        frames: Vec<AMQPFrame>,
        wait_for: WaitFor,
    },
    OpenChannel(oneshot::Sender<Result<ChannelNumber, ClientError>>),
    ReleaseChannel(ChannelNumber),
    OpenChannels(oneshot::Sender<Vec<ChannelNumber>>),
    DropChannels,
    Tuned(Tuning),
    DisarmHeartbeat,
    Shutdown(Option<oneshot::Sender<()>>),
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Call { frames, .. } => write!(f, "Call{{Frames={:?}}}", frames),
            Command::Consume { frames, .. } => write!(f, "Consume{{Frames={:?}}}", frames),
            Command::OpenChannel(_) => write!(f, "OpenChannel"),
            Command::ReleaseChannel(ch) => write!(f, "ReleaseChannel{{Channel={}}}", ch),
            Command::OpenChannels(_) => write!(f, "OpenChannels"),
            Command::DropChannels => write!(f, "DropChannels"),
            Command::Tuned(tuning) => write!(f, "Tuned{{{:?}}}", tuning),
            Command::DisarmHeartbeat => write!(f, "DisarmHeartbeat"),
            Command::Shutdown(_) => write!(f, "Shutdown"),
        }
    }
}

/// Send frames and wait for the reply accepted by `matcher`.
pub(crate) async fn call(
    sink: &CommandSink,
    frames: Vec<AMQPFrame>,
    channel: ChannelNumber,
    matcher: Matcher,
) -> Result<AMQPFrame, ClientError> {
    let (tx, rx) = oneshot::channel();

    sink.send(Command::Call {
        frames,
        wait_for: WaitFor::Frame {
            channel,
            matcher,
            responder: tx,
        },
    })
    .map_err(|_| connection_gone())?;

    rx.await.map_err(|_| connection_gone())?
}

/// Send frames and wait until they are written out.
pub(crate) async fn send(sink: &CommandSink, frames: Vec<AMQPFrame>) -> Result<(), ClientError> {
    let (tx, rx) = oneshot::channel();

    sink.send(Command::Call {
        frames,
        wait_for: WaitFor::SentOut(tx),
    })
    .map_err(|_| connection_gone())?;

    rx.await.map_err(|_| connection_gone())?
}

pub(crate) async fn open_channels(sink: &CommandSink) -> Result<Vec<ChannelNumber>, ClientError> {
    let (tx, rx) = oneshot::channel();

    sink.send(Command::OpenChannels(tx)).map_err(|_| connection_gone())?;

    rx.await.map_err(|_| connection_gone())
}

pub(crate) fn connection_gone() -> ClientError {
    ClientError::closed("Connection is closed")
}

enum FlushWaiter {
    Caller(oneshot::Sender<Result<(), ClientError>>),
    Heartbeat,
    Settle { channel: ChannelNumber, delivery_tag: u64 },
}

struct Consumer {
    no_ack: bool,
    callback: ConsumeCallback,
}

enum Flow {
    Continue,
    Stop,
}

pub(crate) struct Driver<S> {
    reader: ReadHalf<S>,
    writer: WriteHalf<S>,
    input: ReadBuffer,
    output: WriteBuffer,
    commands: mpsc::UnboundedReceiver<Command>,
    pending: AwaitQueue,
    registry: ChannelRegistry,
    channels: ChannelState,
    consumers: HashMap<(ChannelNumber, String), Consumer>,
    flush_waiters: Vec<FlushWaiter>,
    heartbeat: Option<Interval>,
    client: Weak<Inner>,
    generation: u64,
    closed: watch::Sender<bool>,
    shutdown_ack: Option<oneshot::Sender<()>>,
}

impl<S> Driver<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    pub(crate) fn new(
        stream: S,
        commands: mpsc::UnboundedReceiver<Command>,
        client: Weak<Inner>,
        generation: u64,
        closed: watch::Sender<bool>,
        channel_max: u16,
    ) -> Self {
        let (reader, writer) = tokio::io::split(stream);

        Self {
            reader,
            writer,
            input: ReadBuffer::new(),
            output: WriteBuffer::new(),
            commands,
            pending: AwaitQueue::new(),
            registry: ChannelRegistry::new(channel_max),
            channels: ChannelState::new(),
            consumers: HashMap::new(),
            flush_waiters: vec![],
            heartbeat: None,
            client,
            generation,
            closed,
            shutdown_ack: None,
        }
    }

    pub(crate) async fn run(mut self) {
        let result = self.event_loop().await;

        if let Err(e) = &result {
            debug!("Connection driver stops with {}", e);
        }

        self.teardown(result.err()).await;
    }

    async fn event_loop(&mut self) -> Result<(), ClientError> {
        loop {
            let flushing = !self.output.is_empty();

            tokio::select! {
                command = self.commands.recv() => {
                    match command {
                        Some(command) => {
                            trace!("Client command {:?}", command);

                            if let Flow::Stop = self.handle_command(command) {
                                return Ok(());
                            }
                        }
                        None => {
                            // every client handle is dropped
                            debug!("Client is gone, closing the connection");

                            let _ = self.output.append(&frame::connection_close(200, "Client is dropped", 0));

                            return Ok(());
                        }
                    }
                }
                read = self.reader.read_buf(self.input.bytes_mut()) => {
                    match read {
                        Ok(0) => return Err(ClientError::closed("Connection closed by the broker")),
                        Ok(_) => self.process_input()?,
                        Err(e) => return Err(ClientError::transport(&e)),
                    }
                }
                written = self.writer.write_buf(self.output.bytes_mut()), if flushing => {
                    if let Err(e) = written {
                        return Err(self.write_failed(&e));
                    }

                    if self.output.is_empty() {
                        if let Err(e) = self.writer.flush().await {
                            return Err(self.write_failed(&e));
                        }

                        self.flushed();
                    }
                }
                _ = next_beat(&mut self.heartbeat) => {
                    trace!("Sending heartbeat");

                    self.output.append(&frame::heartbeat())?;
                    self.flush_waiters.push(FlushWaiter::Heartbeat);
                }
            }
        }
    }

    fn handle_command(&mut self, command: Command) -> Flow {
        match command {
            Command::Call { frames, wait_for } => {
                self.send_frames(frames, wait_for);
            }
            Command::Consume {
                channel,
                consumer_tag,
                no_ack,
                callback,
                frames,
                wait_for,
            } => {
                let key = (channel, consumer_tag);

                self.consumers.insert(key.clone(), Consumer { no_ack, callback });

                if !self.send_frames(frames, wait_for) {
                    self.consumers.remove(&key);
                }
            }
            Command::OpenChannel(tx) => {
                let _ = tx.send(self.registry.allocate());
            }
            Command::ReleaseChannel(channel) => {
                self.release_channel(channel, &ClientError::closed("Channel is released"));
            }
            Command::OpenChannels(tx) => {
                let _ = tx.send(self.registry.open_channels());
            }
            Command::DropChannels => {
                let err = ClientError::closed("Connection is closing");

                for channel in self.registry.open_channels() {
                    self.release_channel(channel, &err);
                }
            }
            Command::Tuned(tuning) => {
                self.input.set_frame_max(tuning.frame_max);
                self.registry.set_channel_max(tuning.channel_max);

                if tuning.heartbeat > 0 {
                    let period = Duration::from_secs(tuning.heartbeat as u64);
                    let mut interval = time::interval_at(Instant::now() + period, period);

                    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

                    self.heartbeat = Some(interval);
                }
            }
            Command::DisarmHeartbeat => {
                self.heartbeat = None;
            }
            Command::Shutdown(ack) => {
                self.shutdown_ack = ack;

                return Flow::Stop;
            }
        }

        Flow::Continue
    }

    /// Buffer the frames and register what the sender waits for. Returns false if the
    /// frames couldn't be sent.
    fn send_frames(&mut self, frames: Vec<AMQPFrame>, wait_for: WaitFor) -> bool {
        let closed_channel = frames
            .iter()
            .map(AMQPFrame::channel)
            .find(|ch| *ch != 0 && !self.registry.is_open(*ch));

        let result = match closed_channel {
            Some(ch) => Err(ClientError::usage(format!("Channel {} is not open", ch)).on_channel(ch)),
            None => self.output.append_all(&frames).map_err(ClientError::from),
        };

        if let Err(err) = result {
            match wait_for {
                WaitFor::SentOut(tx) => {
                    let _ = tx.send(Err(err));
                }
                WaitFor::Frame { responder, .. } => {
                    let _ = responder.send(Err(err));
                }
            }

            return false;
        }

        for frame in &frames {
            if let AMQPFrame::Method(ch, frame::CHANNEL_CLOSE, _) = frame {
                self.registry.start_closing(*ch);
            }
        }

        match wait_for {
            WaitFor::SentOut(tx) => self.flush_waiters.push(FlushWaiter::Caller(tx)),
            WaitFor::Frame {
                channel,
                matcher,
                responder,
            } => self.pending.register(channel, matcher, responder),
        }

        true
    }

    fn process_input(&mut self) -> Result<(), ClientError> {
        while let Some(frame) = self.input.next_frame()? {
            self.handle_frame(frame)?;
        }

        Ok(())
    }

    fn handle_frame(&mut self, frame: AMQPFrame) -> Result<(), ClientError> {
        trace!("Incoming frame {:?}", frame);

        if let AMQPFrame::Heartbeat(_) = frame {
            return Ok(());
        }

        let route = self.registry.route(&frame)?;

        match &frame {
            AMQPFrame::Method(_, frame::CONNECTION_CLOSE, MethodFrameArgs::ConnectionClose(args)) => {
                let err = ClientError::from_connection_close(args);

                info!("Broker closes the connection {} {}", err.code, err.message);

                self.output.append(&frame::connection_close_ok())?;

                return Err(err);
            }
            AMQPFrame::Method(ch, frame::CHANNEL_CLOSE, MethodFrameArgs::ChannelClose(args)) => {
                let err = ClientError::from_channel_close(*ch, args);

                self.output.append(&frame::channel_close_ok(*ch))?;

                // the close-ok of our own close is still on its way, the number stays taken
                let rejected = match route {
                    Route::Closing(_) => self.forget_channel(*ch, &err),
                    _ => self.release_channel(*ch, &err),
                };

                if rejected == 0 {
                    self.report(&err);
                }

                return Ok(());
            }
            _ => (),
        }

        if let AMQPFrame::Method(ch, frame::CHANNEL_CLOSE_OK, _) = frame {
            self.registry.release(ch);

            let _ = self.pending.offer(frame);

            self.release_channel(ch, &ClientError::closed("Channel is closed").on_channel(ch));

            return Ok(());
        }

        // deliveries after the cancel-ok are not for the callback any more
        if let AMQPFrame::Method(ch, frame::BASIC_CANCEL_OK, MethodFrameArgs::BasicCancelOk(args)) = &frame {
            self.consumers.remove(&(*ch, args.consumer_tag.clone()));
        }

        let frame = match self.pending.offer(frame) {
            Some(frame) => frame,
            None => return Ok(()),
        };

        match route {
            Route::Connection => debug!("Unhandled connection frame {:?}", frame),
            Route::Channel(_) => match self.channels.handle_frame(frame)? {
                Event::Delivered(delivery) => self.deliver(delivery),
                Event::Returned(message) => warn!(
                    "Message to {}/{} is returned: {} {}",
                    message.exchange, message.routing_key, message.reply_code, message.reply_text
                ),
                Event::Got(delivery, _) => debug!("Get result without a waiting call {:?}", delivery),
                Event::InProgress => (),
                Event::Unhandled(frame) => self.unhandled_channel_frame(frame),
            },
            Route::Closing(ch) => trace!("Dropping frame on closing channel {} {:?}", ch, frame),
        }

        Ok(())
    }

    fn unhandled_channel_frame(&mut self, frame: AMQPFrame) {
        match frame {
            AMQPFrame::Method(ch, frame::BASIC_CANCEL, MethodFrameArgs::BasicCancel(args)) => {
                info!("Broker cancelled consumer {} on channel {}", args.consumer_tag, ch);

                self.consumers.remove(&(ch, args.consumer_tag.clone()));

                if !args.no_wait {
                    let _ = self.output.append(&BasicCancelOkArgs::new(&args.consumer_tag).frame(ch));
                }
            }
            other => debug!("Unhandled channel frame {:?}", other),
        }
    }

    fn deliver(&mut self, delivery: Delivery) {
        let key = (delivery.channel, delivery.consumer_tag.clone());

        let (callback, no_ack) = match self.consumers.get(&key) {
            Some(consumer) => (consumer.callback.clone(), consumer.no_ack),
            None => {
                warn!("Delivery for unknown consumer {} on channel {}", key.1, key.0);

                return;
            }
        };

        let client = match self.client.upgrade() {
            Some(inner) => AsyncClient { inner },
            None => return,
        };

        let channel = Channel::new(delivery.channel, client.clone());
        let verdict = callback(&delivery, &channel, &client);

        if no_ack {
            return;
        }

        trace!("Settling delivery {} with {:?}", delivery.delivery_tag, verdict);

        match self.output.append(&verdict.frame(delivery.channel, delivery.delivery_tag)) {
            Ok(()) => self.flush_waiters.push(FlushWaiter::Settle {
                channel: delivery.channel,
                delivery_tag: delivery.delivery_tag,
            }),
            Err(e) => warn!("Cannot settle delivery {}: {:?}", delivery.delivery_tag, e),
        }
    }

    /// Forget everything about a channel. Returns the number of waiting operations which
    /// were failed.
    fn release_channel(&mut self, channel: ChannelNumber, err: &ClientError) -> usize {
        self.registry.release(channel);
        self.forget_channel(channel, err)
    }

    /// Drop the state of a channel and reject its waiters. Returns the number of rejected
    /// calls.
    fn forget_channel(&mut self, channel: ChannelNumber, err: &ClientError) -> usize {
        self.channels.drop_channel(channel);
        self.consumers.retain(|(ch, _), _| *ch != channel);

        self.pending.reject_channel(channel, err)
    }

    fn flushed(&mut self) {
        let waiters = std::mem::take(&mut self.flush_waiters);
        let mut heartbeat_sent = false;

        for waiter in waiters {
            match waiter {
                FlushWaiter::Caller(tx) => {
                    let _ = tx.send(Ok(()));
                }
                FlushWaiter::Heartbeat => heartbeat_sent = true,
                FlushWaiter::Settle { channel, delivery_tag } => {
                    trace!("Delivery {} on channel {} is settled", delivery_tag, channel);
                }
            }
        }

        if heartbeat_sent {
            if let Some(inner) = self.client.upgrade() {
                let client = AsyncClient { inner };

                if let Some(callback) = client.hooks().heartbeat {
                    callback(&client);
                }
            }
        }
    }

    fn write_failed(&self, err: &std::io::Error) -> ClientError {
        let ce = ClientError::transport(err);
        let in_heartbeat = self.flush_waiters.iter().any(|w| matches!(w, FlushWaiter::Heartbeat));

        if in_heartbeat {
            ce.with_kind(ErrorKind::Heartbeat)
        } else {
            ce
        }
    }

    fn report(&self, err: &ClientError) {
        if let Some(inner) = self.client.upgrade() {
            AsyncClient { inner }.report(err);
        }
    }

    async fn teardown(mut self, err: Option<ClientError>) {
        let reason = err.clone().unwrap_or_else(connection_gone);

        if let Some(e) = &err {
            if e.kind == ErrorKind::Protocol {
                let _ = self
                    .output
                    .append(&frame::connection_close(e.code, &e.message, e.class_method));
            }
        }

        let write_failed = matches!(&err, Some(e) if e.kind == ErrorKind::Transport || e.kind == ErrorKind::Heartbeat);

        if !write_failed && !self.output.is_empty() {
            let _ = time::timeout(FLUSH_GRACE, self.writer.write_all(self.output.as_bytes())).await;
        }

        let _ = time::timeout(FLUSH_GRACE, self.writer.shutdown()).await;

        self.output.clear();
        self.pending.reject_all(&reason);

        for waiter in self.flush_waiters.drain(..) {
            if let FlushWaiter::Caller(tx) = waiter {
                let _ = tx.send(Err(reason.clone()));
            }
        }

        self.consumers.clear();
        self.registry.clear();
        self.channels.clear();

        if let Some(inner) = self.client.upgrade() {
            let client = AsyncClient { inner };
            let was_connected = client.connection_lost(self.generation);

            match err {
                Some(e) if was_connected && e.kind == ErrorKind::Heartbeat => {
                    heartbeat::heartbeat_failed(client.config().heartbeat_failure, &client.hooks().error, &e);
                }
                Some(e) if was_connected => {
                    error!("Connection is lost {}", e);

                    client.report(&e);
                }
                _ => (),
            }
        }

        // waiters of the connection see the final state
        let _ = self.closed.send(true);

        if let Some(ack) = self.shutdown_ack.take() {
            let _ = ack.send(());
        }
    }
}

async fn next_beat(heartbeat: &mut Option<Interval>) {
    match heartbeat {
        Some(interval) => {
            interval.tick().await;
        }
        None => futures::future::pending::<()>().await,
    }
}
