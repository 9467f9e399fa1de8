//! Blocking client. Every operation writes its frames and reads the socket until the reply
//! arrives; deliveries and broker notifications read meanwhile are dispatched on the way.
mod channel;

pub use channel::Channel;

use crate::buffer::{ReadBuffer, WriteBuffer};
use crate::config::Config;
use crate::error::{self, default_error_hook, ClientError, ErrorHook, ErrorKind, FailureRecord};
use crate::handshake::{Handshake, Tuning};
use crate::heartbeat::{self, HeartbeatTimer};
use crate::message::{Delivery, Verdict};
use crate::model::{self, ChannelNumber, ConnectionError, ConnectionState};
use crate::registry::{ChannelRegistry, Route};
use crate::state::{ChannelState, Event};
use anyhow::Result;
use burrow_codec::frame::{self, AMQPFrame, BasicCancelOkArgs, ChannelCloseArgs, MethodFrameArgs};
use log::{debug, info, trace, warn};
use std::collections::HashMap;
use std::io::{self, ErrorKind as IoErrorKind};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Called after every heartbeat with the client and whether it is still connected.
pub type HeartbeatCallback = Arc<dyn Fn(&Client, bool) + Send + Sync>;

/// Consumer callback of the blocking client, the verdict settles the delivery unless the
/// consumer is in no-ack mode.
pub type ConsumeFn = Box<dyn FnMut(&Delivery) -> Verdict + Send>;

/// Read timeout when nothing else limits the wait.
const IDLE_READ: Duration = Duration::from_secs(1);

struct Consumer {
    no_ack: bool,
    callback: ConsumeFn,
}

pub struct Client {
    config: Config,
    state: ConnectionState,
    stream: Option<TcpStream>,
    input: ReadBuffer,
    output: WriteBuffer,
    registry: ChannelRegistry,
    channels: ChannelState,
    consumers: HashMap<(ChannelNumber, String), Consumer>,
    tuning: Option<Tuning>,
    heartbeat: Option<HeartbeatTimer>,
    heartbeat_callback: Option<HeartbeatCallback>,
    error_hook: ErrorHook,
    fetched: Option<(Delivery, u32)>,
}

impl Client {
    pub fn new(config: Config) -> Self {
        let channel_max = config.channel_max;

        Self {
            config,
            state: ConnectionState::NotConnected,
            stream: None,
            input: ReadBuffer::new(),
            output: WriteBuffer::new(),
            registry: ChannelRegistry::new(channel_max),
            channels: ChannelState::new(),
            consumers: HashMap::new(),
            tuning: None,
            heartbeat: None,
            heartbeat_callback: None,
            error_hook: default_error_hook(),
            fetched: None,
        }
    }

    pub fn with_error_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&FailureRecord) + Send + Sync + 'static,
    {
        self.error_hook = Arc::new(hook);
        self
    }

    pub fn with_heartbeat_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Client, bool) + Send + Sync + 'static,
    {
        self.heartbeat_callback = Some(Arc::new(callback));
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn tuning(&self) -> Option<Tuning> {
        self.tuning
    }

    /// Connect to the configured broker and perform the handshake.
    pub fn connect(&mut self) -> Result<()> {
        if self.state != ConnectionState::NotConnected {
            return Err(anyhow::Error::new(error::already_connecting(self.state)));
        }

        self.state = ConnectionState::Connecting;

        match self.open_connection() {
            Ok(tuning) => {
                self.input.set_frame_max(tuning.frame_max);
                self.registry.set_channel_max(tuning.channel_max);
                self.heartbeat = HeartbeatTimer::new(tuning.heartbeat, Instant::now());
                self.tuning = Some(tuning);
                self.state = ConnectionState::Connected;

                info!("Connected to {} vhost {}", self.config.address(), self.config.vhost);

                Ok(())
            }
            Err(e) => {
                warn!("Connection to {} failed {}", self.config.address(), e);

                self.report(&e);
                self.teardown();

                Err(anyhow::Error::new(e))
            }
        }
    }

    /// Close the connection. A normal reply code (0 or 200) closes the channels and waits
    /// for the broker to acknowledge the close, other codes just drop the connection.
    pub fn disconnect(&mut self, reply_code: u16, reply_text: &str) -> Result<()> {
        if self.state != ConnectionState::Connected {
            return Err(anyhow::Error::new(error::not_connected(self.state)));
        }

        self.state = ConnectionState::Disconnecting;
        self.heartbeat = None;

        let result = self.close_all(reply_code, reply_text);

        self.teardown();

        debug!("Disconnected with {:?}", result);

        Ok(result?)
    }

    /// Normal disconnect which is a no-op if the client isn't connected.
    pub fn close(&mut self) -> Result<()> {
        match self.state {
            ConnectionState::Connected => self.disconnect(model::ChannelError::Success as u16, "Normal close"),
            _ => Ok(()),
        }
    }

    pub fn reconnect(&mut self) -> Result<()> {
        self.close()?;
        self.connect()
    }

    /// Open a channel on the lowest free channel number.
    pub fn open_channel(&mut self) -> Result<Channel<'_>> {
        self.ensure_connected()?;

        let id = self.registry.allocate()?;

        if let Err(e) = self.call(vec![frame::channel_open(id)], id, &[frame::CHANNEL_OPEN_OK]) {
            self.release_channel(id);

            return Err(anyhow::Error::new(e));
        }

        Ok(Channel::new(id, self))
    }

    /// Handle of an already open channel.
    pub fn channel(&mut self, id: ChannelNumber) -> Result<Channel<'_>> {
        self.ensure_connected()?;

        if !self.registry.is_open(id) {
            return Err(anyhow::Error::new(
                ClientError::usage(format!("Channel {} is not open", id)).on_channel(id),
            ));
        }

        Ok(Channel::new(id, self))
    }

    /// Read and dispatch incoming frames for the given time, sending heartbeats as needed.
    pub fn process_events(&mut self, timeout: Duration) -> Result<()> {
        self.ensure_connected()?;

        let deadline = Instant::now() + timeout;

        while let Some(frame) = self.next_frame(Some(deadline))? {
            self.dispatch(frame)?;
        }

        Ok(())
    }

    /// Process events until the connection is closed. With a limit the client disconnects
    /// when the limit elapses.
    pub fn run(&mut self, limit: Option<Duration>) -> Result<()> {
        let started = Instant::now();

        while self.is_connected() {
            let slice = match limit {
                Some(limit) => match limit.checked_sub(started.elapsed()) {
                    Some(left) if !left.is_zero() => left.min(IDLE_READ),
                    _ => {
                        info!("Stopping the client after {:?}", limit);

                        return self.close();
                    }
                },
                None => IDLE_READ,
            };

            self.process_events(slice)?;
        }

        Ok(())
    }

    pub fn stop(&mut self) -> Result<()> {
        self.close()
    }

    fn ensure_connected(&self) -> Result<(), ClientError> {
        match self.state {
            ConnectionState::Connected | ConnectionState::Disconnecting => Ok(()),
            state => Err(error::not_connected(state)),
        }
    }

    fn open_connection(&mut self) -> Result<Tuning, ClientError> {
        let address = self.config.address();
        let timeout = self.config.connect_timeout();

        debug!("Connecting to {}", address);

        let addrs = address
            .to_socket_addrs()
            .map_err(|e| ClientError::transport(&e))?;

        let mut last_error = ClientError::closed(format!("Cannot resolve {}", address));
        let mut connected = None;

        for addr in addrs {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(stream) => {
                    connected = Some(stream);
                    break;
                }
                Err(e) => last_error = ClientError::transport(&e),
            }
        }

        let stream = connected.ok_or(last_error)?;

        stream.set_nodelay(true).map_err(|e| ClientError::transport(&e))?;

        self.stream = Some(stream);

        let deadline = Instant::now() + timeout;
        let mut hs = Handshake::new(&self.config);
        let header = hs.protocol_header();

        self.write_frames(&[header])?;

        while !hs.is_done() {
            let frame = match self.next_frame(Some(deadline))? {
                Some(frame) => frame,
                None => return Err(ClientError::closed("Handshake timed out")),
            };

            let close = matches!(frame, AMQPFrame::Method(_, frame::CONNECTION_CLOSE, _));

            match hs.on_frame(frame) {
                Ok(reply) => self.write_frames(&reply)?,
                Err(e) => {
                    if close {
                        let _ = self.write_frames(&[frame::connection_close_ok()]);
                    }

                    return Err(e);
                }
            }
        }

        hs.tuning().ok_or_else(|| {
            ClientError::protocol(
                ConnectionError::CommandInvalid as u16,
                "Handshake finished without tuning",
            )
        })
    }

    fn close_all(&mut self, reply_code: u16, reply_text: &str) -> Result<(), ClientError> {
        if !model::is_normal_close(reply_code) {
            for id in self.registry.open_channels() {
                self.release_channel(id);
            }

            return Ok(());
        }

        for id in self.registry.open_channels() {
            // the broker may have closed it while an earlier one was closing
            if !self.registry.is_open(id) {
                continue;
            }

            if let Err(e) = self.close_channel(id) {
                if e.kind != ErrorKind::Broker {
                    return Err(e);
                }

                warn!("Channel closed by the broker during disconnect {}", e);
            }
        }

        if !self.registry.is_empty() {
            return Err(ClientError::protocol(
                ConnectionError::InternalError as u16,
                format!(
                    "All channels have to be closed by now, still open {:?}",
                    self.registry.open_channels()
                ),
            ));
        }

        self.call(
            vec![frame::connection_close(
                model::ChannelError::Success as u16,
                reply_text,
                0,
            )],
            0,
            &[frame::CONNECTION_CLOSE_OK],
        )?;

        Ok(())
    }

    pub(crate) fn close_channel(&mut self, id: ChannelNumber) -> Result<(), ClientError> {
        let frame = frame::channel_close(id, model::ChannelError::Success as u16, "Normal close", 0);

        self.call(vec![frame], id, &[frame::CHANNEL_CLOSE_OK])?;

        Ok(())
    }

    /// Send the frames and read until a method frame in `replies` arrives on the channel.
    /// An empty `replies` just sends.
    pub(crate) fn call(
        &mut self,
        frames: Vec<AMQPFrame>,
        channel: ChannelNumber,
        replies: &[u32],
    ) -> Result<Option<AMQPFrame>, ClientError> {
        if let Some(ch) = frames.iter().map(AMQPFrame::channel).find(|ch| *ch != 0 && !self.registry.is_open(*ch)) {
            return Err(ClientError::usage(format!("Channel {} is not open", ch)).on_channel(ch));
        }

        self.send(&frames)?;

        for frame in &frames {
            if let AMQPFrame::Method(ch, frame::CHANNEL_CLOSE, _) = frame {
                self.registry.start_closing(*ch);
            }
        }

        if replies.is_empty() {
            return Ok(None);
        }

        loop {
            let frame = match self.next_frame(None)? {
                Some(frame) => frame,
                None => continue,
            };

            if let Some(err) = self.closed_under(channel, &frame)? {
                return Err(err);
            }

            if let AMQPFrame::Method(ch, cm, _) = &frame {
                if *ch == channel && replies.contains(cm) {
                    if *cm == frame::CHANNEL_CLOSE_OK {
                        self.release_channel(channel);
                    }

                    return Ok(Some(frame));
                }
            }

            self.dispatch(frame)?;
        }
    }

    /// Wait until the message started by a get-ok on the channel is complete.
    pub(crate) fn wait_fetched(&mut self, channel: ChannelNumber) -> Result<(Delivery, u32), ClientError> {
        loop {
            if let Some(fetched) = self.fetched.take() {
                return Ok(fetched);
            }

            if let Some(frame) = self.next_frame(None)? {
                if let Some(err) = self.closed_under(channel, &frame)? {
                    return Err(err);
                }

                self.dispatch(frame)?;
            }
        }
    }

    /// The broker closed the channel of the running call. Returns the error for the caller.
    fn closed_under(
        &mut self,
        channel: ChannelNumber,
        frame: &AMQPFrame,
    ) -> Result<Option<ClientError>, ClientError> {
        match frame {
            AMQPFrame::Method(ch, frame::CHANNEL_CLOSE, MethodFrameArgs::ChannelClose(args))
                if *ch == channel && channel != 0 =>
            {
                Ok(Some(self.accept_channel_close(*ch, args)?))
            }
            _ => Ok(None),
        }
    }

    /// Answer the channel close of the broker. A channel which the client is closing keeps
    /// its number until the close-ok for its own close arrives.
    fn accept_channel_close(
        &mut self,
        channel: ChannelNumber,
        args: &ChannelCloseArgs,
    ) -> Result<ClientError, ClientError> {
        let err = ClientError::from_channel_close(channel, args);

        if self.registry.is_closing(channel) {
            self.forget_channel(channel);
        } else {
            self.release_channel(channel);
        }

        self.send(&[frame::channel_close_ok(channel)])?;

        Ok(err)
    }

    pub(crate) fn add_consumer(&mut self, channel: ChannelNumber, consumer_tag: &str, no_ack: bool, callback: ConsumeFn) {
        self.consumers
            .insert((channel, consumer_tag.to_string()), Consumer { no_ack, callback });
    }

    pub(crate) fn remove_consumer(&mut self, channel: ChannelNumber, consumer_tag: &str) {
        self.consumers.remove(&(channel, consumer_tag.to_string()));
    }

    pub(crate) fn frame_max(&self) -> u32 {
        self.tuning.map(|t| t.frame_max).unwrap_or_default()
    }

    /// Buffer the frames and write them out. Socket errors are fatal for the connection.
    fn send(&mut self, frames: &[AMQPFrame]) -> Result<(), ClientError> {
        self.output.append_all(frames)?;
        self.flush()
    }

    fn write_frames(&mut self, frames: &[AMQPFrame]) -> Result<(), ClientError> {
        self.output.append_all(frames)?;

        match self.stream.as_mut() {
            Some(stream) => self.output.flush_to(stream).map_err(|e| ClientError::transport(&e)),
            None => Err(ClientError::closed("Connection is closed")),
        }
    }

    fn flush(&mut self) -> Result<(), ClientError> {
        let result = match self.stream.as_mut() {
            Some(stream) => self.output.flush_to(stream).map_err(|e| ClientError::transport(&e)),
            None => Err(ClientError::closed("Connection is closed")),
        };

        if let Err(e) = &result {
            self.connection_lost(e);
        }

        result
    }

    /// Next complete frame, or `None` if the deadline passed. Heartbeats are sent while
    /// waiting.
    fn next_frame(&mut self, deadline: Option<Instant>) -> Result<Option<AMQPFrame>, ClientError> {
        loop {
            match self.input.next_frame() {
                Ok(Some(frame)) => {
                    trace!("Incoming frame {:?}", frame);

                    return Ok(Some(frame));
                }
                Ok(None) => (),
                Err(e) => return Err(self.protocol_violation(e.into())),
            }

            self.beat()?;

            let now = Instant::now();
            let mut wait = IDLE_READ;

            if let Some(deadline) = deadline {
                if now >= deadline {
                    return Ok(None);
                }

                wait = wait.min(deadline - now);
            }

            if let Some(hb) = &self.heartbeat {
                wait = wait.min(hb.until_due(now).max(Duration::from_millis(1)));
            }

            let stream = match self.stream.as_mut() {
                Some(stream) => stream,
                None => return Err(ClientError::closed("Connection is closed")),
            };

            let read = stream
                .set_read_timeout(Some(wait))
                .and_then(|_| self.input.read_from(stream));

            match read {
                Ok(0) => {
                    let err = ClientError::closed("Connection closed by the broker");

                    self.connection_lost(&err);

                    return Err(err);
                }
                Ok(_) => (),
                Err(e) if is_timeout(&e) => (),
                Err(e) => {
                    let err = ClientError::transport(&e);

                    self.connection_lost(&err);

                    return Err(err);
                }
            }
        }
    }

    /// Send a heartbeat if it is due.
    fn beat(&mut self) -> Result<(), ClientError> {
        let now = Instant::now();

        match &mut self.heartbeat {
            Some(hb) if hb.is_due(now) => hb.reset(now),
            _ => return Ok(()),
        }

        trace!("Sending heartbeat");

        let sent = self.output.append(&frame::heartbeat()).map_err(ClientError::from).and_then(|_| {
            match self.stream.as_mut() {
                Some(stream) => self.output.flush_to(stream).map_err(|e| ClientError::transport(&e)),
                None => Err(ClientError::closed("Connection is closed")),
            }
        });

        match sent {
            Ok(()) => {
                if let Some(callback) = self.heartbeat_callback.clone() {
                    callback(self, self.is_connected());
                }

                Ok(())
            }
            Err(e) => {
                let err = e.with_kind(ErrorKind::Heartbeat);

                self.teardown();

                heartbeat::heartbeat_failed(self.config.heartbeat_failure, &self.error_hook, &err);

                if let Some(callback) = self.heartbeat_callback.clone() {
                    callback(self, false);
                }

                Err(err)
            }
        }
    }

    /// Handle a frame which is not the reply of the current call.
    fn dispatch(&mut self, frame: AMQPFrame) -> Result<(), ClientError> {
        if let AMQPFrame::Heartbeat(_) = frame {
            return Ok(());
        }

        let route = match self.registry.route(&frame) {
            Ok(route) => route,
            Err(e) => return Err(self.protocol_violation(e)),
        };

        match frame {
            AMQPFrame::Method(_, frame::CONNECTION_CLOSE, MethodFrameArgs::ConnectionClose(args)) => {
                let err = ClientError::from_connection_close(&args);

                info!("Broker closes the connection {} {}", err.code, err.message);

                let _ = self.write_frames(&[frame::connection_close_ok()]);

                self.connection_lost(&err);

                Err(err)
            }
            AMQPFrame::Method(ch, frame::CHANNEL_CLOSE, MethodFrameArgs::ChannelClose(args)) => {
                let err = self.accept_channel_close(ch, &args)?;

                self.report(&err);

                Ok(())
            }
            AMQPFrame::Method(ch, frame::CHANNEL_CLOSE_OK, _) => {
                self.release_channel(ch);

                Ok(())
            }
            other => match route {
                Route::Connection => {
                    debug!("Unhandled connection frame {:?}", other);

                    Ok(())
                }
                Route::Channel(_) => match self.channels.handle_frame(other) {
                    Ok(event) => self.handle_event(event),
                    Err(e) => Err(self.protocol_violation(e)),
                },
                Route::Closing(ch) => {
                    trace!("Dropping frame on closing channel {} {:?}", ch, other);

                    Ok(())
                }
            },
        }
    }

    fn handle_event(&mut self, event: Event) -> Result<(), ClientError> {
        match event {
            Event::Delivered(delivery) => self.deliver(delivery),
            Event::Got(delivery, message_count) => {
                self.fetched = Some((delivery, message_count));

                Ok(())
            }
            Event::Returned(message) => {
                warn!(
                    "Message to {}/{} is returned: {} {}",
                    message.exchange, message.routing_key, message.reply_code, message.reply_text
                );

                Ok(())
            }
            Event::InProgress => Ok(()),
            Event::Unhandled(AMQPFrame::Method(ch, frame::BASIC_CANCEL, MethodFrameArgs::BasicCancel(args))) => {
                info!("Broker cancelled consumer {} on channel {}", args.consumer_tag, ch);

                self.remove_consumer(ch, &args.consumer_tag);

                if !args.no_wait {
                    self.send(&[BasicCancelOkArgs::new(&args.consumer_tag).frame(ch)])?;
                }

                Ok(())
            }
            Event::Unhandled(other) => {
                debug!("Unhandled channel frame {:?}", other);

                Ok(())
            }
        }
    }

    fn deliver(&mut self, delivery: Delivery) -> Result<(), ClientError> {
        let key = (delivery.channel, delivery.consumer_tag.clone());

        let (verdict, no_ack) = match self.consumers.get_mut(&key) {
            Some(consumer) => ((consumer.callback)(&delivery), consumer.no_ack),
            None => {
                warn!("Delivery for unknown consumer {} on channel {}", key.1, key.0);

                return Ok(());
            }
        };

        if no_ack {
            return Ok(());
        }

        if let Err(e) = self.send(&[verdict.frame(delivery.channel, delivery.delivery_tag)]) {
            warn!("Cannot settle delivery {}: {}", delivery.delivery_tag, e);

            if !self.is_connected() {
                return Err(e);
            }
        }

        Ok(())
    }

    fn release_channel(&mut self, id: ChannelNumber) {
        self.registry.release(id);
        self.forget_channel(id);
    }

    fn forget_channel(&mut self, id: ChannelNumber) {
        self.channels.drop_channel(id);
        self.consumers.retain(|(ch, _), _| *ch != id);
    }

    /// Close the connection with an error code after the broker violated the protocol.
    fn protocol_violation(&mut self, err: ClientError) -> ClientError {
        let _ = self.write_frames(&[frame::connection_close(err.code, &err.message, err.class_method)]);

        self.connection_lost(&err);

        err
    }

    fn connection_lost(&mut self, err: &ClientError) {
        let was_connected = self.is_connected();

        self.teardown();

        if was_connected {
            self.report(err);
        }
    }

    fn teardown(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
        }

        self.state = ConnectionState::NotConnected;
        self.input.clear();
        self.output.clear();
        self.registry.clear();
        self.channels.clear();
        self.consumers.clear();
        self.heartbeat = None;
        self.tuning = None;
        self.fetched = None;
    }

    #[track_caller]
    fn report(&self, err: &ClientError) {
        (self.error_hook)(&FailureRecord::new(err));
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        if self.is_connected() {
            if let Err(e) = self.disconnect(model::ChannelError::Success as u16, "Normal close") {
                debug!("Disconnect on drop failed {:?}", e);
            }
        }
    }
}

fn is_timeout(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        IoErrorKind::WouldBlock | IoErrorKind::TimedOut | IoErrorKind::Interrupted
    )
}

/// Connect, handshake and disconnect to check that the broker is reachable with the
/// configuration.
pub fn probe(config: &Config) -> Result<()> {
    let mut client = Client::new(config.clone());

    client.connect()?;
    client.disconnect(model::ChannelError::Success as u16, "Probe")
}
