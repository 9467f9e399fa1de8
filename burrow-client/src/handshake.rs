//! Connection opening as a state machine without I/O. The blocking and the async client
//! feed it with the frames they read and send out what it returns.
use crate::config::Config;
use crate::error::ClientError;
use crate::model::{ClassMethod, ConnectionError};
use burrow_codec::frame::{
    self, AMQPFrame, ConnectionOpenArgs, ConnectionStartArgs, ConnectionStartOkArgs, ConnectionTuneArgs,
    ConnectionTuneOkArgs, MethodFrameArgs,
};
use log::debug;

/// Values agreed with the broker during connection tuning.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Tuning {
    pub frame_max: u32,
    pub channel_max: u16,
    pub heartbeat: u16,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Step {
    Idle,
    WaitStart,
    WaitTune,
    WaitOpenOk,
    Done,
}

#[derive(Debug)]
pub struct Handshake {
    step: Step,
    username: String,
    password: String,
    vhost: String,
    heartbeat: u16,
    channel_max: u16,
    frame_max: u32,
    tuning: Option<Tuning>,
}

impl Handshake {
    pub fn new(config: &Config) -> Self {
        Self {
            step: Step::Idle,
            username: config.username.clone(),
            password: config.password.clone(),
            vhost: config.vhost.clone(),
            heartbeat: config.heartbeat,
            channel_max: config.channel_max,
            frame_max: config.frame_max,
            tuning: None,
        }
    }

    /// The protocol header which opens the conversation.
    pub fn protocol_header(&mut self) -> AMQPFrame {
        self.step = Step::WaitStart;

        AMQPFrame::Header
    }

    /// The method the handshake is waiting for.
    pub fn expected(&self) -> Option<ClassMethod> {
        match self.step {
            Step::WaitStart => Some(frame::CONNECTION_START),
            Step::WaitTune => Some(frame::CONNECTION_TUNE),
            Step::WaitOpenOk => Some(frame::CONNECTION_OPEN_OK),
            Step::Idle | Step::Done => None,
        }
    }

    pub fn is_done(&self) -> bool {
        self.step == Step::Done
    }

    pub fn tuning(&self) -> Option<Tuning> {
        self.tuning
    }

    /// Process a frame of the broker and return the frames to be sent in reply.
    pub fn on_frame(&mut self, frame: AMQPFrame) -> Result<Vec<AMQPFrame>, ClientError> {
        use MethodFrameArgs::*;

        match (self.step, frame) {
            (_, AMQPFrame::Heartbeat(_)) => Ok(vec![]),
            (_, AMQPFrame::Method(_, _, ConnectionClose(args))) => Err(ClientError::from_connection_close(&args)),
            (Step::WaitStart, AMQPFrame::Method(0, _, ConnectionStart(args))) => self.start(args),
            (Step::WaitTune, AMQPFrame::Method(0, _, ConnectionTune(args))) => Ok(self.tune(args)),
            (Step::WaitOpenOk, AMQPFrame::Method(0, _, ConnectionOpenOk)) => {
                debug!("Connection opened on vhost {}", self.vhost);

                self.step = Step::Done;

                Ok(vec![])
            }
            (step, other) => Err(ClientError::protocol(
                ConnectionError::CommandInvalid as u16,
                format!("Unexpected frame {:?} in handshake step {:?}", other, step),
            )),
        }
    }

    fn start(&mut self, args: ConnectionStartArgs) -> Result<Vec<AMQPFrame>, ClientError> {
        if (args.version_major, args.version_minor) != (0, 9) {
            return Err(ClientError::protocol(
                ConnectionError::NotImplemented as u16,
                format!(
                    "Broker speaks AMQP {}-{}, only 0-9 is supported",
                    args.version_major, args.version_minor
                ),
            ));
        }

        if !args.mechanisms.split(' ').any(|m| m == "PLAIN") {
            return Err(ClientError::protocol(
                ConnectionError::AccessRefused as u16,
                format!("Broker doesn't offer PLAIN authentication: {}", args.mechanisms),
            ));
        }

        self.step = Step::WaitTune;

        Ok(vec![ConnectionStartOkArgs::new(&self.username, &self.password).frame()])
    }

    fn tune(&mut self, args: ConnectionTuneArgs) -> Vec<AMQPFrame> {
        let frame_max = match (self.frame_max, args.frame_max) {
            (0, offered) => offered,
            (proposed, 0) => proposed,
            (proposed, offered) => proposed.min(offered),
        };

        let channel_max = match args.channel_max {
            0 => self.channel_max,
            offered => offered.min(self.channel_max),
        };

        let tuning = Tuning {
            frame_max,
            channel_max,
            heartbeat: self.heartbeat,
        };

        debug!("Connection tuned {:?}", tuning);

        self.tuning = Some(tuning);
        self.step = Step::WaitOpenOk;

        vec![
            ConnectionTuneOkArgs {
                channel_max,
                frame_max,
                heartbeat: self.heartbeat,
            }
            .frame(),
            ConnectionOpenArgs::default().virtual_host(&self.vhost).frame(),
        ]
    }
}
