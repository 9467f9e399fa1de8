use burrow_client::{AsyncClient, ClientError, Config, FailurePolicy, FailureRecord};
use burrow_codec::codec::{AMQPCodec, Frame};
use burrow_codec::frame::{self, AMQPFrame, ConnectionStartArgs, ConnectionTuneArgs, MethodFrameArgs};
use futures::{SinkExt, StreamExt};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::DuplexStream;
use tokio_util::codec::Framed;

const RECV_TIMEOUT: Duration = Duration::from_secs(30);

pub fn setup_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Config for in-process connections, heartbeat is off and failures don't kill the test.
pub fn test_config() -> Config {
    Config {
        heartbeat: 0,
        heartbeat_failure: FailurePolicy::Propagate,
        ..Default::default()
    }
}

/// Broker side of an in-memory connection, driven by the test.
pub struct FakeBroker {
    framed: Framed<DuplexStream, AMQPCodec>,
}

#[allow(dead_code)]
impl FakeBroker {
    pub fn new(stream: DuplexStream) -> Self {
        Self {
            framed: Framed::new(stream, AMQPCodec::new()),
        }
    }

    /// Next frame of the client, heartbeats included. `None` if the client closed the stream.
    pub async fn recv_any(&mut self) -> Option<AMQPFrame> {
        match tokio::time::timeout(RECV_TIMEOUT, self.framed.next()).await {
            Ok(Some(Ok(frame))) => Some(frame),
            Ok(Some(Err(e))) => panic!("Broker cannot decode frame {e:?}"),
            Ok(None) => None,
            Err(_) => panic!("No frame from the client"),
        }
    }

    /// Next frame which is not a heartbeat.
    pub async fn recv(&mut self) -> AMQPFrame {
        loop {
            match self.recv_any().await {
                Some(AMQPFrame::Heartbeat(_)) => continue,
                Some(frame) => return frame,
                None => panic!("Client closed the connection"),
            }
        }
    }

    pub async fn send(&mut self, frame: AMQPFrame) {
        self.framed.send(Frame::Frame(frame)).await.unwrap();
    }

    pub async fn send_all(&mut self, frames: Vec<AMQPFrame>) {
        self.framed.send(Frame::Frames(frames)).await.unwrap();
    }

    pub async fn expect_method(&mut self, class_method: u32) -> (u16, MethodFrameArgs) {
        match self.recv().await {
            AMQPFrame::Method(ch, cm, args) if cm == class_method => (ch, args),
            other => panic!("Expected {class_method:08X} got {other:?}"),
        }
    }

    pub async fn handshake(&mut self, heartbeat: u16) {
        assert_eq!(self.recv().await, AMQPFrame::Header);

        self.send(ConnectionStartArgs::new().frame()).await;

        match self.expect_method(frame::CONNECTION_START_OK).await {
            (0, MethodFrameArgs::ConnectionStartOk(args)) => {
                assert_eq!(args.mechanism, "PLAIN");
                assert_eq!(args.response, "\u{0}guest\u{0}guest");
            }
            other => panic!("{other:?}"),
        }

        self.send(
            ConnectionTuneArgs {
                channel_max: 2047,
                frame_max: 131_072,
                heartbeat,
            }
            .frame(),
        )
        .await;

        self.expect_method(frame::CONNECTION_TUNE_OK).await;

        match self.expect_method(frame::CONNECTION_OPEN).await {
            (0, MethodFrameArgs::ConnectionOpen(args)) => assert_eq!(args.virtual_host, "/"),
            other => panic!("{other:?}"),
        }

        self.send(frame::connection_open_ok()).await;
    }

    /// Answer a channel open, returns the channel number.
    pub async fn open_channel(&mut self) -> u16 {
        let (ch, _) = self.expect_method(frame::CHANNEL_OPEN).await;

        self.send(frame::channel_open_ok(ch)).await;

        ch
    }

    pub async fn close_channel(&mut self) -> u16 {
        let (ch, _) = self.expect_method(frame::CHANNEL_CLOSE).await;

        self.send(frame::channel_close_ok(ch)).await;

        ch
    }

    pub async fn close_connection(&mut self) {
        self.expect_method(frame::CONNECTION_CLOSE).await;
        self.send(frame::connection_close_ok()).await;
    }
}

/// Client connected to a fake broker over an in-memory stream.
pub async fn connected(config: Config) -> (AsyncClient, FakeBroker) {
    let heartbeat = config.heartbeat;
    let (client_io, broker_io) = tokio::io::duplex(64 * 1024);
    let client = AsyncClient::new(config);
    let mut broker = FakeBroker::new(broker_io);

    let connecting = {
        let client = client.clone();

        tokio::spawn(async move { client.connect_stream(client_io).await })
    };

    broker.handshake(heartbeat).await;
    connecting.await.unwrap().unwrap();

    (client, broker)
}

/// Collect the failure records the client reports.
pub fn record_failures(client: &AsyncClient) -> Arc<Mutex<Vec<FailureRecord>>> {
    let records = Arc::new(Mutex::new(vec![]));
    let sink = records.clone();

    client.on_error(move |record| sink.lock().unwrap().push(record.clone()));

    records
}

pub fn to_client_error<T: std::fmt::Debug>(result: anyhow::Result<T>) -> ClientError {
    result.unwrap_err().downcast::<ClientError>().unwrap()
}

/// Wait until the client reaches the expected connected state.
pub async fn wait_until<F: Fn() -> bool>(cond: F) {
    for _ in 0..1000 {
        if cond() {
            return;
        }

        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    panic!("Condition is not met in time");
}
