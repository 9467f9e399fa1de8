use crate::helper::setup_logger;
use burrow_client::blocking::{self, Client};
use burrow_client::descriptor::{self, MessageDescriptor};
use burrow_client::{Config, ConnectionState, ErrorKind, FailurePolicy, MessageProperties, Verdict};
use burrow_codec::codec::{AMQPCodec, Frame};
use burrow_codec::frame::{
    self, AMQPFrame, BasicConsumeOkArgs, BasicDeliverArgs, BasicGetOkArgs, ConnectionStartArgs, ConnectionTuneArgs,
    ContentHeaderFrame, MethodFrameArgs, QueueDeclareOkArgs,
};
use bytes::BytesMut;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio_util::codec::{Decoder, Encoder};

struct BlockingBroker {
    stream: TcpStream,
    codec: AMQPCodec,
    input: BytesMut,
}

impl BlockingBroker {
    fn recv_any(&mut self) -> Option<AMQPFrame> {
        loop {
            if let Some(frame) = self.codec.decode(&mut self.input).unwrap() {
                return Some(frame);
            }

            let mut buf = [0u8; 4096];
            let n = self.stream.read(&mut buf).unwrap();

            if n == 0 {
                return None;
            }

            self.input.extend_from_slice(&buf[..n]);
        }
    }

    fn recv(&mut self) -> AMQPFrame {
        loop {
            match self.recv_any() {
                Some(AMQPFrame::Heartbeat(_)) => continue,
                Some(frame) => return frame,
                None => panic!("Client closed the connection"),
            }
        }
    }

    fn send(&mut self, frames: Vec<AMQPFrame>) {
        let mut buf = BytesMut::new();

        self.codec.encode(Frame::Frames(frames), &mut buf).unwrap();
        self.stream.write_all(&buf).unwrap();
    }

    fn expect_method(&mut self, class_method: u32) -> (u16, MethodFrameArgs) {
        match self.recv() {
            AMQPFrame::Method(ch, cm, args) if cm == class_method => (ch, args),
            other => panic!("Expected {class_method:08X} got {other:?}"),
        }
    }

    fn handshake(&mut self, heartbeat: u16) {
        assert_eq!(self.recv(), AMQPFrame::Header);

        self.send(vec![ConnectionStartArgs::new().frame()]);
        self.expect_method(frame::CONNECTION_START_OK);
        self.send(vec![ConnectionTuneArgs {
            channel_max: 2047,
            frame_max: 131_072,
            heartbeat,
        }
        .frame()]);
        self.expect_method(frame::CONNECTION_TUNE_OK);
        self.expect_method(frame::CONNECTION_OPEN);
        self.send(vec![frame::connection_open_ok()]);
    }

    fn open_channel(&mut self) -> u16 {
        let (ch, _) = self.expect_method(frame::CHANNEL_OPEN);

        self.send(vec![frame::channel_open_ok(ch)]);

        ch
    }

    fn close_channel(&mut self) -> u16 {
        let (ch, _) = self.expect_method(frame::CHANNEL_CLOSE);

        self.send(vec![frame::channel_close_ok(ch)]);

        ch
    }

    fn close_connection(&mut self) {
        self.expect_method(frame::CONNECTION_CLOSE);
        self.send(vec![frame::connection_close_ok()]);
    }

    fn message(&mut self, method: AMQPFrame, body: &str) {
        let ch = method.channel();
        let mut frames = vec![method];

        frames.extend(frame::content_frames(
            ch,
            ContentHeaderFrame::default().with_content_type("text/plain"),
            body.as_bytes(),
            0,
        ));

        self.send(frames);
    }
}

/// Start a broker thread which accepts one connection, performs the handshake and runs the
/// script.
fn spawn_broker<F>(heartbeat: u16, script: F) -> (Config, JoinHandle<()>)
where
    F: FnOnce(&mut BlockingBroker) + Send + 'static,
{
    setup_logger();

    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let handle = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();

        stream.set_read_timeout(Some(Duration::from_secs(30))).unwrap();

        let mut broker = BlockingBroker {
            stream,
            codec: AMQPCodec::new(),
            input: BytesMut::new(),
        };

        broker.handshake(heartbeat);
        script(&mut broker);
    });

    let config = Config {
        host: "127.0.0.1".into(),
        port,
        heartbeat,
        heartbeat_failure: FailurePolicy::Propagate,
        ..Default::default()
    };

    (config, handle)
}

#[test]
fn connect_and_disconnect() {
    let (config, broker) = spawn_broker(0, |broker| {
        broker.close_connection();
    });

    let mut client = Client::new(config);

    client.connect().unwrap();

    assert!(client.is_connected());
    assert_eq!(client.tuning().unwrap().channel_max, 2047);

    let err = client.connect().unwrap_err().downcast::<burrow_client::ClientError>().unwrap();

    assert_eq!(err.kind, ErrorKind::Usage);

    client.disconnect(200, "Bye").unwrap();

    assert_eq!(client.state(), ConnectionState::NotConnected);

    broker.join().unwrap();
}

#[test]
fn publish_and_get() {
    let (config, broker) = spawn_broker(0, |broker| {
        let ch = broker.open_channel();

        broker.expect_method(frame::QUEUE_DECLARE);
        broker.send(vec![QueueDeclareOkArgs::default().name("orders-q").frame(ch)]);

        broker.expect_method(frame::BASIC_PUBLISH);

        let body = match (broker.recv(), broker.recv()) {
            (AMQPFrame::ContentHeader(header), AMQPFrame::ContentBody(body)) => {
                assert_eq!(header.content_type.as_deref(), Some("text/plain"));
                body.body
            }
            other => panic!("{other:?}"),
        };

        match broker.expect_method(frame::BASIC_GET) {
            (_, MethodFrameArgs::BasicGet(args)) => assert_eq!(args.queue, "orders-q"),
            other => panic!("{other:?}"),
        }

        broker.message(
            BasicGetOkArgs::new(7, "")
                .routing_key("orders-q")
                .message_count(0)
                .frame(ch),
            std::str::from_utf8(&body).unwrap(),
        );

        match broker.expect_method(frame::BASIC_ACK) {
            (_, MethodFrameArgs::BasicAck(args)) => assert_eq!(args.delivery_tag, 7),
            other => panic!("{other:?}"),
        }

        broker.expect_method(frame::BASIC_GET);
        broker.send(vec![frame::basic_get_empty(ch)]);

        broker.close_channel();
        broker.close_connection();
    });

    let mut client = Client::new(config);

    client.connect().unwrap();

    {
        let mut channel = client.open_channel().unwrap();

        channel.queue_declare("orders-q", None, None).unwrap();
        channel
            .basic_publish(
                "",
                "orders-q",
                b"hello",
                &MessageProperties::default().content_type("text/plain"),
                false,
                false,
            )
            .unwrap();

        let message = channel.basic_get("orders-q", false).unwrap().unwrap();

        assert_eq!(message.body, b"hello");
        assert_eq!(message.delivery_tag, 7);

        channel.ack(&message).unwrap();

        assert!(channel.basic_get("orders-q", false).unwrap().is_none());
    }

    client.close().unwrap();
    broker.join().unwrap();
}

#[test]
fn consume_with_process_events() {
    let (config, broker) = spawn_broker(0, |broker| {
        let ch = broker.open_channel();

        broker.expect_method(frame::BASIC_CONSUME);
        broker.send(vec![BasicConsumeOkArgs::new("ctag").frame(ch)]);

        broker.message(BasicDeliverArgs::new("ctag", 1, "orders").frame(ch), "ack");
        broker.message(BasicDeliverArgs::new("ctag", 2, "orders").frame(ch), "maybe");

        assert!(matches!(broker.recv(), AMQPFrame::Method(_, frame::BASIC_ACK, _)));
        assert!(matches!(broker.recv(), AMQPFrame::Method(_, frame::BASIC_REJECT, _)));

        broker.close_channel();
        broker.close_connection();
    });

    let bodies = Arc::new(Mutex::new(vec![]));
    let sink = bodies.clone();
    let mut client = Client::new(config);

    client.connect().unwrap();

    let channel_id = {
        let mut channel = client.open_channel().unwrap();

        channel
            .basic_consume("orders-q", "ctag", None, None, move |delivery| {
                let word = delivery.body_str().unwrap_or_default().to_string();

                sink.lock().unwrap().push(word.clone());

                Verdict::from(word.as_str())
            })
            .unwrap();

        channel.id()
    };

    while bodies.lock().unwrap().len() < 2 {
        client.process_events(Duration::from_millis(100)).unwrap();
    }

    client.channel(channel_id).unwrap().close().unwrap();
    client.close().unwrap();

    broker.join().unwrap();

    assert_eq!(*bodies.lock().unwrap(), vec!["ack".to_string(), "maybe".to_string()]);
}

#[test]
fn broker_channel_close_fails_the_call() {
    let (config, broker) = spawn_broker(0, |broker| {
        let ch = broker.open_channel();

        broker.expect_method(frame::EXCHANGE_DECLARE);
        broker.send(vec![frame::channel_close(ch, 406, "PRECONDITION_FAILED", frame::EXCHANGE_DECLARE)]);
        broker.expect_method(frame::CHANNEL_CLOSE_OK);

        assert_eq!(broker.open_channel(), ch);

        broker.close_channel();
        broker.close_connection();
    });

    let mut client = Client::new(config);

    client.connect().unwrap();

    let err = client
        .open_channel()
        .unwrap()
        .exchange_declare("orders", burrow_client::ExchangeType::Fanout, None, None)
        .unwrap_err()
        .downcast::<burrow_client::ClientError>()
        .unwrap();

    assert_eq!(err.kind, ErrorKind::Broker);
    assert_eq!(err.code, 406);
    assert!(client.is_connected());

    let channel = client.open_channel().unwrap();

    assert_eq!(channel.id(), 1);

    channel.close().unwrap();
    client.close().unwrap();

    broker.join().unwrap();
}

#[test]
fn channel_close_elsewhere_does_not_fail_the_call() {
    let (config, broker) = spawn_broker(0, |broker| {
        let first = broker.open_channel();
        let second = broker.open_channel();

        broker.expect_method(frame::QUEUE_DECLARE);
        broker.send(vec![
            frame::channel_close(second, 406, "PRECONDITION_FAILED - unknown delivery tag 3", frame::BASIC_ACK),
            QueueDeclareOkArgs::default().name("orders").frame(first),
        ]);

        let (closed, _) = broker.expect_method(frame::CHANNEL_CLOSE_OK);

        assert_eq!(closed, second);

        // only the first channel is left to close
        assert_eq!(broker.close_channel(), first);
        broker.close_connection();
    });

    let records = Arc::new(Mutex::new(vec![]));
    let sink = records.clone();
    let mut client = Client::new(config).with_error_hook(move |record| sink.lock().unwrap().push(record.clone()));

    client.connect().unwrap();

    let first = client.open_channel().unwrap().id();
    let second = client.open_channel().unwrap().id();

    let declared = client
        .channel(first)
        .unwrap()
        .queue_declare("orders", None, None)
        .unwrap();

    assert_eq!(declared.name, "orders");

    {
        let records = records.lock().unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].code, 406);
        assert_eq!(records[0].channel, Some(second));
    }

    assert!(client.channel(second).is_err());

    client.close().unwrap();

    broker.join().unwrap();
}

#[test]
fn crossing_close_keeps_the_number_until_close_ok() {
    let (config, broker) = spawn_broker(0, |broker| {
        let ch = broker.open_channel();

        broker.expect_method(frame::CHANNEL_CLOSE);
        broker.send(vec![frame::channel_close(ch, 406, "PRECONDITION_FAILED", frame::BASIC_ACK)]);
        broker.expect_method(frame::CHANNEL_CLOSE_OK);

        let (next, _) = broker.expect_method(frame::CHANNEL_OPEN);

        assert_eq!(next, 2);

        // the close-ok of the client's close arrives late
        broker.send(vec![frame::channel_close_ok(ch), frame::channel_open_ok(next)]);

        assert_eq!(broker.open_channel(), ch);

        broker.close_channel();
        broker.close_channel();
        broker.close_connection();
    });

    let records = Arc::new(Mutex::new(vec![]));
    let sink = records.clone();
    let mut client = Client::new(config).with_error_hook(move |record| sink.lock().unwrap().push(record.clone()));

    client.connect().unwrap();

    let err = client
        .open_channel()
        .unwrap()
        .close()
        .unwrap_err()
        .downcast::<burrow_client::ClientError>()
        .unwrap();

    assert_eq!(err.kind, ErrorKind::Broker);
    assert_eq!(err.code, 406);

    assert_eq!(client.open_channel().unwrap().id(), 2);
    assert_eq!(client.open_channel().unwrap().id(), 1);

    client.close().unwrap();

    broker.join().unwrap();

    assert!(records.lock().unwrap().is_empty());
}

#[test]
fn heartbeats_are_sent_while_processing_events() {
    let on_wire = Arc::new(AtomicUsize::new(0));
    let counter = on_wire.clone();

    let (config, broker) = spawn_broker(1, move |broker| {
        loop {
            match broker.recv_any() {
                Some(AMQPFrame::Heartbeat(_)) => {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
                Some(AMQPFrame::Method(_, frame::CONNECTION_CLOSE, _)) => {
                    broker.send(vec![frame::connection_close_ok()]);
                    break;
                }
                other => panic!("{other:?}"),
            }
        }
    });

    let callbacks = Arc::new(AtomicUsize::new(0));
    let seen = callbacks.clone();
    let mut client = Client::new(config).with_heartbeat_callback(move |client, connected| {
        assert!(connected);
        assert!(client.is_connected());

        seen.fetch_add(1, Ordering::SeqCst);
    });

    client.connect().unwrap();
    client.run(Some(Duration::from_millis(2_500))).unwrap();

    assert!(!client.is_connected());

    broker.join().unwrap();

    assert!((1..=3).contains(&on_wire.load(Ordering::SeqCst)));
    assert!((1..=3).contains(&callbacks.load(Ordering::SeqCst)));
}

#[test]
fn lost_connection_is_reported() {
    let (config, broker) = spawn_broker(0, |_broker| {});

    let records = Arc::new(Mutex::new(vec![]));
    let sink = records.clone();
    let mut client = Client::new(config).with_error_hook(move |record| sink.lock().unwrap().push(record.clone()));

    client.connect().unwrap();
    broker.join().unwrap();

    let err = client
        .process_events(Duration::from_secs(5))
        .unwrap_err()
        .downcast::<burrow_client::ClientError>()
        .unwrap();

    assert_eq!(err.kind, ErrorKind::Transport);
    assert_eq!(client.state(), ConnectionState::NotConnected);
    assert_eq!(records.lock().unwrap().len(), 1);
}

#[test]
fn produce_workflow() {
    let (config, broker) = spawn_broker(0, |broker| {
        let ch = broker.open_channel();

        match broker.expect_method(frame::EXCHANGE_DECLARE) {
            (_, MethodFrameArgs::ExchangeDeclare(args)) => {
                assert_eq!(args.exchange_name, "orders");
                assert_eq!(args.exchange_type, "direct");
                assert!(args.flags.contains(frame::ExchangeDeclareFlags::DURABLE));
            }
            other => panic!("{other:?}"),
        }
        broker.send(vec![frame::exchange_declare_ok(ch)]);

        broker.expect_method(frame::QUEUE_DECLARE);
        broker.send(vec![QueueDeclareOkArgs::default().name("orders").frame(ch)]);
        broker.expect_method(frame::QUEUE_BIND);
        broker.send(vec![frame::queue_bind_ok(ch)]);

        broker.expect_method(frame::BASIC_PUBLISH);

        match broker.recv() {
            AMQPFrame::ContentHeader(header) => assert_eq!(header.delivery_mode, Some(2)),
            other => panic!("{other:?}"),
        }

        assert!(matches!(broker.recv(), AMQPFrame::ContentBody(b) if b.body == b"hello"));

        broker.close_channel();
        broker.close_connection();
    });

    let mut client = Client::new(config);
    let desc = MessageDescriptor::new("orders").body("hello");

    descriptor::produce(&mut client, &desc, true).unwrap();

    assert!(!client.is_connected());

    broker.join().unwrap();
}

#[test]
fn probe_reports_unreachable_broker() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();

        listener.local_addr().unwrap().port()
    };

    let config = Config {
        host: "127.0.0.1".into(),
        port,
        timeout: 1,
        ..Default::default()
    };

    let err = blocking::probe(&config)
        .unwrap_err()
        .downcast::<burrow_client::ClientError>()
        .unwrap();

    assert_eq!(err.kind, ErrorKind::Transport);
}

#[test]
fn probe_connects_and_disconnects() {
    let (config, broker) = spawn_broker(0, |broker| {
        broker.close_connection();
    });

    blocking::probe(&config).unwrap();
    broker.join().unwrap();
}
