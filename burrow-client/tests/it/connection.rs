use crate::helper::*;
use burrow_client::{AsyncClient, ConnectionState, ErrorKind};
use burrow_codec::frame::{self, AMQPFrame, MethodFrameArgs};
use std::time::Duration;

#[tokio::test]
async fn connect_twice_is_a_usage_error() {
    setup_logger();

    let (client, _broker) = connected(test_config()).await;
    let (other_io, _other_broker) = tokio::io::duplex(1024);

    let err = to_client_error(client.connect_stream(other_io).await);

    assert_eq!(err.kind, ErrorKind::Usage);
    assert!(client.is_connected());

    let err = to_client_error(client.connect().await);

    assert_eq!(err.kind, ErrorKind::Usage);
}

#[tokio::test]
async fn connect_while_connecting_is_a_usage_error() {
    let (client_io, broker_io) = tokio::io::duplex(64 * 1024);
    let client = AsyncClient::new(test_config());
    let mut broker = FakeBroker::new(broker_io);

    let connecting = {
        let client = client.clone();

        tokio::spawn(async move { client.connect_stream(client_io).await })
    };

    // the protocol header arrives once the first connect is in flight
    assert_eq!(broker.recv().await, AMQPFrame::Header);
    assert_eq!(client.state(), ConnectionState::Connecting);

    let (other_io, mut other_broker) = {
        let (a, b) = tokio::io::duplex(1024);

        (a, FakeBroker::new(b))
    };

    let err = to_client_error(client.connect_stream(other_io).await);

    assert_eq!(err.kind, ErrorKind::Usage);

    // the rejected connect didn't write anything
    assert_eq!(other_broker.recv_any().await, None);

    broker.send(frame::ConnectionStartArgs::new().frame()).await;
    broker.expect_method(frame::CONNECTION_START_OK).await;
    broker
        .send(
            frame::ConnectionTuneArgs {
                channel_max: 0,
                frame_max: 0,
                heartbeat: 0,
            }
            .frame(),
        )
        .await;
    broker.expect_method(frame::CONNECTION_TUNE_OK).await;
    broker.expect_method(frame::CONNECTION_OPEN).await;
    broker.send(frame::connection_open_ok()).await;

    connecting.await.unwrap().unwrap();

    assert!(client.is_connected());
}

#[tokio::test]
async fn tuning_takes_the_smaller_limits() {
    let config = test_config();
    let (client, _broker) = connected(config).await;
    let tuning = client.tuning().unwrap();

    assert_eq!(tuning.channel_max, 2047);
    assert_eq!(tuning.frame_max, 131_072);
    assert_eq!(tuning.heartbeat, 0);
}

#[tokio::test]
async fn broker_without_plain_fails_the_connect() {
    let (client_io, broker_io) = tokio::io::duplex(64 * 1024);
    let client = AsyncClient::new(test_config());
    let records = record_failures(&client);
    let mut broker = FakeBroker::new(broker_io);

    let connecting = {
        let client = client.clone();

        tokio::spawn(async move { client.connect_stream(client_io).await })
    };

    assert_eq!(broker.recv().await, AMQPFrame::Header);
    broker
        .send(frame::ConnectionStartArgs::new().mechanisms("AMQPLAIN").frame())
        .await;

    let err = to_client_error(connecting.await.unwrap());

    assert_eq!(err.code, 403);
    assert_eq!(client.state(), ConnectionState::NotConnected);
    assert_eq!(records.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn concurrent_disconnects_share_the_outcome() {
    let (client, mut broker) = connected(test_config()).await;

    let broker_task = tokio::spawn(async move {
        broker.open_channel().await;
        broker.close_channel().await;
        broker.close_connection().await;
        broker
    });

    let channel = client.channel().await.unwrap();

    assert_eq!(channel.id(), 1);

    let other = client.clone();
    let (first, second) = tokio::join!(client.disconnect(200, "Bye"), other.disconnect(200, "Bye"));

    assert!(first.is_ok());
    assert!(second.is_ok());
    assert_eq!(client.state(), ConnectionState::NotConnected);

    broker_task.await.unwrap();
}

#[tokio::test]
async fn concurrent_disconnects_share_the_failure() {
    let (client, mut broker) = connected(test_config()).await;

    let broker_task = tokio::spawn(async move {
        broker.expect_method(frame::CONNECTION_CLOSE).await;
        // connection is dropped instead of close-ok
        drop(broker);
    });

    let other = client.clone();
    let (first, second) = tokio::join!(client.disconnect(200, "Bye"), other.disconnect(200, "Bye"));

    let first = to_client_error(first);
    let second = to_client_error(second);

    assert_eq!(first.kind, ErrorKind::Transport);
    assert_eq!(first.message, second.message);
    assert_eq!(first.code, second.code);
    assert_eq!(client.state(), ConnectionState::NotConnected);

    broker_task.await.unwrap();
}

#[tokio::test]
async fn disconnect_when_not_connected_is_a_usage_error() {
    let client = AsyncClient::new(test_config());

    let err = to_client_error(client.disconnect(200, "Bye").await);

    assert_eq!(err.kind, ErrorKind::Usage);
    assert!(client.close().await.is_ok());
}

#[tokio::test]
async fn abnormal_disconnect_drops_the_channels() {
    let (client, mut broker) = connected(test_config()).await;

    let broker_task = tokio::spawn(async move {
        broker.open_channel().await;

        // no channel close, no connection close, only the end of the stream
        assert_eq!(broker.recv_any().await, None);
    });

    client.channel().await.unwrap();
    client.disconnect(320, "Shutting down").await.unwrap();

    assert_eq!(client.state(), ConnectionState::NotConnected);

    broker_task.await.unwrap();
}

#[tokio::test]
async fn broker_closes_the_connection() {
    let (client, mut broker) = connected(test_config()).await;
    let records = record_failures(&client);

    let broker_task = tokio::spawn(async move {
        let ch = broker.open_channel().await;

        broker.expect_method(frame::QUEUE_DECLARE).await;
        broker.send(frame::connection_close(320, "CONNECTION_FORCED", 0)).await;
        broker.expect_method(frame::CONNECTION_CLOSE_OK).await;

        ch
    });

    let channel = client.channel().await.unwrap();
    let err = to_client_error(channel.queue_declare("orders", None, None).await);

    assert_eq!(err.kind, ErrorKind::Broker);
    assert_eq!(err.code, 320);

    broker_task.await.unwrap();

    wait_until(|| !client.is_connected()).await;

    let records = records.lock().unwrap();

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].code, 320);
    assert_eq!(records[0].kind, ErrorKind::Broker);
}

#[tokio::test]
async fn frame_on_unknown_channel_is_fatal() {
    let (client, mut broker) = connected(test_config()).await;
    let records = record_failures(&client);

    broker.send(frame::channel_open_ok(5)).await;

    match broker.expect_method(frame::CONNECTION_CLOSE).await {
        (0, MethodFrameArgs::ConnectionClose(args)) => assert_eq!(args.code, 504),
        other => panic!("{other:?}"),
    }

    wait_until(|| !client.is_connected()).await;

    let records = records.lock().unwrap();

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].kind, ErrorKind::Protocol);
    assert_eq!(records[0].channel, Some(5));
}

#[tokio::test]
async fn dropped_client_closes_the_connection() {
    let (client, mut broker) = connected(test_config()).await;

    drop(client);

    match broker.expect_method(frame::CONNECTION_CLOSE).await {
        (0, MethodFrameArgs::ConnectionClose(args)) => assert_eq!(args.code, 200),
        other => panic!("{other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn run_stops_the_client_after_the_limit() {
    let (client, mut broker) = connected(test_config()).await;

    let broker_task = tokio::spawn(async move {
        broker.close_connection().await;
    });

    client.run(Some(Duration::from_secs(5))).await.unwrap();

    assert_eq!(client.state(), ConnectionState::NotConnected);

    broker_task.await.unwrap();
}

#[tokio::test]
async fn run_returns_when_the_connection_is_lost() {
    let (client, broker) = connected(test_config()).await;
    let records = record_failures(&client);

    drop(broker);

    client.run(None).await.unwrap();

    assert!(!client.is_connected());
    assert_eq!(records.lock().unwrap()[0].kind, ErrorKind::Transport);
}

#[tokio::test]
async fn reconnect_after_the_connection_is_lost() {
    let (client, broker) = connected(test_config()).await;
    let _records = record_failures(&client);

    drop(broker);
    client.run(None).await.unwrap();

    let (client_io, broker_io) = tokio::io::duplex(64 * 1024);
    let mut broker = FakeBroker::new(broker_io);

    let connecting = {
        let client = client.clone();

        tokio::spawn(async move { client.connect_stream(client_io).await })
    };

    broker.handshake(0).await;
    connecting.await.unwrap().unwrap();

    assert!(client.is_connected());
}
