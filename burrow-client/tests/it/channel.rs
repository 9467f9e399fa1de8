use crate::helper::*;
use burrow_client::{Config, ErrorKind, ExchangeType, QueueDeclareFlags};
use burrow_codec::frame::{self, AMQPFrame, ChannelCloseArgs, MethodFrameArgs, QueueDeclareOkArgs};

#[tokio::test]
async fn channels_get_the_lowest_free_number() {
    let (client, mut broker) = connected(test_config()).await;

    let broker_task = tokio::spawn(async move {
        for _ in 0..3 {
            broker.open_channel().await;
        }

        assert_eq!(broker.close_channel().await, 2);
        assert_eq!(broker.open_channel().await, 2);
    });

    let one = client.channel().await.unwrap();
    let two = client.channel().await.unwrap();
    let three = client.channel().await.unwrap();

    assert_eq!((one.id(), two.id(), three.id()), (1, 2, 3));

    two.close().await.unwrap();

    assert_eq!(client.channel().await.unwrap().id(), 2);

    broker_task.await.unwrap();
}

#[tokio::test]
async fn replies_are_matched_in_order() {
    let (client, mut broker) = connected(test_config()).await;

    let broker_task = tokio::spawn(async move {
        let ch = broker.open_channel().await;
        let mut names = vec![];

        for _ in 0..2 {
            match broker.expect_method(frame::QUEUE_DECLARE).await {
                (_, MethodFrameArgs::QueueDeclare(args)) => names.push(args.name),
                other => panic!("{other:?}"),
            }
        }

        for name in names {
            broker.send(QueueDeclareOkArgs::default().name(&name).frame(ch)).await;
        }
    });

    let channel = client.channel().await.unwrap();
    let (first, second) = tokio::join!(
        channel.queue_declare("first", None, None),
        channel.queue_declare("second", None, None)
    );

    assert_eq!(first.unwrap().name, "first");
    assert_eq!(second.unwrap().name, "second");

    broker_task.await.unwrap();
}

#[tokio::test]
async fn broker_closes_the_channel() {
    let (client, mut broker) = connected(test_config()).await;
    let records = record_failures(&client);

    let broker_task = tokio::spawn(async move {
        let ch = broker.open_channel().await;

        broker.expect_method(frame::QUEUE_DECLARE).await;
        broker
            .send(frame::channel_close(ch, 404, "NOT_FOUND - no queue 'missing'", frame::QUEUE_DECLARE))
            .await;

        let (closed, _) = broker.expect_method(frame::CHANNEL_CLOSE_OK).await;

        assert_eq!(closed, ch);

        // the number is free again
        assert_eq!(broker.open_channel().await, ch);
    });

    let channel = client.channel().await.unwrap();
    let err = to_client_error(
        channel
            .queue_declare("missing", Some(QueueDeclareFlags::PASSIVE), None)
            .await,
    );

    assert_eq!(err.kind, ErrorKind::Broker);
    assert_eq!(err.code, 404);
    assert_eq!(err.channel, Some(1));
    assert_eq!(err.class_method, frame::QUEUE_DECLARE);

    let again = client.channel().await.unwrap();

    assert_eq!(again.id(), 1);
    assert!(client.is_connected());

    broker_task.await.unwrap();

    // the failure went back to the caller, nothing to report
    assert!(records.lock().unwrap().is_empty());
}

#[tokio::test]
async fn unsolicited_channel_close_is_reported() {
    let (client, mut broker) = connected(test_config()).await;
    let records = record_failures(&client);

    let (channel, ch) = tokio::join!(client.channel(), broker.open_channel());

    assert_eq!(channel.unwrap().id(), ch);

    broker
        .send(
            ChannelCloseArgs {
                code: 406,
                text: "PRECONDITION_FAILED".into(),
                class_id: 0,
                method_id: 0,
            }
            .frame(ch),
        )
        .await;

    broker.expect_method(frame::CHANNEL_CLOSE_OK).await;

    wait_until(|| !records.lock().unwrap().is_empty()).await;

    let records = records.lock().unwrap();

    assert_eq!(records[0].code, 406);
    assert_eq!(records[0].channel, Some(ch));
    assert!(client.is_connected());
}

#[tokio::test]
async fn crossing_close_keeps_the_number_until_close_ok() {
    let (client, mut broker) = connected(test_config()).await;
    let records = record_failures(&client);

    let (channel, ch) = tokio::join!(client.channel(), broker.open_channel());
    let channel = channel.unwrap();

    let (closed, _) = tokio::join!(channel.close(), async {
        broker.expect_method(frame::CHANNEL_CLOSE).await;
        broker
            .send(frame::channel_close(ch, 406, "PRECONDITION_FAILED - unknown delivery tag 7", frame::BASIC_ACK))
            .await;

        let (answered, _) = broker.expect_method(frame::CHANNEL_CLOSE_OK).await;

        assert_eq!(answered, ch);
    });

    let err = to_client_error(closed);

    assert_eq!(err.kind, ErrorKind::Broker);
    assert_eq!(err.code, 406);

    // the close-ok for our close is still due, the number is not handed out
    let (next, next_ch) = tokio::join!(client.channel(), broker.open_channel());
    let next = next.unwrap();

    assert_eq!(next.id(), 2);
    assert_eq!(next_ch, 2);

    broker.send(frame::channel_close_ok(ch)).await;

    let (declared, _) = tokio::join!(next.queue_declare("after", None, None), async {
        broker.expect_method(frame::QUEUE_DECLARE).await;
        broker.send(QueueDeclareOkArgs::default().name("after").frame(2)).await;
    });

    assert_eq!(declared.unwrap().name, "after");

    // the late close-ok freed the number
    let (again, again_ch) = tokio::join!(client.channel(), broker.open_channel());

    assert_eq!(again.unwrap().id(), ch);
    assert_eq!(again_ch, ch);
    assert!(client.is_connected());
    assert!(records.lock().unwrap().is_empty());
}

#[tokio::test]
async fn operation_on_closed_channel_fails_without_io() {
    let (client, mut broker) = connected(test_config()).await;

    let broker_task = tokio::spawn(async move {
        broker.open_channel().await;
        broker.close_channel().await;
        broker
    });

    let channel = client.channel().await.unwrap();
    let copy = channel.clone();

    channel.close().await.unwrap();

    let err = to_client_error(copy.queue_declare("orders", None, None).await);

    assert_eq!(err.kind, ErrorKind::Usage);

    broker_task.await.unwrap();
}

#[tokio::test]
async fn declare_bind_and_publish() {
    let (client, mut broker) = connected(test_config()).await;

    let broker_task = tokio::spawn(async move {
        let ch = broker.open_channel().await;

        match broker.expect_method(frame::EXCHANGE_DECLARE).await {
            (_, MethodFrameArgs::ExchangeDeclare(args)) => {
                assert_eq!(args.exchange_name, "orders");
                assert_eq!(args.exchange_type, "direct");
                assert!(args.flags.contains(frame::ExchangeDeclareFlags::DURABLE));
            }
            other => panic!("{other:?}"),
        }
        broker.send(frame::exchange_declare_ok(ch)).await;

        broker.expect_method(frame::QUEUE_DECLARE).await;
        broker.send(QueueDeclareOkArgs::default().name("orders-q").frame(ch)).await;

        match broker.expect_method(frame::QUEUE_BIND).await {
            (_, MethodFrameArgs::QueueBind(args)) => {
                assert_eq!(args.queue_name, "orders-q");
                assert_eq!(args.exchange_name, "orders");
                assert_eq!(args.routing_key, "orders-q");
            }
            other => panic!("{other:?}"),
        }
        broker.send(frame::queue_bind_ok(ch)).await;

        match broker.expect_method(frame::BASIC_PUBLISH).await {
            (_, MethodFrameArgs::BasicPublish(args)) => {
                assert_eq!(args.exchange_name, "orders");
                assert_eq!(args.routing_key, "orders-q");
            }
            other => panic!("{other:?}"),
        }

        match broker.recv().await {
            AMQPFrame::ContentHeader(header) => {
                assert_eq!(header.body_size, 5);
                assert_eq!(header.content_type.as_deref(), Some("text/plain"));
                assert_eq!(header.delivery_mode, Some(2));
            }
            other => panic!("{other:?}"),
        }

        match broker.recv().await {
            AMQPFrame::ContentBody(body) => assert_eq!(body.body, b"hello"),
            other => panic!("{other:?}"),
        }
    });

    let channel = client.channel().await.unwrap();

    channel
        .exchange_declare(
            "orders",
            ExchangeType::Direct,
            Some(frame::ExchangeDeclareFlags::DURABLE),
            None,
        )
        .await
        .unwrap();

    let queue = channel
        .queue_declare("orders-q", Some(QueueDeclareFlags::DURABLE), None)
        .await
        .unwrap();

    assert_eq!(queue.name, "orders-q");

    channel
        .queue_bind("orders-q", "orders", "orders-q", false, None)
        .await
        .unwrap();

    let properties = burrow_client::MessageProperties::default()
        .content_type("text/plain")
        .delivery_mode(burrow_client::DeliveryMode::Persistent);

    channel
        .basic_publish("orders", "orders-q", b"hello", &properties, false, false)
        .await
        .unwrap();

    broker_task.await.unwrap();
}

#[tokio::test]
async fn large_body_is_split_by_frame_max() {
    let config = Config {
        frame_max: 4096,
        ..test_config()
    };
    let (client, mut broker) = connected(config).await;
    let body = vec![b'x'; 10_000];

    let broker_task = tokio::spawn(async move {
        broker.open_channel().await;
        broker.expect_method(frame::BASIC_PUBLISH).await;

        assert!(matches!(broker.recv().await, AMQPFrame::ContentHeader(h) if h.body_size == 10_000));

        let mut sizes = vec![];

        while sizes.iter().sum::<usize>() < 10_000 {
            match broker.recv().await {
                AMQPFrame::ContentBody(body) => sizes.push(body.body.len()),
                other => panic!("{other:?}"),
            }
        }

        sizes
    });

    let channel = client.channel().await.unwrap();

    assert_eq!(client.tuning().unwrap().frame_max, 4096);

    channel
        .basic_publish("", "big", &body, &Default::default(), false, false)
        .await
        .unwrap();

    let sizes = broker_task.await.unwrap();

    assert_eq!(sizes, vec![4088, 4088, 1824]);
}
