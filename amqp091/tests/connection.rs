//! Connection- and channel-level behavior against a scripted broker.

mod common;

use std::time::Duration;

use amqp091::{
    Connection, ConnectionOptions, ConsumeOptions, Error, OpenError, Properties,
    QueueDeclareOptions,
};
use amqp091_types::{FieldValue, Method};
use common::TestBroker;
use tokio::sync::mpsc;

#[tokio::test]
async fn handshake_negotiates_and_closes_gracefully() {
    let (broker, url) = TestBroker::bind().await;
    let broker = tokio::spawn(async move {
        let mut session = broker.accept_with(2047, 8192, 30).await;
        assert_eq!(session.tuned, (2047, 8192, 30));
        session.expect_connection_close().await;
    });

    let connection = Connection::open_with(&url, ConnectionOptions::new().heartbeat(60))
        .await
        .unwrap();
    assert_eq!(connection.channel_max(), 2047);
    assert_eq!(connection.frame_max(), 8192);
    assert_eq!(connection.heartbeat(), 30);

    connection.close().await.unwrap();
    connection.closed().await;
    assert_eq!(connection.closed_reason().unwrap().code, 200);
    broker.await.unwrap();
}

#[tokio::test]
async fn bad_credentials_surface_as_refused() {
    let (broker, url) = TestBroker::bind().await;
    let broker = tokio::spawn(async move {
        let mut session = broker.accept_until_start_ok().await;
        session
            .send_method(
                0,
                Method::ConnectionClose {
                    reply_code: 403,
                    reply_text: "ACCESS_REFUSED".into(),
                    class_id: 0,
                    method_id: 0,
                },
            )
            .await;
        match session.expect_method(0).await {
            Method::ConnectionCloseOk => {}
            method => panic!("expected close-ok, got {method:?}"),
        }
    });

    match Connection::open(&url).await {
        Err(OpenError::Refused(reason)) => {
            assert_eq!(reason.code, 403);
            assert_eq!(reason.reason, "ACCESS_REFUSED");
        }
        other => panic!("expected a refusal, got {other:?}"),
    }
    broker.await.unwrap();
}

#[tokio::test]
async fn channel_ids_ascend_and_are_reusable_after_close() {
    let (broker, url) = TestBroker::bind().await;
    let broker = tokio::spawn(async move {
        let mut session = broker.accept().await;
        session.expect_channel_open(1).await;
        session.expect_channel_open(2).await;
        match session.expect_method(1).await {
            Method::ChannelClose { reply_code: 200, .. } => {}
            method => panic!("expected channel.close, got {method:?}"),
        }
        session.send_method(1, Method::ChannelCloseOk).await;
        session.expect_channel_open(1).await;
    });

    let connection = Connection::open(&url).await.unwrap();
    let first = connection.channel().await.unwrap();
    let second = connection.channel().await.unwrap();
    assert_eq!(first.id(), 1);
    assert_eq!(second.id(), 2);

    first.close().await.unwrap();
    let reused = connection.channel().await.unwrap();
    assert_eq!(reused.id(), 1);

    assert!(matches!(
        connection.channel_with_id(0).await,
        Err(Error::Argument(_))
    ));
    broker.await.unwrap();
}

#[tokio::test]
async fn queue_declare_roundtrips_the_reply() {
    let (broker, url) = TestBroker::bind().await;
    let broker = tokio::spawn(async move {
        let mut session = broker.accept().await;
        session.expect_channel_open(1).await;
        match session.expect_method(1).await {
            Method::QueueDeclare {
                queue,
                durable,
                exclusive,
                auto_delete,
                ..
            } => {
                assert_eq!(queue, "q1");
                assert!(!durable);
                assert!(exclusive);
                assert!(auto_delete);
            }
            method => panic!("expected queue.declare, got {method:?}"),
        }
        session
            .send_method(
                1,
                Method::QueueDeclareOk {
                    queue: "q1".into(),
                    message_count: 3,
                    consumer_count: 1,
                },
            )
            .await;
    });

    let connection = Connection::open(&url).await.unwrap();
    let channel = connection.channel().await.unwrap();
    let ok = channel
        .queue_declare(
            "q1",
            QueueDeclareOptions {
                exclusive: true,
                auto_delete: true,
                ..QueueDeclareOptions::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(ok.queue, "q1");
    assert_eq!(ok.message_count, 3);
    assert_eq!(ok.consumer_count, 1);
    broker.await.unwrap();
}

#[tokio::test]
async fn publish_splits_bodies_at_the_frame_boundary() {
    let (broker, url) = TestBroker::bind().await;
    let broker = tokio::spawn(async move {
        let mut session = broker.accept_with(2047, 4096, 0).await;
        session.expect_channel_open(1).await;

        // Exactly frame_max - 8 bytes: one body frame.
        match session.expect_method(1).await {
            Method::BasicPublish { routing_key, .. } => assert_eq!(routing_key, "q1"),
            method => panic!("expected basic.publish, got {method:?}"),
        }
        let (body, chunks) = session.read_content(1).await;
        assert_eq!(body.len(), 4088);
        assert_eq!(chunks, vec![4088]);

        // One byte more: two body frames that concatenate to the original.
        match session.expect_method(1).await {
            Method::BasicPublish { .. } => {}
            method => panic!("expected basic.publish, got {method:?}"),
        }
        let (body, chunks) = session.read_content(1).await;
        assert_eq!(body, vec![7u8; 4089]);
        assert_eq!(chunks, vec![4088, 1]);

        // Empty body: header only, no body frame. The next frame the
        // broker sees is already the following publish.
        match session.expect_method(1).await {
            Method::BasicPublish { .. } => {}
            method => panic!("expected basic.publish, got {method:?}"),
        }
        let (body, chunks) = session.read_content(1).await;
        assert!(body.is_empty());
        assert!(chunks.is_empty());
        match session.expect_method(1).await {
            Method::BasicPublish { routing_key, .. } => assert_eq!(routing_key, "sentinel"),
            method => panic!("expected basic.publish, got {method:?}"),
        }
        let (body, _) = session.read_content(1).await;
        assert_eq!(body, b"x");
    });

    let connection = Connection::open(&url).await.unwrap();
    assert_eq!(connection.frame_max(), 4096);
    let channel = connection.channel().await.unwrap();

    channel
        .basic_publish(vec![5u8; 4088], "", "q1", Properties::new(), false)
        .await
        .unwrap();
    channel
        .basic_publish(vec![7u8; 4089], "", "q1", Properties::new(), false)
        .await
        .unwrap();
    channel
        .basic_publish("", "", "q1", Properties::new(), false)
        .await
        .unwrap();
    channel
        .basic_publish("x", "", "sentinel", Properties::new(), false)
        .await
        .unwrap();
    broker.await.unwrap();
}

#[tokio::test]
async fn confirms_track_acks_nacks_and_multiple() {
    let (broker, url) = TestBroker::bind().await;
    let broker = tokio::spawn(async move {
        let mut session = broker.accept().await;
        session.expect_channel_open(1).await;
        match session.expect_method(1).await {
            Method::ConfirmSelect { no_wait: false } => {}
            method => panic!("expected confirm.select, got {method:?}"),
        }
        session.send_method(1, Method::ConfirmSelectOk).await;

        for _ in 0..2 {
            match session.expect_method(1).await {
                Method::BasicPublish { .. } => {}
                method => panic!("expected basic.publish, got {method:?}"),
            }
            let _ = session.read_content(1).await;
        }
        session
            .send_method(
                1,
                Method::BasicAck {
                    delivery_tag: 1,
                    multiple: false,
                },
            )
            .await;
        session
            .send_method(
                1,
                Method::BasicNack {
                    delivery_tag: 2,
                    multiple: false,
                    requeue: false,
                },
            )
            .await;

        // Second round: confirm_select is a local no-op, so the next
        // frame is already the publish; a multiple-ack settles it.
        match session.expect_method(1).await {
            Method::BasicPublish { .. } => {}
            method => panic!("expected basic.publish, got {method:?}"),
        }
        let _ = session.read_content(1).await;
        session
            .send_method(
                1,
                Method::BasicAck {
                    delivery_tag: 3,
                    multiple: true,
                },
            )
            .await;
    });

    let connection = Connection::open(&url).await.unwrap();
    let channel = connection.channel().await.unwrap();

    channel.confirm_select().await.unwrap();
    let seq = channel
        .basic_publish("a", "", "q", Properties::new(), false)
        .await
        .unwrap();
    assert_eq!(seq, Some(1));
    let seq = channel
        .basic_publish("b", "", "q", Properties::new(), false)
        .await
        .unwrap();
    assert_eq!(seq, Some(2));
    assert!(!channel.wait_for_confirms().await.unwrap());

    channel.confirm_select().await.unwrap();
    let seq = channel
        .basic_publish("c", "", "q", Properties::new(), false)
        .await
        .unwrap();
    assert_eq!(seq, Some(3));
    assert!(channel.wait_for_confirms().await.unwrap());
    broker.await.unwrap();
}

#[tokio::test]
async fn basic_get_returns_none_then_a_message() {
    let (broker, url) = TestBroker::bind().await;
    let broker = tokio::spawn(async move {
        let mut session = broker.accept().await;
        session.expect_channel_open(1).await;

        match session.expect_method(1).await {
            Method::BasicGet { queue, no_ack } => {
                assert_eq!(queue, "q1");
                assert!(no_ack);
            }
            method => panic!("expected basic.get, got {method:?}"),
        }
        session.send_method(1, Method::BasicGetEmpty).await;

        match session.expect_method(1).await {
            Method::BasicGet { .. } => {}
            method => panic!("expected basic.get, got {method:?}"),
        }
        session
            .send_method(
                1,
                Method::BasicGetOk {
                    delivery_tag: 1,
                    redelivered: false,
                    exchange: "".into(),
                    routing_key: "q1".into(),
                    message_count: 0,
                },
            )
            .await;
        let properties = Properties {
            delivery_mode: Some(2),
            ..Properties::new()
        };
        session.send_content(1, properties, b"hello").await;

        match session.expect_method(1).await {
            Method::BasicAck {
                delivery_tag: 1,
                multiple: false,
            } => {}
            method => panic!("expected basic.ack, got {method:?}"),
        }
    });

    let connection = Connection::open(&url).await.unwrap();
    let channel = connection.channel().await.unwrap();

    assert!(channel.basic_get("q1", true).await.unwrap().is_none());

    let message = channel.basic_get("q1", false).await.unwrap().unwrap();
    assert_eq!(&message.body[..], b"hello");
    assert_eq!(message.routing_key, "q1");
    assert_eq!(message.properties.delivery_mode, Some(2));
    message.ack().await.unwrap();
    broker.await.unwrap();
}

#[tokio::test]
async fn consumer_receives_deliveries_and_broker_cancel() {
    let (broker, url) = TestBroker::bind().await;
    let broker = tokio::spawn(async move {
        let mut session = broker.accept().await;
        session.expect_channel_open(1).await;
        match session.expect_method(1).await {
            Method::BasicConsume { queue, no_ack, .. } => {
                assert_eq!(queue, "q1");
                assert!(!no_ack);
            }
            method => panic!("expected basic.consume, got {method:?}"),
        }
        session
            .send_method(
                1,
                Method::BasicConsumeOk {
                    consumer_tag: "amq.ctag-test".into(),
                },
            )
            .await;

        session
            .send_method(
                1,
                Method::BasicDeliver {
                    consumer_tag: "amq.ctag-test".into(),
                    delivery_tag: 1,
                    redelivered: false,
                    exchange: "".into(),
                    routing_key: "q1".into(),
                },
            )
            .await;
        session.send_content(1, Properties::new(), b"m1").await;

        // Wait for the ack before cancelling so the client has seen the
        // delivery (and registered its callback) by then.
        match session.expect_method(1).await {
            Method::BasicAck {
                delivery_tag: 1, ..
            } => {}
            method => panic!("expected basic.ack, got {method:?}"),
        }
        session
            .send_method(
                1,
                Method::BasicCancel {
                    consumer_tag: "amq.ctag-test".into(),
                    no_wait: true,
                },
            )
            .await;
    });

    let connection = Connection::open(&url).await.unwrap();
    let channel = connection.channel().await.unwrap();
    let mut consumer = channel
        .basic_consume("q1", ConsumeOptions::default())
        .await
        .unwrap();
    assert_eq!(consumer.tag(), "amq.ctag-test");

    let (cancel_tx, mut cancel_rx) = mpsc::unbounded_channel();
    consumer.on_cancel(move |tag| {
        let _ = cancel_tx.send(tag.to_string());
    });

    let delivery = consumer.recv().await.unwrap();
    assert_eq!(&delivery.body[..], b"m1");
    assert_eq!(delivery.delivery_tag, 1);
    delivery.ack().await.unwrap();

    let canceled_tag = tokio::time::timeout(Duration::from_secs(1), cancel_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(canceled_tag, "amq.ctag-test");
    assert!(consumer.recv().await.is_none());
    assert!(consumer.is_canceled());
    broker.await.unwrap();
}

#[tokio::test]
async fn mandatory_return_invokes_the_callback() {
    let (broker, url) = TestBroker::bind().await;
    let broker = tokio::spawn(async move {
        let mut session = broker.accept().await;
        session.expect_channel_open(1).await;
        match session.expect_method(1).await {
            Method::BasicPublish {
                exchange,
                routing_key,
                mandatory,
                ..
            } => {
                assert_eq!(exchange, "amq.headers");
                assert_eq!(routing_key, "bar");
                assert!(mandatory);
            }
            method => panic!("expected basic.publish, got {method:?}"),
        }
        let _ = session.read_content(1).await;

        session
            .send_method(
                1,
                Method::BasicReturn {
                    reply_code: 312,
                    reply_text: "NO_ROUTE".into(),
                    exchange: "amq.headers".into(),
                    routing_key: "bar".into(),
                },
            )
            .await;
        session.send_content(1, Properties::new(), b"payload").await;
    });

    let connection = Connection::open(&url).await.unwrap();
    let channel = connection.channel().await.unwrap();

    let (return_tx, mut return_rx) = mpsc::unbounded_channel();
    channel.on_return(move |message| {
        let _ = return_tx.send(message);
    });

    channel
        .basic_publish("payload", "amq.headers", "bar", Properties::new(), true)
        .await
        .unwrap();

    let returned = tokio::time::timeout(Duration::from_secs(1), return_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(returned.reply_code, 312);
    assert_eq!(returned.routing_key, "bar");
    assert_eq!(&returned.body[..], b"payload");
    broker.await.unwrap();
}

#[tokio::test]
async fn a_channel_error_does_not_poison_its_siblings() {
    let (broker, url) = TestBroker::bind().await;
    let broker = tokio::spawn(async move {
        let mut session = broker.accept().await;
        session.expect_channel_open(1).await;
        session.expect_channel_open(2).await;

        match session.expect_method(1).await {
            Method::ExchangeDeclare { exchange_type, .. } => {
                assert_eq!(exchange_type, "faulty-type");
            }
            method => panic!("expected exchange.declare, got {method:?}"),
        }
        session
            .send_method(
                1,
                Method::ChannelClose {
                    reply_code: 503,
                    reply_text: "COMMAND_INVALID - unknown exchange type".into(),
                    class_id: 40,
                    method_id: 10,
                },
            )
            .await;
        match session.expect_method(1).await {
            Method::ChannelCloseOk => {}
            method => panic!("expected channel.close-ok, got {method:?}"),
        }

        match session.expect_method(2).await {
            Method::QueueDeclare { queue, .. } => assert_eq!(queue, "still-works"),
            method => panic!("expected queue.declare, got {method:?}"),
        }
        session
            .send_method(
                2,
                Method::QueueDeclareOk {
                    queue: "still-works".into(),
                    message_count: 0,
                    consumer_count: 0,
                },
            )
            .await;
    });

    let connection = Connection::open(&url).await.unwrap();
    let poisoned = connection.channel().await.unwrap();
    let healthy = connection.channel().await.unwrap();

    let err = poisoned
        .exchange_declare("x", "faulty-type", Default::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ChannelClosed(_)));
    assert_eq!(err.reply_code(), Some(503));
    assert!(poisoned.is_closed());

    let ok = healthy
        .queue_declare("still-works", QueueDeclareOptions::default())
        .await
        .unwrap();
    assert_eq!(ok.queue, "still-works");
    assert!(!connection.is_closed());
    broker.await.unwrap();
}

#[tokio::test]
async fn consume_once_times_out_and_swallows_the_late_reply() {
    let (broker, url) = TestBroker::bind().await;
    let broker = tokio::spawn(async move {
        let mut session = broker.accept().await;
        session.expect_channel_open(1).await;

        // Withhold the get reply until the client has timed out and
        // moved on to the declare.
        match session.expect_method(1).await {
            Method::BasicGet { queue, .. } => assert_eq!(queue, "q1"),
            method => panic!("expected basic.get, got {method:?}"),
        }
        match session.expect_method(1).await {
            Method::QueueDeclare { .. } => {}
            method => panic!("expected queue.declare, got {method:?}"),
        }
        // The late answer lands first; it must settle the expired slot,
        // not the declare.
        session.send_method(1, Method::BasicGetEmpty).await;
        session
            .send_method(
                1,
                Method::QueueDeclareOk {
                    queue: "q1".into(),
                    message_count: 0,
                    consumer_count: 0,
                },
            )
            .await;

        // A timely get still works afterwards.
        match session.expect_method(1).await {
            Method::BasicGet { .. } => {}
            method => panic!("expected basic.get, got {method:?}"),
        }
        session
            .send_method(
                1,
                Method::BasicGetOk {
                    delivery_tag: 1,
                    redelivered: false,
                    exchange: "".into(),
                    routing_key: "q1".into(),
                    message_count: 0,
                },
            )
            .await;
        session.send_content(1, Properties::new(), b"in time").await;
    });

    let connection = Connection::open(&url).await.unwrap();
    let channel = connection.channel().await.unwrap();

    let err = channel
        .basic_consume_once("q1", true, Duration::from_millis(100))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Timeout));

    let ok = channel
        .queue_declare("q1", QueueDeclareOptions::default())
        .await
        .unwrap();
    assert_eq!(ok.queue, "q1");

    let message = channel
        .basic_consume_once("q1", true, Duration::from_secs(5))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&message.body[..], b"in time");
    broker.await.unwrap();
}

#[tokio::test]
async fn rpc_deadline_expires_without_desyncing_replies() {
    let (broker, url) = TestBroker::bind().await;
    let broker = tokio::spawn(async move {
        let mut session = broker.accept().await;
        session.expect_channel_open(1).await;

        // Withhold the declare-ok past the client's deadline, then answer
        // both requests in order.
        match session.expect_method(1).await {
            Method::QueueDeclare { .. } => {}
            method => panic!("expected queue.declare, got {method:?}"),
        }
        match session.expect_method(1).await {
            Method::QueuePurge { .. } => {}
            method => panic!("expected queue.purge, got {method:?}"),
        }
        session
            .send_method(
                1,
                Method::QueueDeclareOk {
                    queue: "q1".into(),
                    message_count: 0,
                    consumer_count: 0,
                },
            )
            .await;
        session
            .send_method(1, Method::QueuePurgeOk { message_count: 5 })
            .await;
    });

    let connection = Connection::open_with(
        &url,
        ConnectionOptions::new().rpc_timeout(Duration::from_millis(250)),
    )
    .await
    .unwrap();
    let channel = connection.channel().await.unwrap();

    let err = channel
        .queue_declare("q1", QueueDeclareOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Timeout));

    // The late declare-ok is consumed by the expired slot; the purge
    // reply still reaches the purge.
    let purged = channel.queue_purge("q1").await.unwrap();
    assert_eq!(purged, 5);
    broker.await.unwrap();
}

#[tokio::test]
async fn consume_arguments_reach_the_wire() {
    let (broker, url) = TestBroker::bind().await;
    let broker = tokio::spawn(async move {
        let mut session = broker.accept().await;
        session.expect_channel_open(1).await;
        match session.expect_method(1).await {
            Method::BasicConsume { arguments, .. } => {
                assert_eq!(
                    arguments.get("x-priority"),
                    Some(&FieldValue::I32(7))
                );
            }
            method => panic!("expected basic.consume, got {method:?}"),
        }
        session
            .send_method(
                1,
                Method::BasicConsumeOk {
                    consumer_tag: "t".into(),
                },
            )
            .await;
    });

    let connection = Connection::open(&url).await.unwrap();
    let channel = connection.channel().await.unwrap();
    let mut options = ConsumeOptions::default();
    options.arguments.insert("x-priority", 7i32);
    let consumer = channel.basic_consume("q", options).await.unwrap();
    assert_eq!(consumer.tag(), "t");
    broker.await.unwrap();
}
