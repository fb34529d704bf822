//! Reconnecting-client behavior against a scripted broker: topology
//! replay after a connection loss and confirmed publishing over the
//! reserved channel.

mod common;

use std::time::Duration;

use amqp091::{Client, ClientOptions, Error, Properties, SubscribeOptions};
use amqp091_types::Method;
use common::{BrokerSession, TestBroker};
use tokio::sync::mpsc;

/// Consumes the reserved-channel setup the client performs on every
/// fresh connection: channel 1 open plus confirm.select.
async fn expect_reserved_channel(session: &mut BrokerSession) {
    session.expect_channel_open(1).await;
    match session.expect_method(1).await {
        Method::ConfirmSelect { .. } => {}
        method => panic!("expected confirm.select, got {method:?}"),
    }
    session.send_method(1, Method::ConfirmSelectOk).await;
}

/// Consumes a subscription being established on its own channel:
/// channel open, qos, consume.
async fn expect_subscription(
    session: &mut BrokerSession,
    channel: u16,
    tag: &str,
    prefetch: u16,
) {
    session.expect_channel_open(channel).await;
    match session.expect_method(channel).await {
        Method::BasicQos {
            prefetch_count, ..
        } => assert_eq!(prefetch_count, prefetch),
        method => panic!("expected basic.qos, got {method:?}"),
    }
    session.send_method(channel, Method::BasicQosOk).await;
    match session.expect_method(channel).await {
        Method::BasicConsume { queue, .. } => assert_eq!(queue, "q"),
        method => panic!("expected basic.consume, got {method:?}"),
    }
    session
        .send_method(
            channel,
            Method::BasicConsumeOk {
                consumer_tag: tag.into(),
            },
        )
        .await;
}

#[tokio::test]
async fn reconnect_replays_subscriptions_and_delivers_to_the_original_handler() {
    let (broker, url) = TestBroker::bind().await;

    let broker = tokio::spawn(async move {
        // First connection: reserved channel, then the subscription made
        // after start(). Dropping the session kills the socket.
        let mut session = broker.accept().await;
        expect_reserved_channel(&mut session).await;
        expect_subscription(&mut session, 2, "ctag-1", 10).await;
        drop(session);

        // The supervisor reconnects and replays the topology without any
        // application involvement.
        let mut session = broker.accept().await;
        expect_reserved_channel(&mut session).await;
        expect_subscription(&mut session, 2, "ctag-2", 10).await;

        session
            .send_method(
                2,
                Method::BasicDeliver {
                    consumer_tag: "ctag-2".into(),
                    delivery_tag: 1,
                    redelivered: false,
                    exchange: "".into(),
                    routing_key: "q".into(),
                },
            )
            .await;
        session
            .send_content(2, Properties::new(), b"after-reconnect")
            .await;

        // stop() closes the live connection gracefully.
        session.expect_connection_close().await;
    });

    let client = Client::with_options(
        &url,
        ClientOptions::new().reconnect_interval(Duration::from_millis(100)),
    );
    client.start().await.unwrap();

    let (delivered_tx, mut delivered_rx) = mpsc::unbounded_channel();
    client
        .subscribe(
            "q",
            SubscribeOptions {
                prefetch: 10,
                no_ack: true,
                ..SubscribeOptions::default()
            },
            move |delivery| {
                let delivered_tx = delivered_tx.clone();
                async move {
                    let _ = delivered_tx.send(delivery.body.clone());
                    Ok(())
                }
            },
        )
        .await
        .unwrap();

    let body = tokio::time::timeout(Duration::from_secs(5), delivered_rx.recv())
        .await
        .expect("no delivery after reconnect")
        .unwrap();
    assert_eq!(&body[..], b"after-reconnect");

    client.stop().await;
    broker.await.unwrap();
}

#[tokio::test]
async fn inline_subscription_keeps_consuming_across_reconnects() {
    let (broker, url) = TestBroker::bind().await;

    let broker = tokio::spawn(async move {
        let mut session = broker.accept().await;
        expect_reserved_channel(&mut session).await;
        expect_subscription(&mut session, 2, "ctag-1", 1).await;
        drop(session);

        // The replacement consumer must be handed back to the caller
        // still blocked in subscribe, not to a background worker.
        let mut session = broker.accept().await;
        expect_reserved_channel(&mut session).await;
        expect_subscription(&mut session, 2, "ctag-2", 1).await;

        session
            .send_method(
                2,
                Method::BasicDeliver {
                    consumer_tag: "ctag-2".into(),
                    delivery_tag: 1,
                    redelivered: false,
                    exchange: "".into(),
                    routing_key: "q".into(),
                },
            )
            .await;
        session
            .send_content(2, Properties::new(), b"inline-after-reconnect")
            .await;

        session.expect_connection_close().await;
    });

    let client = Client::with_options(
        &url,
        ClientOptions::new().reconnect_interval(Duration::from_millis(100)),
    );
    client.start().await.unwrap();

    let (delivered_tx, mut delivered_rx) = mpsc::unbounded_channel();
    let subscriber = {
        let client = client.clone();
        tokio::spawn(async move {
            client
                .subscribe(
                    "q",
                    SubscribeOptions {
                        worker_threads: 0,
                        no_ack: true,
                        ..SubscribeOptions::default()
                    },
                    move |delivery| {
                        let delivered_tx = delivered_tx.clone();
                        async move {
                            let _ = delivered_tx.send(delivery.body.clone());
                            Ok(())
                        }
                    },
                )
                .await
                .unwrap();
        })
    };

    let body = tokio::time::timeout(Duration::from_secs(5), delivered_rx.recv())
        .await
        .expect("no delivery after reconnect")
        .unwrap();
    assert_eq!(&body[..], b"inline-after-reconnect");

    // The inline call blocks across the reconnect and returns only once
    // the client stops.
    assert!(!subscriber.is_finished());
    client.stop().await;
    tokio::time::timeout(Duration::from_secs(5), subscriber)
        .await
        .expect("inline subscribe did not return after stop")
        .unwrap();
    broker.await.unwrap();
}

#[tokio::test]
async fn publish_maps_a_nack_to_publish_not_confirmed() {
    let (broker, url) = TestBroker::bind().await;

    let broker = tokio::spawn(async move {
        let mut session = broker.accept().await;
        expect_reserved_channel(&mut session).await;

        match session.expect_method(1).await {
            Method::BasicPublish { routing_key, .. } => assert_eq!(routing_key, "q"),
            method => panic!("expected basic.publish, got {method:?}"),
        }
        let _ = session.read_content(1).await;
        session
            .send_method(
                1,
                Method::BasicAck {
                    delivery_tag: 1,
                    multiple: false,
                },
            )
            .await;

        match session.expect_method(1).await {
            Method::BasicPublish { .. } => {}
            method => panic!("expected basic.publish, got {method:?}"),
        }
        let _ = session.read_content(1).await;
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

        session.expect_connection_close().await;
    });

    let client = Client::new(&url);
    client.start().await.unwrap();

    client
        .publish("accepted", "", "q", Properties::new())
        .await
        .unwrap();
    let err = client
        .publish("rejected", "", "q", Properties::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::PublishNotConfirmed));

    client.stop().await;
    broker.await.unwrap();
}

#[tokio::test]
async fn operations_fail_before_start() {
    let client = Client::new("amqp://localhost");
    let err = client
        .publish("x", "", "q", Properties::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ConnectionClosed(_)));
}

#[tokio::test]
async fn reconnect_interval_is_read_from_the_url() {
    // Parsed at construction; no connection is attempted here.
    let _client = Client::new("amqp://localhost?reconnect_interval=3");
}
