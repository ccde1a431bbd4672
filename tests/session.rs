//! Session engine tests against a scripted broker

mod support;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::timeout;

use support::MockBroker;
use wispmq::protocol::{
    ConnAck, ConnectReturnCode, Packet, PubAck, Publish, SubAck, SubscribeReturnCode, UnsubAck,
};
use wispmq::{Client, ClientConfig, ClientError, ProtocolVersion, QoS, ReconnectHandler};

// ============================================================================
// Connect / disconnect
// ============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn connect_sends_the_expected_wire_image() {
    let broker = MockBroker::start().await;
    let client = Client::new(ClientConfig {
        client_id: Some("myclient".to_string()),
        keep_alive: 15,
        ..broker.config()
    });

    let accept = tokio::spawn(async move {
        let mut conn = broker.accept().await;
        let bytes = conn.read_raw(22).await;
        assert_eq!(
            bytes,
            b"\x10\x14\x00\x04MQTT\x04\x02\x00\x0F\x00\x08myclient"
        );
        conn.send_raw(b"\x20\x02\x00\x00").await;
        conn
    });

    client.connect().await.unwrap();
    assert!(client.is_connected());
    accept.await.unwrap();

    client.disconnect().await;
    assert!(!client.is_connected());
}

#[tokio::test(flavor = "multi_thread")]
async fn connect_is_idempotent() {
    let broker = MockBroker::start().await;
    let client = Client::new(broker.config());

    let accept = tokio::spawn(async move {
        let (conn, _) = broker.accept_session().await;
        (broker, conn)
    });

    client.connect().await.unwrap();
    // Second call must not open a second connection
    client.connect().await.unwrap();
    let (broker, _conn) = accept.await.unwrap();

    let second = timeout(Duration::from_millis(300), broker.accept()).await;
    assert!(second.is_err(), "Client opened a second connection");
}

#[tokio::test(flavor = "multi_thread")]
async fn refused_connections_carry_the_return_code_message() {
    let broker = MockBroker::start().await;
    let client = Client::new(broker.config());

    tokio::spawn(async move {
        let mut conn = broker.accept().await;
        conn.expect_connect().await;
        conn.send(&Packet::ConnAck(ConnAck {
            session_present: false,
            return_code: ConnectReturnCode::NotAuthorized,
        }))
        .await;
    });

    let err = client.connect().await.unwrap_err();
    assert!(err.to_string().contains("not authorised"), "{}", err);
    assert!(!client.is_connected());
}

#[tokio::test(flavor = "multi_thread")]
async fn missing_client_id_with_persistent_session_is_an_error() {
    let broker = MockBroker::start().await;
    let client = Client::new(ClientConfig {
        client_id: None,
        clean_session: false,
        ..broker.config()
    });

    let err = client.connect().await.unwrap_err();
    assert!(err.to_string().contains("client id"), "{}", err);
}

#[tokio::test(flavor = "multi_thread")]
async fn v310_generates_a_client_id() {
    let broker = MockBroker::start().await;
    let client = Client::new(ClientConfig {
        client_id: None,
        version: ProtocolVersion::V31,
        ..broker.config()
    });

    let accept = tokio::spawn(async move { broker.accept_session().await });
    client.connect().await.unwrap();
    let (_conn, connect) = accept.await.unwrap();

    assert_eq!(connect.protocol_version, ProtocolVersion::V31);
    assert_eq!(connect.client_id.len(), 22);
    assert!(connect.client_id.starts_with("wispmq"));
}

#[tokio::test(flavor = "multi_thread")]
async fn disconnect_sends_the_packet() {
    let broker = MockBroker::start().await;
    let client = Client::new(broker.config());

    let accept = tokio::spawn(async move { broker.accept_session().await });
    client.connect().await.unwrap();
    let (mut conn, _) = accept.await.unwrap();

    client.disconnect().await;
    assert_eq!(conn.read_packet().await, Packet::Disconnect);
}

#[tokio::test(flavor = "multi_thread")]
async fn with_session_disconnects_on_both_paths() {
    let broker = MockBroker::start().await;
    let config = broker.config();

    let accept = tokio::spawn(async move {
        let (mut conn, _) = broker.accept_session().await;
        assert_eq!(conn.read_packet().await, Packet::Disconnect);

        let (mut conn, _) = broker.accept_session().await;
        assert_eq!(conn.read_packet().await, Packet::Disconnect);
    });

    let ok: Result<u32, ClientError> =
        Client::with_session(config.clone(), |_client| async { Ok(7) }).await;
    assert_eq!(ok.unwrap(), 7);

    let err: Result<(), ClientError> = Client::with_session(config, |_client| async {
        Err(ClientError::InvalidTopic("synthetic"))
    })
    .await;
    assert!(err.is_err());

    accept.await.unwrap();
}

// ============================================================================
// Operations require a live session
// ============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn operations_fail_when_not_connected() {
    let client = Client::new(ClientConfig::new("127.0.0.1"));

    assert!(matches!(
        client.publish("t", "p", false, QoS::AtMostOnce).await,
        Err(ClientError::NotConnected)
    ));
    assert!(matches!(
        client.subscribe("t").await,
        Err(ClientError::NotConnected)
    ));
    assert!(matches!(
        client.unsubscribe("t").await,
        Err(ClientError::NotConnected)
    ));
    assert!(matches!(client.flush().await, Err(ClientError::NotConnected)));
}

#[tokio::test(flavor = "multi_thread")]
async fn empty_topics_are_rejected() {
    let client = Client::new(ClientConfig::new("127.0.0.1"));
    assert!(matches!(
        client.publish("", "p", false, QoS::AtMostOnce).await,
        Err(ClientError::InvalidTopic(_))
    ));
    assert!(matches!(
        client.subscribe("").await,
        Err(ClientError::InvalidTopic(_))
    ));
    let none: Vec<&str> = Vec::new();
    assert!(matches!(
        client.subscribe(none).await,
        Err(ClientError::InvalidTopic(_))
    ));
}

// ============================================================================
// Publish
// ============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn publish_qos0_wire_image() {
    let broker = MockBroker::start().await;
    let client = Client::new(broker.config());

    let accept = tokio::spawn(async move { broker.accept_session().await });
    client.connect().await.unwrap();
    let (mut conn, _) = accept.await.unwrap();

    client
        .publish("topic", "payload", false, QoS::AtMostOnce)
        .await
        .unwrap();

    assert_eq!(conn.read_raw(16).await, b"\x30\x0E\x00\x05topicpayload");
}

#[tokio::test(flavor = "multi_thread")]
async fn publish_qos1_waits_for_the_puback() {
    let broker = MockBroker::start().await;
    let client = Client::new(broker.config());

    let accept = tokio::spawn(async move { broker.accept_session().await });
    client.connect().await.unwrap();
    let (mut conn, _) = accept.await.unwrap();

    let publisher = {
        let client = client.clone();
        tokio::spawn(async move {
            client
                .publish("topic", "payload", false, QoS::AtLeastOnce)
                .await
        })
    };

    let packet = conn.read_packet().await;
    let packet_id = match packet {
        Packet::Publish(ref p) => {
            assert_eq!(p.qos, QoS::AtLeastOnce);
            assert!(!p.dup);
            p.packet_id.unwrap()
        }
        other => panic!("Expected PUBLISH, got {:?}", other),
    };
    assert!(!publisher.is_finished());

    conn.send(&Packet::PubAck(PubAck::new(packet_id))).await;
    publisher.await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn publish_retransmits_with_dup_then_gives_up() {
    let broker = MockBroker::start().await;
    let client = Client::new(ClientConfig {
        ack_timeout: 0.3,
        resend_limit: 2,
        ..broker.config()
    });

    let accept = tokio::spawn(async move { broker.accept_session().await });
    client.connect().await.unwrap();
    let (mut conn, _) = accept.await.unwrap();

    let publisher = {
        let client = client.clone();
        tokio::spawn(async move { client.publish("topic", "payload", false, QoS::AtLeastOnce).await })
    };

    // Original transmission
    let first = match conn.read_packet().await {
        Packet::Publish(p) => p,
        other => panic!("Expected PUBLISH, got {:?}", other),
    };
    assert!(!first.dup);

    // One retransmission with the dup flag and the same id
    let second = match conn.read_packet().await {
        Packet::Publish(p) => p,
        other => panic!("Expected PUBLISH, got {:?}", other),
    };
    assert!(second.dup);
    assert_eq!(second.packet_id, first.packet_id);

    // Then the caller gets the resend-limit error
    let err = publisher.await.unwrap().unwrap_err();
    assert!(matches!(err, ClientError::ResendLimitExceeded));

    // No third transmission
    conn.expect_silence(Duration::from_millis(500)).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn unknown_acks_are_ignored() {
    let broker = MockBroker::start().await;
    let client = Client::new(broker.config());

    let accept = tokio::spawn(async move { broker.accept_session().await });
    client.connect().await.unwrap();
    let (mut conn, _) = accept.await.unwrap();

    // Unsolicited ack for a packet id the client never used
    conn.send(&Packet::PubAck(PubAck::new(999))).await;

    let publisher = {
        let client = client.clone();
        tokio::spawn(async move { client.publish("t", "p", false, QoS::AtLeastOnce).await })
    };

    let packet_id = match conn.read_packet().await {
        Packet::Publish(p) => p.packet_id.unwrap(),
        other => panic!("Expected PUBLISH, got {:?}", other),
    };
    conn.send(&Packet::PubAck(PubAck::new(packet_id))).await;
    publisher.await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn batch_publish_flushes_per_retain_qos_key() {
    let broker = MockBroker::start().await;
    let client = Client::new(broker.config());

    let accept = tokio::spawn(async move { broker.accept_session().await });
    client.connect().await.unwrap();
    let (mut conn, _) = accept.await.unwrap();

    let broker_task = tokio::spawn(async move {
        let mut seen = Vec::new();
        for _ in 0..3 {
            match conn.read_packet().await {
                Packet::Publish(p) => {
                    let packet_id = p.packet_id.unwrap();
                    seen.push((p.topic.clone(), p.retain));
                    conn.send(&Packet::PubAck(PubAck::new(packet_id))).await;
                }
                other => panic!("Expected PUBLISH, got {:?}", other),
            }
        }
        seen
    });

    client
        .batch_publish(|c| async move {
            c.publish("a", "1", false, QoS::AtLeastOnce).await?;
            c.publish("b", "2", false, QoS::AtLeastOnce).await?;
            // Different key: retained
            c.publish("c", "3", true, QoS::AtLeastOnce).await?;
            Ok(())
        })
        .await
        .unwrap();

    let mut seen = broker_task.await.unwrap();
    seen.sort();
    assert_eq!(
        seen,
        vec![
            ("a".to_string(), false),
            ("b".to_string(), false),
            ("c".to_string(), true),
        ]
    );
}

// ============================================================================
// Subscribe / unsubscribe
// ============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn subscribe_wire_image() {
    let broker = MockBroker::start().await;
    let client = Client::new(broker.config());

    let accept = tokio::spawn(async move { broker.accept_session().await });
    client.connect().await.unwrap();
    let (mut conn, _) = accept.await.unwrap();

    client
        .subscribe(vec![("a/b", QoS::AtMostOnce), ("c/d", QoS::AtLeastOnce)])
        .await
        .unwrap();

    assert_eq!(
        conn.read_raw(16).await,
        b"\x82\x0E\x00\x01\x00\x03a/b\x00\x00\x03c/d\x01"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn subscribe_wait_returns_granted_codes() {
    let broker = MockBroker::start().await;
    let client = Client::new(broker.config());

    let accept = tokio::spawn(async move { broker.accept_session().await });
    client.connect().await.unwrap();
    let (mut conn, _) = accept.await.unwrap();

    let broker_task = tokio::spawn(async move {
        let packet_id = match conn.read_packet().await {
            Packet::Subscribe(s) => s.packet_id,
            other => panic!("Expected SUBSCRIBE, got {:?}", other),
        };
        conn.send(&Packet::SubAck(SubAck {
            packet_id,
            return_codes: vec![
                SubscribeReturnCode::Success(QoS::AtLeastOnce),
                SubscribeReturnCode::Failure,
            ],
        }))
        .await;
        conn
    });

    let granted = client
        .subscribe_wait(vec![("a", QoS::AtLeastOnce), ("b", QoS::ExactlyOnce)])
        .await
        .unwrap();
    assert_eq!(
        granted,
        vec![
            SubscribeReturnCode::Success(QoS::AtLeastOnce),
            SubscribeReturnCode::Failure,
        ]
    );

    let mut conn = broker_task.await.unwrap();

    // And the symmetric unsubscribe path
    let broker_task = tokio::spawn(async move {
        let packet_id = match conn.read_packet().await {
            Packet::Unsubscribe(u) => {
                assert_eq!(u.filters, vec!["a".to_string()]);
                u.packet_id
            }
            other => panic!("Expected UNSUBSCRIBE, got {:?}", other),
        };
        conn.send(&Packet::UnsubAck(UnsubAck { packet_id })).await;
    });

    client.unsubscribe_wait("a").await.unwrap();
    broker_task.await.unwrap();
}

// ============================================================================
// Inbound delivery
// ============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn get_returns_messages_and_acks_qos1() {
    let broker = MockBroker::start().await;
    let client = Client::new(broker.config());

    let accept = tokio::spawn(async move { broker.accept_session().await });
    client.connect().await.unwrap();
    let (mut conn, _) = accept.await.unwrap();

    conn.send(&Packet::Publish(Publish {
        dup: false,
        qos: QoS::AtLeastOnce,
        retain: false,
        topic: "news".to_string(),
        packet_id: Some(5),
        payload: "hello".into(),
    }))
    .await;

    let message = client.get().await.unwrap();
    assert_eq!(message.topic, "news");
    assert_eq!(&message.payload[..], b"hello");

    // Exactly one PUBACK with the same id, after consumption
    assert_eq!(conn.read_packet().await, Packet::PubAck(PubAck::new(5)));
    conn.expect_silence(Duration::from_millis(200)).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn messages_are_delivered_in_wire_order() {
    let broker = MockBroker::start().await;
    let client = Client::new(broker.config());

    let accept = tokio::spawn(async move { broker.accept_session().await });
    client.connect().await.unwrap();
    let (mut conn, _) = accept.await.unwrap();

    for i in 0..5u8 {
        conn.send(&Packet::Publish(Publish {
            topic: format!("t/{}", i),
            payload: vec![i].into(),
            ..Default::default()
        }))
        .await;
    }

    for i in 0..5u8 {
        let message = client.get().await.unwrap();
        assert_eq!(message.topic, format!("t/{}", i));
    }
}

// ============================================================================
// Keep-alive
// ============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn silent_broker_triggers_keep_alive_timeout() {
    let broker = MockBroker::start().await;
    let client = Client::new(ClientConfig {
        keep_alive: 1,
        ack_timeout: 0.5,
        ..broker.config()
    });

    let accept = tokio::spawn(async move { broker.accept_session().await });
    client.connect().await.unwrap();
    let (mut conn, _) = accept.await.unwrap();

    let getter = {
        let client = client.clone();
        tokio::spawn(async move { client.get().await })
    };

    // Exactly one PINGREQ, then nothing
    assert_eq!(conn.read_packet().await, Packet::PingReq);
    conn.expect_silence(Duration::from_millis(400)).await;

    let err = timeout(Duration::from_secs(2), getter)
        .await
        .expect("get() never surfaced the error")
        .unwrap()
        .unwrap_err();
    assert!(matches!(err, ClientError::KeepAliveTimeout), "{}", err);
    assert!(!client.is_connected());
}

#[tokio::test(flavor = "multi_thread")]
async fn pingresp_keeps_the_session_alive() {
    let broker = MockBroker::start().await;
    let client = Client::new(ClientConfig {
        keep_alive: 1,
        ack_timeout: 0.5,
        ..broker.config()
    });

    let accept = tokio::spawn(async move { broker.accept_session().await });
    client.connect().await.unwrap();
    let (mut conn, _) = accept.await.unwrap();

    for _ in 0..2 {
        assert_eq!(conn.read_packet().await, Packet::PingReq);
        conn.send(&Packet::PingResp).await;
    }
    assert!(client.is_connected());
}

// ============================================================================
// Flush
// ============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn flush_waits_for_queued_packets() {
    let broker = MockBroker::start().await;
    let client = Client::new(broker.config());

    let accept = tokio::spawn(async move { broker.accept_session().await });
    client.connect().await.unwrap();
    let (mut conn, _) = accept.await.unwrap();

    for i in 0..3 {
        client
            .publish(format!("t/{}", i), "x", false, QoS::AtMostOnce)
            .await
            .unwrap();
    }
    client.flush().await.unwrap();

    // Everything queued before the barrier is already on the socket
    for i in 0..3 {
        match conn.read_packet().await {
            Packet::Publish(p) => assert_eq!(p.topic, format!("t/{}", i)),
            other => panic!("Expected PUBLISH, got {:?}", other),
        }
    }
}

// ============================================================================
// Reconnect
// ============================================================================

struct Resubscriber {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl ReconnectHandler for Resubscriber {
    async fn on_reconnect(&self, client: &Client) -> Result<(), ClientError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        client.subscribe(("news/#", QoS::AtMostOnce)).await
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn dropped_connection_reconnects_and_replays_the_callback() {
    let broker = MockBroker::start().await;
    let client = Client::new(ClientConfig {
        reconnect_limit: 3,
        reconnect_backoff: 0.05,
        ..broker.config()
    });

    let calls = Arc::new(AtomicUsize::new(0));
    client.set_reconnect_handler(Arc::new(Resubscriber {
        calls: calls.clone(),
    }));

    let accept = tokio::spawn(async move {
        let (conn, _) = broker.accept_session().await;
        // Kill the first connection
        drop(conn);

        // The client comes back; the callback resubscribes
        let (mut conn, _) = broker.accept_session().await;
        match conn.read_packet().await {
            Packet::Subscribe(s) => {
                assert_eq!(s.subscriptions[0].filter, "news/#");
                conn.send(&Packet::SubAck(SubAck {
                    packet_id: s.packet_id,
                    return_codes: vec![SubscribeReturnCode::Success(QoS::AtMostOnce)],
                }))
                .await;
            }
            other => panic!("Expected SUBSCRIBE, got {:?}", other),
        }
        (broker, conn)
    });

    client.connect().await.unwrap();
    let (_broker, mut conn) = accept.await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(client.is_connected());

    // The session is fully usable after the reconnect
    client.publish("t", "p", false, QoS::AtMostOnce).await.unwrap();
    match conn.read_packet().await {
        Packet::Publish(p) => assert_eq!(p.topic, "t"),
        other => panic!("Expected PUBLISH, got {:?}", other),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_reconnection_surfaces_the_original_error() {
    let broker = MockBroker::start().await;
    let client = Client::new(ClientConfig {
        reconnect_limit: 2,
        reconnect_backoff: 0.05,
        ..broker.config()
    });

    let accept = tokio::spawn(async move {
        let (conn, _) = broker.accept_session().await;
        (broker, conn)
    });
    client.connect().await.unwrap();
    let (broker, conn) = accept.await.unwrap();

    let getter = {
        let client = client.clone();
        tokio::spawn(async move { client.get().await })
    };
    // Give get() a moment to start before the failure
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Kill the connection and the listener so reconnection cannot succeed
    drop(conn);
    drop(broker);

    let err = timeout(Duration::from_secs(3), getter)
        .await
        .expect("get() never surfaced the error")
        .unwrap()
        .unwrap_err();
    assert!(matches!(err, ClientError::ConnectionClosed), "{}", err);
    assert!(!client.is_connected());
}

#[tokio::test(flavor = "multi_thread")]
async fn pending_publishes_fail_closed_when_reconnection_is_disabled() {
    let broker = MockBroker::start().await;
    let client = Client::new(ClientConfig {
        ack_timeout: 5.0,
        ..broker.config()
    });

    let accept = tokio::spawn(async move {
        let (conn, _) = broker.accept_session().await;
        (broker, conn)
    });
    client.connect().await.unwrap();
    let (_broker, mut conn) = accept.await.unwrap();

    let publisher = {
        let client = client.clone();
        tokio::spawn(async move { client.publish("t", "p", false, QoS::AtLeastOnce).await })
    };
    // Wait for the publish to hit the wire, then cut the connection
    match conn.read_packet().await {
        Packet::Publish(_) => {}
        other => panic!("Expected PUBLISH, got {:?}", other),
    }
    drop(conn);

    let err = timeout(Duration::from_secs(2), publisher)
        .await
        .expect("publish never failed")
        .unwrap()
        .unwrap_err();
    assert!(matches!(err, ClientError::ConnectionClosed), "{}", err);
}
