//! Test support: a scripted broker for protocol-level client testing
//!
//! Listens on a loopback port and lets each test read the client's packets
//! and answer with exactly the packets (or raw bytes) the scenario calls
//! for.

#![allow(dead_code)]

use std::time::Duration;

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

use wispmq::codec::{Decoder, Encoder};
use wispmq::protocol::{ConnAck, Connect, Packet};
use wispmq::ClientConfig;

pub const READ_TIMEOUT: Duration = Duration::from_secs(2);

/// A broker endpoint under the test's control
pub struct MockBroker {
    listener: TcpListener,
    port: u16,
}

impl MockBroker {
    pub async fn start() -> Self {
        // Show the client's log trail when a test fails
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .try_init();

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind");
        let port = listener.local_addr().unwrap().port();
        Self { listener, port }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Client configuration pointed at this broker, with test-friendly
    /// governors: fast ack timeout, no keep-alive, no reconnection.
    pub fn config(&self) -> ClientConfig {
        ClientConfig {
            host: Some("127.0.0.1".to_string()),
            port: Some(self.port),
            client_id: Some("testclient".to_string()),
            keep_alive: 0,
            ack_timeout: 0.5,
            reconnect_limit: 0,
            ..Default::default()
        }
    }

    /// Wait for the next client connection
    pub async fn accept(&self) -> BrokerConn {
        let (stream, _) = timeout(READ_TIMEOUT, self.listener.accept())
            .await
            .expect("Timed out waiting for a connection")
            .expect("Accept failed");
        BrokerConn {
            stream,
            decoder: Decoder::new(),
            encoder: Encoder::new(),
            buf: BytesMut::with_capacity(4096),
        }
    }

    /// Accept a connection and complete the CONNECT/CONNACK handshake
    pub async fn accept_session(&self) -> (BrokerConn, Box<Connect>) {
        let mut conn = self.accept().await;
        let connect = conn.expect_connect().await;
        conn.send(&Packet::ConnAck(ConnAck::default())).await;
        (conn, connect)
    }
}

/// One accepted client connection
pub struct BrokerConn {
    stream: TcpStream,
    decoder: Decoder,
    encoder: Encoder,
    buf: BytesMut,
}

impl BrokerConn {
    /// Read the next packet from the client
    pub async fn read_packet(&mut self) -> Packet {
        loop {
            if let Some((packet, consumed)) =
                self.decoder.decode(&self.buf).expect("Broken packet from client")
            {
                self.buf.advance(consumed);
                return packet;
            }
            let n = timeout(READ_TIMEOUT, self.stream.read_buf(&mut self.buf))
                .await
                .expect("Timed out waiting for a packet")
                .expect("Read failed");
            assert!(n > 0, "Client closed the connection");
        }
    }

    /// Assert that no packet arrives within the window
    pub async fn expect_silence(&mut self, window: Duration) {
        let result = timeout(window, self.stream.read_buf(&mut self.buf)).await;
        match result {
            Err(_) => {}
            Ok(Ok(0)) => {}
            Ok(_) => {
                // Bytes arrived; fail if they form a complete packet
                if let Ok(Some(_)) = self.decoder.decode(&self.buf) {
                    panic!("Expected silence but a packet arrived");
                }
            }
        }
    }

    /// Read the next packet and require a CONNECT
    pub async fn expect_connect(&mut self) -> Box<Connect> {
        match self.read_packet().await {
            Packet::Connect(connect) => connect,
            other => panic!("Expected CONNECT, got {:?}", other),
        }
    }

    /// Send a packet to the client
    pub async fn send(&mut self, packet: &Packet) {
        let mut buf = BytesMut::new();
        self.encoder.encode(packet, &mut buf).expect("Encode failed");
        self.stream.write_all(&buf).await.expect("Write failed");
    }

    /// Send raw bytes to the client
    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await.expect("Write failed");
    }

    /// Read exactly `n` raw bytes from the client
    pub async fn read_raw(&mut self, n: usize) -> Vec<u8> {
        while self.buf.len() < n {
            let read = timeout(READ_TIMEOUT, self.stream.read_buf(&mut self.buf))
                .await
                .expect("Timed out waiting for bytes")
                .expect("Read failed");
            assert!(read > 0, "Client closed the connection");
        }
        let bytes = self.buf.split_to(n);
        bytes.to_vec()
    }
}
