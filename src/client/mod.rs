//! MQTT Client
//!
//! A long-running connected session over TCP or TLS. One reader task and one
//! writer task share a single full-duplex stream; callers enqueue outbound
//! packets and, for acknowledged flows, block on per-packet ack slots. The
//! session keeps itself alive with PINGREQ, retransmits unacknowledged
//! packets, and reconnects with exponential backoff when a worker fails.
//!
//! # Example
//!
//! ```no_run
//! use wispmq::{Client, ClientConfig, QoS};
//!
//! # async fn run() -> Result<(), wispmq::ClientError> {
//! let client = Client::new(ClientConfig::new("broker.example.com"));
//! client.connect().await?;
//! client.subscribe(("sensors/#", QoS::AtLeastOnce)).await?;
//! client.publish("status", "online", false, QoS::AtMostOnce).await?;
//! let message = client.get().await?;
//! println!("{}: {:?}", message.topic, message.payload);
//! client.disconnect().await;
//! # Ok(())
//! # }
//! ```

mod error;
mod reader;
mod session;
mod stream;
mod tls;
mod writer;

pub use error::ClientError;
pub use tls::TlsError;

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::{Buf, Bytes, BytesMut};
use parking_lot::RwLock;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};
use tracing::{debug, error, info, warn};

use crate::codec::{Decoder, Encoder};
use crate::config::{ClientConfig, ConfigError};
use crate::protocol::{
    Connect, ConnectReturnCode, Packet, ProtocolError, ProtocolVersion, Publish, QoS, Subscribe,
    SubscribeReturnCode, Subscription, Unsubscribe,
};

use session::{AckOutcome, AckSlot, Inbound, SessionState};
use stream::Stream;

/// Which worker task invoked the reconnect path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Role {
    Reader,
    Writer,
}

/// Callback invoked after a successful reconnect, typically to re-subscribe
/// or re-publish presence. An error here tears the session down and surfaces
/// on the next [`Client::get`].
#[async_trait]
pub trait ReconnectHandler: Send + Sync {
    async fn on_reconnect(&self, client: &Client) -> Result<(), ClientError>;
}

/// Worker task handles for the active connection
#[derive(Default)]
pub(crate) struct ConnHandles {
    reader: Option<JoinHandle<()>>,
    writer: Option<JoinHandle<()>>,
}

pub(crate) struct Shared {
    pub(crate) config: ClientConfig,
    pub(crate) session: SessionState,
    /// Serializes connect, disconnect, and reconnect
    conn: tokio::sync::Mutex<ConnHandles>,
    on_reconnect: RwLock<Option<Arc<dyn ReconnectHandler>>>,
}

/// MQTT v3.1/v3.1.1 client
///
/// Cheap to clone; clones share the same session.
#[derive(Clone)]
pub struct Client {
    pub(crate) shared: Arc<Shared>,
}

impl Client {
    /// Create a client for the given configuration. No I/O happens until
    /// [`connect`](Client::connect).
    pub fn new(config: ClientConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                session: SessionState::new(),
                conn: tokio::sync::Mutex::new(ConnHandles::default()),
                on_reconnect: RwLock::new(None),
            }),
        }
    }

    /// The configuration this client was built with
    pub fn config(&self) -> &ClientConfig {
        &self.shared.config
    }

    /// True between CONNACK and disconnect (or terminal reconnect failure)
    pub fn is_connected(&self) -> bool {
        self.shared.session.is_connected()
    }

    /// Register the reconnect callback
    pub fn set_reconnect_handler(&self, handler: Arc<dyn ReconnectHandler>) {
        *self.shared.on_reconnect.write() = Some(handler);
    }

    /// Connect to the broker, run `f`, and disconnect on every exit path.
    pub async fn with_session<F, Fut, T>(config: ClientConfig, f: F) -> Result<T, ClientError>
    where
        F: FnOnce(Client) -> Fut,
        Fut: Future<Output = Result<T, ClientError>>,
    {
        let client = Client::new(config);
        client.connect().await?;
        let result = f(client.clone()).await;
        client.disconnect().await;
        result
    }

    /// Open the connection and start the worker tasks. A no-op when already
    /// connected.
    pub async fn connect(&self) -> Result<(), ClientError> {
        let mut conn = self.shared.conn.lock().await;
        if self.shared.session.is_connected() {
            return Ok(());
        }
        self.connect_locked(&mut conn).await
    }

    /// Send a DISCONNECT packet (best-effort), stop the workers, and fail
    /// every pending acknowledgement. A no-op when not connected.
    pub async fn disconnect(&self) {
        let mut conn = self.shared.conn.lock().await;
        self.shutdown_locked(&mut conn, true).await;
    }

    /// Tear the session down without sending a DISCONNECT packet
    pub async fn disconnect_without_packet(&self) {
        let mut conn = self.shared.conn.lock().await;
        self.shutdown_locked(&mut conn, false).await;
    }

    /// Publish a payload to a topic.
    ///
    /// QoS 0 returns once the packet is queued for the writer; QoS 1/2 waits
    /// for the acknowledgement, retransmitting as needed. Inside
    /// [`batch_publish`](Client::batch_publish), QoS > 0 publishes are
    /// buffered and flushed when the scope ends.
    pub async fn publish(
        &self,
        topic: impl Into<String>,
        payload: impl Into<Bytes>,
        retain: bool,
        qos: QoS,
    ) -> Result<(), ClientError> {
        let topic = topic.into();
        let payload = payload.into();
        if topic.is_empty() {
            return Err(ClientError::InvalidTopic("topic cannot be empty"));
        }
        if !self.shared.session.is_connected() {
            return Err(ClientError::NotConnected);
        }

        if qos == QoS::AtMostOnce {
            self.shared.session.write_queue.push(Packet::Publish(Publish {
                dup: false,
                qos,
                retain,
                topic,
                packet_id: None,
                payload,
            }));
            return Ok(());
        }

        let (topic, payload) = match self.shared.session.try_buffer(retain, qos, topic, payload) {
            Ok(()) => return Ok(()),
            Err(returned) => returned,
        };

        let slot = self.send_tracked_publish(topic, payload, retain, qos);
        wait_for_ack(slot).await.map(|_| ())
    }

    /// Publish a batch of (topic, payload) pairs at one retain/QoS setting.
    /// For QoS > 0, all packets are sent before any acknowledgement is
    /// awaited.
    pub async fn publish_many<I, T, P>(
        &self,
        messages: I,
        retain: bool,
        qos: QoS,
    ) -> Result<(), ClientError>
    where
        I: IntoIterator<Item = (T, P)>,
        T: Into<String>,
        P: Into<Bytes>,
    {
        let messages: Vec<(String, Bytes)> = messages
            .into_iter()
            .map(|(t, p)| (t.into(), p.into()))
            .collect();
        if messages.iter().any(|(t, _)| t.is_empty()) {
            return Err(ClientError::InvalidTopic("topic cannot be empty"));
        }
        if !self.shared.session.is_connected() {
            return Err(ClientError::NotConnected);
        }

        let mut slots = Vec::new();
        for (topic, payload) in messages {
            if qos == QoS::AtMostOnce {
                self.shared.session.write_queue.push(Packet::Publish(Publish {
                    dup: false,
                    qos,
                    retain,
                    topic,
                    packet_id: None,
                    payload,
                }));
                continue;
            }
            match self.shared.session.try_buffer(retain, qos, topic, payload) {
                Ok(()) => continue,
                Err((topic, payload)) => {
                    slots.push(self.send_tracked_publish(topic, payload, retain, qos));
                }
            }
        }

        for slot in slots {
            wait_for_ack(slot).await?;
        }
        Ok(())
    }

    /// Run `f` with QoS > 0 publishes buffered, then flush the buffer as one
    /// batched publish per (retain, qos) key, awaiting the acks together.
    /// Nested scopes collapse into the outermost; an error from `f` discards
    /// the buffer.
    pub async fn batch_publish<F, Fut>(&self, f: F) -> Result<(), ClientError>
    where
        F: FnOnce(Client) -> Fut,
        Fut: Future<Output = Result<(), ClientError>>,
    {
        self.shared.session.begin_batch();
        let result = f(self.clone()).await;
        let entries = self.shared.session.end_batch();

        match (result, entries) {
            (Ok(()), Some(entries)) => {
                for ((retain, qos), messages) in entries {
                    self.publish_many(messages, retain, qos).await?;
                }
                Ok(())
            }
            (Ok(()), None) => Ok(()),
            (Err(e), _) => Err(e),
        }
    }

    /// Subscribe without waiting for the SUBACK. The request is still
    /// tracked and retransmitted until acknowledged.
    pub async fn subscribe<S: IntoSubscriptions>(&self, topics: S) -> Result<(), ClientError> {
        self.subscribe_inner(topics.into_subscriptions(), false)
            .await
            .map(|_| ())
    }

    /// Subscribe and wait for the SUBACK; returns the granted codes in
    /// request order.
    pub async fn subscribe_wait<S: IntoSubscriptions>(
        &self,
        topics: S,
    ) -> Result<Vec<SubscribeReturnCode>, ClientError> {
        match self.subscribe_inner(topics.into_subscriptions(), true).await? {
            Some(Packet::SubAck(ack)) => Ok(ack.return_codes),
            _ => Err(ClientError::Protocol(ProtocolError::UnexpectedPacket(
                "expected SUBACK",
            ))),
        }
    }

    /// Unsubscribe without waiting for the UNSUBACK
    pub async fn unsubscribe<T: IntoTopicFilters>(&self, filters: T) -> Result<(), ClientError> {
        self.unsubscribe_inner(filters.into_topic_filters(), false)
            .await
    }

    /// Unsubscribe and wait for the UNSUBACK
    pub async fn unsubscribe_wait<T: IntoTopicFilters>(
        &self,
        filters: T,
    ) -> Result<(), ClientError> {
        self.unsubscribe_inner(filters.into_topic_filters(), true)
            .await
    }

    /// Block until the next inbound PUBLISH arrives.
    ///
    /// QoS > 0 messages are acknowledged before this returns. A session
    /// error that happened after this call started is raised; stale error
    /// markers from an earlier session are discarded.
    pub async fn get(&self) -> Result<Publish, ClientError> {
        let started = Instant::now();
        let mut inbox = self.shared.session.inbox_rx.lock().await;
        loop {
            match inbox.recv().await {
                None => return Err(ClientError::ConnectionClosed),
                Some(Inbound::Error { error, at }) => {
                    if at >= started {
                        return Err(error);
                    }
                    debug!("Discarding stale session error: {}", error);
                }
                Some(Inbound::Publish(publish)) => {
                    self.acknowledge(&publish);
                    return Ok(publish);
                }
            }
        }
    }

    /// Feed every inbound PUBLISH to `f`, acknowledging QoS > 0 messages
    /// after `f` returns. Runs until the session fails.
    pub async fn each<F>(&self, mut f: F) -> Result<(), ClientError>
    where
        F: FnMut(Publish),
    {
        let started = Instant::now();
        let mut inbox = self.shared.session.inbox_rx.lock().await;
        loop {
            match inbox.recv().await {
                None => return Err(ClientError::ConnectionClosed),
                Some(Inbound::Error { error, at }) => {
                    if at >= started {
                        return Err(error);
                    }
                    debug!("Discarding stale session error: {}", error);
                }
                Some(Inbound::Publish(publish)) => {
                    let ack = (publish.qos, publish.packet_id);
                    f(publish);
                    if let (qos, Some(packet_id)) = ack {
                        if qos != QoS::AtMostOnce {
                            self.shared
                                .session
                                .write_queue
                                .push(Packet::PubAck(crate::protocol::PubAck::new(packet_id)));
                        }
                    }
                }
            }
        }
    }

    /// Block until every packet queued before this call has been written to
    /// the socket.
    pub async fn flush(&self) -> Result<(), ClientError> {
        if !self.shared.session.is_connected() {
            return Err(ClientError::NotConnected);
        }
        let (tx, rx) = oneshot::channel();
        self.shared.session.write_queue.push_flush(tx);
        rx.await.map_err(|_| ClientError::ConnectionClosed)
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    /// Assign a packet id, register the ack slot, and queue the publish
    fn send_tracked_publish(
        &self,
        topic: String,
        payload: Bytes,
        retain: bool,
        qos: QoS,
    ) -> AckSlot {
        let packet_id = self.shared.session.next_packet_id();
        let packet = Packet::Publish(Publish {
            dup: false,
            qos,
            retain,
            topic,
            packet_id: Some(packet_id),
            payload,
        });
        let slot = self
            .shared
            .session
            .register_for_ack(packet.clone(), self.shared.config.ack_timeout_duration());
        self.shared.session.write_queue.push(packet);
        slot
    }

    async fn subscribe_inner(
        &self,
        subscriptions: Vec<Subscription>,
        wait: bool,
    ) -> Result<Option<Packet>, ClientError> {
        if subscriptions.is_empty() {
            return Err(ClientError::InvalidTopic("no topics to subscribe to"));
        }
        if subscriptions.iter().any(|s| s.filter.is_empty()) {
            return Err(ClientError::InvalidTopic("topic cannot be empty"));
        }
        if !self.shared.session.is_connected() {
            return Err(ClientError::NotConnected);
        }

        let packet_id = self.shared.session.next_packet_id();
        let packet = Packet::Subscribe(Subscribe {
            packet_id,
            subscriptions,
        });
        let slot = self
            .shared
            .session
            .register_for_ack(packet.clone(), self.shared.config.ack_timeout_duration());
        self.shared.session.write_queue.push(packet);

        if wait {
            wait_for_ack(slot).await.map(Some)
        } else {
            Ok(None)
        }
    }

    async fn unsubscribe_inner(&self, filters: Vec<String>, wait: bool) -> Result<(), ClientError> {
        if filters.is_empty() {
            return Err(ClientError::InvalidTopic("no topics to unsubscribe from"));
        }
        if filters.iter().any(|f| f.is_empty()) {
            return Err(ClientError::InvalidTopic("topic cannot be empty"));
        }
        if !self.shared.session.is_connected() {
            return Err(ClientError::NotConnected);
        }

        let packet_id = self.shared.session.next_packet_id();
        let packet = Packet::Unsubscribe(Unsubscribe { packet_id, filters });
        let slot = self
            .shared
            .session
            .register_for_ack(packet.clone(), self.shared.config.ack_timeout_duration());
        self.shared.session.write_queue.push(packet);

        if wait {
            wait_for_ack(slot).await.map(|_| ())
        } else {
            Ok(())
        }
    }

    /// Queue the PUBACK for a consumed QoS > 0 message
    fn acknowledge(&self, publish: &Publish) {
        if publish.qos != QoS::AtMostOnce {
            if let Some(packet_id) = publish.packet_id {
                self.shared
                    .session
                    .write_queue
                    .push(Packet::PubAck(crate::protocol::PubAck::new(packet_id)));
            }
        }
    }

    /// Open the socket, perform the CONNECT/CONNACK exchange, and spawn the
    /// worker tasks. Caller must hold the connection mutex.
    async fn connect_locked(&self, conn: &mut ConnHandles) -> Result<(), ClientError> {
        let config = &self.shared.config;
        let host = config
            .host
            .clone()
            .ok_or(ClientError::Config(ConfigError::MissingHost))?;
        let port = config.effective_port();
        let client_id = self.resolve_client_id()?;

        let tcp = TcpStream::connect((host.as_str(), port)).await?;
        tcp.set_nodelay(true)?;
        let mut stream = if config.tls.uses_tls() {
            Stream::Tls(Box::new(tls::connect(tcp, &host, config).await?))
        } else {
            Stream::Tcp(tcp)
        };
        debug!("TCP connected to {}:{}", host, port);

        let connect = Packet::Connect(Box::new(Connect {
            protocol_version: config.version,
            client_id,
            clean_session: config.clean_session,
            keep_alive: config.keep_alive,
            username: config.username.clone(),
            password: config.password.clone().map(Bytes::from),
            will: config.will(),
        }));

        let mut buf = BytesMut::with_capacity(256);
        Encoder::new().encode(&connect, &mut buf)?;
        stream.write_all(&buf).await?;

        // One packet within the ack timeout, and it must be a clean CONNACK
        let (packet, leftover) =
            match timeout(config.ack_timeout_duration(), read_packet(&mut stream)).await {
                Ok(result) => result?,
                Err(_) => {
                    return Err(ClientError::Protocol(ProtocolError::UnexpectedPacket(
                        "no CONNACK before the ack timeout",
                    )))
                }
            };

        match packet {
            Packet::ConnAck(ack) if ack.return_code == ConnectReturnCode::Accepted => {
                debug!("CONNACK received (session_present={})", ack.session_present);
            }
            Packet::ConnAck(ack) => {
                return Err(ClientError::Protocol(ProtocolError::ConnectionRefused(
                    ack.return_code,
                )));
            }
            _ => {
                return Err(ClientError::Protocol(ProtocolError::UnexpectedPacket(
                    "expected CONNACK",
                )));
            }
        }

        let (read_half, write_half) = tokio::io::split(stream);
        self.shared.session.touch();
        self.shared.session.set_connected(true);
        conn.reader = Some(tokio::spawn(
            reader::Reader::new(self.clone(), read_half, leftover).run(),
        ));
        conn.writer = Some(tokio::spawn(
            writer::Writer::new(self.clone(), write_half).run(),
        ));

        info!("Connected to {}:{} (MQTT {})", host, port, config.version);
        Ok(())
    }

    /// Stop both workers and fail every pending acknowledgement. Caller must
    /// hold the connection mutex.
    async fn shutdown_locked(&self, conn: &mut ConnHandles, send_msg: bool) {
        if !self.shared.session.is_connected() {
            return;
        }

        if send_msg {
            // Best-effort DISCONNECT: let the writer drain up to the barrier
            let (tx, rx) = oneshot::channel();
            self.shared.session.write_queue.push(Packet::Disconnect);
            self.shared.session.write_queue.push_flush(tx);
            let _ = timeout(self.shared.config.ack_timeout_duration(), rx).await;
        }

        if let Some(handle) = conn.reader.take() {
            handle.abort();
        }
        if let Some(handle) = conn.writer.take() {
            handle.abort();
        }
        self.shared.session.fail_all_acks();
        self.shared.session.set_connected(false);
        info!("Disconnected");
    }

    /// Recover from a worker failure. Kills the opposite worker, retries the
    /// connection under the connection mutex, and on terminal failure pushes
    /// the original error to the next `get()`.
    pub(crate) async fn reconnect(&self, error: ClientError, role: Role) {
        warn!("Connection lost ({:?} task): {}", role, error);
        let mut conn = self.shared.conn.lock().await;

        match role {
            Role::Reader => {
                if let Some(handle) = conn.writer.take() {
                    handle.abort();
                }
                conn.reader = None;
            }
            Role::Writer => {
                if let Some(handle) = conn.reader.take() {
                    handle.abort();
                }
                conn.writer = None;
            }
        }

        let limit = self.shared.config.reconnect_limit;
        let mut reconnected = false;
        if limit == 0 {
            debug!("Reconnection disabled");
        } else {
            for attempt in 1..=limit {
                info!("Reconnect attempt {}/{}", attempt, limit);
                match self.connect_locked(&mut conn).await {
                    Ok(()) => {
                        reconnected = true;
                        break;
                    }
                    Err(e) => {
                        warn!("Reconnect attempt {} failed: {}", attempt, e);
                        if attempt < limit {
                            let backoff = self.shared.config.reconnect_backoff_duration(attempt);
                            debug!("Backing off for {:?}", backoff);
                            tokio::time::sleep(backoff).await;
                        }
                    }
                }
            }
        }

        if !reconnected {
            error!("Giving up on reconnection: {}", error);
            self.shared.session.fail_all_acks();
            self.shared.session.set_connected(false);
            self.shared.session.push_error(error);
            return;
        }

        // In-flight packets are left to the ordinary timeout walk; only the
        // callback re-establishes subscriptions.
        let handler = self.shared.on_reconnect.read().clone();
        if let Some(handler) = handler {
            if let Err(e) = handler.on_reconnect(self).await {
                warn!("Reconnect callback failed: {}", e);
                self.shared.session.push_error(e);
                self.shutdown_locked(&mut conn, false).await;
            }
        }
    }

    /// The configured client id, a generated one for v3.1.0, or an empty id
    /// for v3.1.1 clean sessions.
    fn resolve_client_id(&self) -> Result<String, ClientError> {
        let config = &self.shared.config;
        match config.client_id.as_deref() {
            Some(id) if !id.is_empty() => Ok(id.to_string()),
            _ => {
                if !config.clean_session {
                    Err(ClientError::Config(ConfigError::MissingClientId))
                } else if config.version == ProtocolVersion::V31 {
                    Ok(generate_client_id())
                } else {
                    Ok(String::new())
                }
            }
        }
    }
}

/// Block on a pending-acknowledgement slot
async fn wait_for_ack(slot: AckSlot) -> Result<Packet, ClientError> {
    match slot.await {
        Ok(AckOutcome::Ack(packet)) => Ok(packet),
        Ok(AckOutcome::ResendLimitExceeded) => Err(ClientError::ResendLimitExceeded),
        Ok(AckOutcome::Closed) | Err(_) => Err(ClientError::ConnectionClosed),
    }
}

/// Read exactly one packet from the stream, returning any bytes that arrived
/// after it so the reader task can pick them up.
async fn read_packet(stream: &mut Stream) -> Result<(Packet, BytesMut), ClientError> {
    let mut decoder = Decoder::new();
    let mut buf = BytesMut::with_capacity(256);
    loop {
        if let Some((packet, consumed)) = decoder.decode(&buf)? {
            buf.advance(consumed);
            return Ok((packet, buf));
        }
        let n = stream.read_buf(&mut buf).await?;
        if n == 0 {
            return Err(ClientError::ConnectionClosed);
        }
    }
}

/// Generate a client id under the v3.1 23-character limit
fn generate_client_id() -> String {
    const CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    let mut id = String::with_capacity(22);
    id.push_str("wispmq");
    let mut seed = rand_id();
    for i in 0..16 {
        if i == 10 {
            seed = rand_id();
        }
        id.push(CHARSET[(seed % CHARSET.len() as u64) as usize] as char);
        seed /= CHARSET.len() as u64;
    }
    id
}

/// Generate a random value without a dedicated RNG dependency
fn rand_id() -> u64 {
    use std::collections::hash_map::RandomState;
    use std::hash::{BuildHasher, Hasher};

    let hasher = RandomState::new().build_hasher();
    hasher.finish()
}

/// Conversion into a SUBSCRIBE topic list. Accepts a bare filter (QoS 0), a
/// `(filter, qos)` pair, vectors of either, and `HashMap<String, QoS>`.
pub trait IntoSubscriptions {
    fn into_subscriptions(self) -> Vec<Subscription>;
}

impl IntoSubscriptions for &str {
    fn into_subscriptions(self) -> Vec<Subscription> {
        vec![Subscription {
            filter: self.to_string(),
            qos: QoS::AtMostOnce,
        }]
    }
}

impl IntoSubscriptions for String {
    fn into_subscriptions(self) -> Vec<Subscription> {
        vec![Subscription {
            filter: self,
            qos: QoS::AtMostOnce,
        }]
    }
}

impl<S: Into<String>> IntoSubscriptions for (S, QoS) {
    fn into_subscriptions(self) -> Vec<Subscription> {
        vec![Subscription {
            filter: self.0.into(),
            qos: self.1,
        }]
    }
}

impl<T: IntoSubscriptions> IntoSubscriptions for Vec<T> {
    fn into_subscriptions(self) -> Vec<Subscription> {
        self.into_iter()
            .flat_map(IntoSubscriptions::into_subscriptions)
            .collect()
    }
}

impl IntoSubscriptions for &[(&str, QoS)] {
    fn into_subscriptions(self) -> Vec<Subscription> {
        self.iter()
            .map(|(filter, qos)| Subscription {
                filter: filter.to_string(),
                qos: *qos,
            })
            .collect()
    }
}

impl IntoSubscriptions for HashMap<String, QoS> {
    fn into_subscriptions(self) -> Vec<Subscription> {
        self.into_iter()
            .map(|(filter, qos)| Subscription { filter, qos })
            .collect()
    }
}

/// Conversion into an UNSUBSCRIBE filter list
pub trait IntoTopicFilters {
    fn into_topic_filters(self) -> Vec<String>;
}

impl IntoTopicFilters for &str {
    fn into_topic_filters(self) -> Vec<String> {
        vec![self.to_string()]
    }
}

impl IntoTopicFilters for String {
    fn into_topic_filters(self) -> Vec<String> {
        vec![self]
    }
}

impl<T: IntoTopicFilters> IntoTopicFilters for Vec<T> {
    fn into_topic_filters(self) -> Vec<String> {
        self.into_iter()
            .flat_map(IntoTopicFilters::into_topic_filters)
            .collect()
    }
}

impl IntoTopicFilters for &[&str] {
    fn into_topic_filters(self) -> Vec<String> {
        self.iter().map(|f| f.to_string()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_client_ids_fit_the_v31_limit() {
        let id = generate_client_id();
        assert_eq!(id.len(), 22);
        assert!(id.len() <= 23);
        assert!(id.starts_with("wispmq"));
        assert!(id
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
    }

    #[test]
    fn generated_client_ids_differ() {
        assert_ne!(generate_client_id(), generate_client_id());
    }

    #[test]
    fn subscription_conversions() {
        let subs = "a/b".into_subscriptions();
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].filter, "a/b");
        assert_eq!(subs[0].qos, QoS::AtMostOnce);

        let subs = ("a/b", QoS::AtLeastOnce).into_subscriptions();
        assert_eq!(subs[0].qos, QoS::AtLeastOnce);

        let subs = vec![("a", QoS::AtMostOnce), ("b", QoS::AtLeastOnce)].into_subscriptions();
        assert_eq!(subs.len(), 2);

        let mut map = HashMap::new();
        map.insert("x".to_string(), QoS::ExactlyOnce);
        let subs = map.into_subscriptions();
        assert_eq!(subs[0].qos, QoS::ExactlyOnce);
    }

    #[test]
    fn filter_conversions() {
        assert_eq!("a".into_topic_filters(), vec!["a".to_string()]);
        assert_eq!(
            vec!["a", "b"].into_topic_filters(),
            vec!["a".to_string(), "b".to_string()]
        );
    }
}
