//! Reader task
//!
//! Owns the socket's read half. Each pass it waits for readable bytes, the
//! session wake signal, or the nearest deadline among pending-ack timeouts
//! and the keep-alive clock, then processes retransmissions and pings.
//! Inbound packets are dispatched here: publishes to the inbox, acks to
//! their pending slots. Any failure hands the error to the reconnect path
//! and ends the task; a successor task is spawned by the reconnect itself.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncReadExt, ReadHalf};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, warn};

use crate::codec::Decoder;
use crate::protocol::Packet;

use super::stream::Stream;
use super::{Client, ClientError, Role};

pub(crate) struct Reader {
    client: Client,
    read_half: ReadHalf<Stream>,
    decoder: Decoder,
    read_buf: BytesMut,
}

impl Reader {
    /// `read_buf` seeds the buffer with any bytes that arrived on the heels
    /// of the CONNACK.
    pub(crate) fn new(client: Client, read_half: ReadHalf<Stream>, read_buf: BytesMut) -> Self {
        Self {
            client,
            read_half,
            decoder: Decoder::new(),
            read_buf,
        }
    }

    pub(crate) fn run(mut self) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        Box::pin(async move {
            if let Err(e) = self.run_inner().await {
                self.client.reconnect(e, Role::Reader).await;
            }
        })
    }

    async fn run_inner(&mut self) -> Result<(), ClientError> {
        // Bytes may already be waiting from the connect exchange
        self.process_buffer()?;

        loop {
            let deadline = self.next_deadline();

            tokio::select! {
                result = self.read_half.read_buf(&mut self.read_buf) => {
                    match result {
                        Ok(0) => return Err(ClientError::ConnectionClosed),
                        Ok(_) => self.process_buffer()?,
                        Err(e) => return Err(e.into()),
                    }
                }
                _ = self.client.shared.session.wake.notified() => {}
                _ = async {
                    match deadline {
                        Some(at) => sleep_until(at).await,
                        None => std::future::pending().await,
                    }
                } => {}
            }

            let config = &self.client.shared.config;
            self.client
                .shared
                .session
                .handle_timeouts(config.ack_timeout_duration(), config.resend_limit);
            self.handle_keep_alives()?;
        }
    }

    /// Earliest of: head pending-ack deadline, next ping due, ping response
    /// deadline. None when neither acks nor keep-alive are active.
    fn next_deadline(&self) -> Option<Instant> {
        let session = &self.client.shared.session;
        let config = &self.client.shared.config;

        let mut deadline = session.head_ack_deadline();

        if config.keep_alive > 0 {
            let keep_alive = Duration::from_secs(config.keep_alive as u64);
            let last = session.last_received();
            let next = if session.keep_alive_sent() {
                last + keep_alive + config.ack_timeout_duration()
            } else {
                last + keep_alive
            };
            deadline = Some(match deadline {
                Some(d) => d.min(next),
                None => next,
            });
        }

        deadline
    }

    /// Decode and dispatch every complete packet in the read buffer
    fn process_buffer(&mut self) -> Result<(), ClientError> {
        while let Some((packet, consumed)) = self.decoder.decode(&self.read_buf)? {
            self.read_buf.advance(consumed);
            self.client.shared.session.touch();
            self.handle_packet(packet);
        }
        Ok(())
    }

    fn handle_packet(&mut self, packet: Packet) {
        let session = &self.client.shared.session;
        match packet {
            Packet::Publish(publish) => {
                debug!(
                    "Received PUBLISH on {:?} ({} bytes)",
                    publish.topic,
                    publish.payload.len()
                );
                session.push_publish(publish);
            }
            Packet::PubAck(_) | Packet::SubAck(_) | Packet::UnsubAck(_) => {
                session.complete_ack(packet);
            }
            Packet::PingResp => {
                debug!("Received PINGRESP");
            }
            other => {
                warn!("Ignoring unexpected {:?} from broker", other.packet_type());
            }
        }
    }

    /// Emit a PINGREQ when the keep-alive interval has elapsed without
    /// traffic, and fail the session when the response never comes.
    fn handle_keep_alives(&mut self) -> Result<(), ClientError> {
        let session = &self.client.shared.session;
        let config = &self.client.shared.config;

        if config.keep_alive == 0 {
            return Ok(());
        }

        let keep_alive = Duration::from_secs(config.keep_alive as u64);
        let last = session.last_received();
        let now = Instant::now();

        if !session.keep_alive_sent() && now >= last + keep_alive {
            debug!("Sending PINGREQ");
            session.write_queue.push(Packet::PingReq);
            session.set_keep_alive_sent();
        } else if session.keep_alive_sent()
            && now >= last + keep_alive + config.ack_timeout_duration()
        {
            return Err(ClientError::KeepAliveTimeout);
        }

        Ok(())
    }
}
