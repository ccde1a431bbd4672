//! Writer task
//!
//! Drains the session write queue onto the socket's write half, one packet
//! at a time, in enqueue order. Flush barriers are acknowledged by signaling
//! their slot instead of writing. A failed write puts the packet back at the
//! head of the queue so it goes out again after reconnection, then hands the
//! error to the reconnect path and exits.

use std::future::Future;
use std::pin::Pin;

use bytes::BytesMut;
use tokio::io::{AsyncWriteExt, WriteHalf};
use tracing::{debug, error};

use crate::codec::Encoder;
use crate::protocol::Packet;

use super::session::WriteItem;
use super::stream::Stream;
use super::{Client, Role};

pub(crate) struct Writer {
    client: Client,
    write_half: WriteHalf<Stream>,
    encoder: Encoder,
    buf: BytesMut,
}

impl Writer {
    pub(crate) fn new(client: Client, write_half: WriteHalf<Stream>) -> Self {
        Self {
            client,
            write_half,
            encoder: Encoder::new(),
            buf: BytesMut::with_capacity(1024),
        }
    }

    pub(crate) fn run(mut self) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        Box::pin(async move {
            loop {
                let item = self.client.shared.session.write_queue.pop().await;
                match item {
                    WriteItem::Packet(packet) => {
                        if let Err(e) = self.write_packet(&packet).await {
                            debug!("Write failed, requeueing packet at head: {}", e);
                            self.client
                                .shared
                                .session
                                .write_queue
                                .push_front(packet);
                            self.client.reconnect(e.into(), Role::Writer).await;
                            return;
                        }
                    }
                    WriteItem::Flush(tx) => {
                        let _ = tx.send(());
                    }
                }
            }
        })
    }

    async fn write_packet(&mut self, packet: &Packet) -> std::io::Result<()> {
        self.buf.clear();
        if let Err(e) = self.encoder.encode(packet, &mut self.buf) {
            // Nothing was written; drop the packet rather than wedge the queue
            error!("Failed to encode outbound packet: {}", e);
            return Ok(());
        }
        self.write_half.write_all(&self.buf).await
    }
}
