//! Client session state
//!
//! Everything the reader task, the writer task, and the caller-facing
//! operations share: the pending-acknowledgement list, the outbound write
//! queue, the inbound message queue, the keep-alive clock, and the batch
//! accumulator. Locks here are held only for short, non-awaiting sections.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::time::Duration;

use ahash::AHashMap;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot, Notify};
use tokio::time::Instant;
use tracing::debug;

use crate::protocol::{Packet, Publish, QoS};

use super::ClientError;

/// Outcome delivered on a pending-acknowledgement slot
#[derive(Debug)]
pub(crate) enum AckOutcome {
    /// The matching acknowledgement packet arrived
    Ack(Packet),
    /// The session terminated before the acknowledgement
    Closed,
    /// The retransmission limit was reached
    ResendLimitExceeded,
}

/// Receiving end of a pending-acknowledgement slot
pub(crate) type AckSlot = oneshot::Receiver<AckOutcome>;

/// A packet awaiting its acknowledgement
pub(crate) struct PendingAck {
    /// The packet as last transmitted (dup set on retransmissions)
    pub(crate) packet: Packet,
    pub(crate) packet_id: u16,
    /// When the current transmission times out
    pub(crate) timeout_at: Instant,
    /// Transmissions so far, the original included
    pub(crate) send_count: u32,
    tx: Option<oneshot::Sender<AckOutcome>>,
}

/// An entry on the writer's queue
pub(crate) enum WriteItem {
    /// Serialize and write this packet
    Packet(Packet),
    /// Signal the slot instead of touching the socket
    Flush(oneshot::Sender<()>),
}

/// Outbound queue shared between callers and the writer task.
///
/// A plain deque plus a notify: the writer is the only consumer, and the
/// error path needs to put a packet back at the head, which a channel
/// cannot do.
pub(crate) struct WriteQueue {
    queue: Mutex<VecDeque<WriteItem>>,
    notify: Notify,
}

impl WriteQueue {
    fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
        }
    }

    /// Append a packet for transmission
    pub(crate) fn push(&self, packet: Packet) {
        self.queue.lock().push_back(WriteItem::Packet(packet));
        self.notify.notify_one();
    }

    /// Put a packet back at the head after a failed write
    pub(crate) fn push_front(&self, packet: Packet) {
        self.queue.lock().push_front(WriteItem::Packet(packet));
        self.notify.notify_one();
    }

    /// Append a flush barrier
    pub(crate) fn push_flush(&self, tx: oneshot::Sender<()>) {
        self.queue.lock().push_back(WriteItem::Flush(tx));
        self.notify.notify_one();
    }

    /// Dequeue the next item, waiting if the queue is empty
    pub(crate) async fn pop(&self) -> WriteItem {
        loop {
            if let Some(item) = self.queue.lock().pop_front() {
                return item;
            }
            self.notify.notified().await;
        }
    }
}

/// An inbound item for `get()`
pub(crate) enum Inbound {
    /// A PUBLISH received from the broker
    Publish(Publish),
    /// A terminal session error, stamped with when it happened
    Error { error: ClientError, at: Instant },
}

/// QoS > 0 publishes buffered inside a batch scope, keyed by (retain, qos)
struct Batch {
    depth: u32,
    entries: AHashMap<(bool, QoS), AHashMap<String, Bytes>>,
}

/// Shared session state
pub(crate) struct SessionState {
    connected: AtomicBool,
    /// Next packet id; allocation wraps 1..=0xFFFF and never returns 0
    last_packet_id: AtomicU16,
    /// Pending acknowledgements in transmission order
    pending: Mutex<VecDeque<PendingAck>>,
    pub(crate) write_queue: WriteQueue,
    inbox_tx: mpsc::UnboundedSender<Inbound>,
    pub(crate) inbox_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Inbound>>,
    /// Breaks the reader out of its timed wait when new work appears
    pub(crate) wake: Notify,
    /// Time of the most recent packet delivery from the broker
    last_received: Mutex<Instant>,
    /// True after a PINGREQ went out and before any packet came back
    keep_alive_sent: AtomicBool,
    batch: Mutex<Option<Batch>>,
}

impl SessionState {
    pub(crate) fn new() -> Self {
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        Self {
            connected: AtomicBool::new(false),
            last_packet_id: AtomicU16::new(1),
            pending: Mutex::new(VecDeque::new()),
            write_queue: WriteQueue::new(),
            inbox_tx,
            inbox_rx: tokio::sync::Mutex::new(inbox_rx),
            wake: Notify::new(),
            last_received: Mutex::new(Instant::now()),
            keep_alive_sent: AtomicBool::new(false),
            batch: Mutex::new(None),
        }
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub(crate) fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Release);
    }

    /// Allocate the next packet id, skipping 0 on wrap-around
    pub(crate) fn next_packet_id(&self) -> u16 {
        let id = self.last_packet_id.fetch_add(1, Ordering::SeqCst);
        if id == 0 {
            self.last_packet_id.fetch_add(1, Ordering::SeqCst)
        } else {
            id
        }
    }

    /// Record a packet delivery from the broker
    pub(crate) fn touch(&self) {
        *self.last_received.lock() = Instant::now();
        self.keep_alive_sent.store(false, Ordering::Release);
    }

    pub(crate) fn last_received(&self) -> Instant {
        *self.last_received.lock()
    }

    pub(crate) fn keep_alive_sent(&self) -> bool {
        self.keep_alive_sent.load(Ordering::Acquire)
    }

    pub(crate) fn set_keep_alive_sent(&self) {
        self.keep_alive_sent.store(true, Ordering::Release);
    }

    /// Track a packet until its acknowledgement arrives.
    ///
    /// Waking the reader when the list was empty lets it shrink its wait to
    /// the new head's deadline.
    pub(crate) fn register_for_ack(&self, packet: Packet, ack_timeout: Duration) -> AckSlot {
        let packet_id = packet.packet_id().unwrap_or_default();
        let (tx, rx) = oneshot::channel();

        let mut pending = self.pending.lock();
        let was_empty = pending.is_empty();
        pending.push_back(PendingAck {
            packet,
            packet_id,
            timeout_at: Instant::now() + ack_timeout,
            send_count: 1,
            tx: Some(tx),
        });
        drop(pending);

        if was_empty {
            self.wake.notify_one();
        }
        rx
    }

    /// Deliver an acknowledgement to its pending slot; unknown ids are
    /// silently ignored.
    pub(crate) fn complete_ack(&self, ack: Packet) {
        let Some(packet_id) = ack.packet_id() else {
            return;
        };

        let entry = {
            let mut pending = self.pending.lock();
            match pending.iter().position(|p| p.packet_id == packet_id) {
                Some(idx) => pending.remove(idx),
                None => None,
            }
        };

        match entry {
            Some(mut entry) => {
                if let Some(tx) = entry.tx.take() {
                    let _ = tx.send(AckOutcome::Ack(ack));
                }
            }
            None => debug!("Ignoring ack for unknown packet id {}", packet_id),
        }
    }

    /// Fail every pending acknowledgement with `Closed` and clear the list
    pub(crate) fn fail_all_acks(&self) {
        let drained: Vec<PendingAck> = self.pending.lock().drain(..).collect();
        for mut entry in drained {
            if let Some(tx) = entry.tx.take() {
                let _ = tx.send(AckOutcome::Closed);
            }
        }
    }

    /// Deadline of the oldest pending acknowledgement
    pub(crate) fn head_ack_deadline(&self) -> Option<Instant> {
        self.pending.lock().front().map(|p| p.timeout_at)
    }

    /// Walk the pending list in transmission order, retransmitting or
    /// failing every entry whose deadline has passed.
    pub(crate) fn handle_timeouts(&self, ack_timeout: Duration, resend_limit: u32) {
        let now = Instant::now();
        let mut to_send = Vec::new();
        let mut wake = false;

        {
            let mut pending = self.pending.lock();
            let mut idx = 0;
            while idx < pending.len() {
                if pending[idx].timeout_at > now {
                    // Later entries were sent later; nothing past this point
                    // has expired yet.
                    break;
                }

                pending[idx].send_count += 1;
                if pending[idx].send_count > resend_limit {
                    if let Some(mut entry) = pending.remove(idx) {
                        debug!(
                            "Giving up on packet id {} after {} transmissions",
                            entry.packet_id,
                            entry.send_count - 1
                        );
                        if let Some(tx) = entry.tx.take() {
                            let _ = tx.send(AckOutcome::ResendLimitExceeded);
                        }
                    }
                } else {
                    let entry = &mut pending[idx];
                    entry.timeout_at = now + ack_timeout;
                    entry.packet.set_dup();
                    to_send.push(entry.packet.clone());
                    if idx == 0 {
                        wake = true;
                    }
                    idx += 1;
                }
            }
        }

        for packet in to_send {
            debug!("Retransmitting packet id {:?}", packet.packet_id());
            self.write_queue.push(packet);
        }
        if wake {
            self.wake.notify_one();
        }
    }

    /// Hand an inbound PUBLISH to `get()`
    pub(crate) fn push_publish(&self, publish: Publish) {
        let _ = self.inbox_tx.send(Inbound::Publish(publish));
    }

    /// Surface a terminal error to the next `get()`
    pub(crate) fn push_error(&self, error: ClientError) {
        let _ = self.inbox_tx.send(Inbound::Error {
            error,
            at: Instant::now(),
        });
    }

    /// Open a batch scope (or nest inside the current one)
    pub(crate) fn begin_batch(&self) {
        let mut batch = self.batch.lock();
        match batch.as_mut() {
            Some(b) => b.depth += 1,
            None => {
                *batch = Some(Batch {
                    depth: 1,
                    entries: AHashMap::new(),
                })
            }
        }
    }

    /// Close a batch scope; returns the accumulated entries when the
    /// outermost scope ends.
    #[allow(clippy::type_complexity)]
    pub(crate) fn end_batch(
        &self,
    ) -> Option<AHashMap<(bool, QoS), AHashMap<String, Bytes>>> {
        let mut batch = self.batch.lock();
        let b = batch.as_mut()?;
        b.depth -= 1;
        if b.depth == 0 {
            batch.take().map(|b| b.entries)
        } else {
            None
        }
    }

    #[cfg(test)]
    pub(crate) fn set_last_packet_id(&self, id: u16) {
        self.last_packet_id.store(id, Ordering::SeqCst);
    }

    /// Buffer a publish into the active batch scope. When no scope is open,
    /// the arguments come back so the caller can send directly.
    pub(crate) fn try_buffer(
        &self,
        retain: bool,
        qos: QoS,
        topic: String,
        payload: Bytes,
    ) -> Result<(), (String, Bytes)> {
        let mut batch = self.batch.lock();
        match batch.as_mut() {
            Some(b) => {
                b.entries
                    .entry((retain, qos))
                    .or_default()
                    .insert(topic, payload);
                Ok(())
            }
            None => Err((topic, payload)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::PubAck;

    fn publish_packet(id: u16) -> Packet {
        Packet::Publish(Publish {
            qos: QoS::AtLeastOnce,
            topic: "t".to_string(),
            packet_id: Some(id),
            ..Default::default()
        })
    }

    #[test]
    fn packet_id_allocation_never_returns_zero() {
        let session = SessionState::new();
        assert_eq!(session.next_packet_id(), 1);
        assert_eq!(session.next_packet_id(), 2);

        session.set_last_packet_id(0xFFFF);
        assert_eq!(session.next_packet_id(), 0xFFFF);
        assert_eq!(session.next_packet_id(), 1);
    }

    #[test]
    fn pending_acks_keep_transmission_order() {
        let session = SessionState::new();
        let _slot1 = session.register_for_ack(publish_packet(1), Duration::from_secs(1));
        let _slot2 = session.register_for_ack(publish_packet(2), Duration::from_secs(2));
        let _slot3 = session.register_for_ack(publish_packet(3), Duration::from_secs(3));

        let pending = session.pending.lock();
        let ids: Vec<u16> = pending.iter().map(|p| p.packet_id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        // The head's deadline is the earliest
        assert!(pending
            .iter()
            .all(|p| pending[0].timeout_at <= p.timeout_at));
    }

    #[test]
    fn completing_an_ack_delivers_the_packet_to_its_slot() {
        let session = SessionState::new();
        let mut slot1 = session.register_for_ack(publish_packet(1), Duration::from_secs(5));
        let mut slot2 = session.register_for_ack(publish_packet(2), Duration::from_secs(5));

        session.complete_ack(Packet::PubAck(PubAck::new(2)));

        assert!(slot1.try_recv().is_err());
        match slot2.try_recv() {
            Ok(AckOutcome::Ack(Packet::PubAck(ack))) => assert_eq!(ack.packet_id, 2),
            other => panic!("expected delivered ack, got {:?}", other),
        }
        assert_eq!(session.pending.lock().len(), 1);

        // Unknown ids leave the list untouched
        session.complete_ack(Packet::PubAck(PubAck::new(42)));
        assert_eq!(session.pending.lock().len(), 1);
    }

    #[test]
    fn expired_entries_are_retransmitted_with_the_dup_flag() {
        let session = SessionState::new();
        let _slot = session.register_for_ack(publish_packet(7), Duration::ZERO);

        session.handle_timeouts(Duration::from_secs(5), 5);

        let mut queue = session.write_queue.queue.lock();
        match queue.pop_front() {
            Some(WriteItem::Packet(Packet::Publish(p))) => {
                assert!(p.dup);
                assert_eq!(p.packet_id, Some(7));
            }
            _ => panic!("expected a retransmitted PUBLISH"),
        }
        drop(queue);

        let pending = session.pending.lock();
        assert_eq!(pending[0].send_count, 2);
        assert!(pending[0].timeout_at > Instant::now() + Duration::from_secs(4));
    }

    #[test]
    fn exhausted_entries_fail_with_resend_limit_exceeded() {
        let session = SessionState::new();
        let mut slot = session.register_for_ack(publish_packet(9), Duration::ZERO);

        session.handle_timeouts(Duration::ZERO, 1);

        match slot.try_recv() {
            Ok(AckOutcome::ResendLimitExceeded) => {}
            other => panic!("expected resend limit outcome, got {:?}", other),
        }
        assert!(session.pending.lock().is_empty());
        // Nothing was queued for retransmission
        assert!(session.write_queue.queue.lock().is_empty());
    }

    #[test]
    fn fail_all_acks_closes_every_slot() {
        let session = SessionState::new();
        let mut slot1 = session.register_for_ack(publish_packet(1), Duration::from_secs(5));
        let mut slot2 = session.register_for_ack(publish_packet(2), Duration::from_secs(5));

        session.fail_all_acks();

        assert!(matches!(slot1.try_recv(), Ok(AckOutcome::Closed)));
        assert!(matches!(slot2.try_recv(), Ok(AckOutcome::Closed)));
        assert!(session.pending.lock().is_empty());
    }

    #[test]
    fn nested_batches_collapse_into_the_outermost() {
        let session = SessionState::new();

        session.begin_batch();
        session.begin_batch();
        session
            .try_buffer(false, QoS::AtLeastOnce, "a".to_string(), Bytes::from("1"))
            .unwrap();
        assert!(session.end_batch().is_none());

        session
            .try_buffer(true, QoS::AtLeastOnce, "b".to_string(), Bytes::from("2"))
            .unwrap();
        let entries = session.end_batch().expect("outermost scope must flush");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[&(false, QoS::AtLeastOnce)]["a"], Bytes::from("1"));
        assert_eq!(entries[&(true, QoS::AtLeastOnce)]["b"], Bytes::from("2"));
    }

    #[test]
    fn buffering_outside_a_batch_returns_the_message() {
        let session = SessionState::new();
        let err = session.try_buffer(false, QoS::AtLeastOnce, "a".to_string(), Bytes::from("1"));
        assert_eq!(err, Err(("a".to_string(), Bytes::from("1"))));
    }
}
