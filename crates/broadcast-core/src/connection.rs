//! Connection table — tracks live sockets and the metadata attached to
//! each (user id, subscribed channels, last-seen instant).

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tokio::time::Instant;

use broadcast_protocol::ServerFrame;

/// Outbound half of a connection: frames queued here are written to the
/// socket by its owning task. Bounded so a slow client applies backpressure
/// rather than growing memory without limit.
pub type OutboxSender = mpsc::Sender<ServerFrame>;
pub type OutboxReceiver = mpsc::Receiver<ServerFrame>;

#[derive(Debug)]
pub struct ConnectionHandle {
    pub socket_id: String,
    pub user_id: Option<String>,
    pub outbox: OutboxSender,
    pub connected_at: Instant,
    channels: RwLock<HashSet<String>>,
    last_seen: RwLock<Instant>,
    outbox_bytes: AtomicUsize,
}

impl ConnectionHandle {
    pub fn new(socket_id: String, user_id: Option<String>, outbox: OutboxSender) -> Self {
        let now = Instant::now();
        ConnectionHandle {
            socket_id,
            user_id,
            outbox,
            connected_at: now,
            channels: RwLock::new(HashSet::new()),
            last_seen: RwLock::new(now),
            outbox_bytes: AtomicUsize::new(0),
        }
    }

    pub async fn touch(&self) {
        *self.last_seen.write().await = Instant::now();
    }

    pub async fn idle_for(&self) -> std::time::Duration {
        self.last_seen.read().await.elapsed()
    }

    pub async fn note_channel(&self, channel: &str) {
        self.channels.write().await.insert(channel.to_owned());
    }

    pub async fn forget_channel(&self, channel: &str) {
        self.channels.write().await.remove(channel);
    }

    pub async fn channel_count(&self) -> usize {
        self.channels.read().await.len()
    }

    pub async fn channels(&self) -> Vec<String> {
        self.channels.read().await.iter().cloned().collect()
    }

    pub async fn send(&self, frame: ServerFrame) -> bool {
        let len = frame.byte_len();
        let sent = self.outbox.send(frame).await.is_ok();
        if sent {
            self.outbox_bytes.fetch_add(len, Ordering::SeqCst);
        }
        sent
    }

    /// Marks `len` bytes as drained from the outbox, called by the socket
    /// write loop once a queued frame has actually been written.
    pub fn outbox_drained(&self, len: usize) {
        self.outbox_bytes.fetch_sub(len, Ordering::SeqCst);
    }

    /// Approximate count of bytes queued in the outbox but not yet written
    /// to the socket, used as the backpressure signal.
    pub fn outbox_bytes(&self) -> usize {
        self.outbox_bytes.load(Ordering::SeqCst)
    }
}

/// Registry of all live connections on this node, keyed by socket id.
#[derive(Default)]
pub struct ConnectionTable {
    connections: RwLock<std::collections::HashMap<String, Arc<ConnectionHandle>>>,
}

impl ConnectionTable {
    pub fn new() -> Self {
        ConnectionTable {
            connections: RwLock::new(std::collections::HashMap::new()),
        }
    }

    pub async fn insert(&self, handle: Arc<ConnectionHandle>) {
        self.connections
            .write()
            .await
            .insert(handle.socket_id.clone(), handle);
    }

    pub async fn remove(&self, socket_id: &str) -> Option<Arc<ConnectionHandle>> {
        self.connections.write().await.remove(socket_id)
    }

    pub async fn get(&self, socket_id: &str) -> Option<Arc<ConnectionHandle>> {
        self.connections.read().await.get(socket_id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.connections.read().await.is_empty()
    }

    pub async fn all(&self) -> Vec<Arc<ConnectionHandle>> {
        self.connections.read().await.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(socket_id: &str) -> (Arc<ConnectionHandle>, OutboxReceiver) {
        let (tx, rx) = mpsc::channel(16);
        (
            Arc::new(ConnectionHandle::new(socket_id.to_owned(), None, tx)),
            rx,
        )
    }

    #[tokio::test]
    async fn insert_and_lookup_round_trips() {
        let table = ConnectionTable::new();
        let (h, _rx) = handle("sock-1");
        table.insert(h.clone()).await;
        assert!(table.get("sock-1").await.is_some());
        assert_eq!(table.len().await, 1);
    }

    #[tokio::test]
    async fn remove_drops_the_handle() {
        let table = ConnectionTable::new();
        let (h, _rx) = handle("sock-1");
        table.insert(h).await;
        table.remove("sock-1").await;
        assert!(table.get("sock-1").await.is_none());
        assert!(table.is_empty().await);
    }

    #[tokio::test]
    async fn note_and_forget_channel_tracks_membership() {
        let (h, _rx) = handle("sock-1");
        h.note_channel("public-room").await;
        assert_eq!(h.channel_count().await, 1);
        h.forget_channel("public-room").await;
        assert_eq!(h.channel_count().await, 0);
    }

    #[tokio::test]
    async fn send_delivers_to_the_outbox() {
        let (h, mut rx) = handle("sock-1");
        let frame = ServerFrame::new("test-event");
        assert!(h.send(frame).await);
        assert!(rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn outbox_bytes_tracks_queued_then_drained_frames() {
        let (h, _rx) = handle("sock-1");
        let frame = ServerFrame::new("test-event");
        let len = frame.byte_len();
        h.send(frame).await;
        assert_eq!(h.outbox_bytes(), len);
        h.outbox_drained(len);
        assert_eq!(h.outbox_bytes(), 0);
    }
}
