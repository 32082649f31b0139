//! Acknowledger — tracks outbound frames awaiting a client `ack` and
//! retries delivery up to a fixed attempt count, each attempt timed
//! independently (per-attempt timeout, not one deadline for the whole
//! retry sequence).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, RwLock};
use tokio::time::timeout;

struct Pending {
    acked: oneshot::Sender<()>,
}

/// Tracks in-flight acks by message id. Redelivery (re-sending the frame on
/// timeout) is the orchestrator's responsibility; this type only answers
/// "has this message id been acked yet" and supplies the per-attempt wait.
#[derive(Default)]
pub struct Acknowledger {
    pending: RwLock<HashMap<String, Pending>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckResult {
    Acked,
    TimedOut,
}

impl Acknowledger {
    pub fn new() -> Self {
        Acknowledger {
            pending: RwLock::new(HashMap::new()),
        }
    }

    /// Registers `message_id` as awaiting acknowledgment and waits up to
    /// `attempt_timeout` for it to arrive. Call once per retry attempt: a
    /// `TimedOut` result lets the caller re-send and call this again.
    pub async fn await_ack(self: &Arc<Self>, message_id: &str, attempt_timeout: Duration) -> AckResult {
        let (tx, rx) = oneshot::channel();
        self.pending
            .write()
            .await
            .insert(message_id.to_owned(), Pending { acked: tx });

        let result = match timeout(attempt_timeout, rx).await {
            Ok(_) => AckResult::Acked,
            Err(_) => AckResult::TimedOut,
        };

        self.pending.write().await.remove(message_id);
        result
    }

    /// Resolves a pending ack. Idempotent no-op if `message_id` isn't
    /// registered (late or duplicate ack).
    pub async fn acknowledge(&self, message_id: &str) {
        if let Some(pending) = self.pending.write().await.remove(message_id) {
            let _ = pending.acked.send(());
        }
    }

    /// Drops a pending registration without resolving it, e.g. when the
    /// retry budget is exhausted and the orchestrator gives up.
    pub async fn clear(&self, message_id: &str) {
        self.pending.write().await.remove(message_id);
    }

    pub async fn pending_count(&self) -> usize {
        self.pending.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acked_before_timeout_resolves_as_acked() {
        let acker = Arc::new(Acknowledger::new());
        let acker2 = acker.clone();
        let wait = tokio::spawn(async move {
            acker2.await_ack("m1", Duration::from_millis(200)).await
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        acker.acknowledge("m1").await;
        assert_eq!(wait.await.unwrap(), AckResult::Acked);
    }

    #[tokio::test]
    async fn unacked_message_times_out() {
        let acker = Arc::new(Acknowledger::new());
        let result = acker.await_ack("m2", Duration::from_millis(10)).await;
        assert_eq!(result, AckResult::TimedOut);
    }

    #[tokio::test]
    async fn each_attempt_gets_its_own_timeout_window() {
        let acker = Arc::new(Acknowledger::new());
        let first = acker.await_ack("m3", Duration::from_millis(5)).await;
        assert_eq!(first, AckResult::TimedOut);
        let acker2 = acker.clone();
        let wait = tokio::spawn(async move {
            acker2.await_ack("m3", Duration::from_millis(200)).await
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        acker.acknowledge("m3").await;
        assert_eq!(wait.await.unwrap(), AckResult::Acked);
    }

    #[tokio::test]
    async fn late_acknowledge_after_timeout_is_a_no_op() {
        let acker = Arc::new(Acknowledger::new());
        let _ = acker.await_ack("m4", Duration::from_millis(5)).await;
        acker.acknowledge("m4").await;
        assert_eq!(acker.pending_count().await, 0);
    }
}
