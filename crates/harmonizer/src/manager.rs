use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dashmap::DashMap;
use rusqlite::Connection;
use tokio::sync::mpsc;
use tracing::{debug, instrument};

use crate::error::Result;
use crate::types::{BurstMessage, HarmonizedBurst};

struct BurstState {
    messages: Vec<BurstMessage>,
    /// Bumped on every new arrival; a pending flush task compares its
    /// captured generation against the live one and no-ops if they differ,
    /// which is how a fresh message "resets" the debounce window without
    /// cancelling and respawning a timer task.
    generation: u64,
}

/// Buffers inbound WhatsApp messages per conversation for a short window so
/// a customer's rapid-fire multi-message burst ("hi", "do you have the blue
/// one", "in medium") reaches the AI agent orchestrator as one turn instead
/// of three (spec §4.2).
///
/// Per-conversation state lives in a `DashMap` guarded by nothing heavier
/// than the map's own sharding — the same lock-free shape
/// `skynet-gateway::AppState` uses for `active_operations` and
/// `ws_clients`. Idempotency (dropping webhook retries of a message this
/// platform already harmonized) is delegated to `db::record_if_new`.
pub struct BurstHarmonizer {
    db: Arc<Mutex<Connection>>,
    buffers: Arc<DashMap<String, BurstState>>,
    window: Duration,
    flushed_tx: mpsc::Sender<HarmonizedBurst>,
    seq: AtomicU64,
}

impl BurstHarmonizer {
    /// `window_secs` should already be clamped to the supported 1-10s range
    /// (see `platform_core::config::HarmonizerConfig::clamped_window_secs`).
    pub fn new(
        db: Arc<Mutex<Connection>>,
        window_secs: u64,
    ) -> (Self, mpsc::Receiver<HarmonizedBurst>) {
        let (tx, rx) = mpsc::channel(256);
        (
            Self {
                db,
                buffers: Arc::new(DashMap::new()),
                window: Duration::from_secs(window_secs.max(1)),
                flushed_tx: tx,
                seq: AtomicU64::new(0),
            },
            rx,
        )
    }

    /// Accepts one inbound message. Returns `Ok(false)` without buffering if
    /// `provider_message_id` was already harmonized (at-least-once webhook
    /// retry), `Ok(true)` otherwise.
    #[instrument(skip(self, text), fields(conversation_id, provider_message_id))]
    pub fn accept(
        &self,
        conversation_id: &str,
        provider_message_id: &str,
        text: &str,
        received_at: &str,
    ) -> Result<bool> {
        {
            let conn = self.db.lock().unwrap();
            if !crate::db::record_if_new(&conn, provider_message_id, conversation_id, received_at)? {
                debug!("duplicate provider message id, dropped");
                return Ok(false);
            }
        }

        let generation = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        {
            let mut entry = self.buffers.entry(conversation_id.to_string()).or_insert_with(|| {
                BurstState { messages: Vec::new(), generation: 0 }
            });
            entry.messages.push(BurstMessage {
                provider_message_id: provider_message_id.to_string(),
                text: text.to_string(),
                received_at: received_at.to_string(),
            });
            entry.generation = generation;
        }

        self.schedule_flush(conversation_id.to_string(), generation);
        Ok(true)
    }

    fn schedule_flush(&self, conversation_id: String, generation: u64) {
        let buffers = Arc::clone(&self.buffers);
        let tx = self.flushed_tx.clone();
        let window = self.window;
        tokio::spawn(async move {
            tokio::time::sleep(window).await;

            let is_latest = buffers
                .get(&conversation_id)
                .map(|s| s.generation == generation)
                .unwrap_or(false);
            if !is_latest {
                // A newer message arrived during the sleep; its own flush task
                // will fire once the window elapses from its arrival instead.
                return;
            }

            if let Some((_, state)) = buffers.remove(&conversation_id) {
                let burst = HarmonizedBurst { conversation_id, messages: state.messages };
                let _ = tx.send(burst).await;
            }
        });
    }

    /// Number of conversations with a burst currently buffering. Exposed for
    /// tests and health metrics.
    pub fn pending_count(&self) -> usize {
        self.buffers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Arc<Mutex<Connection>> {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::init_db(&conn).unwrap();
        Arc::new(Mutex::new(conn))
    }

    #[tokio::test]
    async fn bursts_within_window_are_combined() {
        let (h, mut rx) = BurstHarmonizer::new(test_db(), 1);

        h.accept("c1", "m1", "hi", "t1").unwrap();
        h.accept("c1", "m2", "how much is the blue one", "t2").unwrap();

        let burst = rx.recv().await.expect("expected a flushed burst");
        assert_eq!(burst.messages.len(), 2);
        assert_eq!(burst.combined_text(), "hi\nhow much is the blue one");
    }

    #[tokio::test]
    async fn duplicate_provider_message_id_is_dropped() {
        let (h, mut rx) = BurstHarmonizer::new(test_db(), 1);
        assert!(h.accept("c1", "m1", "hi", "t1").unwrap());
        assert!(!h.accept("c1", "m1", "hi again (retry)", "t1").unwrap());

        let burst = rx.recv().await.expect("expected a flushed burst");
        assert_eq!(burst.messages.len(), 1);
    }

    #[tokio::test]
    async fn separate_conversations_do_not_mix() {
        let (h, mut rx) = BurstHarmonizer::new(test_db(), 1);
        h.accept("c1", "m1", "hi", "t1").unwrap();
        h.accept("c2", "m2", "hello", "t2").unwrap();

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        let ids: Vec<_> = [first.conversation_id, second.conversation_id].into();
        assert!(ids.contains(&"c1".to_string()));
        assert!(ids.contains(&"c2".to_string()));
    }
}
