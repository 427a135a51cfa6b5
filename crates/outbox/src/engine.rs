use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::Connection;
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::db::{self, init_db};
use crate::error::Result;
use crate::types::OutboxEvent;

/// Handles one outbox event type. Registered handlers are looked up by
/// `OutboxEvent::event_type`; an event with no registered handler is logged
/// and left dispatched (there is nothing useful to retry).
#[async_trait]
pub trait OutboxHandler: Send + Sync {
    async fn handle(&self, event: &OutboxEvent) -> anyhow::Result<()>;
}

const POLL_SECS: u64 = 5;
const BATCH_SIZE: u32 = 50;

/// Polls `outbox_events` for undispatched rows and routes each to its
/// registered handler. A handler failure is logged; the row is left
/// undispatched so it is retried on the next poll.
pub struct OutboxDispatcher {
    conn: Arc<Mutex<Connection>>,
    handlers: HashMap<String, Arc<dyn OutboxHandler>>,
}

impl OutboxDispatcher {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Result<Self> {
        {
            let c = conn.lock().unwrap();
            init_db(&c)?;
        }
        Ok(Self { conn, handlers: HashMap::new() })
    }

    pub fn register(&mut self, event_type: impl Into<String>, handler: Arc<dyn OutboxHandler>) {
        self.handlers.insert(event_type.into(), handler);
    }

    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!("outbox dispatcher started");
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(POLL_SECS));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.tick().await {
                        error!("outbox dispatcher tick error: {e}");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("outbox dispatcher shutting down");
                        break;
                    }
                }
            }
        }
    }

    async fn tick(&mut self) -> Result<()> {
        let pending = {
            let conn = self.conn.lock().unwrap();
            db::pending_events(&conn, BATCH_SIZE)?
        };
        for event in pending {
            match self.handlers.get(&event.event_type) {
                Some(handler) => match handler.handle(&event).await {
                    Ok(()) => {
                        let conn = self.conn.lock().unwrap();
                        db::mark_dispatched(&conn, &event.id)?;
                        debug!(event_id = %event.id, event_type = %event.event_type, "outbox event dispatched");
                    }
                    Err(e) => {
                        error!(event_id = %event.id, event_type = %event.event_type, error = %e, "outbox handler failed, will retry");
                    }
                },
                None => {
                    error!(event_type = %event.event_type, "no handler registered for outbox event type, leaving undispatched");
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingHandler(Arc<AtomicUsize>);

    #[async_trait]
    impl OutboxHandler for CountingHandler {
        async fn handle(&self, _event: &OutboxEvent) -> anyhow::Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FailingHandler;

    #[async_trait]
    impl OutboxHandler for FailingHandler {
        async fn handle(&self, _event: &OutboxEvent) -> anyhow::Result<()> {
            anyhow::bail!("always fails")
        }
    }

    fn setup() -> Arc<Mutex<Connection>> {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        Arc::new(Mutex::new(conn))
    }

    #[tokio::test]
    async fn dispatches_and_marks_handled() {
        let conn = setup();
        {
            let c = conn.lock().unwrap();
            db::enqueue_event(&c, "tenant-1", "order", "order-1", "order.placed", "{}").unwrap();
        }
        let counter = Arc::new(AtomicUsize::new(0));
        let mut dispatcher = OutboxDispatcher::new(conn.clone()).unwrap();
        dispatcher.register("order.placed", Arc::new(CountingHandler(counter.clone())));
        dispatcher.tick().await.unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        let c = conn.lock().unwrap();
        let pending = db::pending_events(&c, 10).unwrap();
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn failed_handler_leaves_event_pending_for_retry() {
        let conn = setup();
        {
            let c = conn.lock().unwrap();
            db::enqueue_event(&c, "tenant-1", "order", "order-1", "order.placed", "{}").unwrap();
        }
        let mut dispatcher = OutboxDispatcher::new(conn.clone()).unwrap();
        dispatcher.register("order.placed", Arc::new(FailingHandler));
        dispatcher.tick().await.unwrap();

        let c = conn.lock().unwrap();
        let pending = db::pending_events(&c, 10).unwrap();
        assert_eq!(pending.len(), 1);
    }
}
