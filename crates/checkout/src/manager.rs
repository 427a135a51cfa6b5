use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::Connection;
use tokio::time::{sleep, Duration};
use tracing::{info, warn};

use crate::db;
use crate::error::{CheckoutError, Result};
use crate::types::{CheckoutSession, CheckoutState, Order, OrderStatus, PaymentRequest, PaymentStatus};
use grounding::CatalogItem;

/// Maximum outbound messages emitted from `ProductSelected` through
/// `PaymentInitiated` inclusive (spec §4.3).
pub const MESSAGE_BUDGET: u32 = 3;

/// Invokes a tenant's configured payment provider to start a charge.
#[async_trait]
pub trait PaymentCapability: Send + Sync {
    /// Returns a provider-assigned reference id on success.
    async fn initiate(&self, order: &Order) -> std::result::Result<String, String>;
}

fn ensure_state(session: &CheckoutSession, expected: CheckoutState, event: &str) -> Result<()> {
    if session.state != expected {
        return Err(CheckoutError::InvalidTransition {
            from: session.state.to_string(),
            event: event.to_string(),
        });
    }
    Ok(())
}

pub struct CheckoutMachine {
    conn: Arc<Mutex<Connection>>,
}

impl CheckoutMachine {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Result<Self> {
        {
            let c = conn.lock().unwrap();
            db::init_db(&c)?;
        }
        Ok(Self { conn })
    }

    pub fn start(&self, tenant_id: &str, conversation_id: &str, customer_id: &str) -> Result<CheckoutSession> {
        let conn = self.conn.lock().unwrap();
        db::create_session(&conn, tenant_id, conversation_id, customer_id)
    }

    /// `Browsing -> ProductSelected` on a resolvable, in-stock catalog item.
    pub fn select_product(&self, session: &CheckoutSession, item: &CatalogItem) -> Result<CheckoutSession> {
        ensure_state(session, CheckoutState::Browsing, "select_product")?;
        if !item.in_stock {
            return Err(CheckoutError::OutOfStock(item.sku.clone()));
        }
        let conn = self.conn.lock().unwrap();
        db::update_session(
            &conn,
            &session.id,
            CheckoutState::ProductSelected,
            Some(&item.sku),
            None,
            None,
            None,
            session.outbound_message_count,
        )?;
        db::get_session(&conn, &session.id)?.ok_or_else(|| CheckoutError::NotFound(session.id.clone()))
    }

    /// `ProductSelected -> QuantityConfirmed` on a positive quantity within stock.
    pub fn confirm_quantity(
        &self,
        session: &CheckoutSession,
        quantity: u32,
        available_stock: u32,
    ) -> Result<CheckoutSession> {
        ensure_state(session, CheckoutState::ProductSelected, "confirm_quantity")?;
        if quantity == 0 || quantity > available_stock {
            return Err(CheckoutError::QuantityExceedsStock { requested: quantity, available: available_stock });
        }
        let conn = self.conn.lock().unwrap();
        db::update_session(
            &conn,
            &session.id,
            CheckoutState::QuantityConfirmed,
            session.product_sku.as_deref(),
            Some(quantity),
            None,
            None,
            session.outbound_message_count,
        )?;
        db::get_session(&conn, &session.id)?.ok_or_else(|| CheckoutError::NotFound(session.id.clone()))
    }

    /// `QuantityConfirmed -> PaymentMethodSelected`: atomically creates the
    /// Order (server-priced, never from model output) plus its outbox event.
    pub fn select_payment_method(
        &self,
        session: &CheckoutSession,
        payment_method: &str,
        unit_price_cents: i64,
        currency: &str,
    ) -> Result<(CheckoutSession, Order)> {
        ensure_state(session, CheckoutState::QuantityConfirmed, "select_payment_method")?;
        let sku = session
            .product_sku
            .clone()
            .ok_or_else(|| CheckoutError::InvalidTransition { from: session.state.to_string(), event: "select_payment_method".into() })?;
        let quantity = session
            .quantity
            .ok_or_else(|| CheckoutError::InvalidTransition { from: session.state.to_string(), event: "select_payment_method".into() })?;

        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let order = db::create_order(&tx, &session.tenant_id, &session.id, &session.customer_id, &sku, quantity, unit_price_cents, currency)?;
        outbox::db::enqueue_event(
            &tx,
            &session.tenant_id,
            "order",
            &order.id,
            "order.created",
            &serde_json::to_string(&order).unwrap_or_default(),
        )?;
        db::update_session(
            &tx,
            &session.id,
            CheckoutState::PaymentMethodSelected,
            session.product_sku.as_deref(),
            session.quantity,
            Some(payment_method),
            Some(&order.id),
            session.outbound_message_count,
        )?;
        tx.commit()?;

        let updated = db::get_session(&conn, &session.id)?.ok_or_else(|| CheckoutError::NotFound(session.id.clone()))?;
        Ok((updated, order))
    }

    /// `PaymentMethodSelected -> PaymentInitiated`: one retry with backoff on
    /// a transient failure, then transitions to `Failed` (spec §4.3).
    pub async fn initiate_payment(
        &self,
        session: &CheckoutSession,
        order: &Order,
        payment: &dyn PaymentCapability,
    ) -> Result<(CheckoutSession, PaymentRequest)> {
        ensure_state(session, CheckoutState::PaymentMethodSelected, "initiate_payment")?;

        let payment_request = {
            let conn = self.conn.lock().unwrap();
            db::create_payment_request(&conn, &session.tenant_id, &order.id, &session.payment_method.clone().unwrap_or_default())?
        };

        let mut last_err = None;
        for attempt in 0..2 {
            match payment.initiate(order).await {
                Ok(reference) => {
                    let conn = self.conn.lock().unwrap();
                    db::set_payment_status(&conn, &payment_request.id, PaymentStatus::Initiated, Some(&reference))?;
                    db::update_session(
                        &conn,
                        &session.id,
                        CheckoutState::PaymentInitiated,
                        session.product_sku.as_deref(),
                        session.quantity,
                        session.payment_method.as_deref(),
                        session.order_id.as_deref(),
                        session.outbound_message_count,
                    )?;
                    let updated = db::get_session(&conn, &session.id)?.ok_or_else(|| CheckoutError::NotFound(session.id.clone()))?;
                    let pr = PaymentRequest { status: PaymentStatus::Initiated, provider_reference: Some(reference), ..payment_request };
                    return Ok((updated, pr));
                }
                Err(e) => {
                    warn!(order_id = %order.id, attempt, error = %e, "payment initiation failed");
                    last_err = Some(e);
                    if attempt == 0 {
                        sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        }

        let conn = self.conn.lock().unwrap();
        db::set_payment_status(&conn, &payment_request.id, PaymentStatus::Failed, None)?;
        db::set_order_status(&conn, &order.id, OrderStatus::Failed)?;
        db::update_session(
            &conn,
            &session.id,
            CheckoutState::Failed,
            session.product_sku.as_deref(),
            session.quantity,
            session.payment_method.as_deref(),
            session.order_id.as_deref(),
            session.outbound_message_count,
        )?;
        Err(CheckoutError::PaymentFailed(last_err.unwrap_or_default()))
    }

    /// `PaymentInitiated -> Paid` on a validated success callback.
    pub fn mark_paid(&self, session: &CheckoutSession, order: &Order, payment_request: &PaymentRequest) -> Result<CheckoutSession> {
        ensure_state(session, CheckoutState::PaymentInitiated, "mark_paid")?;
        let conn = self.conn.lock().unwrap();
        db::set_order_status(&conn, &order.id, OrderStatus::Paid)?;
        db::set_payment_status(&conn, &payment_request.id, PaymentStatus::Succeeded, None)?;
        db::update_session(
            &conn,
            &session.id,
            CheckoutState::Paid,
            session.product_sku.as_deref(),
            session.quantity,
            session.payment_method.as_deref(),
            session.order_id.as_deref(),
            session.outbound_message_count,
        )?;
        info!(order_id = %order.id, "order paid");
        db::get_session(&conn, &session.id)?.ok_or_else(|| CheckoutError::NotFound(session.id.clone()))
    }

    /// `PaymentInitiated -> Failed` on a validated failure or timeout callback.
    pub fn mark_failed(&self, session: &CheckoutSession, order: &Order, payment_request: &PaymentRequest) -> Result<CheckoutSession> {
        ensure_state(session, CheckoutState::PaymentInitiated, "mark_failed")?;
        let conn = self.conn.lock().unwrap();
        db::set_order_status(&conn, &order.id, OrderStatus::Failed)?;
        db::set_payment_status(&conn, &payment_request.id, PaymentStatus::Failed, None)?;
        db::update_session(
            &conn,
            &session.id,
            CheckoutState::Failed,
            session.product_sku.as_deref(),
            session.quantity,
            session.payment_method.as_deref(),
            session.order_id.as_deref(),
            session.outbound_message_count,
        )?;
        db::get_session(&conn, &session.id)?.ok_or_else(|| CheckoutError::NotFound(session.id.clone()))
    }

    /// Counts a single outbound message against the `ProductSelected`..
    /// `PaymentInitiated` budget. Call before sending; an error means the
    /// caller must suppress the message rather than send it.
    pub fn record_outbound_message(&self, session: &CheckoutSession) -> Result<CheckoutSession> {
        if !matches!(
            session.state,
            CheckoutState::ProductSelected
                | CheckoutState::QuantityConfirmed
                | CheckoutState::PaymentMethodSelected
                | CheckoutState::PaymentInitiated
        ) {
            return db::get_session(&self.conn.lock().unwrap(), &session.id)?.ok_or_else(|| CheckoutError::NotFound(session.id.clone()));
        }
        if session.outbound_message_count >= MESSAGE_BUDGET {
            return Err(CheckoutError::MessageBudgetExceeded);
        }
        let conn = self.conn.lock().unwrap();
        db::update_session(
            &conn,
            &session.id,
            session.state,
            session.product_sku.as_deref(),
            session.quantity,
            session.payment_method.as_deref(),
            session.order_id.as_deref(),
            session.outbound_message_count + 1,
        )?;
        db::get_session(&conn, &session.id)?.ok_or_else(|| CheckoutError::NotFound(session.id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grounding::CatalogItem;

    fn setup() -> CheckoutMachine {
        let conn = Connection::open_in_memory().unwrap();
        outbox::db::init_db(&conn).unwrap();
        CheckoutMachine::new(Arc::new(Mutex::new(conn))).unwrap()
    }

    fn item(sku: &str, in_stock: bool) -> CatalogItem {
        CatalogItem {
            id: 1,
            tenant_id: "t1".into(),
            sku: sku.into(),
            name: "Widget".into(),
            description: "A widget".into(),
            price_cents: 1500,
            currency: "USD".into(),
            in_stock,
            created_at: "2026-01-01T00:00:00Z".into(),
            updated_at: "2026-01-01T00:00:00Z".into(),
        }
    }

    struct AlwaysSucceeds;
    #[async_trait]
    impl PaymentCapability for AlwaysSucceeds {
        async fn initiate(&self, _order: &Order) -> std::result::Result<String, String> {
            Ok("ref-123".to_string())
        }
    }

    struct AlwaysFails;
    #[async_trait]
    impl PaymentCapability for AlwaysFails {
        async fn initiate(&self, _order: &Order) -> std::result::Result<String, String> {
            Err("provider unreachable".to_string())
        }
    }

    #[tokio::test]
    async fn happy_path_reaches_paid() {
        let m = setup();
        let session = m.start("t1", "conv-1", "cust-1").unwrap();
        let session = m.select_product(&session, &item("widget-1", true)).unwrap();
        let session = m.confirm_quantity(&session, 2, 10).unwrap();
        let (session, order) = m.select_payment_method(&session, "card", 1500, "USD").unwrap();
        assert_eq!(order.total_cents, 3000);
        let (session, payment_request) = m.initiate_payment(&session, &order, &AlwaysSucceeds).await.unwrap();
        assert_eq!(session.state, CheckoutState::PaymentInitiated);
        let session = m.mark_paid(&session, &order, &payment_request).unwrap();
        assert_eq!(session.state, CheckoutState::Paid);
    }

    #[test]
    fn out_of_stock_product_rejected() {
        let m = setup();
        let session = m.start("t1", "conv-1", "cust-1").unwrap();
        let err = m.select_product(&session, &item("widget-1", false)).unwrap_err();
        assert!(matches!(err, CheckoutError::OutOfStock(_)));
    }

    #[test]
    fn quantity_exceeding_stock_rejected() {
        let m = setup();
        let session = m.start("t1", "conv-1", "cust-1").unwrap();
        let session = m.select_product(&session, &item("widget-1", true)).unwrap();
        let err = m.confirm_quantity(&session, 5, 3).unwrap_err();
        assert!(matches!(err, CheckoutError::QuantityExceedsStock { requested: 5, available: 3 }));
    }

    #[test]
    fn transition_out_of_order_rejected() {
        let m = setup();
        let session = m.start("t1", "conv-1", "cust-1").unwrap();
        let err = m.confirm_quantity(&session, 1, 10).unwrap_err();
        assert!(matches!(err, CheckoutError::InvalidTransition { .. }));
    }

    #[test]
    fn message_budget_exceeded_after_three() {
        let m = setup();
        let session = m.start("t1", "conv-1", "cust-1").unwrap();
        let session = m.select_product(&session, &item("widget-1", true)).unwrap();
        let session = m.record_outbound_message(&session).unwrap();
        let session = m.record_outbound_message(&session).unwrap();
        let session = m.record_outbound_message(&session).unwrap();
        assert_eq!(session.outbound_message_count, 3);
        let err = m.record_outbound_message(&session).unwrap_err();
        assert!(matches!(err, CheckoutError::MessageBudgetExceeded));
    }

    #[tokio::test]
    async fn payment_retries_once_then_fails() {
        let m = setup();
        let session = m.start("t1", "conv-1", "cust-1").unwrap();
        let session = m.select_product(&session, &item("widget-1", true)).unwrap();
        let session = m.confirm_quantity(&session, 1, 10).unwrap();
        let (session, order) = m.select_payment_method(&session, "card", 1500, "USD").unwrap();
        let err = m.initiate_payment(&session, &order, &AlwaysFails).await.unwrap_err();
        assert!(matches!(err, CheckoutError::PaymentFailed(_)));
        let session = db::get_session(&m.conn.lock().unwrap(), &session.id).unwrap().unwrap();
        assert_eq!(session.state, CheckoutState::Failed);
        let order = db::get_order(&m.conn.lock().unwrap(), &order.id).unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Failed);
    }
}
