use std::sync::{Arc, Mutex};

use rusqlite::Connection;
use tenancy::permissions::{PermissionCheck, PermissionResolver};

use crate::db;
use crate::error::{Result, WalletError};
use crate::types::{Withdrawal, WithdrawalStatus};

/// Wallet withdrawals, gated by four-eyes approval (spec §4.1, §6, P4):
/// the member who requests a withdrawal may never also approve it.
pub struct WalletManager {
    conn: Arc<Mutex<Connection>>,
}

impl WalletManager {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Result<Self> {
        {
            let c = conn.lock().unwrap();
            db::init_db(&c)?;
        }
        Ok(Self { conn })
    }

    pub fn initiate(&self, tenant_id: &str, requested_by: &str, amount_cents: i64, currency: &str) -> Result<Withdrawal> {
        let conn = self.conn.lock().unwrap();
        db::create_withdrawal(&conn, tenant_id, requested_by, amount_cents, currency)
    }

    pub fn approve(&self, withdrawal_id: &str, approved_by: &str) -> Result<Withdrawal> {
        let conn = self.conn.lock().unwrap();
        let withdrawal = db::get_withdrawal(&conn, withdrawal_id)?.ok_or_else(|| WalletError::NotFound(withdrawal_id.to_string()))?;
        if withdrawal.status != WithdrawalStatus::Pending {
            return Err(WalletError::NotPending(withdrawal_id.to_string()));
        }
        if let PermissionCheck::Denied { .. } = PermissionResolver::check_four_eyes(&withdrawal.requested_by, approved_by) {
            return Err(WalletError::FourEyesViolation);
        }
        db::set_status(&conn, withdrawal_id, WithdrawalStatus::Approved, Some(approved_by))?;
        db::get_withdrawal(&conn, withdrawal_id)?.ok_or_else(|| WalletError::NotFound(withdrawal_id.to_string()))
    }

    pub fn reject(&self, withdrawal_id: &str, rejected_by: &str) -> Result<Withdrawal> {
        let conn = self.conn.lock().unwrap();
        let withdrawal = db::get_withdrawal(&conn, withdrawal_id)?.ok_or_else(|| WalletError::NotFound(withdrawal_id.to_string()))?;
        if withdrawal.status != WithdrawalStatus::Pending {
            return Err(WalletError::NotPending(withdrawal_id.to_string()));
        }
        db::set_status(&conn, withdrawal_id, WithdrawalStatus::Rejected, Some(rejected_by))?;
        db::get_withdrawal(&conn, withdrawal_id)?.ok_or_else(|| WalletError::NotFound(withdrawal_id.to_string()))
    }

    pub fn get(&self, withdrawal_id: &str) -> Result<Option<Withdrawal>> {
        let conn = self.conn.lock().unwrap();
        db::get_withdrawal(&conn, withdrawal_id)
    }

    pub fn list(&self, tenant_id: &str) -> Result<Vec<Withdrawal>> {
        let conn = self.conn.lock().unwrap();
        db::list_withdrawals(&conn, tenant_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> WalletManager {
        let conn = Connection::open_in_memory().unwrap();
        WalletManager::new(Arc::new(Mutex::new(conn))).unwrap()
    }

    #[test]
    fn rejects_self_approval() {
        let mgr = manager();
        let w = mgr.initiate("t1", "owner-1", 10_000, "USD").unwrap();
        let err = mgr.approve(&w.id, "owner-1").unwrap_err();
        assert!(matches!(err, WalletError::FourEyesViolation));
    }

    #[test]
    fn approves_with_distinct_approver() {
        let mgr = manager();
        let w = mgr.initiate("t1", "owner-1", 10_000, "USD").unwrap();
        let approved = mgr.approve(&w.id, "manager-1").unwrap();
        assert_eq!(approved.status, WithdrawalStatus::Approved);
        assert_eq!(approved.approved_by.as_deref(), Some("manager-1"));
    }

    #[test]
    fn cannot_approve_twice() {
        let mgr = manager();
        let w = mgr.initiate("t1", "owner-1", 10_000, "USD").unwrap();
        mgr.approve(&w.id, "manager-1").unwrap();
        let err = mgr.approve(&w.id, "manager-2").unwrap_err();
        assert!(matches!(err, WalletError::NotPending(_)));
    }
}
