use super::{map_commission_row, CustomerLedgerRow, NetworkStore, COMMISSION_COLUMNS};
use crate::{
    error::CommissionResult,
    ledger::{CommissionRecord, CreditTotals},
    types::{Amount, ADMIN_WALLET_KEY},
};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

/// Ledger-derived wallet figures for one recipient.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LedgerSums {
    pub total: Amount,
    pub count: i64,
    pub last_event_at: Option<DateTime<Utc>>,
}

impl NetworkStore {
    // ── Commission ledger ─────────────────────────────────────────

    /// Single-statement insert. Returns the row id.
    pub fn insert_commission(&self, record: &CommissionRecord) -> CommissionResult<i64> {
        insert_commission_on(&self.conn, record)
    }

    /// Aggregate of credited entries for `customer_id`.
    pub fn credited_totals(&self, customer_id: &str) -> CommissionResult<CreditTotals> {
        credited_totals_on(&self.conn, customer_id)
    }

    pub fn commissions_for_customer(&self, customer_id: &str) -> CommissionResult<Vec<CommissionRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {COMMISSION_COLUMNS} FROM commission_record
             WHERE customer_id = ?1 ORDER BY id ASC"
        ))?;
        let rows = stmt
            .query_map(params![customer_id], map_commission_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Most recent credited entries for a wallet key, newest first.
    pub fn recent_commissions(&self, wallet_key: &str, limit: usize) -> CommissionResult<Vec<CommissionRecord>> {
        let limit = limit as i64;
        let rows = if wallet_key == ADMIN_WALLET_KEY {
            let mut stmt = self.conn.prepare(&format!(
                "SELECT {COMMISSION_COLUMNS} FROM commission_record
                 WHERE recipient_type = 'admin' AND status = 'credited'
                 ORDER BY id DESC LIMIT ?1"
            ))?;
            let rows = stmt
                .query_map(params![limit], map_commission_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        } else {
            let mut stmt = self.conn.prepare(&format!(
                "SELECT {COMMISSION_COLUMNS} FROM commission_record
                 WHERE recipient_id = ?1 AND status = 'credited'
                 ORDER BY id DESC LIMIT ?2"
            ))?;
            let rows = stmt
                .query_map(params![wallet_key, limit], map_commission_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };
        Ok(rows)
    }

    /// Sum and count of credited entries for a wallet key, straight from the ledger.
    pub fn ledger_sums(&self, wallet_key: &str) -> CommissionResult<LedgerSums> {
        let map = |row: &rusqlite::Row<'_>| -> rusqlite::Result<LedgerSums> {
            Ok(LedgerSums {
                total: row.get(0)?,
                count: row.get(1)?,
                last_event_at: row.get(2)?,
            })
        };
        let sums = if wallet_key == ADMIN_WALLET_KEY {
            self.conn.query_row(
                "SELECT COALESCE(SUM(amount), 0), COUNT(*), MAX(created_at)
                 FROM commission_record
                 WHERE recipient_type = 'admin' AND status = 'credited'",
                [],
                map,
            )?
        } else {
            self.conn.query_row(
                "SELECT COALESCE(SUM(amount), 0), COUNT(*), MAX(created_at)
                 FROM commission_record
                 WHERE recipient_id = ?1 AND status = 'credited'",
                params![wallet_key],
                map,
            )?
        };
        Ok(sums)
    }

    /// Every wallet key that has at least one credited entry.
    pub fn ledger_wallet_keys(&self) -> CommissionResult<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT COALESCE(recipient_id, ?1) FROM commission_record
             WHERE status = 'credited' ORDER BY 1",
        )?;
        let keys = stmt
            .query_map(params![ADMIN_WALLET_KEY], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(keys)
    }

    /// Per-customer credited totals across the whole ledger.
    pub fn customer_ledger_rows(&self) -> CommissionResult<Vec<CustomerLedgerRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT customer_id, MIN(initiator_promoter_id), COUNT(*), SUM(amount)
             FROM commission_record
             WHERE status = 'credited'
             GROUP BY customer_id
             ORDER BY customer_id",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(CustomerLedgerRow {
                    customer_id: row.get(0)?,
                    initiator_promoter_id: row.get(1)?,
                    entry_count: row.get(2)?,
                    total_amount: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn commission_count(&self) -> CommissionResult<i64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM commission_record", [], |row| row.get(0))?;
        Ok(count)
    }
}

pub(super) fn insert_commission_on(conn: &Connection, r: &CommissionRecord) -> CommissionResult<i64> {
    conn.execute(
        "INSERT INTO commission_record
         (customer_id, initiator_promoter_id, recipient_id, recipient_type,
          level, amount, status, transaction_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            r.customer_id,
            r.initiator_promoter_id,
            r.recipient_id,
            r.recipient_type.as_str(),
            r.level as i64,
            r.amount,
            r.status.as_str(),
            r.transaction_id,
            r.created_at,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub(super) fn credited_totals_on(conn: &Connection, customer_id: &str) -> CommissionResult<CreditTotals> {
    let totals = conn.query_row(
        "SELECT COUNT(*),
                COALESCE(SUM(CASE WHEN recipient_type = 'promoter' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(amount), 0),
                COALESCE(SUM(CASE WHEN recipient_type = 'admin' THEN amount ELSE 0 END), 0)
         FROM commission_record
         WHERE customer_id = ?1 AND status = 'credited'",
        params![customer_id],
        |row| {
            Ok(CreditTotals {
                entry_count: row.get(0)?,
                promoter_levels: row.get(1)?,
                total_amount: row.get(2)?,
                admin_amount: row.get(3)?,
            })
        },
    )?;
    Ok(totals)
}
