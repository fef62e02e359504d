use super::{NetworkStore, PinAuditRow, PinTransactionRow};
use crate::error::CommissionResult;
use rusqlite::{params, OptionalExtension, Row};

impl NetworkStore {
    // ── Pin quota ─────────────────────────────────────────────────

    /// Compare-and-decrement in one statement. Returns the new balance, or
    /// `None` when the promoter is missing or holds fewer than `amount` pins.
    pub fn consume_pins(&self, promoter_id: &str, amount: i64) -> CommissionResult<Option<i64>> {
        let balance = self
            .conn
            .query_row(
                "UPDATE promoter SET pins = pins - ?2
                 WHERE promoter_id = ?1 AND pins >= ?2
                 RETURNING pins",
                params![promoter_id, amount],
                |row| row.get(0),
            )
            .optional()?;
        Ok(balance)
    }

    /// Unconditional top-up. Returns the new balance, or `None` when the
    /// promoter does not exist.
    pub fn credit_pins(&self, promoter_id: &str, amount: i64) -> CommissionResult<Option<i64>> {
        let balance = self
            .conn
            .query_row(
                "UPDATE promoter SET pins = pins + ?2
                 WHERE promoter_id = ?1
                 RETURNING pins",
                params![promoter_id, amount],
                |row| row.get(0),
            )
            .optional()?;
        Ok(balance)
    }

    pub fn promoter_pins(&self, promoter_id: &str) -> CommissionResult<Option<i64>> {
        let pins = self
            .conn
            .query_row(
                "SELECT pins FROM promoter WHERE promoter_id = ?1",
                params![promoter_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(pins)
    }

    pub fn insert_pin_transaction(&self, t: &PinTransactionRow) -> CommissionResult<i64> {
        self.conn.execute(
            "INSERT INTO pin_transaction
             (promoter_id, customer_id, delta, transaction_type, note, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                t.promoter_id,
                t.customer_id,
                t.delta,
                t.transaction_type,
                t.note,
                t.created_at,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn pin_transactions_for_promoter(&self, promoter_id: &str) -> CommissionResult<Vec<PinTransactionRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, promoter_id, customer_id, delta, transaction_type, note, created_at
             FROM pin_transaction WHERE promoter_id = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt
            .query_map(params![promoter_id], map_pin_transaction)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn pin_transactions_for_customer(&self, customer_id: &str) -> CommissionResult<Vec<PinTransactionRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, promoter_id, customer_id, delta, transaction_type, note, created_at
             FROM pin_transaction WHERE customer_id = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt
            .query_map(params![customer_id], map_pin_transaction)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Current pins next to the sum of every audited delta, per promoter.
    pub fn pin_audit_rows(&self) -> CommissionResult<Vec<PinAuditRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT p.promoter_id, p.pins, COALESCE(SUM(t.delta), 0)
             FROM promoter p
             LEFT JOIN pin_transaction t ON t.promoter_id = p.promoter_id
             GROUP BY p.promoter_id, p.pins
             ORDER BY p.promoter_id",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(PinAuditRow {
                    promoter_id: row.get(0)?,
                    pins: row.get(1)?,
                    audited_sum: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

fn map_pin_transaction(row: &Row<'_>) -> rusqlite::Result<PinTransactionRow> {
    Ok(PinTransactionRow {
        id: Some(row.get(0)?),
        promoter_id: row.get(1)?,
        customer_id: row.get(2)?,
        delta: row.get(3)?,
        transaction_type: row.get(4)?,
        note: row.get(5)?,
        created_at: row.get(6)?,
    })
}
