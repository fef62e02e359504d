use super::{CustomerRow, NetworkStore};
use crate::error::CommissionResult;
use rusqlite::{params, OptionalExtension};

impl NetworkStore {
    // ── Customer ──────────────────────────────────────────────────

    pub fn insert_customer(&self, c: &CustomerRow) -> CommissionResult<()> {
        self.conn.execute(
            "INSERT INTO customer (customer_id, parent_promoter_id, name, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                c.customer_id,
                c.parent_promoter_id,
                c.name,
                c.status,
                c.created_at,
            ],
        )?;
        Ok(())
    }

    pub fn get_customer(&self, customer_id: &str) -> CommissionResult<Option<CustomerRow>> {
        let row = self
            .conn
            .query_row(
                "SELECT customer_id, parent_promoter_id, name, status, created_at
                 FROM customer WHERE customer_id = ?1",
                params![customer_id],
                |row| {
                    Ok(CustomerRow {
                        customer_id: row.get(0)?,
                        parent_promoter_id: row.get(1)?,
                        name: row.get(2)?,
                        status: row.get(3)?,
                        created_at: row.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    pub fn customer_count(&self) -> CommissionResult<i64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM customer", [], |row| row.get(0))?;
        Ok(count)
    }

    pub fn customers_for_promoter(&self, promoter_id: &str) -> CommissionResult<Vec<CustomerRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT customer_id, parent_promoter_id, name, status, created_at
             FROM customer WHERE parent_promoter_id = ?1
             ORDER BY created_at ASC, customer_id ASC",
        )?;
        let rows = stmt.query_map(params![promoter_id], |row| {
            Ok(CustomerRow {
                customer_id: row.get(0)?,
                parent_promoter_id: row.get(1)?,
                name: row.get(2)?,
                status: row.get(3)?,
                created_at: row.get(4)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Customers with no credited ledger entry at all.
    pub fn customers_without_commissions(&self) -> CommissionResult<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT c.customer_id FROM customer c
             WHERE NOT EXISTS (
                SELECT 1 FROM commission_record r
                WHERE r.customer_id = c.customer_id AND r.status = 'credited'
             )
             ORDER BY c.customer_id",
        )?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }
}
