use super::{NetworkStore, WalletRow};
use crate::{error::CommissionResult, ledger::CommissionRecord};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

impl NetworkStore {
    // ── Wallet cache ──────────────────────────────────────────────

    pub fn get_wallet(&self, wallet_key: &str) -> CommissionResult<Option<WalletRow>> {
        let row = self
            .conn
            .query_row(
                "SELECT wallet_key, balance, total_earned, commission_count,
                        last_event_at, stale, refreshed_at
                 FROM wallet WHERE wallet_key = ?1",
                params![wallet_key],
                |row| {
                    Ok(WalletRow {
                        wallet_key: row.get(0)?,
                        balance: row.get(1)?,
                        total_earned: row.get(2)?,
                        commission_count: row.get(3)?,
                        last_event_at: row.get(4)?,
                        stale: row.get::<_, i32>(5)? != 0,
                        refreshed_at: row.get(6)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    pub fn all_wallets(&self) -> CommissionResult<Vec<WalletRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT wallet_key, balance, total_earned, commission_count,
                    last_event_at, stale, refreshed_at
             FROM wallet ORDER BY wallet_key",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(WalletRow {
                    wallet_key: row.get(0)?,
                    balance: row.get(1)?,
                    total_earned: row.get(2)?,
                    commission_count: row.get(3)?,
                    last_event_at: row.get(4)?,
                    stale: row.get::<_, i32>(5)? != 0,
                    refreshed_at: row.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Overwrite the cached projection with fresh values and clear `stale`.
    pub fn upsert_wallet(&self, w: &WalletRow) -> CommissionResult<()> {
        self.conn.execute(
            "INSERT INTO wallet
             (wallet_key, balance, total_earned, commission_count, last_event_at, stale, refreshed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)
             ON CONFLICT(wallet_key) DO UPDATE SET
                balance          = excluded.balance,
                total_earned     = excluded.total_earned,
                commission_count = excluded.commission_count,
                last_event_at    = excluded.last_event_at,
                stale            = 0,
                refreshed_at     = excluded.refreshed_at",
            params![
                w.wallet_key,
                w.balance,
                w.total_earned,
                w.commission_count,
                w.last_event_at,
                w.refreshed_at,
            ],
        )?;
        Ok(())
    }

    /// Mark a cached wallet stale so the next read recomputes it.
    pub fn invalidate_wallet(&self, wallet_key: &str) -> CommissionResult<()> {
        self.conn.execute(
            "UPDATE wallet SET stale = 1 WHERE wallet_key = ?1",
            params![wallet_key],
        )?;
        Ok(())
    }
}

/// Fold one credited record into a fresh cached wallet. Missing or stale
/// rows are left alone; the next read rebuilds them from the ledger.
pub(super) fn apply_wallet_credit_on(
    conn: &Connection,
    record: &CommissionRecord,
    at: DateTime<Utc>,
) -> CommissionResult<()> {
    conn.execute(
        "UPDATE wallet SET
            balance          = balance + ?2,
            total_earned     = total_earned + ?2,
            commission_count = commission_count + 1,
            last_event_at    = ?3,
            refreshed_at     = ?4
         WHERE wallet_key = ?1 AND stale = 0",
        params![
            record.recipient().wallet_key(),
            record.amount,
            record.created_at,
            at,
        ],
    )?;
    Ok(())
}
