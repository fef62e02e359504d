//! SQLite persistence layer.
//!
//! RULE: Only the store talks to the database.
//! Components call store methods; they never execute SQL directly.

use crate::{
    error::CommissionResult,
    ledger::{CommissionRecord, CommissionStatus, RecipientType},
    types::{Amount, CustomerId, PromoterId},
};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row, Transaction, TransactionBehavior};
use serde::{Deserialize, Serialize};
use std::time::Duration;

mod commission;
mod customer;
mod events;
mod pins;
mod procedure;
mod promoter;
mod wallet;

pub use procedure::{ProcedureOutcome, DISTRIBUTE_PROCEDURE};

pub struct NetworkStore {
    conn: Connection,
}

impl NetworkStore {
    pub fn open(path: &str) -> CommissionResult<Self> {
        Self::open_with_timeout(path, Duration::from_millis(5_000))
    }

    pub fn open_with_timeout(path: &str, busy_timeout: Duration) -> CommissionResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only for real files (shared-memory and :memory: ignore it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        conn.busy_timeout(busy_timeout)?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> CommissionResult<Self> {
        let conn = Connection::open(":memory:")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> CommissionResult<()> {
        self.conn
            .execute_batch(include_str!("../../../migrations/001_network.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/002_commission_ledger.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/003_pins.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/004_wallet_cache.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/005_event_log.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/006_procedures.sql"))?;
        Ok(())
    }

    /// Run `f` inside one IMMEDIATE transaction on this connection. Every
    /// store call `f` makes joins it; an error rolls all of them back.
    /// Not reentrant: `f` must not call `atomically` again.
    pub fn atomically<T>(&self, f: impl FnOnce() -> CommissionResult<T>) -> CommissionResult<T> {
        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)?;
        let value = f()?;
        tx.commit()?;
        Ok(value)
    }

    /// Direct connection access for tooling and tests that need to stage
    /// conditions (broken triggers, raw parent edits) the API never produces.
    pub fn raw(&self) -> &Connection {
        &self.conn
    }
}

// ── Row types ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromoterRow {
    pub promoter_id: PromoterId,
    pub parent_promoter_id: Option<PromoterId>,
    pub name: String,
    pub pins: i64,
    pub status: String, // active | suspended
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerRow {
    pub customer_id: CustomerId,
    pub parent_promoter_id: PromoterId,
    pub name: String,
    pub status: String, // active | inactive
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinTransactionRow {
    pub id: Option<i64>,
    pub promoter_id: PromoterId,
    pub customer_id: Option<CustomerId>,
    pub delta: i64,
    pub transaction_type: String, // allocation | deduction
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletRow {
    pub wallet_key: String,
    pub balance: Amount,
    pub total_earned: Amount,
    pub commission_count: i64,
    pub last_event_at: Option<DateTime<Utc>>,
    pub stale: bool,
    pub refreshed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub id: Option<i64>,
    pub subject_id: String,
    pub event_type: String,
    pub payload: String,
    pub created_at: DateTime<Utc>,
}

/// Per-customer ledger aggregate used by reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerLedgerRow {
    pub customer_id: CustomerId,
    pub initiator_promoter_id: PromoterId,
    pub entry_count: i64,
    pub total_amount: Amount,
}

/// Pin balance next to the sum of its audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinAuditRow {
    pub promoter_id: PromoterId,
    pub pins: i64,
    pub audited_sum: i64,
}

pub(crate) const COMMISSION_COLUMNS: &str =
    "id, customer_id, initiator_promoter_id, recipient_id, recipient_type,
     level, amount, status, transaction_id, created_at";

pub(crate) fn map_commission_row(row: &Row<'_>) -> rusqlite::Result<CommissionRecord> {
    let recipient_type: String = row.get(4)?;
    let status: String = row.get(7)?;
    Ok(CommissionRecord {
        id: Some(row.get(0)?),
        customer_id: row.get(1)?,
        initiator_promoter_id: row.get(2)?,
        recipient_id: row.get(3)?,
        recipient_type: RecipientType::parse(&recipient_type)
            .ok_or_else(|| bad_text(4, "recipient_type", &recipient_type))?,
        level: row.get::<_, i64>(5)? as u8,
        amount: row.get(6)?,
        status: CommissionStatus::parse(&status).ok_or_else(|| bad_text(7, "status", &status))?,
        transaction_id: row.get(8)?,
        created_at: row.get(9)?,
    })
}

fn bad_text(idx: usize, column: &str, value: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        rusqlite::types::Type::Text,
        format!("unexpected {column} value '{value}'").into(),
    )
}
