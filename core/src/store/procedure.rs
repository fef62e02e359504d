//! The atomic distribution procedure.
//!
//! Guard, walk, allocation and every ledger write run inside one IMMEDIATE
//! transaction, so two callers for the same customer serialize on the write
//! lock and the second one sees the first one's entries.

use super::{
    commission::{credited_totals_on, insert_commission_on},
    promoter::promoter_parent_on,
    wallet::apply_wallet_credit_on,
    NetworkStore,
};
use crate::{
    config::CommissionSchedule,
    error::{CommissionError, CommissionResult},
    hierarchy::{resolve_chain, PromoterLookup},
    idempotency::{self, GuardDecision},
    ledger::{records_for_plan, CommissionRecord, CreditTotals},
    pool::{allocate, AllocationPlan},
    types::PromoterId,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};

pub const DISTRIBUTE_PROCEDURE: &str = "distribute_commission";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcedureOutcome {
    Distributed {
        plan: AllocationPlan,
        records: Vec<CommissionRecord>,
    },
    AlreadyProcessed(CreditTotals),
}

struct TxLookup<'c>(&'c Connection);

impl PromoterLookup for TxLookup<'_> {
    fn parent_of(&self, promoter_id: &str) -> CommissionResult<Option<Option<PromoterId>>> {
        promoter_parent_on(self.0, promoter_id)
    }
}

impl NetworkStore {
    // ── Stored procedures ─────────────────────────────────────────

    pub fn procedure_installed(&self, name: &str) -> CommissionResult<bool> {
        procedure_installed_on(&self.conn, name)
    }

    pub fn install_procedure(&self, name: &str, version: i64, at: DateTime<Utc>) -> CommissionResult<()> {
        self.conn.execute(
            "INSERT INTO store_procedure (name, version, installed_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(name) DO UPDATE SET version = excluded.version,
                                             installed_at = excluded.installed_at",
            params![name, version, at],
        )?;
        Ok(())
    }

    pub fn uninstall_procedure(&self, name: &str) -> CommissionResult<()> {
        self.conn
            .execute("DELETE FROM store_procedure WHERE name = ?1", params![name])?;
        Ok(())
    }

    /// Run the full distribution for one customer as one atomic unit.
    /// Nothing is written unless every entry is written.
    pub fn call_distribute_procedure(
        &self,
        customer_id: &str,
        initiator_id: &str,
        schedule: &CommissionSchedule,
        now: DateTime<Utc>,
    ) -> CommissionResult<ProcedureOutcome> {
        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)?;

        if !procedure_installed_on(&tx, DISTRIBUTE_PROCEDURE)? {
            return Err(CommissionError::ProcedureNotFound {
                name: DISTRIBUTE_PROCEDURE.to_string(),
            });
        }

        let existing = credited_totals_on(&tx, customer_id)?;
        if let GuardDecision::AlreadyProcessed(prior) = idempotency::check(existing) {
            return Ok(ProcedureOutcome::AlreadyProcessed(prior));
        }

        let chain = resolve_chain(&TxLookup(&tx), initiator_id, schedule.max_levels())?;
        let plan = allocate(schedule, &chain);
        let mut records = records_for_plan(&plan, customer_id, initiator_id, now);

        for record in &mut records {
            record.id = Some(insert_commission_on(&tx, record)?);
            apply_wallet_credit_on(&tx, record, now)?;
        }

        tx.commit()?;
        Ok(ProcedureOutcome::Distributed { plan, records })
    }
}

fn procedure_installed_on(conn: &Connection, name: &str) -> CommissionResult<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM store_procedure WHERE name = ?1",
            params![name],
            |row| row.get::<_, i64>(0),
        )
        .optional()?;
    Ok(found.is_some())
}
