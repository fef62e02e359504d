//! Distribution orchestrator.
//!
//! PRIMARY PATH: one call into the store's atomic procedure, which runs the
//! idempotency guard, the hierarchy walk, the pool allocation and every
//! ledger write as a single unit.
//!
//! FALLBACK PATH: taken only when the procedure is reported missing. The same
//! three steps run from here as independent statements. There is no rollback:
//!   - a failure after the first write leaves the customer partially paid and
//!     is returned as `PartialDistribution` for manual reconciliation;
//!   - two concurrent fallback passes for one customer can both get past the
//!     guard; the post-write check detects and logs the excess.
//!
//! Transient errors never trigger the fallback (the procedure may have
//! committed). They are retried on the primary path, where the guard makes a
//! retry safe.

use crate::{
    clock::Clock,
    config::{CommissionSchedule, DistributionPolicy},
    error::{CommissionError, CommissionResult},
    event::{self, EventSink, NetworkEvent},
    hierarchy::{resolve_chain, PromoterLookup},
    idempotency::{self, GuardDecision},
    ledger::{records_for_plan, CommissionRecord, CreditTotals},
    pool::{allocate, AllocationPlan},
    store::{NetworkStore, ProcedureOutcome},
    types::{Amount, CustomerId, PromoterId},
    validation::require_id,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistributionMethod {
    Primary,
    Fallback,
    Skipped,
}

impl DistributionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Fallback => "fallback",
            Self::Skipped => "skipped",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DistributionSummary {
    pub customer_id: CustomerId,
    pub initiator_promoter_id: PromoterId,
    pub total_distributed: Amount,
    pub levels_distributed: usize,
    pub admin_fallback_amount: Amount,
    pub timestamp: DateTime<Utc>,
    /// Entries written by this call. Empty when skipped.
    pub entries: Vec<CommissionRecord>,
    /// Credit beyond one pool found on the ledger for this customer.
    pub duplicate_excess: Option<Amount>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DistributionOutcome {
    Primary(DistributionSummary),
    Fallback(DistributionSummary),
    /// Already processed; the summary carries the prior totals.
    Skipped(DistributionSummary),
}

/// The trigger call's wire shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionReport {
    pub success: bool,
    pub total_distributed: Amount,
    pub levels_distributed: usize,
    pub admin_fallback_amount: Amount,
    pub timestamp: DateTime<Utc>,
    pub method: DistributionMethod,
}

impl DistributionOutcome {
    pub fn summary(&self) -> &DistributionSummary {
        match self {
            Self::Primary(s) | Self::Fallback(s) | Self::Skipped(s) => s,
        }
    }

    pub fn method(&self) -> DistributionMethod {
        match self {
            Self::Primary(_) => DistributionMethod::Primary,
            Self::Fallback(_) => DistributionMethod::Fallback,
            Self::Skipped(_) => DistributionMethod::Skipped,
        }
    }

    pub fn report(&self) -> DistributionReport {
        let s = self.summary();
        DistributionReport {
            success: true,
            total_distributed: s.total_distributed,
            levels_distributed: s.levels_distributed,
            admin_fallback_amount: s.admin_fallback_amount,
            timestamp: s.timestamp,
            method: self.method(),
        }
    }
}

/// What the orchestrator needs from the persistent store.
pub trait DistributionStore: EventSink {
    /// The atomic procedure. Errors with `ProcedureNotFound` when unavailable.
    fn call_distribute_procedure(
        &self,
        customer_id: &str,
        initiator_id: &str,
        schedule: &CommissionSchedule,
        now: DateTime<Utc>,
    ) -> CommissionResult<ProcedureOutcome>;

    fn credited_totals(&self, customer_id: &str) -> CommissionResult<CreditTotals>;

    fn promoter_parent(&self, promoter_id: &str) -> CommissionResult<Option<Option<PromoterId>>>;

    fn insert_commission(&self, record: &CommissionRecord) -> CommissionResult<i64>;

    fn invalidate_wallet(&self, wallet_key: &str) -> CommissionResult<()>;
}

impl DistributionStore for NetworkStore {
    fn call_distribute_procedure(
        &self,
        customer_id: &str,
        initiator_id: &str,
        schedule: &CommissionSchedule,
        now: DateTime<Utc>,
    ) -> CommissionResult<ProcedureOutcome> {
        NetworkStore::call_distribute_procedure(self, customer_id, initiator_id, schedule, now)
    }

    fn credited_totals(&self, customer_id: &str) -> CommissionResult<CreditTotals> {
        NetworkStore::credited_totals(self, customer_id)
    }

    fn promoter_parent(&self, promoter_id: &str) -> CommissionResult<Option<Option<PromoterId>>> {
        NetworkStore::promoter_parent(self, promoter_id)
    }

    fn insert_commission(&self, record: &CommissionRecord) -> CommissionResult<i64> {
        NetworkStore::insert_commission(self, record)
    }

    fn invalidate_wallet(&self, wallet_key: &str) -> CommissionResult<()> {
        NetworkStore::invalidate_wallet(self, wallet_key)
    }
}

/// One hop per round trip, for the fallback walk.
struct StoreLookup<'a, S: ?Sized>(&'a S);

impl<S: DistributionStore + ?Sized> PromoterLookup for StoreLookup<'_, S> {
    fn parent_of(&self, promoter_id: &str) -> CommissionResult<Option<Option<PromoterId>>> {
        self.0.promoter_parent(promoter_id)
    }
}

pub struct Distributor<'a, S: DistributionStore + ?Sized> {
    store: &'a S,
    schedule: &'a CommissionSchedule,
    policy: &'a DistributionPolicy,
    clock: &'a dyn Clock,
}

impl<'a, S: DistributionStore + ?Sized> Distributor<'a, S> {
    pub fn new(
        store: &'a S,
        schedule: &'a CommissionSchedule,
        policy: &'a DistributionPolicy,
        clock: &'a dyn Clock,
    ) -> Self {
        Self {
            store,
            schedule,
            policy,
            clock,
        }
    }

    /// The trigger call. Primary path first, fallback when the procedure is
    /// missing and the policy allows it.
    pub fn distribute(&self, customer_id: &str, initiator_id: &str) -> CommissionResult<DistributionOutcome> {
        require_id("customer_id", customer_id)?;
        require_id("initiator_promoter_id", initiator_id)?;

        let mut attempt: u32 = 0;
        loop {
            let now = self.clock.now();
            let result = self
                .store
                .call_distribute_procedure(customer_id, initiator_id, self.schedule, now);

            match result {
                Ok(ProcedureOutcome::Distributed { plan, records }) => {
                    let summary = self.summarize(customer_id, initiator_id, &plan, records, None, now);
                    self.record_completed(DistributionMethod::Primary, &summary);
                    log::info!(
                        "Distributed {} for customer '{customer_id}' (primary, {} levels, admin {})",
                        summary.total_distributed,
                        summary.levels_distributed,
                        summary.admin_fallback_amount
                    );
                    return Ok(DistributionOutcome::Primary(summary));
                }
                Ok(ProcedureOutcome::AlreadyProcessed(prior)) => {
                    return Ok(self.skipped(customer_id, initiator_id, prior, now));
                }
                Err(e) if e.is_procedure_missing() => {
                    if !self.policy.allow_fallback {
                        log::error!(
                            "Distribution procedure unavailable for customer '{customer_id}' and fallback is disabled"
                        );
                        return Err(e);
                    }
                    log::warn!(
                        "Distribution procedure unavailable ({e}); customer '{customer_id}' runs on the non-atomic fallback path"
                    );
                    event::record(
                        self.store,
                        &NetworkEvent::FallbackEngaged {
                            customer_id: customer_id.to_string(),
                            reason: e.to_string(),
                        },
                        now,
                    );
                    return self.distribute_fallback(customer_id, initiator_id);
                }
                Err(e) if e.is_transient() && attempt < self.policy.max_transient_retries => {
                    attempt += 1;
                    log::warn!(
                        "Transient store error distributing customer '{customer_id}' (attempt {attempt}): {e}; retrying through the guard"
                    );
                }
                Err(e) if e.is_transient() => {
                    return Err(CommissionError::TransientStore(format!(
                        "outcome unknown for customer '{customer_id}' after {} attempts: {e}",
                        attempt + 1
                    )));
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// The non-atomic path: guard, walk, then one insert per entry.
    pub fn distribute_fallback(
        &self,
        customer_id: &str,
        initiator_id: &str,
    ) -> CommissionResult<DistributionOutcome> {
        require_id("customer_id", customer_id)?;
        require_id("initiator_promoter_id", initiator_id)?;
        let now = self.clock.now();

        let existing = self.store.credited_totals(customer_id)?;
        if let GuardDecision::AlreadyProcessed(prior) = idempotency::check(existing) {
            return Ok(self.skipped(customer_id, initiator_id, prior, now));
        }

        let chain = resolve_chain(&StoreLookup(self.store), initiator_id, self.schedule.max_levels())?;
        let plan = allocate(self.schedule, &chain);
        let planned = records_for_plan(&plan, customer_id, initiator_id, now);
        let planned_count = planned.len();

        let mut written: Vec<CommissionRecord> = Vec::with_capacity(planned_count);
        for mut record in planned {
            match self.store.insert_commission(&record) {
                Ok(id) => {
                    record.id = Some(id);
                    written.push(record);
                }
                Err(e) => {
                    self.invalidate_wallets(&written);
                    return Err(self.partial_failure(customer_id, &written, planned_count, e, now));
                }
            }
        }
        self.invalidate_wallets(&written);

        let duplicate_excess = match self.store.credited_totals(customer_id) {
            Ok(after) => self.check_duplicate(customer_id, &after, now),
            Err(e) => {
                log::warn!("Post-write duplicate check failed for customer '{customer_id}': {e}");
                None
            }
        };

        let summary = self.summarize(customer_id, initiator_id, &plan, written, duplicate_excess, now);
        self.record_completed(DistributionMethod::Fallback, &summary);
        log::info!(
            "Distributed {} for customer '{customer_id}' (fallback, {} levels, admin {})",
            summary.total_distributed,
            summary.levels_distributed,
            summary.admin_fallback_amount
        );
        Ok(DistributionOutcome::Fallback(summary))
    }

    /// Every recipient credited outside the procedure loses its cached wallet.
    fn invalidate_wallets(&self, written: &[CommissionRecord]) {
        let keys: BTreeSet<String> = written
            .iter()
            .map(|r| r.recipient().wallet_key().to_string())
            .collect();
        for key in &keys {
            if let Err(e) = self.store.invalidate_wallet(key) {
                log::warn!("Could not invalidate cached wallet '{key}': {e}");
            }
        }
    }

    fn skipped(
        &self,
        customer_id: &str,
        initiator_id: &str,
        prior: CreditTotals,
        now: DateTime<Utc>,
    ) -> DistributionOutcome {
        log::info!(
            "Customer '{customer_id}' already distributed ({} entries, {} total); skipping",
            prior.entry_count,
            prior.total_amount
        );
        let duplicate_excess = self.check_duplicate(customer_id, &prior, now);
        event::record(
            self.store,
            &NetworkEvent::DistributionSkipped {
                customer_id: customer_id.to_string(),
                prior_total: prior.total_amount,
                prior_entries: prior.entry_count,
            },
            now,
        );
        DistributionOutcome::Skipped(DistributionSummary {
            customer_id: customer_id.to_string(),
            initiator_promoter_id: initiator_id.to_string(),
            total_distributed: prior.total_amount,
            levels_distributed: prior.promoter_levels.max(0) as usize,
            admin_fallback_amount: prior.admin_amount,
            timestamp: now,
            entries: Vec::new(),
            duplicate_excess,
        })
    }

    fn check_duplicate(&self, customer_id: &str, totals: &CreditTotals, now: DateTime<Utc>) -> Option<Amount> {
        let pool_total = self.schedule.pool_total();
        let excess = idempotency::excess_over_pool(customer_id, totals, pool_total)?;
        event::record(
            self.store,
            &NetworkEvent::DuplicateDetected {
                customer_id: customer_id.to_string(),
                credited_total: totals.total_amount,
                pool_total,
            },
            now,
        );
        Some(excess)
    }

    fn partial_failure(
        &self,
        customer_id: &str,
        written: &[CommissionRecord],
        planned: usize,
        cause: CommissionError,
        now: DateTime<Utc>,
    ) -> CommissionError {
        if written.is_empty() {
            // Nothing reached the ledger; the plain store error is accurate.
            return cause;
        }
        let credited: Amount = written.iter().map(|r| r.amount).sum();
        log::error!(
            "Fallback distribution for customer '{customer_id}' stopped after {} of {planned} entries ({credited} credited): {cause}",
            written.len()
        );
        event::record(
            self.store,
            &NetworkEvent::PartialDistribution {
                customer_id: customer_id.to_string(),
                written: written.len(),
                planned,
                credited,
                cause: cause.to_string(),
            },
            now,
        );
        CommissionError::PartialDistribution {
            customer_id: customer_id.to_string(),
            written: written.len(),
            planned,
            credited,
            cause: cause.to_string(),
        }
    }

    fn summarize(
        &self,
        customer_id: &str,
        initiator_id: &str,
        plan: &AllocationPlan,
        entries: Vec<CommissionRecord>,
        duplicate_excess: Option<Amount>,
        now: DateTime<Utc>,
    ) -> DistributionSummary {
        DistributionSummary {
            customer_id: customer_id.to_string(),
            initiator_promoter_id: initiator_id.to_string(),
            total_distributed: entries.iter().map(|r| r.amount).sum(),
            levels_distributed: plan.promoter_levels(),
            admin_fallback_amount: plan.admin_remainder,
            timestamp: now,
            entries,
            duplicate_excess,
        }
    }

    fn record_completed(&self, method: DistributionMethod, summary: &DistributionSummary) {
        event::record(
            self.store,
            &NetworkEvent::DistributionCompleted {
                customer_id: summary.customer_id.clone(),
                method,
                total_distributed: summary.total_distributed,
                levels_distributed: summary.levels_distributed,
                admin_fallback_amount: summary.admin_fallback_amount,
            },
            summary.timestamp,
        );
    }
}
