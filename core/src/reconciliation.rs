//! Reconciliation report: the manual-review side of the fallback path and of
//! the pin audit trail.
//!
//! Checks:
//!   - every customer on the ledger holds exactly one pool (partial and
//!     duplicated distributions are listed)
//!   - every onboarded customer has ledger entries at all
//!   - every promoter's pins equal the sum of its audited pin deltas
//!   - every fresh cached wallet matches the ledger (optionally repaired)

use crate::{
    error::CommissionResult,
    store::NetworkStore,
    types::{Amount, CustomerId, PromoterId},
    wallet::{WalletAggregator, WalletDrift},
};
use serde::Serialize;
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DistributionStatus {
    Complete,
    Partial,
    Duplicated,
}

impl DistributionStatus {
    pub fn classify(credited: Amount, pool_total: Amount) -> Self {
        match credited.cmp(&pool_total) {
            Ordering::Less => Self::Partial,
            Ordering::Equal => Self::Complete,
            Ordering::Greater => Self::Duplicated,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CustomerDistributionAudit {
    pub customer_id: CustomerId,
    pub initiator_promoter_id: PromoterId,
    pub entry_count: i64,
    pub credited_total: Amount,
    pub status: DistributionStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PinAuditGap {
    pub promoter_id: PromoterId,
    pub pins: i64,
    pub audited_sum: i64,
    /// pins - audited_sum. Negative when deductions went unaudited.
    pub gap: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconciliationReport {
    pub pool_total: Amount,
    pub customers_checked: usize,
    pub distribution_issues: Vec<CustomerDistributionAudit>,
    pub undistributed_customers: Vec<CustomerId>,
    pub pin_gaps: Vec<PinAuditGap>,
    pub wallet_drift: Vec<WalletDrift>,
}

impl ReconciliationReport {
    pub fn build(
        store: &NetworkStore,
        pool_total: Amount,
        wallets: &WalletAggregator<'_>,
        repair_wallets: bool,
    ) -> CommissionResult<Self> {
        let ledger_rows = store.customer_ledger_rows()?;
        let customers_checked = ledger_rows.len();

        let distribution_issues: Vec<CustomerDistributionAudit> = ledger_rows
            .into_iter()
            .filter_map(|row| {
                let status = DistributionStatus::classify(row.total_amount, pool_total);
                (status != DistributionStatus::Complete).then(|| CustomerDistributionAudit {
                    customer_id: row.customer_id,
                    initiator_promoter_id: row.initiator_promoter_id,
                    entry_count: row.entry_count,
                    credited_total: row.total_amount,
                    status,
                })
            })
            .collect();

        let undistributed_customers = store.customers_without_commissions()?;

        let pin_gaps: Vec<PinAuditGap> = store
            .pin_audit_rows()?
            .into_iter()
            .filter(|r| r.pins != r.audited_sum)
            .map(|r| PinAuditGap {
                gap: r.pins - r.audited_sum,
                promoter_id: r.promoter_id,
                pins: r.pins,
                audited_sum: r.audited_sum,
            })
            .collect();

        let wallet_drift = wallets.reconcile_cache(repair_wallets)?;

        let report = Self {
            pool_total,
            customers_checked,
            distribution_issues,
            undistributed_customers,
            pin_gaps,
            wallet_drift,
        };
        if report.is_clean() {
            log::info!("Reconciliation clean: {customers_checked} customers checked");
        } else {
            log::warn!(
                "Reconciliation found {} distribution issues, {} undistributed customers, {} pin audit gaps, {} wallet drifts",
                report.distribution_issues.len(),
                report.undistributed_customers.len(),
                report.pin_gaps.len(),
                report.wallet_drift.len()
            );
        }
        Ok(report)
    }

    pub fn is_clean(&self) -> bool {
        self.distribution_issues.is_empty()
            && self.undistributed_customers.is_empty()
            && self.pin_gaps.is_empty()
            && self.wallet_drift.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_against_pool() {
        assert_eq!(DistributionStatus::classify(800, 800), DistributionStatus::Complete);
        assert_eq!(DistributionStatus::classify(600, 800), DistributionStatus::Partial);
        assert_eq!(DistributionStatus::classify(1600, 800), DistributionStatus::Duplicated);
    }
}
