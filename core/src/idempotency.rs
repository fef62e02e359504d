//! Idempotency guard. A customer with any credited entry has been processed;
//! a customer credited beyond one pool has been processed more than once.

use crate::{ledger::CreditTotals, types::Amount};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDecision {
    Proceed,
    AlreadyProcessed(CreditTotals),
}

pub fn check(existing: CreditTotals) -> GuardDecision {
    if existing.is_empty() {
        GuardDecision::Proceed
    } else {
        GuardDecision::AlreadyProcessed(existing)
    }
}

/// Returns the amount credited beyond one pool, logging it, or `None` when
/// the ledger holds at most one pool for the customer.
pub fn excess_over_pool(customer_id: &str, totals: &CreditTotals, pool_total: Amount) -> Option<Amount> {
    if totals.total_amount <= pool_total {
        return None;
    }
    let excess = totals.total_amount - pool_total;
    log::warn!(
        "Duplicate distribution for customer '{customer_id}': {} credited across {} entries, pool is {pool_total} (excess {excess})",
        totals.total_amount,
        totals.entry_count
    );
    Some(excess)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_ledger_proceeds() {
        assert_eq!(check(CreditTotals::default()), GuardDecision::Proceed);
    }

    #[test]
    fn prior_credit_skips_with_totals() {
        let prior = CreditTotals {
            entry_count: 2,
            promoter_levels: 1,
            total_amount: 800,
            admin_amount: 300,
        };
        assert_eq!(check(prior), GuardDecision::AlreadyProcessed(prior));
    }

    #[test]
    fn excess_only_above_pool() {
        let one = CreditTotals { entry_count: 4, promoter_levels: 4, total_amount: 800, admin_amount: 0 };
        assert_eq!(excess_over_pool("c", &one, 800), None);
        let two = CreditTotals { entry_count: 8, promoter_levels: 8, total_amount: 1600, admin_amount: 0 };
        assert_eq!(excess_over_pool("c", &two, 800), Some(800));
    }
}
