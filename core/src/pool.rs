//! Pool accountant: splits one onboarding's fixed pool across the resolved
//! hierarchy and hands whatever is left to the admin account.

use crate::{
    config::CommissionSchedule,
    hierarchy::ResolvedLevel,
    types::{Amount, Level, PromoterId, ADMIN_LEVEL, ADMIN_WALLET_KEY},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum Recipient {
    Promoter(PromoterId),
    Admin,
}

impl Recipient {
    pub fn promoter_id(&self) -> Option<&str> {
        match self {
            Self::Promoter(id) => Some(id),
            Self::Admin => None,
        }
    }

    pub fn wallet_key(&self) -> &str {
        match self {
            Self::Promoter(id) => id,
            Self::Admin => ADMIN_WALLET_KEY,
        }
    }

    /// Inverse of `wallet_key`.
    pub fn from_wallet_key(key: &str) -> Self {
        if key == ADMIN_WALLET_KEY {
            Self::Admin
        } else {
            Self::Promoter(key.to_string())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedEntry {
    pub level: Level,
    pub recipient: Recipient,
    pub amount: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationPlan {
    pub pool_total: Amount,
    /// Promoter entries in level order, then the admin entry if any.
    pub entries: Vec<PlannedEntry>,
    pub admin_remainder: Amount,
}

impl AllocationPlan {
    pub fn promoter_levels(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e.recipient, Recipient::Promoter(_)))
            .count()
    }

    pub fn total(&self) -> Amount {
        self.entries.iter().map(|e| e.amount).sum()
    }
}

/// Allocate the schedule over `chain`. Levels beyond the schedule are ignored;
/// levels without a recipient leave their amount in the remainder.
pub fn allocate(schedule: &CommissionSchedule, chain: &[ResolvedLevel]) -> AllocationPlan {
    let pool_total = schedule.pool_total();
    let mut remaining = pool_total;
    let mut entries = Vec::with_capacity(chain.len() + 1);

    for resolved in chain {
        let Some(amount) = schedule.amount_for(resolved.level) else {
            continue;
        };
        entries.push(PlannedEntry {
            level: resolved.level,
            recipient: Recipient::Promoter(resolved.recipient_id.clone()),
            amount,
        });
        remaining -= amount;
    }

    if remaining > 0 {
        entries.push(PlannedEntry {
            level: ADMIN_LEVEL,
            recipient: Recipient::Admin,
            amount: remaining,
        });
    }

    debug_assert_eq!(entries.iter().map(|e| e.amount).sum::<Amount>(), pool_total);

    AllocationPlan {
        pool_total,
        entries,
        admin_remainder: remaining.max(0),
    }
}
