//! Ledger entries. One row per payment, immutable once credited.

use crate::{
    pool::{AllocationPlan, PlannedEntry, Recipient},
    types::{Amount, CustomerId, Level, PromoterId},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecipientType {
    Promoter,
    Admin,
}

impl RecipientType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Promoter => "promoter",
            Self::Admin => "admin",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "promoter" => Some(Self::Promoter),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommissionStatus {
    Pending,
    Credited,
    Failed,
}

impl CommissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Credited => "credited",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "credited" => Some(Self::Credited),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionRecord {
    /// Assigned by the store on insert.
    pub id: Option<i64>,
    pub customer_id: CustomerId,
    pub initiator_promoter_id: PromoterId,
    pub recipient_id: Option<PromoterId>,
    pub recipient_type: RecipientType,
    pub level: Level,
    pub amount: Amount,
    pub status: CommissionStatus,
    pub transaction_id: String,
    pub created_at: DateTime<Utc>,
}

impl CommissionRecord {
    pub fn recipient(&self) -> Recipient {
        match (&self.recipient_type, &self.recipient_id) {
            (RecipientType::Promoter, Some(id)) => Recipient::Promoter(id.clone()),
            _ => Recipient::Admin,
        }
    }
}

/// Aggregate of the credited entries already on the ledger for one customer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditTotals {
    pub entry_count: i64,
    pub promoter_levels: i64,
    pub total_amount: Amount,
    pub admin_amount: Amount,
}

impl CreditTotals {
    pub fn is_empty(&self) -> bool {
        self.entry_count == 0
    }
}

pub fn new_transaction_id() -> String {
    format!("CMT-{}", uuid::Uuid::new_v4().simple())
}

/// Turn an allocation plan into the credited rows the ledger writer persists.
pub fn records_for_plan(
    plan: &AllocationPlan,
    customer_id: &str,
    initiator_id: &str,
    now: DateTime<Utc>,
) -> Vec<CommissionRecord> {
    plan.entries
        .iter()
        .map(|entry| record_for_entry(entry, customer_id, initiator_id, now))
        .collect()
}

fn record_for_entry(
    entry: &PlannedEntry,
    customer_id: &str,
    initiator_id: &str,
    now: DateTime<Utc>,
) -> CommissionRecord {
    let (recipient_id, recipient_type) = match &entry.recipient {
        Recipient::Promoter(id) => (Some(id.clone()), RecipientType::Promoter),
        Recipient::Admin => (None, RecipientType::Admin),
    };
    CommissionRecord {
        id: None,
        customer_id: customer_id.to_string(),
        initiator_promoter_id: initiator_id.to_string(),
        recipient_id,
        recipient_type,
        level: entry.level,
        amount: entry.amount,
        status: CommissionStatus::Credited,
        transaction_id: new_transaction_id(),
        created_at: now,
    }
}
