//! Activity log. Every significant step of onboarding and distribution is
//! appended to `event_log` as tagged JSON.
//!
//! RULE: event writes are best-effort. A failed append is logged and never
//! changes the outcome of the step that produced it.

use crate::{
    distribution::DistributionMethod,
    error::CommissionResult,
    store::{EventLogEntry, NetworkStore},
    types::{Amount, CustomerId, PromoterId},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Variants are only ever appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NetworkEvent {
    // ── Registry ───────────────────────────────────
    PromoterRegistered {
        promoter_id: PromoterId,
        parent_promoter_id: Option<PromoterId>,
        initial_pins: i64,
    },

    // ── Pin quota ──────────────────────────────────
    PinsAdjusted {
        promoter_id: PromoterId,
        delta: i64,
        new_balance: i64,
        customer_id: Option<CustomerId>,
        audit_recorded: bool,
    },
    PinsRejected {
        promoter_id: PromoterId,
        available: i64,
        required: i64,
    },

    // ── Onboarding ─────────────────────────────────
    CustomerOnboarded {
        customer_id: CustomerId,
        promoter_id: PromoterId,
    },

    // ── Distribution ───────────────────────────────
    DistributionCompleted {
        customer_id: CustomerId,
        method: DistributionMethod,
        total_distributed: Amount,
        levels_distributed: usize,
        admin_fallback_amount: Amount,
    },
    DistributionSkipped {
        customer_id: CustomerId,
        prior_total: Amount,
        prior_entries: i64,
    },
    FallbackEngaged {
        customer_id: CustomerId,
        reason: String,
    },
    PartialDistribution {
        customer_id: CustomerId,
        written: usize,
        planned: usize,
        credited: Amount,
        cause: String,
    },
    DuplicateDetected {
        customer_id: CustomerId,
        credited_total: Amount,
        pool_total: Amount,
    },
}

impl NetworkEvent {
    /// Stable name for the event_type column.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::PromoterRegistered { .. } => "promoter_registered",
            Self::PinsAdjusted { .. } => "pins_adjusted",
            Self::PinsRejected { .. } => "pins_rejected",
            Self::CustomerOnboarded { .. } => "customer_onboarded",
            Self::DistributionCompleted { .. } => "distribution_completed",
            Self::DistributionSkipped { .. } => "distribution_skipped",
            Self::FallbackEngaged { .. } => "fallback_engaged",
            Self::PartialDistribution { .. } => "partial_distribution",
            Self::DuplicateDetected { .. } => "duplicate_detected",
        }
    }

    /// The entity the event is filed under.
    pub fn subject_id(&self) -> &str {
        match self {
            Self::PromoterRegistered { promoter_id, .. }
            | Self::PinsAdjusted { promoter_id, .. }
            | Self::PinsRejected { promoter_id, .. } => promoter_id,
            Self::CustomerOnboarded { customer_id, .. }
            | Self::DistributionCompleted { customer_id, .. }
            | Self::DistributionSkipped { customer_id, .. }
            | Self::FallbackEngaged { customer_id, .. }
            | Self::PartialDistribution { customer_id, .. }
            | Self::DuplicateDetected { customer_id, .. } => customer_id,
        }
    }

    pub fn to_log_entry(&self, at: DateTime<Utc>) -> CommissionResult<EventLogEntry> {
        Ok(EventLogEntry {
            id: None,
            subject_id: self.subject_id().to_string(),
            event_type: self.event_type().to_string(),
            payload: serde_json::to_string(self)?,
            created_at: at,
        })
    }
}

/// Anything that can persist an activity log entry.
pub trait EventSink {
    fn append_event(&self, entry: &EventLogEntry) -> CommissionResult<()>;
}

impl EventSink for NetworkStore {
    fn append_event(&self, entry: &EventLogEntry) -> CommissionResult<()> {
        NetworkStore::append_event(self, entry)
    }
}

/// Append an event, logging instead of failing.
pub fn record<S: EventSink + ?Sized>(sink: &S, event: &NetworkEvent, at: DateTime<Utc>) {
    let result = event
        .to_log_entry(at)
        .and_then(|entry| sink.append_event(&entry));
    if let Err(e) = result {
        log::warn!("Could not record {} event: {e}", event.event_type());
    }
}
