//! Pin quota gate.
//!
//! A deduction is one compare-and-decrement statement against the stored
//! balance; it cannot take pins below zero. The audit row is a second
//! statement. If that second statement fails, the balance stays correct and
//! the gap is flagged on the result for reconciliation to pick up.

use crate::{
    clock::Clock,
    error::{CommissionError, CommissionResult},
    event::{self, NetworkEvent},
    store::{NetworkStore, PinTransactionRow},
    types::PromoterId,
    validation::require_id,
};
use serde::{Deserialize, Serialize};

/// Largest pin change a single call may apply, in either direction.
pub const MAX_PIN_DELTA: i64 = 1_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PinTransactionType {
    Allocation,
    Deduction,
}

impl PinTransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allocation => "allocation",
            Self::Deduction => "deduction",
        }
    }

    pub fn for_delta(delta: i64) -> Self {
        if delta < 0 {
            Self::Deduction
        } else {
            Self::Allocation
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinAdjustment {
    pub success: bool,
    pub promoter_id: PromoterId,
    pub delta: i64,
    pub new_balance: i64,
    pub transaction_type: PinTransactionType,
    /// Id of the audit row, `None` when the audit insert failed.
    pub audit_id: Option<i64>,
}

impl PinAdjustment {
    pub fn audit_recorded(&self) -> bool {
        self.audit_id.is_some()
    }
}

pub struct PinQuotaGate<'a> {
    store: &'a NetworkStore,
    clock: &'a dyn Clock,
}

impl<'a> PinQuotaGate<'a> {
    pub fn new(store: &'a NetworkStore, clock: &'a dyn Clock) -> Self {
        Self { store, clock }
    }

    /// Negative `delta` consumes pins and fails with `QuotaExhausted` when the
    /// balance does not cover it. Positive `delta` is an administrative top-up.
    pub fn adjust_pins(
        &self,
        promoter_id: &str,
        delta: i64,
        customer_id: Option<&str>,
        note: Option<&str>,
    ) -> CommissionResult<PinAdjustment> {
        require_id("promoter_id", promoter_id)?;
        if let Some(c) = customer_id {
            require_id("customer_id", c)?;
        }
        if delta == 0 {
            return Err(CommissionError::validation("pin delta must be non-zero"));
        }
        if delta.unsigned_abs() > MAX_PIN_DELTA as u64 {
            return Err(CommissionError::validation(format!(
                "pin delta {delta} exceeds the per-call limit of {MAX_PIN_DELTA}"
            )));
        }

        let transaction_type = PinTransactionType::for_delta(delta);
        let new_balance = match transaction_type {
            PinTransactionType::Deduction => self.deduct(promoter_id, -delta)?,
            PinTransactionType::Allocation => self
                .store
                .credit_pins(promoter_id, delta)?
                .ok_or_else(|| CommissionError::PromoterNotFound {
                    promoter_id: promoter_id.to_string(),
                })?,
        };

        let now = self.clock.now();
        let audit = PinTransactionRow {
            id: None,
            promoter_id: promoter_id.to_string(),
            customer_id: customer_id.map(str::to_string),
            delta,
            transaction_type: transaction_type.as_str().to_string(),
            note: note.map(str::to_string),
            created_at: now,
        };
        let audit_id = match self.store.insert_pin_transaction(&audit) {
            Ok(id) => Some(id),
            Err(e) => {
                log::error!(
                    "Pin {} of {delta} for promoter '{promoter_id}' applied (balance {new_balance}) but audit insert failed: {e}",
                    transaction_type.as_str()
                );
                None
            }
        };

        event::record(
            self.store,
            &NetworkEvent::PinsAdjusted {
                promoter_id: promoter_id.to_string(),
                delta,
                new_balance,
                customer_id: customer_id.map(str::to_string),
                audit_recorded: audit_id.is_some(),
            },
            now,
        );
        log::debug!("Promoter '{promoter_id}' pins {delta:+} -> {new_balance}");

        Ok(PinAdjustment {
            success: true,
            promoter_id: promoter_id.to_string(),
            delta,
            new_balance,
            transaction_type,
            audit_id,
        })
    }

    /// Consume one pin for an onboarding.
    pub fn consume_for_onboarding(&self, promoter_id: &str, customer_id: &str) -> CommissionResult<PinAdjustment> {
        self.adjust_pins(promoter_id, -1, Some(customer_id), Some("customer onboarding"))
    }

    fn deduct(&self, promoter_id: &str, amount: i64) -> CommissionResult<i64> {
        if let Some(balance) = self.store.consume_pins(promoter_id, amount)? {
            return Ok(balance);
        }
        // The guarded update touched nothing: either no such promoter or too few pins.
        match self.store.promoter_pins(promoter_id)? {
            None => Err(CommissionError::PromoterNotFound {
                promoter_id: promoter_id.to_string(),
            }),
            Some(available) => {
                log::info!(
                    "Promoter '{promoter_id}' has {available} pins, {amount} required; onboarding rejected"
                );
                event::record(
                    self.store,
                    &NetworkEvent::PinsRejected {
                        promoter_id: promoter_id.to_string(),
                        available,
                        required: amount,
                    },
                    self.clock.now(),
                );
                Err(CommissionError::QuotaExhausted {
                    promoter_id: promoter_id.to_string(),
                    available,
                    required: amount,
                })
            }
        }
    }
}
