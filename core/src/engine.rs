//! The network engine: the one place that sequences onboarding.
//!
//! ONBOARDING ORDER (fixed, never reordered):
//!   1. Validate input              (no store access)
//!   2. Pin quota gate              (hard stop on QuotaExhausted)
//!   3. Customer record creation    (pin refunded if this fails)
//!   4. Commission distribution     (reported separately; a failure here
//!                                   does not undo the onboarding)
//!
//! RULES:
//!   - Nothing after step 2 runs unless the pin was consumed.
//!   - Distribution failures are surfaced, never swallowed, and never
//!     retried here. Reconciliation is a separate, explicit call.

use crate::{
    clock::{Clock, SystemClock},
    config::NetworkConfig,
    distribution::{DistributionOutcome, Distributor},
    error::{CommissionError, CommissionResult},
    event::{self, NetworkEvent},
    pins::{PinAdjustment, PinQuotaGate, MAX_PIN_DELTA},
    pool::Recipient,
    reconciliation::ReconciliationReport,
    store::{CustomerRow, NetworkStore, PromoterRow},
    types::{CustomerId, PromoterId},
    validation::require_id,
    wallet::{CommissionSummary, WalletAggregator},
};
use serde::{Deserialize, Serialize};

pub const MAX_NAME_LEN: usize = 120;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPromoter {
    pub promoter_id: PromoterId,
    pub parent_promoter_id: Option<PromoterId>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub initial_pins: i64,
}

#[derive(Debug)]
pub struct OnboardingOutcome {
    pub customer: CustomerRow,
    pub pins: PinAdjustment,
    /// Distribution runs after the customer exists; its failure leaves the
    /// customer in place for a later retry or manual reconciliation.
    pub distribution: CommissionResult<DistributionOutcome>,
}

impl OnboardingOutcome {
    pub fn customer_id(&self) -> &str {
        &self.customer.customer_id
    }
}

pub struct NetworkEngine {
    pub store: NetworkStore,
    pub config: NetworkConfig,
    clock: Box<dyn Clock>,
}

impl NetworkEngine {
    pub fn new(store: NetworkStore, config: NetworkConfig, clock: Box<dyn Clock>) -> Self {
        Self {
            store,
            config,
            clock,
        }
    }

    /// Migrated store, given config, wall clock.
    pub fn build(store: NetworkStore, config: NetworkConfig) -> CommissionResult<Self> {
        store.migrate()?;
        Ok(Self::new(store, config, Box::new(SystemClock)))
    }

    /// In-memory store with test defaults.
    pub fn build_test() -> CommissionResult<Self> {
        Self::build(NetworkStore::in_memory()?, NetworkConfig::default_test())
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub fn pin_gate(&self) -> PinQuotaGate<'_> {
        PinQuotaGate::new(&self.store, self.clock.as_ref())
    }

    pub fn distributor(&self) -> Distributor<'_, NetworkStore> {
        Distributor::new(
            &self.store,
            &self.config.schedule,
            &self.config.distribution,
            self.clock.as_ref(),
        )
    }

    pub fn wallets(&self) -> WalletAggregator<'_> {
        WalletAggregator::new(&self.store, &self.config.wallet, self.clock.as_ref())
    }

    // ── Registry ───────────────────────────────────────────────

    /// Add a promoter under an existing parent (or as a root). The initial pin
    /// grant goes through the quota gate so it lands in the audit trail.
    pub fn register_promoter(&self, new: &NewPromoter) -> CommissionResult<PromoterRow> {
        require_id("promoter_id", &new.promoter_id)?;
        if let Some(parent) = &new.parent_promoter_id {
            require_id("parent_promoter_id", parent)?;
        }
        check_name(&new.name)?;
        if new.initial_pins < 0 {
            return Err(CommissionError::validation("initial_pins must not be negative"));
        }
        if new.initial_pins > MAX_PIN_DELTA {
            return Err(CommissionError::validation(format!(
                "initial_pins {} exceeds the per-call limit of {MAX_PIN_DELTA}",
                new.initial_pins
            )));
        }
        if self.store.get_promoter(&new.promoter_id)?.is_some() {
            return Err(CommissionError::validation(format!(
                "promoter '{}' already exists",
                new.promoter_id
            )));
        }
        if let Some(parent) = &new.parent_promoter_id {
            if self.store.get_promoter(parent)?.is_none() {
                return Err(CommissionError::PromoterNotFound {
                    promoter_id: parent.clone(),
                });
            }
        }

        let now = self.clock.now();
        let row = PromoterRow {
            promoter_id: new.promoter_id.clone(),
            parent_promoter_id: new.parent_promoter_id.clone(),
            name: new.name.clone(),
            pins: 0,
            status: "active".into(),
            created_at: now,
        };
        // Row and initial grant land together or not at all.
        let pins = self.store.atomically(|| {
            self.store.insert_promoter(&row)?;
            if new.initial_pins > 0 {
                let grant = self.pin_gate().adjust_pins(
                    &row.promoter_id,
                    new.initial_pins,
                    None,
                    Some("initial allocation"),
                )?;
                Ok(grant.new_balance)
            } else {
                Ok(0)
            }
        })?;
        event::record(
            &self.store,
            &NetworkEvent::PromoterRegistered {
                promoter_id: row.promoter_id.clone(),
                parent_promoter_id: row.parent_promoter_id.clone(),
                initial_pins: new.initial_pins,
            },
            now,
        );
        log::info!(
            "Registered promoter '{}' under {:?} with {pins} pins",
            row.promoter_id,
            row.parent_promoter_id
        );
        Ok(PromoterRow { pins, ..row })
    }

    // ── Quota ──────────────────────────────────────────────────

    pub fn adjust_pins(
        &self,
        promoter_id: &str,
        delta: i64,
        customer_id: Option<&str>,
        note: Option<&str>,
    ) -> CommissionResult<PinAdjustment> {
        self.pin_gate().adjust_pins(promoter_id, delta, customer_id, note)
    }

    // ── Onboarding ─────────────────────────────────────────────

    pub fn onboard(&self, initiator_id: &str, customer_name: &str) -> CommissionResult<OnboardingOutcome> {
        require_id("initiator_promoter_id", initiator_id)?;
        check_name(customer_name)?;

        let customer_id: CustomerId = uuid::Uuid::new_v4().to_string();
        let gate = self.pin_gate();
        let pins = gate.consume_for_onboarding(initiator_id, &customer_id)?;

        let customer = CustomerRow {
            customer_id: customer_id.clone(),
            parent_promoter_id: initiator_id.to_string(),
            name: customer_name.to_string(),
            status: "active".into(),
            created_at: self.clock.now(),
        };
        if let Err(e) = self.store.insert_customer(&customer) {
            log::error!("Customer creation failed for promoter '{initiator_id}' after pin deduction: {e}");
            if let Err(refund_err) =
                gate.adjust_pins(initiator_id, 1, Some(&customer_id), Some("refund: customer creation failed"))
            {
                log::error!("Pin refund for promoter '{initiator_id}' failed: {refund_err}");
            }
            return Err(e);
        }
        event::record(
            &self.store,
            &NetworkEvent::CustomerOnboarded {
                customer_id: customer_id.clone(),
                promoter_id: initiator_id.to_string(),
            },
            customer.created_at,
        );

        let distribution = self.distribute(&customer_id, initiator_id);
        if let Err(e) = &distribution {
            log::error!("Customer '{customer_id}' onboarded but distribution did not complete: {e}");
        }

        Ok(OnboardingOutcome {
            customer,
            pins,
            distribution,
        })
    }

    // ── Distribution ───────────────────────────────────────────

    pub fn distribute(&self, customer_id: &str, initiator_id: &str) -> CommissionResult<DistributionOutcome> {
        self.distributor().distribute(customer_id, initiator_id)
    }

    // ── Read model ─────────────────────────────────────────────

    pub fn commission_summary(&self, recipient: &Recipient) -> CommissionResult<CommissionSummary> {
        self.wallets().commission_summary(recipient)
    }

    // ── Reconciliation ─────────────────────────────────────────

    pub fn reconciliation_report(&self, repair_wallets: bool) -> CommissionResult<ReconciliationReport> {
        ReconciliationReport::build(
            &self.store,
            self.config.schedule.pool_total(),
            &self.wallets(),
            repair_wallets,
        )
    }
}

fn check_name(name: &str) -> CommissionResult<()> {
    if name.chars().count() > MAX_NAME_LEN {
        return Err(CommissionError::validation(format!(
            "name exceeds {MAX_NAME_LEN} characters"
        )));
    }
    Ok(())
}
