use crate::{
    distribution::DistributionReport,
    engine::{NetworkEngine, NewPromoter},
    error::CommissionResult,
    pins::PinAdjustment,
    pool::Recipient,
    reconciliation::ReconciliationReport,
    store::{CustomerRow, PromoterRow},
    types::{CustomerId, PromoterId},
    wallet::CommissionSummary,
};
use serde::{Deserialize, Serialize};

/// Operator commands accepted by the runner's JSON-lines loop.
/// Variants are only ever appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum NetworkCommand {
    // ── Registry ─────────────────────────────────
    RegisterPromoter(NewPromoter),

    // ── Quota ────────────────────────────────────
    AllocatePins {
        promoter_id: PromoterId,
        delta: i64,
        #[serde(default)]
        note: Option<String>,
    },

    // ── Onboarding / distribution ────────────────
    Onboard {
        promoter_id: PromoterId,
        #[serde(default)]
        customer_name: String,
    },
    Distribute {
        customer_id: CustomerId,
        initiator_promoter_id: PromoterId,
    },

    // ── Read model ───────────────────────────────
    /// `promoter_id: None` reads the admin wallet.
    Summary {
        #[serde(default)]
        promoter_id: Option<PromoterId>,
    },
    Audit {
        #[serde(default)]
        repair_wallets: bool,
    },

    Quit,
}

/// What a command produced. Serialized as one JSON line by the runner.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "reply", rename_all = "snake_case")]
pub enum CommandReply {
    Promoter(PromoterRow),
    Pins(PinAdjustment),
    Onboarded {
        customer: CustomerRow,
        pins: PinAdjustment,
        distribution: Option<DistributionReport>,
        distribution_error: Option<String>,
    },
    Distribution(DistributionReport),
    Summary(CommissionSummary),
    Audit(ReconciliationReport),
    Bye,
}

impl NetworkEngine {
    pub fn apply(&self, command: NetworkCommand) -> CommissionResult<CommandReply> {
        match command {
            NetworkCommand::RegisterPromoter(new) => self.register_promoter(&new).map(CommandReply::Promoter),
            NetworkCommand::AllocatePins {
                promoter_id,
                delta,
                note,
            } => self
                .adjust_pins(&promoter_id, delta, None, note.as_deref())
                .map(CommandReply::Pins),
            NetworkCommand::Onboard {
                promoter_id,
                customer_name,
            } => {
                let outcome = self.onboard(&promoter_id, &customer_name)?;
                let (distribution, distribution_error) = match &outcome.distribution {
                    Ok(d) => (Some(d.report()), None),
                    Err(e) => (None, Some(e.to_string())),
                };
                Ok(CommandReply::Onboarded {
                    customer: outcome.customer,
                    pins: outcome.pins,
                    distribution,
                    distribution_error,
                })
            }
            NetworkCommand::Distribute {
                customer_id,
                initiator_promoter_id,
            } => self
                .distribute(&customer_id, &initiator_promoter_id)
                .map(|o| CommandReply::Distribution(o.report())),
            NetworkCommand::Summary { promoter_id } => {
                let recipient = promoter_id.map_or(Recipient::Admin, Recipient::Promoter);
                self.commission_summary(&recipient).map(CommandReply::Summary)
            }
            NetworkCommand::Audit { repair_wallets } => {
                self.reconciliation_report(repair_wallets).map(CommandReply::Audit)
            }
            NetworkCommand::Quit => Ok(CommandReply::Bye),
        }
    }
}
