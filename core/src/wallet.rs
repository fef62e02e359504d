//! Wallet aggregator.
//!
//! The ledger is the only source of truth: a wallet is the sum and count of
//! the recipient's credited entries. The `wallet` table is a read-through
//! cache on top of that. It is bumped inside the atomic procedure, marked
//! stale by the fallback path, and rebuilt from the ledger whenever a read
//! finds it stale or missing.

use crate::{
    clock::Clock,
    config::WalletConfig,
    error::CommissionResult,
    ledger::CommissionRecord,
    pool::Recipient,
    store::{NetworkStore, WalletRow},
    types::Amount,
    validation::require_id,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalletSource {
    Cache,
    Ledger,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    pub wallet_key: String,
    pub balance: Amount,
    pub total_earned: Amount,
    pub commission_count: i64,
    pub last_event_at: Option<DateTime<Utc>>,
    pub source: WalletSource,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommissionSummary {
    pub recipient: Recipient,
    pub balance: Amount,
    pub total_earned: Amount,
    pub commission_count: i64,
    pub last_event_at: Option<DateTime<Utc>>,
    pub recent_entries: Vec<CommissionRecord>,
}

/// A cached wallet that disagrees with its ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WalletDrift {
    pub wallet_key: String,
    pub cached: Wallet,
    pub ledger: Wallet,
    pub repaired: bool,
}

pub struct WalletAggregator<'a> {
    store: &'a NetworkStore,
    config: &'a WalletConfig,
    clock: &'a dyn Clock,
}

impl<'a> WalletAggregator<'a> {
    pub fn new(store: &'a NetworkStore, config: &'a WalletConfig, clock: &'a dyn Clock) -> Self {
        Self {
            store,
            config,
            clock,
        }
    }

    /// Computed from credited ledger entries only. No cache involved.
    pub fn ledger_wallet(&self, recipient: &Recipient) -> CommissionResult<Wallet> {
        let key = recipient.wallet_key();
        let sums = self.store.ledger_sums(key)?;
        Ok(Wallet {
            wallet_key: key.to_string(),
            balance: sums.total,
            total_earned: sums.total,
            commission_count: sums.count,
            last_event_at: sums.last_event_at,
            source: WalletSource::Ledger,
        })
    }

    /// Read-through: a fresh cache row is returned as is; a stale or missing
    /// row is rebuilt from the ledger and stored.
    pub fn wallet(&self, recipient: &Recipient) -> CommissionResult<Wallet> {
        let key = recipient.wallet_key();
        if let Some(row) = self.store.get_wallet(key)? {
            if !row.stale {
                return Ok(cached_wallet(row));
            }
        }
        self.rebuild(recipient)
    }

    pub fn commission_summary(&self, recipient: &Recipient) -> CommissionResult<CommissionSummary> {
        if let Recipient::Promoter(id) = recipient {
            require_id("recipient_id", id)?;
        }
        let wallet = self.wallet(recipient)?;
        let recent_entries = self
            .store
            .recent_commissions(recipient.wallet_key(), self.config.recent_entries_limit)?;
        Ok(CommissionSummary {
            recipient: recipient.clone(),
            balance: wallet.balance,
            total_earned: wallet.total_earned,
            commission_count: wallet.commission_count,
            last_event_at: wallet.last_event_at,
            recent_entries,
        })
    }

    /// Explicit invalidation hook for writers outside the atomic procedure.
    pub fn invalidate(&self, recipient: &Recipient) -> CommissionResult<()> {
        self.store.invalidate_wallet(recipient.wallet_key())
    }

    /// Compare every cached wallet, and every recipient on the ledger, against
    /// the ledger. With `repair`, drifted rows are overwritten with ledger values.
    pub fn reconcile_cache(&self, repair: bool) -> CommissionResult<Vec<WalletDrift>> {
        let mut keys: Vec<String> = self.store.ledger_wallet_keys()?;
        for row in self.store.all_wallets()? {
            if !keys.contains(&row.wallet_key) {
                keys.push(row.wallet_key);
            }
        }

        let mut drifts = Vec::new();
        for key in keys {
            let recipient = Recipient::from_wallet_key(&key);
            let ledger = self.ledger_wallet(&recipient)?;
            let cached = match self.store.get_wallet(&key)? {
                // Already marked for rebuild; the next read takes care of it.
                Some(row) if row.stale => continue,
                Some(row) => cached_wallet(row),
                // Never cached: nothing can disagree yet.
                None => continue,
            };
            if same_figures(&cached, &ledger) {
                continue;
            }

            log::warn!(
                "Wallet cache drift for '{key}': cached {}, ledger {} over {} entries",
                cached.total_earned,
                ledger.total_earned,
                ledger.commission_count
            );
            if repair {
                self.rebuild(&recipient)?;
            }
            drifts.push(WalletDrift {
                wallet_key: key,
                cached,
                ledger,
                repaired: repair,
            });
        }
        Ok(drifts)
    }

    /// Ledger read and cache write share one write transaction, so no ledger
    /// insert or invalidation from another connection can land between them.
    fn rebuild(&self, recipient: &Recipient) -> CommissionResult<Wallet> {
        self.store.atomically(|| {
            let fresh = self.ledger_wallet(recipient)?;
            self.store.upsert_wallet(&WalletRow {
                wallet_key: fresh.wallet_key.clone(),
                balance: fresh.balance,
                total_earned: fresh.total_earned,
                commission_count: fresh.commission_count,
                last_event_at: fresh.last_event_at,
                stale: false,
                refreshed_at: self.clock.now(),
            })?;
            Ok(fresh)
        })
    }
}

fn cached_wallet(row: WalletRow) -> Wallet {
    Wallet {
        wallet_key: row.wallet_key,
        balance: row.balance,
        total_earned: row.total_earned,
        commission_count: row.commission_count,
        last_event_at: row.last_event_at,
        source: WalletSource::Cache,
    }
}

fn same_figures(a: &Wallet, b: &Wallet) -> bool {
    a.balance == b.balance && a.total_earned == b.total_earned && a.commission_count == b.commission_count
}
