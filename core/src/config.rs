//! Network configuration: commission schedule and runtime policies, loaded from `data/`.

use crate::{
    error::{CommissionError, CommissionResult},
    types::{Amount, Level},
};
use serde::{Deserialize, Serialize};

/// Hard ceiling on hierarchy depth. A schedule may be shorter, never longer.
pub const MAX_HIERARCHY_LEVELS: usize = 4;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct LevelRate {
    pub level: Level,
    pub amount: Amount,
}

/// The per-level commission table. Level 1 pays the initiator, level n+1 pays
/// level n's parent. The pool is the sum of every level's amount.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommissionSchedule {
    pub levels: Vec<LevelRate>,
}

impl CommissionSchedule {
    pub fn new(levels: Vec<LevelRate>) -> CommissionResult<Self> {
        let schedule = Self { levels };
        schedule.validate()?;
        Ok(schedule)
    }

    /// The 500/100/100/100 schedule used by the network today.
    pub fn standard() -> Self {
        Self {
            levels: vec![
                LevelRate { level: 1, amount: 500 },
                LevelRate { level: 2, amount: 100 },
                LevelRate { level: 3, amount: 100 },
                LevelRate { level: 4, amount: 100 },
            ],
        }
    }

    pub fn validate(&self) -> CommissionResult<()> {
        if self.levels.is_empty() {
            return Err(CommissionError::validation("schedule has no levels"));
        }
        if self.levels.len() > MAX_HIERARCHY_LEVELS {
            return Err(CommissionError::validation(format!(
                "schedule has {} levels, at most {MAX_HIERARCHY_LEVELS} allowed",
                self.levels.len()
            )));
        }
        for (i, rate) in self.levels.iter().enumerate() {
            let expected = (i + 1) as Level;
            if rate.level != expected {
                return Err(CommissionError::validation(format!(
                    "schedule levels must be contiguous from 1: expected level {expected}, found {}",
                    rate.level
                )));
            }
            if rate.amount <= 0 {
                return Err(CommissionError::validation(format!(
                    "level {} amount must be positive (got {})",
                    rate.level, rate.amount
                )));
            }
        }
        Ok(())
    }

    pub fn max_levels(&self) -> usize {
        self.levels.len()
    }

    pub fn pool_total(&self) -> Amount {
        self.levels.iter().map(|l| l.amount).sum()
    }

    pub fn amount_for(&self, level: Level) -> Option<Amount> {
        self.levels.iter().find(|l| l.level == level).map(|l| l.amount)
    }
}

impl Default for CommissionSchedule {
    fn default() -> Self {
        Self::standard()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistributionPolicy {
    /// When false, a missing atomic procedure is an error instead of a
    /// switch to the non-atomic path.
    pub allow_fallback: bool,
    /// Extra attempts on the primary path after a transient store error.
    pub max_transient_retries: u32,
}

impl Default for DistributionPolicy {
    fn default() -> Self {
        Self {
            allow_fallback: true,
            max_transient_retries: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletConfig {
    pub recent_entries_limit: usize,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            recent_entries_limit: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub busy_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            busy_timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct NetworkConfigFile {
    schedule: CommissionSchedule,
    #[serde(default)]
    distribution: DistributionPolicy,
    #[serde(default)]
    wallet: WalletConfig,
    #[serde(default)]
    store: StoreConfig,
}

#[derive(Debug, Clone, Default)]
pub struct NetworkConfig {
    pub schedule: CommissionSchedule,
    pub distribution: DistributionPolicy,
    pub wallet: WalletConfig,
    pub store: StoreConfig,
}

impl NetworkConfig {
    /// Load from the data/ directory.
    /// In tests, use NetworkConfig::default_test().
    pub fn load(data_dir: &str) -> anyhow::Result<Self> {
        let path = format!("{data_dir}/commission/commission_config.json");
        let content = std::fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        Self::from_json(&content).map_err(|e| anyhow::anyhow!("Invalid {path}: {e}"))
    }

    pub fn from_json(content: &str) -> anyhow::Result<Self> {
        let file: NetworkConfigFile = serde_json::from_str(content)?;
        file.schedule.validate()?;
        Ok(Self {
            schedule: file.schedule,
            distribution: file.distribution,
            wallet: file.wallet,
            store: file.store,
        })
    }

    /// Config with hardcoded defaults for use in tests.
    pub fn default_test() -> Self {
        Self {
            schedule: CommissionSchedule::standard(),
            distribution: DistributionPolicy::default(),
            wallet: WalletConfig::default(),
            store: StoreConfig::default(),
        }
    }
}
