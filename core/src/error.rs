use crate::types::{Amount, CustomerId, PromoterId};
use rusqlite::ErrorCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CommissionError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Promoter '{promoter_id}' not found")]
    PromoterNotFound { promoter_id: PromoterId },

    #[error("Promoter '{promoter_id}' has {available} pins, {required} required")]
    QuotaExhausted {
        promoter_id: PromoterId,
        available: i64,
        required: i64,
    },

    #[error("Stored procedure '{name}' not found")]
    ProcedureNotFound { name: String },

    #[error("Transient store error: {0}")]
    TransientStore(String),

    #[error(
        "Partial distribution for customer '{customer_id}': {written} of {planned} entries \
         written ({credited} credited); manual reconciliation required: {cause}"
    )]
    PartialDistribution {
        customer_id: CustomerId,
        written: usize,
        planned: usize,
        credited: Amount,
        cause: String,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CommissionError {
    /// Busy/locked database or an explicit transient failure. The outcome of
    /// the failed call is unknown; callers may retry through the idempotency
    /// guard but must not assume nothing was written.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::TransientStore(_) => true,
            Self::Database(rusqlite::Error::SqliteFailure(e, _)) => matches!(
                e.code,
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }

    /// The "not found" class that sends the orchestrator down the fallback path.
    pub fn is_procedure_missing(&self) -> bool {
        matches!(self, Self::ProcedureNotFound { .. })
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

pub type CommissionResult<T> = Result<T, CommissionError>;
