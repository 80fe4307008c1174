use fee_engine::FeeError;
use payment_ledger::LedgerError;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SettlementError {
    #[error("Procedure {0} not found")]
    ProcedureNotFound(Uuid),

    #[error("Payment record {0} not found")]
    PaymentRecordNotFound(Uuid),

    #[error("Material {0} not found")]
    MaterialNotFound(Uuid),

    /// Data error: the procedure cannot be priced yet. Nothing is written.
    #[error("Procedure {procedure_id} is missing required {field}")]
    MissingPrerequisite { procedure_id: Uuid, field: &'static str },

    /// Policy error, distinct from data errors: the procedure's financials
    /// are frozen and the actor holds no override privilege.
    #[error("Procedure {0} is closed; recalculation requires override privilege")]
    ProcedureClosed(Uuid),

    #[error("Actor lacks privilege to {0}")]
    NotAuthorized(&'static str),

    #[error("Stale write on procedure {procedure_id}: expected version {expected}, found {found}")]
    VersionConflict {
        procedure_id: Uuid,
        expected: u64,
        found: u64,
    },

    #[error(transparent)]
    Fee(#[from] FeeError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("Storage error: {0}")]
    Storage(String),
}

pub type SettlementResult<T> = Result<T, SettlementError>;
