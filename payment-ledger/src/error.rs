use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LedgerError {
    #[error("Payment amount must be positive, got {0}")]
    NonPositiveAmount(Decimal),

    #[error("Payment of {amount} exceeds the remaining balance of {remaining}")]
    ExceedsRemaining { amount: Decimal, remaining: Decimal },

    #[error("Payment record is cancelled and no longer accepts transactions")]
    RecordCancelled,

    #[error("Payment record is already cancelled")]
    AlreadyCancelled,
}

pub type LedgerResult<T> = Result<T, LedgerError>;
