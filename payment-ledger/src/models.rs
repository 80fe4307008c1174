use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which way money moves for a procedure's settlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentDirection {
    /// Time-allocation contracts: the facility invoices its amount.
    FacilityReceives,
    /// Revenue-share contracts: the facility pays out the practitioner share.
    FacilityPays,
}

/// Settlement status, derived from the paid/total ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Partial,
    Complete,
    /// Administrative terminal state, independent of the paid/total ratio.
    Cancelled,
}

/// How a settlement transaction was paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    CreditCard,
    DebitCard,
    BankTransfer,
    Check,
    Other,
}

/// One immutable entry in a payment record's transaction list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentTransaction {
    pub id: Uuid,
    pub amount: Decimal,
    pub method: PaymentMethod,
    pub reference: Option<String>,
    pub notes: Option<String>,
    pub recorded_by: Uuid,
    /// Server-assigned at append time, never caller-supplied.
    pub recorded_at: DateTime<Utc>,
}

/// Settlement tracker, one per procedure.
///
/// Invariants, maintained by normalization on every write:
/// - `amount_paid + amount_remaining == total_amount` to the cent
/// - `amount_paid == sum(transactions[].amount)` (absent administrative
///   total reductions, which clamp per the status rules)
/// - `transactions` is append-only
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub id: Uuid,
    pub procedure_id: Uuid,
    pub direction: PaymentDirection,
    pub total_amount: Decimal,
    pub amount_paid: Decimal,
    pub amount_remaining: Decimal,
    pub status: PaymentStatus,
    pub transactions: Vec<PaymentTransaction>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
