use crate::error::{LedgerError, LedgerResult};
use crate::models::{PaymentDirection, PaymentMethod, PaymentRecord, PaymentStatus, PaymentTransaction};
use chrono::Utc;
use fee_engine::{round_money, ContractModel, FeeBreakdown};
use rust_decimal::Decimal;
use tracing::debug;
use uuid::Uuid;

impl PaymentRecord {
    /// Creates a fresh record in `pending` with nothing paid.
    #[must_use]
    pub fn new(procedure_id: Uuid, direction: PaymentDirection, total_amount: Decimal) -> Self {
        let now = Utc::now();
        let total_amount = round_money(total_amount);
        Self {
            id: Uuid::new_v4(),
            procedure_id,
            direction,
            total_amount,
            amount_paid: Decimal::ZERO,
            amount_remaining: total_amount,
            status: PaymentStatus::Pending,
            transactions: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Re-derives `status` and `amount_remaining` from the paid/total ratio
    /// and rounds every monetary field.
    ///
    /// Never raises: normalization is a pure transform of already-valid
    /// state. Validation happens at the transaction-recording boundary. A
    /// cancelled record stays cancelled regardless of the ratio.
    fn normalize(&mut self) {
        self.total_amount = round_money(self.total_amount);
        self.amount_paid = round_money(self.amount_paid);

        if self.status == PaymentStatus::Cancelled {
            self.amount_remaining = round_money(self.amount_remaining);
            return;
        }

        if self.amount_paid > Decimal::ZERO && self.amount_paid >= self.total_amount {
            // Paid can exceed total only after an administrative total
            // reduction; clamp it, the transaction list keeps the full audit.
            self.amount_paid = self.total_amount;
            self.amount_remaining = Decimal::ZERO;
            self.status = PaymentStatus::Complete;
        } else if self.amount_paid > Decimal::ZERO {
            self.amount_remaining = self.total_amount - self.amount_paid;
            self.status = PaymentStatus::Partial;
        } else {
            self.amount_paid = Decimal::ZERO;
            self.amount_remaining = self.total_amount;
            self.status = PaymentStatus::Pending;
        }

        self.updated_at = Utc::now();
    }

    /// Appends an immutable settlement transaction and re-derives the
    /// record's state.
    ///
    /// The timestamp is server-assigned here, never caller-supplied.
    ///
    /// # Errors
    ///
    /// Refuses, leaving the record unchanged:
    /// - a non-positive amount
    /// - an amount exceeding `amount_remaining`
    /// - any transaction against a cancelled record
    pub fn record_transaction(
        &mut self,
        amount: Decimal,
        method: PaymentMethod,
        reference: Option<String>,
        notes: Option<String>,
        recorded_by: Uuid,
    ) -> LedgerResult<PaymentTransaction> {
        if self.status == PaymentStatus::Cancelled {
            return Err(LedgerError::RecordCancelled);
        }
        let amount = round_money(amount);
        if amount <= Decimal::ZERO {
            return Err(LedgerError::NonPositiveAmount(amount));
        }
        if amount > self.amount_remaining {
            return Err(LedgerError::ExceedsRemaining {
                amount,
                remaining: self.amount_remaining,
            });
        }

        let transaction = PaymentTransaction {
            id: Uuid::new_v4(),
            amount,
            method,
            reference,
            notes,
            recorded_by,
            recorded_at: Utc::now(),
        };
        self.transactions.push(transaction.clone());
        self.amount_paid += amount;
        self.normalize();

        Ok(transaction)
    }

    /// Applies a recalculated total, leaving `amount_paid` and the
    /// transaction history untouched.
    ///
    /// `amount_remaining` moves by the delta between new and old total,
    /// clamped at zero; the status follows, including a downgrade from
    /// `complete` back to `partial` when the total grows after payments.
    pub fn apply_total(&mut self, new_total: Decimal) {
        self.total_amount = new_total;
        self.normalize();
    }

    /// Administrative cancellation; terminal and never re-entered
    /// automatically.
    ///
    /// # Errors
    ///
    /// Returns an error if the record is already cancelled.
    pub fn cancel(&mut self) -> LedgerResult<()> {
        if self.status == PaymentStatus::Cancelled {
            return Err(LedgerError::AlreadyCancelled);
        }
        self.status = PaymentStatus::Cancelled;
        self.updated_at = Utc::now();
        Ok(())
    }
}

/// Outcome of synchronizing a payment record with recalculated amounts.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    /// A first positive amount: create this record.
    Created(PaymentRecord),
    /// Existing record with an adjusted total: persist this state.
    Updated(PaymentRecord),
    /// The amount dropped to zero before any money moved: delete the record.
    Removed(Uuid),
    /// No positive amount and no existing record: nothing to track.
    NotRequired,
}

/// Synchronizes payment records with the fee calculator's output.
pub struct PaymentLedger;

impl PaymentLedger {
    /// Direction and settled amount for a contract model.
    ///
    /// Time allocation invoices the facility amount; revenue share pays out
    /// the practitioner amount.
    #[must_use]
    pub fn settlement_terms(contract: &ContractModel, fees: &FeeBreakdown) -> (PaymentDirection, Decimal) {
        match contract {
            ContractModel::TimeAllocation { .. } => {
                (PaymentDirection::FacilityReceives, fees.facility_amount)
            }
            ContractModel::RevenueShare { .. } => {
                (PaymentDirection::FacilityPays, fees.practitioner_amount)
            }
        }
    }

    /// The createOrUpdate step run after every fee recalculation.
    ///
    /// Recalculation only ever mutates `total_amount`; `amount_paid` and the
    /// transaction history are never touched here. A record whose total
    /// drops to zero is removed only while nothing has been paid: once
    /// money has moved the record is kept so its history is never orphaned.
    /// Cancelled records are left exactly as they are.
    #[must_use]
    pub fn sync(
        existing: Option<PaymentRecord>,
        procedure_id: Uuid,
        contract: &ContractModel,
        fees: &FeeBreakdown,
    ) -> SyncOutcome {
        let (direction, total) = Self::settlement_terms(contract, fees);
        let total = round_money(total);

        match existing {
            None => {
                if total <= Decimal::ZERO {
                    return SyncOutcome::NotRequired;
                }
                let record = PaymentRecord::new(procedure_id, direction, total);
                debug!(%procedure_id, %total, ?direction, "payment record created");
                SyncOutcome::Created(record)
            }
            Some(record) if record.status == PaymentStatus::Cancelled => {
                // A cancelled record is frozen; recalculated totals no longer
                // apply to it.
                debug!(%procedure_id, "payment record is cancelled, skipping sync");
                SyncOutcome::NotRequired
            }
            Some(mut record) => {
                if total <= Decimal::ZERO && record.amount_paid.is_zero() {
                    debug!(%procedure_id, "amount dropped to zero before settlement, removing record");
                    return SyncOutcome::Removed(record.id);
                }
                record.apply_total(total.max(Decimal::ZERO));
                debug!(%procedure_id, %total, status = ?record.status, "payment record total updated");
                SyncOutcome::Updated(record)
            }
        }
    }
}
