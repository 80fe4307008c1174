use crate::collaborators::{
    CatalogReader, ClassificationScheduleReader, MaterialReader, PaymentRecordStore,
    PractitionerReader, ProcedureStore,
};
use crate::error::{SettlementError, SettlementResult};
use crate::models::{build_snapshot, Actor, Procedure, ProcedureStatus};
use dashmap::DashMap;
use fee_engine::{
    round_money, weighted_average_unit_price, ClassificationFeeResolver, ContractModel,
    FeeBreakdown, FeeCalculator, MaterialCategory, MaterialConsumption, MaterialCostAggregator,
};
use payment_ledger::{PaymentLedger, PaymentMethod, PaymentRecord, SyncOutcome};
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

/// Orchestrates fee recalculation and payment settlement over the
/// collaborator stores.
///
/// All mutating work on a procedure (recalculation, material adds, payment
/// recording) is serialized through a per-procedure lock so a recalculation
/// never reads state mid-edit and concurrent settlement transactions cannot
/// lose updates.
pub struct SettlementService {
    procedures: Arc<dyn ProcedureStore>,
    catalog: Arc<dyn CatalogReader>,
    practitioners: Arc<dyn PractitionerReader>,
    schedules: Arc<dyn ClassificationScheduleReader>,
    materials: Arc<dyn MaterialReader>,
    payments: Arc<dyn PaymentRecordStore>,
    locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl SettlementService {
    pub fn new(
        procedures: Arc<dyn ProcedureStore>,
        catalog: Arc<dyn CatalogReader>,
        practitioners: Arc<dyn PractitionerReader>,
        schedules: Arc<dyn ClassificationScheduleReader>,
        materials: Arc<dyn MaterialReader>,
        payments: Arc<dyn PaymentRecordStore>,
    ) -> Self {
        Self {
            procedures,
            catalog,
            practitioners,
            schedules,
            materials,
            payments,
            locks: DashMap::new(),
        }
    }

    fn procedure_lock(&self, procedure_id: Uuid) -> Arc<Mutex<()>> {
        self.locks
            .entry(procedure_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drops a procedure's lock entry once no task holds a handle to it.
    ///
    /// `remove_if` runs the predicate under the shard lock, so a concurrent
    /// `procedure_lock` either clones the `Arc` first (count > 1, entry
    /// stays) or re-creates the entry after removal.
    fn release_procedure_lock(&self, procedure_id: Uuid) {
        self.locks
            .remove_if(&procedure_id, |_, lock| Arc::strong_count(lock) == 1);
    }

    /// Number of procedure locks currently retained, for diagnostics.
    #[must_use]
    pub fn tracked_procedure_locks(&self) -> usize {
        self.locks.len()
    }

    /// Re-derives and persists a procedure's amount split, then synchronizes
    /// its payment record.
    ///
    /// # Errors
    ///
    /// Fails fast without writing anything when the procedure is unknown,
    /// closed (and the actor holds no override), or missing its practitioner
    /// or catalog reference.
    pub async fn recalculate_fees(
        &self,
        procedure_id: Uuid,
        actor: &Actor,
    ) -> SettlementResult<FeeBreakdown> {
        let lock = self.procedure_lock(procedure_id);
        let result = {
            let _guard = lock.lock().await;
            self.recalculate_locked(procedure_id, actor).await
        };
        drop(lock);
        self.release_procedure_lock(procedure_id);
        result
    }

    async fn recalculate_locked(
        &self,
        procedure_id: Uuid,
        actor: &Actor,
    ) -> SettlementResult<FeeBreakdown> {
        let procedure = self
            .procedures
            .get(procedure_id)
            .await?
            .ok_or(SettlementError::ProcedureNotFound(procedure_id))?;

        Self::check_lifecycle(&procedure, actor)?;

        let practitioner_id = procedure.practitioner_id.ok_or(
            SettlementError::MissingPrerequisite { procedure_id, field: "practitioner" },
        )?;
        let catalog_entry_id = procedure.catalog_entry_id.ok_or(
            SettlementError::MissingPrerequisite { procedure_id, field: "catalog entry" },
        )?;

        let practitioner = self
            .practitioners
            .get(practitioner_id)
            .await?
            .ok_or(SettlementError::MissingPrerequisite { procedure_id, field: "practitioner" })?;
        let catalog_entry = self
            .catalog
            .get(catalog_entry_id)
            .await?
            .ok_or(SettlementError::MissingPrerequisite { procedure_id, field: "catalog entry" })?;

        let snapshot = build_snapshot(&procedure, &catalog_entry, &practitioner);

        let material_costs = MaterialCostAggregator::aggregate(&snapshot.materials)?;
        let schedule = self.schedules.active_schedule().await?;
        let classification_fee = ClassificationFeeResolver::new(schedule)
            .resolve_for_contract(&snapshot.contract, snapshot.classification);

        let fees = FeeCalculator::calculate(&snapshot, &material_costs, classification_fee)?;

        self.procedures
            .persist_amounts(
                procedure_id,
                procedure.version,
                fees.practitioner_amount,
                fees.facility_amount,
            )
            .await?;

        self.sync_payment_record(&procedure, &snapshot.contract, &fees).await?;

        info!(
            %procedure_id,
            practitioner_amount = %fees.practitioner_amount,
            facility_amount = %fees.facility_amount,
            "fees recalculated"
        );

        Ok(fees)
    }

    async fn sync_payment_record(
        &self,
        procedure: &Procedure,
        contract: &ContractModel,
        fees: &FeeBreakdown,
    ) -> SettlementResult<()> {
        let existing = self.payments.find_by_procedure(procedure.id).await?;
        match PaymentLedger::sync(existing, procedure.id, contract, fees) {
            SyncOutcome::Created(record) | SyncOutcome::Updated(record) => {
                self.payments.upsert(record).await
            }
            SyncOutcome::Removed(record_id) => self.payments.remove(record_id).await,
            SyncOutcome::NotRequired => Ok(()),
        }
    }

    /// Records a settlement transaction against a payment record.
    ///
    /// Validation (positive amount, within the remaining balance, record not
    /// cancelled) lives in the ledger itself; this method serializes the
    /// write and persists the normalized record atomically.
    ///
    /// # Errors
    ///
    /// Propagates `LedgerError` refusals and fails when the record is
    /// unknown.
    pub async fn record_payment(
        &self,
        payment_record_id: Uuid,
        amount: Decimal,
        method: PaymentMethod,
        reference: Option<String>,
        notes: Option<String>,
        actor: &Actor,
    ) -> SettlementResult<PaymentRecord> {
        let located = self
            .payments
            .get(payment_record_id)
            .await?
            .ok_or(SettlementError::PaymentRecordNotFound(payment_record_id))?;
        let procedure_id = located.procedure_id;

        let lock = self.procedure_lock(procedure_id);
        let result = {
            let _guard = lock.lock().await;
            self.record_payment_locked(payment_record_id, amount, method, reference, notes, actor)
                .await
        };
        drop(lock);
        self.release_procedure_lock(procedure_id);
        result
    }

    async fn record_payment_locked(
        &self,
        payment_record_id: Uuid,
        amount: Decimal,
        method: PaymentMethod,
        reference: Option<String>,
        notes: Option<String>,
        actor: &Actor,
    ) -> SettlementResult<PaymentRecord> {
        // Reload under the lock so two concurrent settlements serialize
        // against the same state.
        let mut record = self
            .payments
            .get(payment_record_id)
            .await?
            .ok_or(SettlementError::PaymentRecordNotFound(payment_record_id))?;

        let transaction =
            record.record_transaction(amount, method, reference, notes, actor.id)?;
        self.payments.upsert(record.clone()).await?;

        info!(
            payment_record_id = %record.id,
            procedure_id = %record.procedure_id,
            amount = %transaction.amount,
            status = ?record.status,
            "settlement transaction recorded"
        );

        Ok(record)
    }

    /// Adds a consumed material to a procedure, freezing its unit price, and
    /// recalculates the fees.
    ///
    /// Consumables freeze the purchasing weighted-average over lots (catalog
    /// base price when no lots exist); patient-billable materials freeze the
    /// selling price. The frozen price is never recomputed afterwards.
    ///
    /// # Errors
    ///
    /// Fails when the procedure or material is unknown, the procedure is
    /// closed without an override, or the subsequent recalculation fails.
    pub async fn add_material_consumption(
        &self,
        procedure_id: Uuid,
        material_id: Uuid,
        quantity: Decimal,
        actor: &Actor,
    ) -> SettlementResult<FeeBreakdown> {
        let lock = self.procedure_lock(procedure_id);
        let result = {
            let _guard = lock.lock().await;
            self.add_material_locked(procedure_id, material_id, quantity, actor).await
        };
        drop(lock);
        self.release_procedure_lock(procedure_id);
        result
    }

    async fn add_material_locked(
        &self,
        procedure_id: Uuid,
        material_id: Uuid,
        quantity: Decimal,
        actor: &Actor,
    ) -> SettlementResult<FeeBreakdown> {
        let procedure = self
            .procedures
            .get(procedure_id)
            .await?
            .ok_or(SettlementError::ProcedureNotFound(procedure_id))?;

        Self::check_lifecycle(&procedure, actor)?;

        let material = self
            .materials
            .get(material_id)
            .await?
            .ok_or(SettlementError::MaterialNotFound(material_id))?;

        let unit_price = match material.category {
            MaterialCategory::Consumable => {
                weighted_average_unit_price(&material.lots, material.base_price)?
            }
            MaterialCategory::PatientBillable => round_money(material.selling_price),
        };

        let entry = MaterialConsumption {
            material_id,
            category: material.category,
            quantity,
            unit_price,
        };
        self.procedures
            .append_material(procedure_id, procedure.version, entry)
            .await?;

        info!(
            %procedure_id,
            %material_id,
            %quantity,
            %unit_price,
            "material consumption recorded with frozen price"
        );

        self.recalculate_locked(procedure_id, actor).await
    }

    /// Administrative cancellation of a payment record.
    ///
    /// # Errors
    ///
    /// Requires an administrator; fails on unknown or already-cancelled
    /// records.
    pub async fn cancel_payment_record(
        &self,
        payment_record_id: Uuid,
        actor: &Actor,
    ) -> SettlementResult<PaymentRecord> {
        if !actor.is_administrator {
            return Err(SettlementError::NotAuthorized("cancel a payment record"));
        }

        let located = self
            .payments
            .get(payment_record_id)
            .await?
            .ok_or(SettlementError::PaymentRecordNotFound(payment_record_id))?;
        let procedure_id = located.procedure_id;

        let lock = self.procedure_lock(procedure_id);
        let result = {
            let _guard = lock.lock().await;
            self.cancel_payment_record_locked(payment_record_id, actor).await
        };
        drop(lock);
        self.release_procedure_lock(procedure_id);
        result
    }

    async fn cancel_payment_record_locked(
        &self,
        payment_record_id: Uuid,
        actor: &Actor,
    ) -> SettlementResult<PaymentRecord> {
        let mut record = self
            .payments
            .get(payment_record_id)
            .await?
            .ok_or(SettlementError::PaymentRecordNotFound(payment_record_id))?;
        record.cancel()?;
        self.payments.upsert(record.clone()).await?;

        warn!(
            payment_record_id = %record.id,
            procedure_id = %record.procedure_id,
            actor = %actor.id,
            "payment record cancelled"
        );

        Ok(record)
    }

    fn check_lifecycle(procedure: &Procedure, actor: &Actor) -> SettlementResult<()> {
        if procedure.status == ProcedureStatus::Closed && !actor.can_override_closed {
            return Err(SettlementError::ProcedureClosed(procedure.id));
        }
        Ok(())
    }
}
