use crate::error::SettlementResult;
use crate::models::{CatalogEntry, Material, Practitioner, Procedure};
use async_trait::async_trait;
use fee_engine::{ClassificationFeeSchedule, MaterialConsumption};
use payment_ledger::PaymentRecord;
use rust_decimal::Decimal;
use uuid::Uuid;

/// Procedure reader/writer owned by the entity CRUD layer.
///
/// Writes carry the version read beforehand; a store must reject stale
/// writes with `SettlementError::VersionConflict`.
#[async_trait]
pub trait ProcedureStore: Send + Sync {
    async fn get(&self, id: Uuid) -> SettlementResult<Option<Procedure>>;

    /// Persists the recalculated amount split and bumps the version.
    async fn persist_amounts(
        &self,
        id: Uuid,
        expected_version: u64,
        practitioner_amount: Decimal,
        facility_amount: Decimal,
    ) -> SettlementResult<()>;

    /// Appends a consumption entry with an already-frozen unit price.
    async fn append_material(
        &self,
        id: Uuid,
        expected_version: u64,
        entry: MaterialConsumption,
    ) -> SettlementResult<()>;
}

#[async_trait]
pub trait CatalogReader: Send + Sync {
    async fn get(&self, id: Uuid) -> SettlementResult<Option<CatalogEntry>>;
}

#[async_trait]
pub trait PractitionerReader: Send + Sync {
    async fn get(&self, id: Uuid) -> SettlementResult<Option<Practitioner>>;
}

#[async_trait]
pub trait ClassificationScheduleReader: Send + Sync {
    /// The currently active fee schedule; an empty schedule is valid and
    /// resolves through the built-in defaults.
    async fn active_schedule(&self) -> SettlementResult<ClassificationFeeSchedule>;
}

#[async_trait]
pub trait MaterialReader: Send + Sync {
    async fn get(&self, id: Uuid) -> SettlementResult<Option<Material>>;
}

/// Payment record store; one record per procedure, enforced by the service.
#[async_trait]
pub trait PaymentRecordStore: Send + Sync {
    async fn get(&self, id: Uuid) -> SettlementResult<Option<PaymentRecord>>;

    async fn find_by_procedure(&self, procedure_id: Uuid) -> SettlementResult<Option<PaymentRecord>>;

    async fn upsert(&self, record: PaymentRecord) -> SettlementResult<()>;

    async fn remove(&self, id: Uuid) -> SettlementResult<()>;
}
