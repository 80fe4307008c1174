//! End-to-end settlement flows over in-memory collaborator stores.

use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use fee_engine::{
    ClassificationFeeSchedule, ContractModel, MaterialCategory, MaterialConsumption, MaterialLot,
    RiskClassification,
};
use payment_ledger::{LedgerError, PaymentDirection, PaymentMethod, PaymentRecord, PaymentStatus};
use rust_decimal::Decimal;
use settlement_service::{
    Actor, CatalogEntry, CatalogReader, ClassificationScheduleReader, Material, MaterialReader,
    PaymentRecordStore, Practitioner, PractitionerReader, Procedure, ProcedureStatus,
    ProcedureStore, SettlementError, SettlementResult, SettlementService,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

#[derive(Default)]
struct ProcedureRepo(Mutex<HashMap<Uuid, Procedure>>);

impl ProcedureRepo {
    fn insert(&self, procedure: Procedure) {
        self.0.lock().unwrap().insert(procedure.id, procedure);
    }

    fn snapshot(&self, id: Uuid) -> Procedure {
        self.0.lock().unwrap().get(&id).cloned().unwrap()
    }

    fn mutate(&self, id: Uuid, f: impl FnOnce(&mut Procedure)) {
        let mut map = self.0.lock().unwrap();
        f(map.get_mut(&id).unwrap());
    }
}

#[async_trait]
impl ProcedureStore for ProcedureRepo {
    async fn get(&self, id: Uuid) -> SettlementResult<Option<Procedure>> {
        Ok(self.0.lock().unwrap().get(&id).cloned())
    }

    async fn persist_amounts(
        &self,
        id: Uuid,
        expected_version: u64,
        practitioner_amount: Decimal,
        facility_amount: Decimal,
    ) -> SettlementResult<()> {
        let mut map = self.0.lock().unwrap();
        let procedure = map.get_mut(&id).ok_or(SettlementError::ProcedureNotFound(id))?;
        if procedure.version != expected_version {
            return Err(SettlementError::VersionConflict {
                procedure_id: id,
                expected: expected_version,
                found: procedure.version,
            });
        }
        procedure.practitioner_amount = practitioner_amount;
        procedure.facility_amount = facility_amount;
        procedure.version += 1;
        Ok(())
    }

    async fn append_material(
        &self,
        id: Uuid,
        expected_version: u64,
        entry: MaterialConsumption,
    ) -> SettlementResult<()> {
        let mut map = self.0.lock().unwrap();
        let procedure = map.get_mut(&id).ok_or(SettlementError::ProcedureNotFound(id))?;
        if procedure.version != expected_version {
            return Err(SettlementError::VersionConflict {
                procedure_id: id,
                expected: expected_version,
                found: procedure.version,
            });
        }
        procedure.materials.push(entry);
        procedure.version += 1;
        Ok(())
    }
}

#[derive(Default)]
struct CatalogRepo(Mutex<HashMap<Uuid, CatalogEntry>>);

#[async_trait]
impl CatalogReader for CatalogRepo {
    async fn get(&self, id: Uuid) -> SettlementResult<Option<CatalogEntry>> {
        Ok(self.0.lock().unwrap().get(&id).cloned())
    }
}

#[derive(Default)]
struct PractitionerRepo(Mutex<HashMap<Uuid, Practitioner>>);

#[async_trait]
impl PractitionerReader for PractitionerRepo {
    async fn get(&self, id: Uuid) -> SettlementResult<Option<Practitioner>> {
        Ok(self.0.lock().unwrap().get(&id).cloned())
    }
}

#[derive(Default)]
struct ScheduleRepo(Mutex<ClassificationFeeSchedule>);

#[async_trait]
impl ClassificationScheduleReader for ScheduleRepo {
    async fn active_schedule(&self) -> SettlementResult<ClassificationFeeSchedule> {
        Ok(self.0.lock().unwrap().clone())
    }
}

#[derive(Default)]
struct MaterialRepo(Mutex<HashMap<Uuid, Material>>);

impl MaterialRepo {
    fn insert(&self, material: Material) {
        self.0.lock().unwrap().insert(material.id, material);
    }

    fn mutate(&self, id: Uuid, f: impl FnOnce(&mut Material)) {
        let mut map = self.0.lock().unwrap();
        f(map.get_mut(&id).unwrap());
    }
}

#[async_trait]
impl MaterialReader for MaterialRepo {
    async fn get(&self, id: Uuid) -> SettlementResult<Option<Material>> {
        Ok(self.0.lock().unwrap().get(&id).cloned())
    }
}

#[derive(Default)]
struct PaymentRepo(Mutex<HashMap<Uuid, PaymentRecord>>);

impl PaymentRepo {
    fn by_procedure(&self, procedure_id: Uuid) -> Option<PaymentRecord> {
        self.0
            .lock()
            .unwrap()
            .values()
            .find(|record| record.procedure_id == procedure_id)
            .cloned()
    }

    fn len(&self) -> usize {
        self.0.lock().unwrap().len()
    }
}

#[async_trait]
impl PaymentRecordStore for PaymentRepo {
    async fn get(&self, id: Uuid) -> SettlementResult<Option<PaymentRecord>> {
        Ok(self.0.lock().unwrap().get(&id).cloned())
    }

    async fn find_by_procedure(&self, procedure_id: Uuid) -> SettlementResult<Option<PaymentRecord>> {
        Ok(self.by_procedure(procedure_id))
    }

    async fn upsert(&self, record: PaymentRecord) -> SettlementResult<()> {
        self.0.lock().unwrap().insert(record.id, record);
        Ok(())
    }

    async fn remove(&self, id: Uuid) -> SettlementResult<()> {
        self.0.lock().unwrap().remove(&id);
        Ok(())
    }
}

struct TestEnv {
    service: SettlementService,
    procedures: Arc<ProcedureRepo>,
    materials: Arc<MaterialRepo>,
    payments: Arc<PaymentRepo>,
    procedure_id: Uuid,
}

fn standard_catalog_entry() -> CatalogEntry {
    CatalogEntry {
        id: Uuid::new_v4(),
        name: "arthroscopic knee repair".to_string(),
        base_price: Decimal::from(100_000),
        standard_duration_minutes: 60,
        overtime_threshold_minutes: 60,
        overtime_unit_minutes: 15,
        overtime_fee_per_unit: Decimal::from(500),
        overtime_tolerance_minutes: 15,
        urgency_surcharge_percent: Decimal::from(10),
    }
}

fn setup(contract: ContractModel, duration_minutes: i64, urgent: bool) -> TestEnv {
    let procedures = Arc::new(ProcedureRepo::default());
    let catalog = Arc::new(CatalogRepo::default());
    let practitioners = Arc::new(PractitionerRepo::default());
    let schedules = Arc::new(ScheduleRepo::default());
    let materials = Arc::new(MaterialRepo::default());
    let payments = Arc::new(PaymentRepo::default());

    let catalog_entry = standard_catalog_entry();
    let practitioner = Practitioner {
        id: Uuid::new_v4(),
        name: "Dr. Chae".to_string(),
        contract,
    };

    let start = Utc.with_ymd_and_hms(2026, 3, 10, 9, 0, 0).unwrap();
    let procedure = Procedure {
        id: Uuid::new_v4(),
        code: "OP-2026-0412".to_string(),
        practitioner_id: Some(practitioner.id),
        catalog_entry_id: Some(catalog_entry.id),
        scheduled_start: start,
        scheduled_end: start + Duration::minutes(duration_minutes),
        actual_start: Some(start),
        actual_end: Some(start + Duration::minutes(duration_minutes)),
        urgent,
        catalog_price: catalog_entry.base_price,
        classification: None,
        urgent_classification: false,
        apply_overtime_fee: false,
        materials: Vec::new(),
        personnel: Vec::new(),
        practitioner_amount: Decimal::ZERO,
        facility_amount: Decimal::ZERO,
        status: ProcedureStatus::Editable,
        version: 0,
    };
    let procedure_id = procedure.id;

    catalog.0.lock().unwrap().insert(catalog_entry.id, catalog_entry);
    practitioners.0.lock().unwrap().insert(practitioner.id, practitioner);
    procedures.insert(procedure);

    let service = SettlementService::new(
        procedures.clone(),
        catalog.clone(),
        practitioners.clone(),
        schedules,
        materials.clone(),
        payments.clone(),
    );

    TestEnv { service, procedures, materials, payments, procedure_id }
}

fn allocation(hourly_rate: i64) -> ContractModel {
    ContractModel::TimeAllocation { hourly_rate: Decimal::from(hourly_rate) }
}

fn revenue_share(share_percent: i64) -> ContractModel {
    ContractModel::RevenueShare { share_percent: Decimal::from(share_percent) }
}

#[tokio::test]
async fn test_allocation_recalculation_creates_facility_invoice() {
    let env = setup(allocation(40_000), 90, false);
    let actor = Actor::staff(Uuid::new_v4());

    let fees = env.service.recalculate_fees(env.procedure_id, &actor).await.unwrap();
    assert_eq!(fees.facility_amount, Decimal::from(60_000));
    assert_eq!(fees.practitioner_amount, Decimal::ZERO);

    let procedure = env.procedures.snapshot(env.procedure_id);
    assert_eq!(procedure.facility_amount, Decimal::from(60_000));
    assert_eq!(procedure.version, 1);

    let record = env.payments.by_procedure(env.procedure_id).unwrap();
    assert_eq!(record.direction, PaymentDirection::FacilityReceives);
    assert_eq!(record.total_amount, Decimal::from(60_000));
    assert_eq!(record.status, PaymentStatus::Pending);
}

#[tokio::test]
async fn test_revenue_share_recalculation_creates_practitioner_payout() {
    let env = setup(revenue_share(45), 60, true);
    let actor = Actor::staff(Uuid::new_v4());

    let fees = env.service.recalculate_fees(env.procedure_id, &actor).await.unwrap();
    assert_eq!(fees.net_billable, Decimal::from(110_000));
    assert_eq!(fees.practitioner_amount, Decimal::from(49_500));
    assert_eq!(fees.facility_amount, Decimal::from(60_500));

    let record = env.payments.by_procedure(env.procedure_id).unwrap();
    assert_eq!(record.direction, PaymentDirection::FacilityPays);
    assert_eq!(record.total_amount, Decimal::from(49_500));
}

#[tokio::test]
async fn test_recalculation_is_idempotent() {
    let env = setup(revenue_share(45), 60, true);
    let actor = Actor::staff(Uuid::new_v4());

    let first = env.service.recalculate_fees(env.procedure_id, &actor).await.unwrap();
    let record_before = env.payments.by_procedure(env.procedure_id).unwrap();

    let second = env.service.recalculate_fees(env.procedure_id, &actor).await.unwrap();
    let record_after = env.payments.by_procedure(env.procedure_id).unwrap();

    assert_eq!(first, second);
    assert_eq!(env.payments.len(), 1);
    assert_eq!(record_before.id, record_after.id);
    assert_eq!(record_after.amount_paid, Decimal::ZERO);
}

#[tokio::test]
async fn test_payments_settle_through_partial_to_complete() {
    let env = setup(allocation(40_000), 90, false);
    let actor = Actor::staff(Uuid::new_v4());
    env.service.recalculate_fees(env.procedure_id, &actor).await.unwrap();
    let record = env.payments.by_procedure(env.procedure_id).unwrap();

    let record = env
        .service
        .record_payment(
            record.id,
            Decimal::from(20_000),
            PaymentMethod::BankTransfer,
            Some("INV-7731".to_string()),
            None,
            &actor,
        )
        .await
        .unwrap();
    assert_eq!(record.status, PaymentStatus::Partial);
    assert_eq!(record.amount_remaining, Decimal::from(40_000));

    let record = env
        .service
        .record_payment(record.id, Decimal::from(40_000), PaymentMethod::Cash, None, None, &actor)
        .await
        .unwrap();
    assert_eq!(record.status, PaymentStatus::Complete);
    assert_eq!(record.amount_remaining, Decimal::ZERO);
    assert_eq!(record.amount_paid + record.amount_remaining, record.total_amount);
    assert_eq!(record.transactions.len(), 2);
}

#[tokio::test]
async fn test_overpayment_is_rejected_and_nothing_persisted() {
    let env = setup(allocation(40_000), 90, false);
    let actor = Actor::staff(Uuid::new_v4());
    env.service.recalculate_fees(env.procedure_id, &actor).await.unwrap();
    let record = env.payments.by_procedure(env.procedure_id).unwrap();

    let err = env
        .service
        .record_payment(record.id, Decimal::from(70_000), PaymentMethod::Cash, None, None, &actor)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        SettlementError::Ledger(LedgerError::ExceedsRemaining {
            amount: Decimal::from(70_000),
            remaining: Decimal::from(60_000),
        })
    );

    let stored = env.payments.by_procedure(env.procedure_id).unwrap();
    assert_eq!(stored.status, PaymentStatus::Pending);
    assert!(stored.transactions.is_empty());
}

#[tokio::test]
async fn test_closed_procedure_refuses_recalculation_without_override() {
    let env = setup(allocation(40_000), 90, false);
    env.procedures.mutate(env.procedure_id, |p| p.status = ProcedureStatus::Closed);

    let staff = Actor::staff(Uuid::new_v4());
    let err = env.service.recalculate_fees(env.procedure_id, &staff).await.unwrap_err();
    assert_eq!(err, SettlementError::ProcedureClosed(env.procedure_id));

    // the procedure is untouched
    let procedure = env.procedures.snapshot(env.procedure_id);
    assert_eq!(procedure.facility_amount, Decimal::ZERO);
    assert_eq!(procedure.version, 0);

    // an override-privileged actor may still recalculate
    let admin = Actor::administrator(Uuid::new_v4());
    let fees = env.service.recalculate_fees(env.procedure_id, &admin).await.unwrap();
    assert_eq!(fees.facility_amount, Decimal::from(60_000));
}

#[tokio::test]
async fn test_missing_practitioner_fails_fast() {
    let env = setup(allocation(40_000), 90, false);
    env.procedures.mutate(env.procedure_id, |p| p.practitioner_id = None);
    let actor = Actor::staff(Uuid::new_v4());

    let err = env.service.recalculate_fees(env.procedure_id, &actor).await.unwrap_err();
    assert_eq!(
        err,
        SettlementError::MissingPrerequisite {
            procedure_id: env.procedure_id,
            field: "practitioner",
        }
    );
    assert!(env.payments.by_procedure(env.procedure_id).is_none());
}

#[tokio::test]
async fn test_consumable_material_freezes_weighted_average_price() {
    let env = setup(allocation(40_000), 90, false);
    let actor = Actor::staff(Uuid::new_v4());

    let material = Material {
        id: Uuid::new_v4(),
        name: "suture kit".to_string(),
        category: MaterialCategory::Consumable,
        base_price: Decimal::from(999),
        selling_price: Decimal::from(2_000),
        lots: vec![
            MaterialLot { quantity: Decimal::from(10), unit_price: Decimal::from(100) },
            MaterialLot { quantity: Decimal::from(30), unit_price: Decimal::from(200) },
        ],
    };
    let material_id = material.id;
    env.materials.insert(material);

    let fees = env
        .service
        .add_material_consumption(env.procedure_id, material_id, Decimal::from(2), &actor)
        .await
        .unwrap();

    // weighted average (10*100 + 30*200)/40 = 175, two consumed
    assert_eq!(fees.material_cost, Decimal::from(350));
    assert_eq!(fees.facility_amount, Decimal::from(60_350));

    let procedure = env.procedures.snapshot(env.procedure_id);
    assert_eq!(procedure.materials[0].unit_price, Decimal::from(175));

    // later lot changes never touch the frozen price
    env.materials.mutate(material_id, |m| {
        m.lots = vec![MaterialLot { quantity: Decimal::from(5), unit_price: Decimal::from(9_000) }]
    });
    let fees = env.service.recalculate_fees(env.procedure_id, &actor).await.unwrap();
    assert_eq!(fees.material_cost, Decimal::from(350));
}

#[tokio::test]
async fn test_patient_billable_material_reduces_net_billable() {
    let env = setup(revenue_share(45), 60, false);
    let actor = Actor::staff(Uuid::new_v4());

    let implant = Material {
        id: Uuid::new_v4(),
        name: "fixation implant".to_string(),
        category: MaterialCategory::PatientBillable,
        base_price: Decimal::from(6_000),
        selling_price: Decimal::from(10_000),
        lots: Vec::new(),
    };
    let implant_id = implant.id;
    env.materials.insert(implant);

    let fees = env
        .service
        .add_material_consumption(env.procedure_id, implant_id, Decimal::ONE, &actor)
        .await
        .unwrap();

    // patient-billable items freeze the selling price
    let procedure = env.procedures.snapshot(env.procedure_id);
    assert_eq!(procedure.materials[0].unit_price, Decimal::from(10_000));

    // net 100,000 - 10,000 = 90,000; practitioner 45%; facility share plus
    // the pass-through patient materials
    assert_eq!(fees.net_billable, Decimal::from(90_000));
    assert_eq!(fees.practitioner_amount, Decimal::from(40_500));
    assert_eq!(fees.facility_amount, Decimal::from(59_500));
}

#[tokio::test]
async fn test_classification_fee_applies_to_allocation_contracts_only() {
    let env = setup(allocation(40_000), 90, false);
    env.procedures.mutate(env.procedure_id, |p| {
        p.classification = Some(RiskClassification::High);
    });
    let actor = Actor::staff(Uuid::new_v4());

    // empty schedule -> built-in default of 50,000 for High
    let fees = env.service.recalculate_fees(env.procedure_id, &actor).await.unwrap();
    assert_eq!(fees.classification_fee, Decimal::from(50_000));
    assert_eq!(fees.facility_amount, Decimal::from(110_000));

    let share_env = setup(revenue_share(45), 60, false);
    share_env.procedures.mutate(share_env.procedure_id, |p| {
        p.classification = Some(RiskClassification::High);
    });
    let fees = share_env
        .service
        .recalculate_fees(share_env.procedure_id, &actor)
        .await
        .unwrap();
    assert_eq!(fees.classification_fee, Decimal::ZERO);
    assert_eq!(fees.practitioner_amount, Decimal::from(45_000));
}

#[tokio::test]
async fn test_amount_dropping_to_zero_removes_unpaid_record() {
    let env = setup(revenue_share(45), 60, false);
    let actor = Actor::staff(Uuid::new_v4());

    env.service.recalculate_fees(env.procedure_id, &actor).await.unwrap();
    assert_eq!(env.payments.len(), 1);

    env.procedures.mutate(env.procedure_id, |p| p.catalog_price = Decimal::ZERO);
    env.service.recalculate_fees(env.procedure_id, &actor).await.unwrap();
    assert_eq!(env.payments.len(), 0);
}

#[tokio::test]
async fn test_recalculation_preserves_payments_when_total_changes() {
    let env = setup(revenue_share(45), 60, false);
    let actor = Actor::staff(Uuid::new_v4());

    env.service.recalculate_fees(env.procedure_id, &actor).await.unwrap();
    let record = env.payments.by_procedure(env.procedure_id).unwrap();
    env.service
        .record_payment(record.id, Decimal::from(20_000), PaymentMethod::Cash, None, None, &actor)
        .await
        .unwrap();

    // urgency flips on, total grows, history and paid amount survive
    env.procedures.mutate(env.procedure_id, |p| p.urgent = true);
    env.service.recalculate_fees(env.procedure_id, &actor).await.unwrap();

    let record = env.payments.by_procedure(env.procedure_id).unwrap();
    assert_eq!(record.total_amount, Decimal::from(49_500));
    assert_eq!(record.amount_paid, Decimal::from(20_000));
    assert_eq!(record.amount_remaining, Decimal::from(29_500));
    assert_eq!(record.status, PaymentStatus::Partial);
    assert_eq!(record.transactions.len(), 1);
}

#[tokio::test]
async fn test_procedure_locks_are_released_after_each_operation() {
    let env = setup(allocation(40_000), 90, false);
    let actor = Actor::staff(Uuid::new_v4());

    env.service.recalculate_fees(env.procedure_id, &actor).await.unwrap();
    assert_eq!(env.service.tracked_procedure_locks(), 0);

    let record = env.payments.by_procedure(env.procedure_id).unwrap();
    env.service
        .record_payment(record.id, Decimal::from(20_000), PaymentMethod::Cash, None, None, &actor)
        .await
        .unwrap();
    assert_eq!(env.service.tracked_procedure_locks(), 0);
}

#[tokio::test]
async fn test_recalculation_leaves_cancelled_record_unchanged() {
    let env = setup(revenue_share(45), 60, false);
    let staff = Actor::staff(Uuid::new_v4());

    env.service.recalculate_fees(env.procedure_id, &staff).await.unwrap();
    let record = env.payments.by_procedure(env.procedure_id).unwrap();
    env.service
        .record_payment(record.id, Decimal::from(20_000), PaymentMethod::Cash, None, None, &staff)
        .await
        .unwrap();

    let admin = Actor::administrator(Uuid::new_v4());
    env.service.cancel_payment_record(record.id, &admin).await.unwrap();

    // a later recalculation changes the fees but must not touch the
    // cancelled record
    env.procedures.mutate(env.procedure_id, |p| p.urgent = true);
    env.service.recalculate_fees(env.procedure_id, &staff).await.unwrap();

    let stored = env.payments.by_procedure(env.procedure_id).unwrap();
    assert_eq!(stored.status, PaymentStatus::Cancelled);
    assert_eq!(stored.total_amount, Decimal::from(45_000));
    assert_eq!(stored.amount_paid, Decimal::from(20_000));
    assert_eq!(stored.amount_paid + stored.amount_remaining, stored.total_amount);
    assert_eq!(stored.transactions.len(), 1);
}

#[tokio::test]
async fn test_cancellation_requires_administrator_and_is_terminal() {
    let env = setup(allocation(40_000), 90, false);
    let staff = Actor::staff(Uuid::new_v4());
    env.service.recalculate_fees(env.procedure_id, &staff).await.unwrap();
    let record = env.payments.by_procedure(env.procedure_id).unwrap();

    let err = env.service.cancel_payment_record(record.id, &staff).await.unwrap_err();
    assert!(matches!(err, SettlementError::NotAuthorized(_)));

    let admin = Actor::administrator(Uuid::new_v4());
    let cancelled = env.service.cancel_payment_record(record.id, &admin).await.unwrap();
    assert_eq!(cancelled.status, PaymentStatus::Cancelled);

    let err = env
        .service
        .record_payment(record.id, Decimal::from(1_000), PaymentMethod::Cash, None, None, &staff)
        .await
        .unwrap_err();
    assert_eq!(err, SettlementError::Ledger(LedgerError::RecordCancelled));
}
