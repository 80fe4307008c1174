use chrono::{DateTime, Utc};
use fee_engine::{
    ContractModel, MaterialCategory, MaterialConsumption, MaterialLot, OvertimeTerms,
    PersonnelAssignment, ProcedureSnapshot, RiskClassification,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Whether a procedure's financial fields may still be recalculated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcedureStatus {
    Editable,
    /// Closed by privileged action; recalculation is refused without an
    /// override.
    Closed,
}

/// A billable clinical episode as held by the procedure collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Procedure {
    pub id: Uuid,
    pub code: String,
    pub practitioner_id: Option<Uuid>,
    pub catalog_entry_id: Option<Uuid>,
    pub scheduled_start: DateTime<Utc>,
    pub scheduled_end: DateTime<Utc>,
    pub actual_start: Option<DateTime<Utc>>,
    pub actual_end: Option<DateTime<Utc>>,
    pub urgent: bool,
    /// Catalog price frozen at creation, immune to later catalog edits.
    pub catalog_price: Decimal,
    pub classification: Option<RiskClassification>,
    pub urgent_classification: bool,
    pub apply_overtime_fee: bool,
    pub materials: Vec<MaterialConsumption>,
    pub personnel: Vec<PersonnelAssignment>,
    /// Derived by the last fee recalculation.
    pub practitioner_amount: Decimal,
    pub facility_amount: Decimal,
    pub status: ProcedureStatus,
    /// Optimistic-concurrency version, bumped on every write.
    pub version: u64,
}

impl Procedure {
    /// Duration in whole minutes, preferring actual over scheduled times.
    #[must_use]
    pub fn actual_duration_minutes(&self) -> i64 {
        match (self.actual_start, self.actual_end) {
            (Some(start), Some(end)) => (end - start).num_minutes(),
            _ => (self.scheduled_end - self.scheduled_start).num_minutes(),
        }
    }
}

/// Catalog entry for a procedure type.
///
/// The overtime threshold is one explicitly named field; historical systems
/// drifted between several duration fields for this and the catalog is the
/// single source now.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: Uuid,
    pub name: String,
    /// Base price excluding tax.
    pub base_price: Decimal,
    pub standard_duration_minutes: i64,
    pub overtime_threshold_minutes: i64,
    pub overtime_unit_minutes: i64,
    pub overtime_fee_per_unit: Decimal,
    pub overtime_tolerance_minutes: i64,
    /// Urgency surcharge, 0-100.
    pub urgency_surcharge_percent: Decimal,
}

impl CatalogEntry {
    #[must_use]
    pub fn overtime_terms(&self) -> OvertimeTerms {
        OvertimeTerms {
            threshold_minutes: self.overtime_threshold_minutes,
            unit_minutes: self.overtime_unit_minutes,
            fee_per_unit: self.overtime_fee_per_unit,
            tolerance_minutes: self.overtime_tolerance_minutes,
        }
    }
}

/// Practitioner with exactly one contract model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Practitioner {
    pub id: Uuid,
    pub name: String,
    pub contract: ContractModel,
}

/// Catalog material with its purchasing lots and selling price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Material {
    pub id: Uuid,
    pub name: String,
    pub category: MaterialCategory,
    /// Purchasing fallback price when no lots exist.
    pub base_price: Decimal,
    /// Markup price charged on to patients.
    pub selling_price: Decimal,
    pub lots: Vec<MaterialLot>,
}

/// The caller identity for policy checks and transaction attribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Actor {
    pub id: Uuid,
    /// May recalculate closed procedures.
    pub can_override_closed: bool,
    /// May cancel payment records.
    pub is_administrator: bool,
}

impl Actor {
    #[must_use]
    pub fn staff(id: Uuid) -> Self {
        Self { id, can_override_closed: false, is_administrator: false }
    }

    #[must_use]
    pub fn administrator(id: Uuid) -> Self {
        Self { id, can_override_closed: true, is_administrator: true }
    }
}

/// Assembles the resolved, immutable snapshot the fee engine consumes.
#[must_use]
pub fn build_snapshot(
    procedure: &Procedure,
    catalog_entry: &CatalogEntry,
    practitioner: &Practitioner,
) -> ProcedureSnapshot {
    ProcedureSnapshot {
        procedure_id: procedure.id,
        actual_duration_minutes: procedure.actual_duration_minutes(),
        catalog_price: procedure.catalog_price,
        urgent: procedure.urgent,
        urgency_surcharge_percent: catalog_entry.urgency_surcharge_percent,
        contract: practitioner.contract.clone(),
        classification: procedure.classification,
        urgent_classification: procedure.urgent_classification,
        apply_overtime_fee: procedure.apply_overtime_fee,
        overtime: catalog_entry.overtime_terms(),
        materials: procedure.materials.clone(),
        personnel: procedure.personnel.clone(),
    }
}
