use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Rounds a monetary value to 2 decimal places, midpoint away from zero.
///
/// Applied to every monetary field on write so that derived amounts and
/// ledger balances always agree to the cent.
#[must_use]
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// How a practitioner is compensated; exactly one model per practitioner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContractModel {
    /// The facility retains the theatre allocation fee; the practitioner is
    /// compensated by the flat hourly rate folded into the allocation cost
    /// and receives nothing through the settlement ledger.
    TimeAllocation {
        /// Hourly allocation rate, facility-local currency units.
        hourly_rate: Decimal,
    },
    /// The practitioner receives a share of the net billable revenue.
    RevenueShare {
        /// Share of net billable revenue, 0-100.
        share_percent: Decimal,
    },
}

/// Who gets paid through the settlement ledger for a given contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayoutChannel {
    /// No ledger payout: allocation contracts settle facility-side only.
    None,
    Practitioner,
}

impl ContractModel {
    /// Ledger payout channel for this contract model.
    ///
    /// Time-allocation contracts deliberately never pay the practitioner
    /// through the ledger; this is a documented design choice, not a gap.
    #[must_use]
    pub fn payout_channel(&self) -> PayoutChannel {
        match self {
            Self::TimeAllocation { .. } => PayoutChannel::None,
            Self::RevenueShare { .. } => PayoutChannel::Practitioner,
        }
    }
}

/// Clinical risk classification, three ordinal levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskClassification {
    Low,
    Moderate,
    High,
}

/// Material category, which determines how the unit price was frozen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaterialCategory {
    /// Consumed by the facility; price frozen from the purchasing
    /// weighted-average over lots.
    Consumable,
    /// Billed on to the patient; price frozen from the selling price.
    PatientBillable,
}

/// A consumed material with its price frozen at entry-creation time.
///
/// The frozen `unit_price` is immutable: later catalog or lot changes must
/// never silently alter an already-recorded consumption.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialConsumption {
    pub material_id: Uuid,
    pub category: MaterialCategory,
    pub quantity: Decimal,
    pub unit_price: Decimal,
}

/// A purchase lot used for weighted-average price resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialLot {
    pub quantity: Decimal,
    pub unit_price: Decimal,
}

/// Staff assigned to a procedure; cost accrues per hour of actual duration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonnelAssignment {
    pub staff_id: Uuid,
    pub hourly_fee: Decimal,
}

/// Overtime billing terms from the catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OvertimeTerms {
    /// Duration beyond which overtime billing may start.
    pub threshold_minutes: i64,
    /// Length of one billable overtime unit.
    pub unit_minutes: i64,
    /// Fee per overtime unit.
    pub fee_per_unit: Decimal,
    /// Grace minutes deducted before any overtime is billed.
    pub tolerance_minutes: i64,
}

/// Fully resolved procedure snapshot consumed by the calculator.
///
/// All references are already resolved and all prices already frozen; the
/// calculator never looks anything up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcedureSnapshot {
    pub procedure_id: Uuid,
    pub actual_duration_minutes: i64,
    /// Catalog price captured when the procedure was created, immune to
    /// later catalog edits.
    pub catalog_price: Decimal,
    pub urgent: bool,
    /// Urgency surcharge, 0-100, from the catalog entry.
    pub urgency_surcharge_percent: Decimal,
    pub contract: ContractModel,
    pub classification: Option<RiskClassification>,
    /// Independent of `urgent`; does not affect the fee amount under the
    /// current rule set (intentional asymmetry, confirmed with billing).
    pub urgent_classification: bool,
    pub apply_overtime_fee: bool,
    pub overtime: OvertimeTerms,
    pub materials: Vec<MaterialConsumption>,
    pub personnel: Vec<PersonnelAssignment>,
}

/// Aggregated material costs for one procedure.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MaterialCostSummary {
    pub total_material_cost: Decimal,
    pub patient_billable_material_cost: Decimal,
}

impl MaterialCostSummary {
    #[must_use]
    pub fn non_patient_material_cost(&self) -> Decimal {
        self.total_material_cost - self.patient_billable_material_cost
    }
}

/// Calculator output: the persisted amount split plus the components it was
/// derived from, so reporting can reuse the authoritative figures instead of
/// carrying a second formula.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeBreakdown {
    pub practitioner_amount: Decimal,
    pub facility_amount: Decimal,
    pub allocation_cost: Decimal,
    pub material_cost: Decimal,
    pub personnel_cost: Decimal,
    pub overtime_fee: Decimal,
    pub classification_fee: Decimal,
    pub net_billable: Decimal,
}
