use crate::error::{FeeError, FeeResult};
use crate::models::{
    round_money, ContractModel, FeeBreakdown, MaterialCostSummary, OvertimeTerms, PersonnelAssignment,
    ProcedureSnapshot,
};
use rust_decimal::Decimal;

const MINUTES_PER_HOUR: i64 = 60;

fn hours(minutes: i64) -> Decimal {
    Decimal::from(minutes) / Decimal::from(MINUTES_PER_HOUR)
}

fn percent(value: Decimal) -> Decimal {
    value / Decimal::ONE_HUNDRED
}

/// Pro-rated overtime: fractional units are billed as-is, but nothing is
/// billed until at least one full unit has accrued past the tolerance.
///
/// Used by the time-allocation algorithm.
#[must_use]
pub fn pro_rated_overtime_fee(duration_minutes: i64, terms: &OvertimeTerms) -> Decimal {
    if terms.unit_minutes <= 0 || duration_minutes <= terms.threshold_minutes {
        return Decimal::ZERO;
    }
    let billable = (duration_minutes - terms.threshold_minutes - terms.tolerance_minutes).max(0);
    if billable < terms.unit_minutes {
        return Decimal::ZERO;
    }
    terms.fee_per_unit * Decimal::from(billable) / Decimal::from(terms.unit_minutes)
}

/// Whole-unit overtime: any partial unit past the tolerance bills as a full
/// unit.
///
/// Used by the revenue-share algorithm. The contrast with
/// [`pro_rated_overtime_fee`] is deliberate and flagged to stakeholders; do
/// not unify the two policies silently.
#[must_use]
pub fn whole_unit_overtime_fee(duration_minutes: i64, terms: &OvertimeTerms) -> Decimal {
    let extra = duration_minutes - terms.threshold_minutes;
    if terms.unit_minutes <= 0 || extra <= 0 {
        return Decimal::ZERO;
    }
    let billable = (extra - terms.tolerance_minutes).max(0);
    if billable == 0 {
        return Decimal::ZERO;
    }
    let units = (Decimal::from(billable) / Decimal::from(terms.unit_minutes)).ceil();
    terms.fee_per_unit * units
}

/// Total personnel cost: staff hourly fee x duration in hours, summed over
/// all assignments.
///
/// # Errors
///
/// Returns an error for a negative hourly fee.
pub fn total_personnel_cost(duration_minutes: i64, personnel: &[PersonnelAssignment]) -> FeeResult<Decimal> {
    let duration_hours = hours(duration_minutes);
    let mut total = Decimal::ZERO;
    for assignment in personnel {
        if assignment.hourly_fee < Decimal::ZERO {
            return Err(FeeError::NegativeHourlyFee {
                staff_id: assignment.staff_id,
                hourly_fee: assignment.hourly_fee,
            });
        }
        total += assignment.hourly_fee * duration_hours;
    }
    Ok(total)
}

/// Pure per-procedure fee calculator.
///
/// Consumes a fully resolved snapshot plus pre-aggregated material costs and
/// the already-resolved classification fee; produces the practitioner and
/// facility amount split. Re-running on identical input yields identical
/// output, which recalculation audits rely on.
pub struct FeeCalculator;

impl FeeCalculator {
    /// Derives the amount split for one procedure.
    ///
    /// Both output amounts are clamped to >= 0 and rounded to 2 decimal
    /// places. The classification fee is only ever added under a
    /// time-allocation contract; the revenue-share branch ignores it.
    ///
    /// # Errors
    ///
    /// Fails fast on invalid input (negative duration, price or rate, a
    /// share outside 0-100, degenerate overtime terms) rather than returning
    /// amounts that could be mistaken for a legitimate zero fee.
    pub fn calculate(
        snapshot: &ProcedureSnapshot,
        materials: &MaterialCostSummary,
        classification_fee: Decimal,
    ) -> FeeResult<FeeBreakdown> {
        Self::validate(snapshot)?;

        let personnel_cost = total_personnel_cost(snapshot.actual_duration_minutes, &snapshot.personnel)?;

        match &snapshot.contract {
            ContractModel::TimeAllocation { hourly_rate } => {
                Self::time_allocation(snapshot, materials, personnel_cost, classification_fee, *hourly_rate)
            }
            ContractModel::RevenueShare { share_percent } => {
                Self::revenue_share(snapshot, materials, personnel_cost, *share_percent)
            }
        }
    }

    fn validate(snapshot: &ProcedureSnapshot) -> FeeResult<()> {
        if snapshot.actual_duration_minutes < 0 {
            return Err(FeeError::InvalidDuration(snapshot.actual_duration_minutes));
        }
        if snapshot.catalog_price < Decimal::ZERO {
            return Err(FeeError::NegativeCatalogPrice(snapshot.catalog_price));
        }
        if snapshot.urgency_surcharge_percent < Decimal::ZERO {
            return Err(FeeError::Validation(format!(
                "negative urgency surcharge percent: {}",
                snapshot.urgency_surcharge_percent
            )));
        }
        match &snapshot.contract {
            ContractModel::TimeAllocation { hourly_rate } => {
                if *hourly_rate < Decimal::ZERO {
                    return Err(FeeError::NegativeRate(*hourly_rate));
                }
            }
            ContractModel::RevenueShare { share_percent } => {
                if *share_percent < Decimal::ZERO || *share_percent > Decimal::ONE_HUNDRED {
                    return Err(FeeError::ShareOutOfRange(*share_percent));
                }
            }
        }
        if snapshot.apply_overtime_fee {
            let terms = &snapshot.overtime;
            if terms.unit_minutes <= 0 {
                return Err(FeeError::InvalidOvertimeTerms(format!(
                    "unit length must be positive, got {} minutes",
                    terms.unit_minutes
                )));
            }
            if terms.threshold_minutes < 0 || terms.tolerance_minutes < 0 {
                return Err(FeeError::InvalidOvertimeTerms(
                    "threshold and tolerance must be non-negative".to_string(),
                ));
            }
            if terms.fee_per_unit < Decimal::ZERO {
                return Err(FeeError::InvalidOvertimeTerms(format!(
                    "fee per unit must be non-negative, got {}",
                    terms.fee_per_unit
                )));
            }
        }
        Ok(())
    }

    /// Time-based allocation: the facility retains the allocation fee and
    /// recovers all costs; nothing is paid to the practitioner through the
    /// settlement ledger (`PayoutChannel::None`).
    fn time_allocation(
        snapshot: &ProcedureSnapshot,
        materials: &MaterialCostSummary,
        personnel_cost: Decimal,
        classification_fee: Decimal,
        hourly_rate: Decimal,
    ) -> FeeResult<FeeBreakdown> {
        let allocation_cost = hours(snapshot.actual_duration_minutes) * hourly_rate;

        let urgency_multiplier = if snapshot.urgent {
            Decimal::ONE + percent(snapshot.urgency_surcharge_percent)
        } else {
            Decimal::ONE
        };
        let effective_personnel_cost = personnel_cost * urgency_multiplier;

        let overtime_fee = if snapshot.apply_overtime_fee {
            pro_rated_overtime_fee(snapshot.actual_duration_minutes, &snapshot.overtime)
        } else {
            Decimal::ZERO
        };

        let allocation_cost = round_money(allocation_cost);
        let material_cost = round_money(materials.total_material_cost);
        let personnel_cost = round_money(effective_personnel_cost);
        let overtime_fee = round_money(overtime_fee);
        let classification_fee = round_money(classification_fee);

        let facility_amount =
            allocation_cost + material_cost + personnel_cost + overtime_fee + classification_fee;

        Ok(FeeBreakdown {
            practitioner_amount: Decimal::ZERO,
            facility_amount: round_money(facility_amount.max(Decimal::ZERO)),
            allocation_cost,
            material_cost,
            personnel_cost,
            overtime_fee,
            classification_fee,
            net_billable: Decimal::ZERO,
        })
    }

    /// Revenue share: practitioner and facility split the net billable
    /// revenue; the overtime fee comes out of the practitioner share.
    fn revenue_share(
        snapshot: &ProcedureSnapshot,
        materials: &MaterialCostSummary,
        personnel_cost: Decimal,
        share_percent: Decimal,
    ) -> FeeResult<FeeBreakdown> {
        let urgency_rate = if snapshot.urgent {
            percent(snapshot.urgency_surcharge_percent)
        } else {
            Decimal::ZERO
        };

        let overtime_fee = if snapshot.apply_overtime_fee {
            whole_unit_overtime_fee(snapshot.actual_duration_minutes, &snapshot.overtime)
        } else {
            Decimal::ZERO
        };

        let share_rate = percent(share_percent);
        let net_billable = snapshot.catalog_price * (Decimal::ONE + urgency_rate)
            - materials.patient_billable_material_cost;

        let practitioner_amount = (net_billable * share_rate - overtime_fee).max(Decimal::ZERO);
        let facility_amount = net_billable * (Decimal::ONE - share_rate)
            + materials.patient_billable_material_cost
            + overtime_fee;

        Ok(FeeBreakdown {
            practitioner_amount: round_money(practitioner_amount),
            facility_amount: round_money(facility_amount.max(Decimal::ZERO)),
            allocation_cost: Decimal::ZERO,
            material_cost: round_money(materials.total_material_cost),
            personnel_cost: round_money(personnel_cost),
            overtime_fee: round_money(overtime_fee),
            // Never charged under revenue share, enforced at the resolver
            // and kept out of the split here as well.
            classification_fee: Decimal::ZERO,
            net_billable: round_money(net_billable),
        })
    }
}
