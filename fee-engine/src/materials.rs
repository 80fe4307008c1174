use crate::error::{FeeError, FeeResult};
use crate::models::{round_money, MaterialCategory, MaterialConsumption, MaterialCostSummary, MaterialLot};
use rust_decimal::Decimal;

/// Aggregates consumed-material costs over frozen unit prices.
///
/// This component never looks up live prices; every entry carries the price
/// frozen when the consumption was recorded.
pub struct MaterialCostAggregator;

impl MaterialCostAggregator {
    /// Sums quantity x frozen unit price over all entries, and separately
    /// over the patient-billable subset.
    ///
    /// # Errors
    ///
    /// Returns an error if any entry carries a negative quantity or unit
    /// price; a degenerate zero result must never mask bad input.
    pub fn aggregate(entries: &[MaterialConsumption]) -> FeeResult<MaterialCostSummary> {
        let mut total = Decimal::ZERO;
        let mut patient_billable = Decimal::ZERO;

        for entry in entries {
            if entry.quantity < Decimal::ZERO {
                return Err(FeeError::NegativeQuantity {
                    material_id: entry.material_id,
                    quantity: entry.quantity,
                });
            }
            if entry.unit_price < Decimal::ZERO {
                return Err(FeeError::NegativeUnitPrice {
                    material_id: entry.material_id,
                    unit_price: entry.unit_price,
                });
            }

            let line_cost = entry.quantity * entry.unit_price;
            total += line_cost;
            if entry.category == MaterialCategory::PatientBillable {
                patient_billable += line_cost;
            }
        }

        Ok(MaterialCostSummary {
            total_material_cost: round_money(total),
            patient_billable_material_cost: round_money(patient_billable),
        })
    }
}

/// Resolves the purchasing weighted-average unit price over lots.
///
/// Used only when a consumption entry is created; the resolved value is
/// copied onto the entry and becomes immutable. With no lots (or only empty
/// lots) the material's catalog base price is the fallback.
///
/// # Errors
///
/// Returns an error if any lot carries a negative quantity or unit price.
pub fn weighted_average_unit_price(lots: &[MaterialLot], fallback_price: Decimal) -> FeeResult<Decimal> {
    let mut total_quantity = Decimal::ZERO;
    let mut total_value = Decimal::ZERO;

    for lot in lots {
        if lot.quantity < Decimal::ZERO || lot.unit_price < Decimal::ZERO {
            return Err(FeeError::Validation(format!(
                "purchase lot with negative quantity or price: {} x {}",
                lot.quantity, lot.unit_price
            )));
        }
        total_quantity += lot.quantity;
        total_value += lot.quantity * lot.unit_price;
    }

    if total_quantity.is_zero() {
        return Ok(round_money(fallback_price));
    }

    Ok(round_money(total_value / total_quantity))
}
