use crate::models::{round_money, ContractModel, RiskClassification};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// One configured fee row in the active classification fee schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationFeeRow {
    pub level: RiskClassification,
    pub fee: Decimal,
    pub active: bool,
}

/// Classification fee schedule, at most one active row per level.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassificationFeeSchedule {
    pub rows: Vec<ClassificationFeeRow>,
}

impl ClassificationFeeSchedule {
    fn active_fee(&self, level: RiskClassification) -> Option<Decimal> {
        self.rows
            .iter()
            .find(|row| row.active && row.level == level)
            .map(|row| row.fee)
    }
}

/// Resolves the flat classification fee for a procedure.
///
/// A missing or inactive schedule row is a configuration gap, never a user
/// error: the resolver logs a warning and falls back to the built-in default
/// table.
pub struct ClassificationFeeResolver {
    schedule: ClassificationFeeSchedule,
}

impl ClassificationFeeResolver {
    #[must_use]
    pub fn new(schedule: ClassificationFeeSchedule) -> Self {
        Self { schedule }
    }

    /// Built-in fallback fees, one per level.
    #[must_use]
    pub fn default_fee(level: RiskClassification) -> Decimal {
        match level {
            RiskClassification::Low => Decimal::from(20_000),
            RiskClassification::Moderate => Decimal::from(35_000),
            RiskClassification::High => Decimal::from(50_000),
        }
    }

    /// Flat fee for the given classification, zero when unclassified.
    #[must_use]
    pub fn resolve(&self, classification: Option<RiskClassification>) -> Decimal {
        let Some(level) = classification else {
            return Decimal::ZERO;
        };

        match self.schedule.active_fee(level) {
            Some(fee) => round_money(fee),
            None => {
                warn!(
                    classification = ?level,
                    "no active classification fee schedule row, using built-in default"
                );
                round_money(Self::default_fee(level))
            }
        }
    }

    /// Classification fee as applicable to a contract model.
    ///
    /// Charged only under time-based allocation: revenue-share percentages
    /// are assumed to already internalize case-complexity pricing, so share
    /// contracts never incur this fee. The urgent-classification flag does
    /// not change the amount under the current rule set.
    #[must_use]
    pub fn resolve_for_contract(
        &self,
        contract: &ContractModel,
        classification: Option<RiskClassification>,
    ) -> Decimal {
        match contract {
            ContractModel::TimeAllocation { .. } => self.resolve(classification),
            ContractModel::RevenueShare { .. } => Decimal::ZERO,
        }
    }
}
