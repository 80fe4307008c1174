use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FeeError {
    #[error("Invalid procedure duration: {0} minutes")]
    InvalidDuration(i64),

    #[error("Revenue share percent {0} is outside 0-100")]
    ShareOutOfRange(Decimal),

    #[error("Negative hourly allocation rate: {0}")]
    NegativeRate(Decimal),

    #[error("Negative catalog price: {0}")]
    NegativeCatalogPrice(Decimal),

    #[error("Negative quantity {quantity} for material {material_id}")]
    NegativeQuantity { material_id: Uuid, quantity: Decimal },

    #[error("Negative unit price {unit_price} for material {material_id}")]
    NegativeUnitPrice { material_id: Uuid, unit_price: Decimal },

    #[error("Negative hourly fee {hourly_fee} for staff {staff_id}")]
    NegativeHourlyFee { staff_id: Uuid, hourly_fee: Decimal },

    #[error("Invalid overtime terms: {0}")]
    InvalidOvertimeTerms(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

pub type FeeResult<T> = Result<T, FeeError>;
