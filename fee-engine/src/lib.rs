//! Fee derivation engine for surgical facility billing
//!
//! Provides the pure computation core of the billing pipeline:
//! - Material cost aggregation over frozen consumption prices
//! - Classification-based flat fee resolution with schedule fallback
//! - Per-procedure fee calculation under two contract models
//!
//! Everything in this crate is side-effect free and deterministic: the same
//! resolved procedure snapshot always yields the same amounts, which is what
//! makes recalculation auditable. Persistence and ledger synchronization live
//! in `settlement-service`.

pub mod calculator;
pub mod classification;
pub mod error;
pub mod materials;
pub mod models;

pub use calculator::*;
pub use classification::*;
pub use error::*;
pub use materials::*;
pub use models::*;
