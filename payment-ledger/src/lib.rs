//! Payment settlement ledger for surgical facility billing
//!
//! One payment record per procedure tracks settlement of the computed amount
//! over time: a settlement state machine (pending, partial, complete, plus an
//! administrative cancelled state), an append-only transaction list, and the
//! conservation invariant `amount_paid + amount_remaining == total_amount`
//! to the cent.
//!
//! The ledger is a pure state transform; persistence happens in
//! `settlement-service` through the atomic normalize-then-persist sequence.

pub mod error;
pub mod ledger;
pub mod models;

pub use error::*;
pub use ledger::*;
pub use models::*;
