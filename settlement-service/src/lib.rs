//! Settlement orchestration for surgical facility billing
//!
//! Exposes the two operations the surrounding CRUD/web layer calls:
//! - `recalculate_fees`: assemble a resolved procedure snapshot from the
//!   collaborator stores, run the fee engine, persist the amount split, and
//!   synchronize the payment ledger record
//! - `record_payment`: append a settlement transaction to a procedure's
//!   payment record
//!
//! Plus the material-add path that freezes consumption prices at entry time.
//! Concurrent work on the same procedure is serialized through a
//! per-procedure lock registry so recalculation never races an edit and two
//! settlement transactions cannot be lost to each other.

pub mod collaborators;
pub mod error;
pub mod models;
pub mod service;

pub use collaborators::*;
pub use error::*;
pub use models::*;
pub use service::*;
