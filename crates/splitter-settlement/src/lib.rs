//! Splitter Settlement Engine
//!
//! Pure computation over a group snapshot: per-user net balances, and a
//! short list of transfers that brings every balance back to zero. Nothing
//! here holds state or performs I/O, so callers recompute freshly whenever
//! the ledger changes.

pub mod error;
pub mod split;
pub mod balances;
pub mod simplify;
pub mod plan;

pub use balances::calculate_balances;
pub use error::SettlementError;
pub use plan::{settle, SettlementPlan};
pub use simplify::{simplify_debts, SETTLEMENT_TOLERANCE};
pub use split::participant_debits;
