//! Risk sizing policy and portfolio exposure ledger.

mod ledger;
mod sizing;

pub use ledger::{ExposureLedger, LedgerState};
pub use sizing::RiskSizer;
