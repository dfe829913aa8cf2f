pub mod ledger;
pub mod models;

pub use ledger::PositionLedger;
pub use models::*;
