pub mod engine;
pub mod models;
pub mod workflow;
#[cfg(test)]
mod tests;

pub use engine::TradeSessionEngine;
pub use models::*;
pub use workflow::{EntryOutcome, TradeWorkflow};
