pub mod checklist;
pub mod cooldown;
pub mod heat;
pub mod impulse;
pub mod models;
pub mod sizing;

pub use checklist::{ChecklistEvaluation, ChecklistItems};
pub use cooldown::{CooldownManager, COOLDOWN_HOURS};
pub use heat::RiskGateEngine;
pub use impulse::{ImpulseBrake, IMPULSE_BRAKE_SECONDS};
pub use models::*;
pub use sizing::{size_stock, size_stock_for, StockSizing};
