pub mod candidates;
pub mod db;
pub mod decisions;
pub mod settings;

pub use candidates::CandidateStore;
pub use db::Database;
pub use decisions::DecisionStore;
pub use settings::SettingsStore;
