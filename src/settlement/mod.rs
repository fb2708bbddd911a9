// Settlement: reward calculation and the reconciliation pass
pub mod engine;
pub mod reward;

pub use engine::{PassStatus, SettlementEngine, SettlementFailure, SettlementReport};
pub use reward::{Claims, RewardDecision};
