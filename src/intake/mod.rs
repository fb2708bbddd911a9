// Boundaries that feed the ledger: wagers, match results, accounts
pub mod accounts;
pub mod outcomes;
pub mod wagers;

pub use accounts::{AccountAdmin, Profile, DEFAULT_STARTING_POINTS};
pub use outcomes::OutcomeIntake;
pub use wagers::{Pick, WagerIntake};
