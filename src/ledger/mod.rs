// Balance ledger, wager log and outcome log over the versioned store
pub mod accessor;
pub mod models;

pub use accessor::{CreditOutcome, LedgerAccessor, RetryPolicy, Update};

#[cfg(test)]
pub(crate) mod fixtures {
    use super::models::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    /// Unresolved UFC wager: 100 points at 1.90
    pub fn wager(bettor: &str, contest: &str, fight: &str, selection: &str) -> Wager {
        Wager {
            id: Uuid::new_v4(),
            bettor: bettor.to_string(),
            sport: Sport::Ufc,
            contest_id: contest.to_string(),
            match_id: fight.to_string(),
            selection: selection.to_string(),
            stake: 100,
            base_odds: dec!(1.90),
            round_claim: None,
            method_claim: None,
            resolved: false,
            won: None,
            reward: None,
            credited: false,
            placed_at: Utc::now(),
            resolved_at: None,
        }
    }

    pub fn result(winner: &str, round: Option<&str>, method: Option<&str>) -> MatchResult {
        MatchResult {
            winning_selection: winner.to_string(),
            round: round.map(str::to_string),
            method: method.map(str::to_string),
            recorded_at: Utc::now(),
        }
    }
}
