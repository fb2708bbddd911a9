use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::Serialize;

use crate::error::ValidationError;
use crate::ledger::models::{normalize_selection, Method, Round, ValidatedResult, Wager};

/// Bonus when the round claim matches the recorded round
pub const ROUND_BONUS: Decimal = dec!(1.20);
/// Bonus when the method claim matches the recorded method
pub const METHOD_BONUS: Decimal = dec!(1.10);

/// A wager's optional claims, parsed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Claims {
    pub round: Option<Round>,
    pub method: Option<Method>,
}

impl Claims {
    pub fn of(wager: &Wager) -> Result<Self, ValidationError> {
        Ok(Self {
            round: wager.round()?,
            method: wager.method()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RewardDecision {
    pub won: bool,
    pub reward: u64,
}

impl RewardDecision {
    pub const LOST: RewardDecision = RewardDecision { won: false, reward: 0 };
}

/// Multiplier for the claims that match the outcome
pub fn bonus(claims: &Claims, outcome: &ValidatedResult) -> Decimal {
    let mut bonus = Decimal::ONE;
    if claims.round.is_some() && claims.round == outcome.round {
        bonus *= ROUND_BONUS;
    }
    if claims.method.is_some() && claims.method == outcome.method {
        bonus *= METHOD_BONUS;
    }
    bonus
}

/// Decide a wager against its match result.
///
/// Arithmetic is exact; the payout is rounded once, half to even.
pub fn compute(wager: &Wager, claims: &Claims, outcome: &ValidatedResult) -> RewardDecision {
    if normalize_selection(&wager.selection) != outcome.winning_selection {
        return RewardDecision::LOST;
    }

    let payout = Decimal::from(wager.stake)
        .checked_mul(wager.base_odds)
        .and_then(|v| v.checked_mul(bonus(claims, outcome)))
        .unwrap_or(Decimal::MAX)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointNearestEven);

    RewardDecision {
        won: true,
        reward: payout.to_u64().unwrap_or(u64::MAX),
    }
}
