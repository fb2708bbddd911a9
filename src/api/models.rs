use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::intake::Pick;
use crate::ledger::models::*;

// ========== REQUEST MODELS ==========

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterUserRequest {
    #[validate(length(min = 1, max = 64, message = "must be 1-64 characters"))]
    pub user: String,
    #[validate(length(max = 32))]
    pub color: Option<String>,
    #[validate(length(max = 64))]
    pub discord: Option<String>,
}

/// Explicit overwrite of a ledger entry
#[derive(Debug, Deserialize, Validate)]
pub struct AdminEditRequest {
    pub points: u64,
    #[validate(length(max = 32))]
    pub color: Option<String>,
    #[validate(length(max = 64))]
    pub discord: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct PickRequest {
    pub sport: Sport,
    #[validate(length(min = 1, message = "must not be empty"))]
    pub contest_id: String,
    #[validate(length(min = 1, message = "must not be empty"))]
    pub match_id: String,
    #[validate(length(min = 1, message = "must not be empty"))]
    pub selection: String,
    #[validate(range(min = 1, message = "must be at least 1 point"))]
    pub stake: u64,
    pub base_odds: Decimal,
    pub round_claim: Option<String>,
    pub method_claim: Option<String>,
}

impl From<PickRequest> for Pick {
    fn from(r: PickRequest) -> Self {
        Pick {
            sport: r.sport,
            contest_id: r.contest_id,
            match_id: r.match_id,
            selection: r.selection,
            stake: r.stake,
            base_odds: r.base_odds,
            round_claim: r.round_claim,
            method_claim: r.method_claim,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct PlaceWagerRequest {
    #[validate(length(min = 1, message = "must not be empty"))]
    pub bettor: String,
    #[serde(flatten)]
    #[validate]
    pub pick: PickRequest,
}

/// Combined ticket: one debit for the total stake
#[derive(Debug, Deserialize, Validate)]
pub struct PlaceSlipRequest {
    #[validate(length(min = 1, message = "must not be empty"))]
    pub bettor: String,
    #[validate]
    pub picks: Vec<PickRequest>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RecordResultRequest {
    pub sport: Sport,
    #[validate(length(min = 1, message = "must not be empty"))]
    pub match_id: String,
    #[validate(length(min = 1, message = "must not be empty"))]
    pub winning_selection: String,
    pub round: Option<String>,
    pub method: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StreakQuery {
    pub sport: Option<Sport>,
}

// ========== RESPONSE MODELS ==========

#[derive(Debug, Serialize)]
pub struct AccountResponse {
    pub user: String,
    pub points: u64,
    pub color: Option<String>,
    pub discord: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl From<BalanceEntry> for AccountResponse {
    fn from(entry: BalanceEntry) -> Self {
        Self {
            user: entry.user,
            points: entry.points,
            color: entry.color,
            discord: entry.discord,
            updated_at: entry.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PlaceWagerResponse {
    pub wager_ids: Vec<WagerId>,
    pub balance: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct ContestResponse {
    pub contest_id: String,
    pub sport: Sport,
    pub closed: bool,
    pub checked: bool,
    pub checked_at: Option<DateTime<Utc>>,
    pub matches: Vec<MatchResultResponse>,
}

#[derive(Debug, Serialize)]
pub struct MatchResultResponse {
    pub match_id: String,
    pub winning_selection: String,
    pub round: Option<String>,
    pub method: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl ContestResponse {
    pub fn new(contest_id: &str, contest: ContestResults) -> Self {
        Self {
            contest_id: contest_id.to_string(),
            sport: contest.sport,
            closed: contest.closed,
            checked: contest.checked,
            checked_at: contest.checked_at,
            matches: contest
                .matches
                .into_iter()
                .map(|(match_id, r)| MatchResultResponse {
                    match_id,
                    winning_selection: r.winning_selection,
                    round: r.round,
                    method: r.method,
                    recorded_at: r.recorded_at,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub store: String,
}
