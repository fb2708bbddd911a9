use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::ValidationError;

/// Document keys in the versioned store
pub mod keys {
    pub const BALANCE_PREFIX: &str = "balances/";
    pub const WAGER_LOG: &str = "wagers";
    pub const OUTCOME_LOG: &str = "outcomes";

    pub fn balance(user: &str) -> String {
        format!("{}{}", BALANCE_PREFIX, user)
    }
}

pub type WagerId = Uuid;

/// Sport a contest belongs to. Wagers only settle against contests of the same sport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sport {
    Ufc,
    Csgo,
}

impl Sport {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sport::Ufc => "ufc",
            Sport::Csgo => "csgo",
        }
    }

    pub fn all() -> Vec<Sport> {
        vec![Sport::Ufc, Sport::Csgo]
    }
}

impl fmt::Display for Sport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Sport {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ufc" => Ok(Sport::Ufc),
            "csgo" | "cs:go" | "cs2" => Ok(Sport::Csgo),
            other => Err(ValidationError::UnknownSport(other.to_string())),
        }
    }
}

/// Round a fight ends in (R1..R5)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Round(u8);

impl Round {
    pub const MAX: u8 = 5;

    pub fn new(n: u8) -> Option<Self> {
        (1..=Self::MAX).contains(&n).then_some(Round(n))
    }

    pub fn number(&self) -> u8 {
        self.0
    }

    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let trimmed = raw.trim();
        trimmed
            .strip_prefix('R')
            .or_else(|| trimmed.strip_prefix('r'))
            .and_then(|n| n.parse::<u8>().ok())
            .and_then(Round::new)
            .ok_or_else(|| ValidationError::InvalidRound(raw.to_string()))
    }
}

impl fmt::Display for Round {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R{}", self.0)
    }
}

/// How a fight was won
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Ko,
    Tko,
    Decision,
    Submission,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Ko => "KO",
            Method::Tko => "TKO",
            Method::Decision => "Decision",
            Method::Submission => "Submission",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        match raw.trim().to_lowercase().as_str() {
            "ko" => Ok(Method::Ko),
            "tko" => Ok(Method::Tko),
            "decision" | "decisión" => Ok(Method::Decision),
            "submission" | "sumisión" | "sumision" => Ok(Method::Submission),
            _ => Err(ValidationError::InvalidMethod(raw.to_string())),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Parse an optional claim, treating blank strings as absent
pub fn parse_optional<T>(
    raw: Option<&str>,
    parse: impl Fn(&str) -> Result<T, ValidationError>,
) -> Result<Option<T>, ValidationError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => parse(value).map(Some),
    }
}

/// Identity comparison for selections: case-insensitive, whitespace-normalised
pub fn normalize_selection(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

///Balance ledger entry (one document per user)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceEntry {
    pub user: String,
    pub points: u64,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub discord: Option<String>,
    /// Wagers whose winnings were already credited here. Never pruned: a pass
    /// holding a stale `Settling` view of a settled wager relies on it.
    #[serde(default)]
    pub credit_receipts: BTreeSet<WagerId>,
    pub updated_at: DateTime<Utc>,
}

impl BalanceEntry {
    pub fn new(user: &str, points: u64, color: Option<String>, discord: Option<String>) -> Self {
        Self {
            user: user.to_string(),
            points,
            color,
            discord,
            credit_receipts: BTreeSet::new(),
            updated_at: Utc::now(),
        }
    }

    pub fn has_available(&self, required: u64) -> bool {
        self.points >= required
    }

    pub fn was_credited(&self, wager_id: &WagerId) -> bool {
        self.credit_receipts.contains(wager_id)
    }
}

/// Where a wager is in settlement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementState {
    Unresolved,
    /// Resolved as won, credit not yet confirmed on the balance ledger
    Settling,
    Settled,
}

/// A placed stake on a selection within a contest match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wager {
    pub id: WagerId,
    pub bettor: String,
    pub sport: Sport,
    pub contest_id: String,
    pub match_id: String,
    pub selection: String,
    pub stake: u64,
    #[serde(with = "rust_decimal::serde::float")]
    pub base_odds: Decimal,
    #[serde(default)]
    pub round_claim: Option<String>,
    #[serde(default)]
    pub method_claim: Option<String>,
    #[serde(default)]
    pub resolved: bool,
    #[serde(default)]
    pub won: Option<bool>,
    #[serde(default)]
    pub reward: Option<u64>,
    #[serde(default)]
    pub credited: bool,
    pub placed_at: DateTime<Utc>,
    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Wager {
    pub fn state(&self) -> SettlementState {
        match (self.resolved, self.won, self.credited) {
            (false, _, _) => SettlementState::Unresolved,
            (true, Some(true), false) => SettlementState::Settling,
            _ => SettlementState::Settled,
        }
    }

    pub fn is_settled(&self) -> bool {
        self.state() == SettlementState::Settled
    }

    pub fn references(&self, contest_id: &str, sport: Sport) -> bool {
        self.contest_id == contest_id && self.sport == sport
    }

    pub fn round(&self) -> Result<Option<Round>, ValidationError> {
        parse_optional(self.round_claim.as_deref(), Round::parse)
    }

    pub fn method(&self) -> Result<Option<Method>, ValidationError> {
        parse_optional(self.method_claim.as_deref(), Method::parse)
    }

    /// Net effect on the bettor: +reward when won, -stake when lost, 0 while pending
    pub fn net_result(&self) -> i64 {
        match (self.resolved, self.won) {
            (true, Some(true)) => self.reward.unwrap_or(0) as i64,
            (true, _) => -(self.stake as i64),
            _ => 0,
        }
    }
}

/// All wagers, one append-mostly list per user
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WagerLog {
    #[serde(default)]
    pub bets: BTreeMap<String, Vec<Wager>>,
}

impl WagerLog {
    pub fn append(&mut self, wager: Wager) {
        self.bets.entry(wager.bettor.clone()).or_default().push(wager);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Wager> {
        self.bets.values().flatten()
    }

    /// Locate a wager by identity, never by position
    pub fn find(&self, id: &WagerId) -> Option<&Wager> {
        self.iter().find(|w| &w.id == id)
    }

    pub fn find_mut(&mut self, id: &WagerId) -> Option<&mut Wager> {
        self.bets.values_mut().flatten().find(|w| &w.id == id)
    }

    pub fn for_user(&self, user: &str) -> &[Wager] {
        self.bets.get(user).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn referencing(&self, contest_id: &str, sport: Sport) -> impl Iterator<Item = &Wager> + '_ {
        let contest_id = contest_id.to_string();
        self.iter().filter(move |w| w.references(&contest_id, sport))
    }
}

/// Recorded result of one match
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchResult {
    pub winning_selection: String,
    #[serde(default)]
    pub round: Option<String>,
    #[serde(default)]
    pub method: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

/// A match result after validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedResult {
    pub winning_selection: String,
    pub round: Option<Round>,
    pub method: Option<Method>,
}

impl MatchResult {
    /// Results arrive from an untrusted operator surface
    pub fn validate(&self, contest_id: &str, match_id: &str) -> Result<ValidatedResult, ValidationError> {
        let winning_selection = normalize_selection(&self.winning_selection);
        if winning_selection.is_empty() {
            return Err(ValidationError::EmptyWinner {
                contest_id: contest_id.to_string(),
                match_id: match_id.to_string(),
            });
        }

        Ok(ValidatedResult {
            winning_selection,
            round: parse_optional(self.round.as_deref(), Round::parse)?,
            method: parse_optional(self.method.as_deref(), Method::parse)?,
        })
    }
}

/// Results for one contest (event) and its settlement fence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContestResults {
    pub sport: Sport,
    #[serde(default)]
    pub matches: BTreeMap<String, MatchResult>,
    /// Operator declared every match result recorded
    #[serde(default)]
    pub closed: bool,
    /// Every wager on this contest has been settled
    #[serde(default)]
    pub checked: bool,
    #[serde(default)]
    pub checked_at: Option<DateTime<Utc>>,
}

impl ContestResults {
    pub fn new(sport: Sport) -> Self {
        Self {
            sport,
            matches: BTreeMap::new(),
            closed: false,
            checked: false,
            checked_at: None,
        }
    }
}

/// Map from contest id to its results
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeLog {
    #[serde(default)]
    pub contests: BTreeMap<String, ContestResults>,
}

impl OutcomeLog {
    pub fn unchecked(&self) -> impl Iterator<Item = (&String, &ContestResults)> {
        self.contests.iter().filter(|(_, c)| !c.checked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::fixtures::wager;
    use rust_decimal_macros::dec;

    #[test]
    fn test_round_parsing() {
        assert_eq!(Round::parse("R2").unwrap().number(), 2);
        assert_eq!(Round::parse(" r5 ").unwrap().to_string(), "R5");
        assert!(Round::parse("R0").is_err());
        assert!(Round::parse("R6").is_err());
        assert!(Round::parse("2").is_err());
        assert!(Round::parse("Sin round").is_err());
    }

    #[test]
    fn test_method_parsing_accepts_spanish_spellings() {
        assert_eq!(Method::parse("KO").unwrap(), Method::Ko);
        assert_eq!(Method::parse("tko").unwrap(), Method::Tko);
        assert_eq!(Method::parse("Decisión").unwrap(), Method::Decision);
        assert_eq!(Method::parse("Sumisión").unwrap(), Method::Submission);
        assert!(Method::parse("DQ").is_err());
    }

    #[test]
    fn test_blank_claims_are_absent() {
        assert_eq!(parse_optional(Some("  "), Round::parse).unwrap(), None);
        assert_eq!(parse_optional(None, Method::parse).unwrap(), None);
    }

    #[test]
    fn test_normalize_selection() {
        assert_eq!(normalize_selection("  Jon   JONES "), "jon jones");
        assert_eq!(normalize_selection("\t"), "");
    }

    #[test]
    fn test_wager_state_transitions() {
        let mut w = wager("ana", "UFC 300", "A vs B", "A");
        assert_eq!(w.state(), SettlementState::Unresolved);

        w.resolved = true;
        w.won = Some(true);
        w.reward = Some(190);
        assert_eq!(w.state(), SettlementState::Settling);
        assert_eq!(w.net_result(), 190);

        w.credited = true;
        assert_eq!(w.state(), SettlementState::Settled);

        let mut lost = wager("ana", "UFC 300", "C vs D", "C");
        lost.resolved = true;
        lost.won = Some(false);
        lost.reward = Some(0);
        assert!(lost.is_settled());
        assert_eq!(lost.net_result(), -100);
    }

    #[test]
    fn test_wager_log_find_by_identity() {
        let mut log = WagerLog::default();
        let a = wager("ana", "UFC 300", "A vs B", "A");
        let b = wager("bo", "UFC 300", "A vs B", "B");
        let b_id = b.id;
        log.append(a);
        log.append(b);

        assert_eq!(log.find(&b_id).unwrap().bettor, "bo");
        log.find_mut(&b_id).unwrap().resolved = true;
        assert!(log.for_user("bo")[0].resolved);
        assert_eq!(log.referencing("UFC 300", Sport::Ufc).count(), 2);
        assert_eq!(log.referencing("UFC 300", Sport::Csgo).count(), 0);
    }

    #[test]
    fn test_match_result_validation() {
        let result = MatchResult {
            winning_selection: "   ".into(),
            round: None,
            method: None,
            recorded_at: Utc::now(),
        };
        assert!(matches!(
            result.validate("UFC 300", "A vs B"),
            Err(ValidationError::EmptyWinner { .. })
        ));

        let result = MatchResult {
            winning_selection: "Alex Pereira".into(),
            round: Some("R1".into()),
            method: Some("KO".into()),
            recorded_at: Utc::now(),
        };
        let validated = result.validate("UFC 300", "A vs B").unwrap();
        assert_eq!(validated.winning_selection, "alex pereira");
        assert_eq!(validated.round, Round::new(1));
        assert_eq!(validated.method, Some(Method::Ko));
    }

    #[test]
    fn test_wager_document_round_trip_keeps_odds() {
        let w = wager("ana", "UFC 300", "A vs B", "A");
        let value = serde_json::to_value(&w).unwrap();
        assert_eq!(value["base_odds"], serde_json::json!(1.9));
        let back: Wager = serde_json::from_value(value).unwrap();
        assert_eq!(back.base_odds, dec!(1.9));
    }
}
