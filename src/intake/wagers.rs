use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::{AppResult, ValidationError, WagerError};
use crate::ledger::models::*;
use crate::ledger::{LedgerAccessor, Update};
use crate::notify::{self, Notice, Notifier};

/// One selection on a slip
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pick {
    pub sport: Sport,
    pub contest_id: String,
    pub match_id: String,
    pub selection: String,
    pub stake: u64,
    pub base_odds: Decimal,
    #[serde(default)]
    pub round_claim: Option<String>,
    #[serde(default)]
    pub method_claim: Option<String>,
}

impl Pick {
    /// Validate and turn into an unresolved wager with canonical claims
    pub fn into_wager(self, bettor: &str) -> Result<Wager, ValidationError> {
        if self.stake == 0 {
            return Err(ValidationError::InvalidStake);
        }
        if self.base_odds <= Decimal::ZERO {
            return Err(ValidationError::InvalidOdds(self.base_odds.to_string()));
        }

        let contest_id = required(&self.contest_id, "contest_id")?;
        let match_id = required(&self.match_id, "match_id")?;
        let selection = required(&self.selection, "selection")?;
        let round = parse_optional(self.round_claim.as_deref(), Round::parse)?;
        let method = parse_optional(self.method_claim.as_deref(), Method::parse)?;

        Ok(Wager {
            id: Uuid::new_v4(),
            bettor: bettor.to_string(),
            sport: self.sport,
            contest_id,
            match_id,
            selection,
            stake: self.stake,
            base_odds: self.base_odds,
            round_claim: round.map(|r| r.to_string()),
            method_claim: method.map(|m| m.as_str().to_string()),
            resolved: false,
            won: None,
            reward: None,
            credited: false,
            placed_at: Utc::now(),
            resolved_at: None,
        })
    }
}

fn required(raw: &str, field: &'static str) -> Result<String, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::MissingField(field));
    }
    Ok(trimmed.to_string())
}

/// Places wagers: debit first, then append; a failed append is refunded.
pub struct WagerIntake {
    ledger: Arc<LedgerAccessor>,
    notifier: Arc<dyn Notifier>,
}

impl WagerIntake {
    pub fn new(ledger: Arc<LedgerAccessor>, notifier: Arc<dyn Notifier>) -> Self {
        Self { ledger, notifier }
    }

    pub async fn place_wager(&self, bettor: &str, pick: Pick) -> AppResult<WagerId> {
        let ids = self.place_slip(bettor, vec![pick]).await?;
        ids.into_iter()
            .next()
            .ok_or_else(|| WagerError::EmptySlip.into())
    }

    /// Place several picks for one bettor with a single debit of the total stake
    pub async fn place_slip(&self, bettor: &str, picks: Vec<Pick>) -> AppResult<Vec<WagerId>> {
        let bettor = bettor.trim();
        if bettor.is_empty() {
            return Err(ValidationError::MissingField("bettor").into());
        }
        if picks.is_empty() {
            return Err(WagerError::EmptySlip.into());
        }

        let wagers = picks
            .into_iter()
            .map(|pick| pick.into_wager(bettor))
            .collect::<Result<Vec<_>, _>>()?;

        self.ensure_open(&wagers).await?;

        let total = wagers
            .iter()
            .try_fold(0u64, |acc, w| acc.checked_add(w.stake))
            .ok_or(ValidationError::InvalidStake)?;

        let entry = self.ledger.debit(bettor, total).await?;
        info!("💸 Debited {} pts from {} (balance {})", total, bettor, entry.points);

        let appended = self
            .ledger
            .update_wager_log(|log| {
                for wager in &wagers {
                    if log.find(&wager.id).is_none() {
                        log.append(wager.clone());
                    }
                }
                Ok(Update::Write(()))
            })
            .await;

        if let Err(e) = appended {
            warn!("⚠️ Could not record wagers for {}: {}", bettor, e);
            match self.ledger.refund(bettor, total).await {
                Ok(entry) => info!("↩️ Refunded {} pts to {} (balance {})", total, bettor, entry.points),
                Err(refund_error) => error!(
                    "❌ Refund of {} pts to {} failed: {}",
                    total, bettor, refund_error
                ),
            }
            return Err(e);
        }

        for wager in &wagers {
            info!(
                "🎟️ Wager {} placed: {} on {} ({}/{}) at {}",
                wager.id, wager.stake, wager.selection, wager.contest_id, wager.match_id, wager.base_odds
            );
        }

        let ids = wagers.iter().map(|w| w.id).collect();
        let notices = wagers
            .into_iter()
            .map(|w| Notice::WagerPlaced {
                bettor: w.bettor,
                wager_id: w.id,
                sport: w.sport,
                contest_id: w.contest_id,
                match_id: w.match_id,
                selection: w.selection,
                stake: w.stake,
            })
            .collect();
        notify::dispatch(self.notifier.clone(), notices);

        Ok(ids)
    }

    /// Reject picks on contests that are settled, closed or already decided
    async fn ensure_open(&self, wagers: &[Wager]) -> AppResult<()> {
        let outcomes = self.ledger.outcome_log().await?;

        for wager in wagers {
            let Some(contest) = outcomes.contests.get(&wager.contest_id) else {
                continue;
            };
            if contest.sport != wager.sport {
                return Err(ValidationError::SportMismatch {
                    contest_id: wager.contest_id.clone(),
                    sport: contest.sport.to_string(),
                    requested: wager.sport.to_string(),
                }
                .into());
            }
            if contest.checked {
                return Err(ValidationError::ContestSettled(wager.contest_id.clone()).into());
            }
            if contest.closed {
                return Err(ValidationError::ContestClosed(wager.contest_id.clone()).into());
            }
            if contest.matches.contains_key(&wager.match_id) {
                return Err(ValidationError::MatchDecided {
                    contest_id: wager.contest_id.clone(),
                    match_id: wager.match_id.clone(),
                }
                .into());
            }
        }
        Ok(())
    }
}
