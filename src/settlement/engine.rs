use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::reward::{self, Claims, RewardDecision};
use crate::error::{AppError, AppResult};
use crate::ledger::models::{ContestResults, SettlementState, ValidatedResult, WagerId};
use crate::ledger::{CreditOutcome, LedgerAccessor, Update};
use crate::notify::{self, Notice, Notifier};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PassStatus {
    /// Nothing left to settle
    Completed,
    /// Some wagers are still pending or failed; the next pass picks them up
    PartiallyCompleted,
    /// The store stayed unavailable; the pass stopped early
    Failed,
}

/// A wager or match result the pass could not settle
#[derive(Debug, Clone, Serialize)]
pub struct SettlementFailure {
    pub contest_id: String,
    pub match_id: Option<String>,
    pub wager_id: Option<WagerId>,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SettlementReport {
    pub status: PassStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub contests_scanned: usize,
    pub contests_checked: usize,
    pub wagers_resolved: usize,
    pub wagers_won: usize,
    pub credits_applied: usize,
    pub points_credited: u64,
    /// Wagers on scanned contests that are not settled yet
    pub pending_wagers: usize,
    pub failures: Vec<SettlementFailure>,
}

impl SettlementReport {
    fn begin() -> Self {
        let now = Utc::now();
        Self {
            status: PassStatus::Completed,
            started_at: now,
            finished_at: now,
            contests_scanned: 0,
            contests_checked: 0,
            wagers_resolved: 0,
            wagers_won: 0,
            credits_applied: 0,
            points_credited: 0,
            pending_wagers: 0,
            failures: Vec::new(),
        }
    }

    fn record(&mut self, contest_id: &str, match_id: Option<&str>, wager_id: Option<WagerId>, reason: String) {
        self.failures.push(SettlementFailure {
            contest_id: contest_id.to_string(),
            match_id: match_id.map(str::to_string),
            wager_id,
            reason,
        });
    }

    fn finish(mut self, halted: bool) -> Self {
        self.finished_at = Utc::now();
        self.status = if halted {
            PassStatus::Failed
        } else if !self.failures.is_empty() || self.pending_wagers > 0 {
            PassStatus::PartiallyCompleted
        } else {
            PassStatus::Completed
        };
        self
    }
}

struct CreditTask {
    wager_id: WagerId,
    bettor: String,
    reward: u64,
}

/// Winnings credited this pass, keyed by (bettor, contest)
type CreditTally = BTreeMap<(String, String), u64>;

/// Reconciles recorded match results against pending wagers.
///
/// Safe to run repeatedly and concurrently: a wager is resolved at most once
/// in the wager log, its credit is fenced by a receipt on the bettor's balance
/// entry, and a contest is only marked checked once every wager on it is settled.
pub struct SettlementEngine {
    ledger: Arc<LedgerAccessor>,
    notifier: Arc<dyn Notifier>,
}

impl SettlementEngine {
    pub fn new(ledger: Arc<LedgerAccessor>, notifier: Arc<dyn Notifier>) -> Self {
        Self { ledger, notifier }
    }

    pub async fn run_settlement_pass(&self) -> SettlementReport {
        let mut report = SettlementReport::begin();
        let mut tally = CreditTally::new();
        let mut halted = false;

        info!("🔄 Settlement pass started");

        let outcomes = match self.ledger.outcome_log().await {
            Ok(outcomes) => outcomes,
            Err(e) => {
                error!("❌ Could not read outcome log: {}", e);
                report.record("*", None, None, e.to_string());
                return report.finish(true);
            }
        };

        for (contest_id, contest) in outcomes.unchecked() {
            report.contests_scanned += 1;

            match self.settle_contest(contest_id, contest, &mut report, &mut tally).await {
                Ok(()) => {}
                Err(e @ AppError::PersistenceUnavailable { .. }) => {
                    error!("❌ Settlement halted on {}: {}", contest_id, e);
                    report.record(contest_id, None, None, e.to_string());
                    halted = true;
                    break;
                }
                Err(e) => {
                    warn!("⚠️ Contest {} skipped: {}", contest_id, e);
                    report.record(contest_id, None, None, e.to_string());
                }
            }
        }

        let notices: Vec<Notice> = tally
            .into_iter()
            .map(|((bettor, contest_id), amount_credited)| Notice::Credited {
                bettor,
                amount_credited,
                contest_id,
            })
            .collect();
        notify::dispatch(self.notifier.clone(), notices);

        let report = report.finish(halted);
        info!(
            "📊 Settlement pass {:?}: {} contests scanned, {} checked, {} wagers resolved, {} pts credited, {} failures",
            report.status,
            report.contests_scanned,
            report.contests_checked,
            report.wagers_resolved,
            report.points_credited,
            report.failures.len()
        );
        report
    }

    async fn settle_contest(
        &self,
        contest_id: &str,
        contest: &ContestResults,
        report: &mut SettlementReport,
        tally: &mut CreditTally,
    ) -> AppResult<()> {
        // Match results come from the operator surface and are re-validated here
        let mut results: BTreeMap<&str, ValidatedResult> = BTreeMap::new();
        let mut blocked = false;
        for (match_id, result) in &contest.matches {
            match result.validate(contest_id, match_id) {
                Ok(validated) => {
                    results.insert(match_id.as_str(), validated);
                }
                Err(e) => {
                    warn!("⚠️ Invalid result for {}/{}: {}", contest_id, match_id, e);
                    report.record(contest_id, Some(match_id.as_str()), None, e.to_string());
                    blocked = true;
                }
            }
        }

        // Stage resolutions against a fresh wager log
        let log = self.ledger.wager_log().await?;
        let mut staged: Vec<(WagerId, RewardDecision)> = Vec::new();
        for wager in log
            .referencing(contest_id, contest.sport)
            .filter(|w| !w.resolved)
        {
            let Some(outcome) = results.get(wager.match_id.as_str()) else {
                continue;
            };
            match Claims::of(wager) {
                Ok(claims) => staged.push((wager.id, reward::compute(wager, &claims, outcome))),
                Err(e) => {
                    warn!("⚠️ Wager {} has a malformed claim: {}", wager.id, e);
                    report.record(
                        contest_id,
                        Some(wager.match_id.as_str()),
                        Some(wager.id),
                        e.to_string(),
                    );
                }
            }
        }

        if !staged.is_empty() {
            let resolved_at = Utc::now();
            let applied = self
                .ledger
                .update_wager_log(|log| {
                    let mut applied = Vec::new();
                    for (id, decision) in &staged {
                        // Re-located by id; another pass may have resolved it already
                        if let Some(wager) = log.find_mut(id).filter(|w| !w.resolved) {
                            wager.resolved = true;
                            wager.won = Some(decision.won);
                            wager.reward = Some(decision.reward);
                            wager.resolved_at = Some(resolved_at);
                            applied.push(*decision);
                        }
                    }
                    Ok(if applied.is_empty() {
                        Update::Unchanged(applied)
                    } else {
                        Update::Write(applied)
                    })
                })
                .await?;

            report.wagers_resolved += applied.len();
            report.wagers_won += applied.iter().filter(|d| d.won).count();
            debug!("✓ {} wagers resolved on {}", applied.len(), contest_id);
        }

        // Credit every won wager not yet confirmed, including ones left by an earlier pass
        let log = self.ledger.wager_log().await?;
        let settling: Vec<CreditTask> = log
            .referencing(contest_id, contest.sport)
            .filter(|w| w.state() == SettlementState::Settling)
            .map(|w| CreditTask {
                wager_id: w.id,
                bettor: w.bettor.clone(),
                reward: w.reward.unwrap_or(0),
            })
            .collect();

        let mut confirmed: Vec<WagerId> = Vec::new();
        let mut halted: Option<AppError> = None;
        for task in &settling {
            match self
                .ledger
                .credit_once(&task.bettor, task.wager_id, task.reward)
                .await
            {
                Ok(CreditOutcome::Applied { balance }) => {
                    info!(
                        "✅ Credited {} pts to {} for wager {} (balance {})",
                        task.reward, task.bettor, task.wager_id, balance
                    );
                    report.credits_applied += 1;
                    report.points_credited += task.reward;
                    *tally
                        .entry((task.bettor.clone(), contest_id.to_string()))
                        .or_default() += task.reward;
                    confirmed.push(task.wager_id);
                }
                Ok(CreditOutcome::AlreadyApplied) => {
                    debug!("✓ Wager {} was already credited", task.wager_id);
                    confirmed.push(task.wager_id);
                }
                Err(e @ AppError::PersistenceUnavailable { .. }) => {
                    halted = Some(e);
                    break;
                }
                Err(e) => {
                    warn!("⚠️ Could not credit wager {}: {}", task.wager_id, e);
                    report.record(contest_id, None, Some(task.wager_id), e.to_string());
                }
            }
        }

        if !confirmed.is_empty() {
            self.ledger
                .update_wager_log(|log| {
                    let mut marked = 0usize;
                    for id in &confirmed {
                        if let Some(wager) = log
                            .find_mut(id)
                            .filter(|w| w.state() == SettlementState::Settling)
                        {
                            wager.credited = true;
                            marked += 1;
                        }
                    }
                    Ok(if marked == 0 {
                        Update::Unchanged(())
                    } else {
                        Update::Write(())
                    })
                })
                .await?;
        }

        if let Some(e) = halted {
            return Err(e);
        }

        let log = self.ledger.wager_log().await?;
        let pending = log
            .referencing(contest_id, contest.sport)
            .filter(|w| !w.is_settled())
            .count();
        report.pending_wagers += pending;

        if pending > 0 || blocked || !contest.closed {
            debug!(
                "⏳ {} stays open: {} pending, closed={}, blocked={}",
                contest_id, pending, contest.closed, blocked
            );
            return Ok(());
        }

        let checked = self
            .ledger
            .update_outcome_log(|outcomes| match outcomes.contests.get_mut(contest_id) {
                Some(c) if c.closed && !c.checked => {
                    c.checked = true;
                    c.checked_at = Some(Utc::now());
                    Ok(Update::Write(true))
                }
                _ => Ok(Update::Unchanged(false)),
            })
            .await?;

        if checked {
            report.contests_checked += 1;
            info!("🏁 Contest {} fully settled", contest_id);
        }
        Ok(())
    }
}
