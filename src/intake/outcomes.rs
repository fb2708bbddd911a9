use chrono::Utc;
use std::sync::Arc;
use tracing::info;

use crate::error::{AppError, AppResult, ValidationError};
use crate::ledger::models::*;
use crate::ledger::{LedgerAccessor, Update};

/// Operator boundary for match results. Input is untrusted.
pub struct OutcomeIntake {
    ledger: Arc<LedgerAccessor>,
}

impl OutcomeIntake {
    pub fn new(ledger: Arc<LedgerAccessor>) -> Self {
        Self { ledger }
    }

    /// Record (or correct) the result of one match
    pub async fn record_result(
        &self,
        contest_id: &str,
        sport: Sport,
        match_id: &str,
        winning_selection: &str,
        round: Option<&str>,
        method: Option<&str>,
    ) -> AppResult<ContestResults> {
        let contest_id = contest_id.trim();
        let match_id = match_id.trim();
        if contest_id.is_empty() {
            return Err(ValidationError::MissingField("contest_id").into());
        }
        if match_id.is_empty() {
            return Err(ValidationError::MissingField("match_id").into());
        }

        let submitted = MatchResult {
            winning_selection: winning_selection.trim().to_string(),
            round: round.map(str::to_string),
            method: method.map(str::to_string),
            recorded_at: Utc::now(),
        };
        let validated = submitted.validate(contest_id, match_id)?;
        let result = MatchResult {
            round: validated.round.map(|r| r.to_string()),
            method: validated.method.map(|m| m.as_str().to_string()),
            ..submitted
        };

        let contest = self
            .ledger
            .update_outcome_log(|outcomes| {
                let contest = outcomes
                    .contests
                    .entry(contest_id.to_string())
                    .or_insert_with(|| ContestResults::new(sport));

                if contest.sport != sport {
                    return Err(ValidationError::SportMismatch {
                        contest_id: contest_id.to_string(),
                        sport: contest.sport.to_string(),
                        requested: sport.to_string(),
                    }
                    .into());
                }
                if contest.checked {
                    return Err(ValidationError::ContestSettled(contest_id.to_string()).into());
                }
                if contest.closed {
                    return Err(ValidationError::ContestClosed(contest_id.to_string()).into());
                }

                contest.matches.insert(match_id.to_string(), result.clone());
                Ok(Update::Write(contest.clone()))
            })
            .await?;

        info!(
            "📝 Result recorded for {}/{}: {} {}",
            contest_id,
            match_id,
            result.winning_selection,
            [result.round.as_deref(), result.method.as_deref()]
                .into_iter()
                .flatten()
                .collect::<Vec<_>>()
                .join(" ")
        );
        Ok(contest)
    }

    /// Declare every result of a contest recorded so settlement may check it
    pub async fn close_contest(&self, contest_id: &str) -> AppResult<ContestResults> {
        let contest = self
            .ledger
            .update_outcome_log(|outcomes| {
                let contest = outcomes
                    .contests
                    .get_mut(contest_id)
                    .ok_or_else(|| AppError::NotFound(format!("Contest {}", contest_id)))?;

                if contest.closed {
                    return Ok(Update::Unchanged(contest.clone()));
                }
                contest.closed = true;
                Ok(Update::Write(contest.clone()))
            })
            .await?;

        info!("🔒 Contest {} closed with {} results", contest_id, contest.matches.len());
        Ok(contest)
    }

    pub async fn contest(&self, contest_id: &str) -> AppResult<ContestResults> {
        self.ledger
            .outcome_log()
            .await?
            .contests
            .remove(contest_id)
            .ok_or_else(|| AppError::NotFound(format!("Contest {}", contest_id)))
    }

    pub async fn contests(&self) -> AppResult<OutcomeLog> {
        self.ledger.outcome_log().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::RetryPolicy;
    use crate::store::MemoryDocumentStore;

    fn intake() -> OutcomeIntake {
        let store = Arc::new(MemoryDocumentStore::new());
        OutcomeIntake::new(Arc::new(LedgerAccessor::new(store, RetryPolicy::default())))
    }

    #[tokio::test]
    async fn test_record_result_canonicalises_claims() {
        let intake = intake();
        let contest = intake
            .record_result("UFC 300", Sport::Ufc, "Pereira vs Hill", " Pereira ", Some("r1"), Some("ko"))
            .await
            .unwrap();

        let result = &contest.matches["Pereira vs Hill"];
        assert_eq!(result.winning_selection, "Pereira");
        assert_eq!(result.round.as_deref(), Some("R1"));
        assert_eq!(result.method.as_deref(), Some("KO"));
        assert!(!contest.closed);
    }

    #[tokio::test]
    async fn test_rejects_empty_winner_and_bad_claims() {
        let intake = intake();
        assert!(matches!(
            intake
                .record_result("UFC 300", Sport::Ufc, "A vs B", "  ", None, None)
                .await
                .unwrap_err(),
            AppError::Validation(ValidationError::EmptyWinner { .. })
        ));
        assert!(intake
            .record_result("UFC 300", Sport::Ufc, "A vs B", "A", Some("R6"), None)
            .await
            .is_err());
        assert!(intake.contests().await.unwrap().contests.is_empty());
    }

    #[tokio::test]
    async fn test_closed_contest_rejects_results() {
        let intake = intake();
        intake
            .record_result("Major", Sport::Csgo, "NaVi vs G2", "NaVi", None, None)
            .await
            .unwrap();

        assert!(matches!(
            intake
                .record_result("Major", Sport::Ufc, "X vs Y", "X", None, None)
                .await
                .unwrap_err(),
            AppError::Validation(ValidationError::SportMismatch { .. })
        ));

        let closed = intake.close_contest("Major").await.unwrap();
        assert!(closed.closed);
        // Closing twice is a no-op
        assert!(intake.close_contest("Major").await.unwrap().closed);

        assert!(matches!(
            intake
                .record_result("Major", Sport::Csgo, "FaZe vs Vitality", "FaZe", None, None)
                .await
                .unwrap_err(),
            AppError::Validation(ValidationError::ContestClosed(_))
        ));
        assert!(matches!(
            intake.close_contest("Unknown").await.unwrap_err(),
            AppError::NotFound(_)
        ));
    }
}
