use chrono::Utc;
use rand::Rng;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::models::*;
use crate::error::{AppError, AppResult, StoreError, ValidationError, WagerError};
use crate::store::{DocumentStore, VersionToken};

/// Bounded exponential backoff for compare-and-set retries
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(25),
            max_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based): base * 2^(attempt-1),
    /// capped, with jitter over the upper half.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let ceiling = self
            .base_delay
            .saturating_mul(1u32 << exp)
            .min(self.max_delay);
        let ceiling_ms = ceiling.as_millis() as u64;
        if ceiling_ms == 0 {
            return ceiling;
        }
        let jittered = rand::rng().random_range(ceiling_ms / 2..=ceiling_ms);
        Duration::from_millis(jittered)
    }
}

/// What a mutation decided after seeing the fresh document
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Update<R> {
    /// Persist the mutated document
    Write(R),
    /// Nothing to persist
    Unchanged(R),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreditOutcome {
    Applied { balance: u64 },
    AlreadyApplied,
}

enum Attempt<R> {
    Done(R),
    Retry(StoreError),
}

/// Typed access to the ledger documents. Every mutation goes through
/// [`LedgerAccessor::update`], which re-reads and re-applies on conflict.
pub struct LedgerAccessor {
    store: Arc<dyn DocumentStore>,
    retry: RetryPolicy,
}

impl LedgerAccessor {
    pub fn new(store: Arc<dyn DocumentStore>, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    // ========== RAW DOCUMENT OPERATIONS ==========

    /// Read and decode a document with its version token
    pub async fn read_document<T: DeserializeOwned>(
        &self,
        key: &str,
    ) -> AppResult<(Option<T>, VersionToken)> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.store.read(key).await {
                Ok(doc) => {
                    let body = doc.body.map(|value| decode(key, value)).transpose()?;
                    return Ok((body, doc.version));
                }
                Err(e) => self.backoff_or_give_up(key, attempt, e).await?,
            }
        }
    }

    /// Single compare-and-set write. Conflicts are returned to the caller.
    pub async fn write_document<T: Serialize>(
        &self,
        key: &str,
        document: &T,
        expected: VersionToken,
    ) -> Result<VersionToken, StoreError> {
        self.store.write(key, encode(key, document)?, expected).await
    }

    /// Read-modify-write with retry. `mutate` sees the freshly read document
    /// (`None` if absent) on every attempt and must be safe to re-run.
    pub async fn update<T, R, F>(&self, key: &str, mut mutate: F) -> AppResult<R>
    where
        T: Serialize + DeserializeOwned + Send,
        R: Send,
        F: FnMut(&mut Option<T>) -> AppResult<Update<R>> + Send,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.try_update(key, &mut mutate).await? {
                Attempt::Done(r) => {
                    if attempt > 1 {
                        debug!("✓ {} committed after {} attempts", key, attempt);
                    }
                    return Ok(r);
                }
                Attempt::Retry(e) => self.backoff_or_give_up(key, attempt, e).await?,
            }
        }
    }

    async fn try_update<T, R, F>(&self, key: &str, mutate: &mut F) -> AppResult<Attempt<R>>
    where
        T: Serialize + DeserializeOwned + Send,
        R: Send,
        F: FnMut(&mut Option<T>) -> AppResult<Update<R>> + Send,
    {
        let current = match self.store.read(key).await {
            Ok(doc) => doc,
            Err(e) => return Ok(Attempt::Retry(e)),
        };
        let mut document: Option<T> = current
            .body
            .map(|value| decode(key, value))
            .transpose()?;

        let result = match mutate(&mut document)? {
            Update::Unchanged(r) => return Ok(Attempt::Done(r)),
            Update::Write(r) => r,
        };

        let document = document.ok_or_else(|| {
            AppError::Internal(format!("mutation of {} produced no document", key))
        })?;
        let body = encode(key, &document)?;

        match self.store.write(key, body, current.version).await {
            Ok(_) => Ok(Attempt::Done(result)),
            Err(e @ StoreError::Corrupt { .. }) => Err(e.into()),
            Err(e) => Ok(Attempt::Retry(e)),
        }
    }

    async fn backoff_or_give_up(&self, key: &str, attempt: u32, error: StoreError) -> AppResult<()> {
        if let StoreError::Corrupt { .. } = error {
            return Err(error.into());
        }

        if attempt >= self.retry.max_attempts {
            warn!("❌ {} still failing after {} attempts: {}", key, attempt, error);
            return Err(AppError::PersistenceUnavailable {
                key: key.to_string(),
                attempts: attempt,
                reason: error.to_string(),
            });
        }

        let delay = self.retry.delay_for(attempt);
        debug!(
            "🔁 Retrying {} (attempt {}/{}) in {:?}: {}",
            key, attempt, self.retry.max_attempts, delay, error
        );
        tokio::time::sleep(delay).await;
        Ok(())
    }

    // ========== BALANCE OPERATIONS ==========

    pub async fn balance(&self, user: &str) -> AppResult<Option<BalanceEntry>> {
        let (entry, _) = self.read_document(&keys::balance(user)).await?;
        Ok(entry)
    }

    pub async fn balances(&self) -> AppResult<Vec<BalanceEntry>> {
        let keys = self
            .store
            .keys_with_prefix(keys::BALANCE_PREFIX)
            .await
            .map_err(|e| AppError::PersistenceUnavailable {
                key: keys::BALANCE_PREFIX.to_string(),
                attempts: 1,
                reason: e.to_string(),
            })?;

        let mut entries = Vec::with_capacity(keys.len());
        for key in keys {
            if let (Some(entry), _) = self.read_document::<BalanceEntry>(&key).await? {
                entries.push(entry);
            }
        }
        Ok(entries)
    }

    pub async fn create_account(&self, entry: BalanceEntry) -> AppResult<BalanceEntry> {
        let key = keys::balance(&entry.user);
        let created = self
            .update(&key, |slot: &mut Option<BalanceEntry>| {
                if slot.is_some() {
                    return Err(ValidationError::DuplicateAccount(entry.user.clone()).into());
                }
                *slot = Some(entry.clone());
                Ok(Update::Write(entry.clone()))
            })
            .await?;

        info!("👤 Account created: {} ({} pts)", created.user, created.points);
        Ok(created)
    }

    /// Take `amount` points from `user`. Fails without writing if the balance is short.
    pub async fn debit(&self, user: &str, amount: u64) -> AppResult<BalanceEntry> {
        self.update(&keys::balance(user), |slot: &mut Option<BalanceEntry>| {
            let entry = slot
                .as_mut()
                .ok_or_else(|| WagerError::UnknownBettor(user.to_string()))?;

            if !entry.has_available(amount) {
                return Err(WagerError::InsufficientBalance {
                    required: amount,
                    available: entry.points,
                }
                .into());
            }

            entry.points -= amount;
            entry.updated_at = Utc::now();
            Ok(Update::Write(entry.clone()))
        })
        .await
    }

    /// Credit winnings for one wager. A receipt on the entry makes repeats no-ops.
    pub async fn credit_once(
        &self,
        user: &str,
        wager_id: WagerId,
        amount: u64,
    ) -> AppResult<CreditOutcome> {
        self.update(&keys::balance(user), |slot: &mut Option<BalanceEntry>| {
            let entry = slot
                .as_mut()
                .ok_or_else(|| AppError::NotFound(format!("Balance entry for {}", user)))?;

            if entry.was_credited(&wager_id) {
                return Ok(Update::Unchanged(CreditOutcome::AlreadyApplied));
            }

            entry.points = entry.points.saturating_add(amount);
            entry.credit_receipts.insert(wager_id);
            entry.updated_at = Utc::now();
            Ok(Update::Write(CreditOutcome::Applied {
                balance: entry.points,
            }))
        })
        .await
    }

    /// Give back a debit whose wager could not be recorded
    pub async fn refund(&self, user: &str, amount: u64) -> AppResult<BalanceEntry> {
        self.update(&keys::balance(user), |slot: &mut Option<BalanceEntry>| {
            let entry = slot
                .as_mut()
                .ok_or_else(|| WagerError::UnknownBettor(user.to_string()))?;
            entry.points = entry.points.saturating_add(amount);
            entry.updated_at = Utc::now();
            Ok(Update::Write(entry.clone()))
        })
        .await
    }

    /// Explicit admin overwrite of points and profile. Credit receipts are kept.
    pub async fn admin_edit(
        &self,
        user: &str,
        points: u64,
        color: Option<String>,
        discord: Option<String>,
    ) -> AppResult<BalanceEntry> {
        let edited = self
            .update(&keys::balance(user), |slot: &mut Option<BalanceEntry>| {
                let entry = slot
                    .as_mut()
                    .ok_or_else(|| AppError::NotFound(format!("Account {}", user)))?;
                entry.points = points;
                entry.color = color.clone();
                entry.discord = discord.clone();
                entry.updated_at = Utc::now();
                Ok(Update::Write(entry.clone()))
            })
            .await?;

        warn!("🛠️ Admin edit on {}: balance set to {}", user, points);
        Ok(edited)
    }

    // ========== WAGER LOG ==========

    pub async fn wager_log(&self) -> AppResult<WagerLog> {
        let (log, _) = self.read_document(keys::WAGER_LOG).await?;
        Ok(log.unwrap_or_default())
    }

    pub async fn update_wager_log<R, F>(&self, mut mutate: F) -> AppResult<R>
    where
        R: Send,
        F: FnMut(&mut WagerLog) -> AppResult<Update<R>> + Send,
    {
        self.update(keys::WAGER_LOG, |slot: &mut Option<WagerLog>| {
            mutate(slot.get_or_insert_with(WagerLog::default))
        })
        .await
    }

    // ========== OUTCOME LOG ==========

    pub async fn outcome_log(&self) -> AppResult<OutcomeLog> {
        let (log, _) = self.read_document(keys::OUTCOME_LOG).await?;
        Ok(log.unwrap_or_default())
    }

    pub async fn update_outcome_log<R, F>(&self, mut mutate: F) -> AppResult<R>
    where
        R: Send,
        F: FnMut(&mut OutcomeLog) -> AppResult<Update<R>> + Send,
    {
        self.update(keys::OUTCOME_LOG, |slot: &mut Option<OutcomeLog>| {
            mutate(slot.get_or_insert_with(OutcomeLog::default))
        })
        .await
    }
}

fn decode<T: DeserializeOwned>(key: &str, value: serde_json::Value) -> Result<T, StoreError> {
    serde_json::from_value(value).map_err(|e| StoreError::Corrupt {
        key: key.to_string(),
        message: e.to_string(),
    })
}

fn encode<T: Serialize>(key: &str, document: &T) -> Result<serde_json::Value, StoreError> {
    serde_json::to_value(document).map_err(|e| StoreError::Corrupt {
        key: key.to_string(),
        message: e.to_string(),
    })
}
