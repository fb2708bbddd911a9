use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use crate::error::{AppError, AppResult, ValidationError};
use crate::ledger::models::BalanceEntry;
use crate::ledger::LedgerAccessor;
use crate::notify::{self, Notice, Notifier};
use crate::stats::{self, HistoryEntry};

pub const DEFAULT_STARTING_POINTS: u64 = 1000;

/// Balance plus wager history for one user
#[derive(Debug, Clone, Serialize)]
pub struct Profile {
    pub account: BalanceEntry,
    pub history: Vec<HistoryEntry>,
}

pub struct AccountAdmin {
    ledger: Arc<LedgerAccessor>,
    notifier: Arc<dyn Notifier>,
    starting_points: u64,
}

impl AccountAdmin {
    pub fn new(ledger: Arc<LedgerAccessor>, notifier: Arc<dyn Notifier>, starting_points: u64) -> Self {
        Self {
            ledger,
            notifier,
            starting_points,
        }
    }

    pub async fn register(
        &self,
        user: &str,
        color: Option<String>,
        discord: Option<String>,
    ) -> AppResult<BalanceEntry> {
        let user = user.trim();
        if user.is_empty() {
            return Err(ValidationError::MissingField("user").into());
        }
        if user.contains('/') {
            return Err(ValidationError::InvalidInput(format!("User name may not contain '/': {}", user)).into());
        }

        let entry = self
            .ledger
            .create_account(BalanceEntry::new(user, self.starting_points, color, discord))
            .await?;

        notify::dispatch(
            self.notifier.clone(),
            vec![Notice::AccountCreated {
                user: entry.user.clone(),
                points: entry.points,
                discord: entry.discord.clone(),
            }],
        );
        Ok(entry)
    }

    /// Explicit administrative overwrite of a ledger entry
    pub async fn admin_edit(
        &self,
        user: &str,
        points: u64,
        color: Option<String>,
        discord: Option<String>,
    ) -> AppResult<BalanceEntry> {
        self.ledger.admin_edit(user, points, color, discord).await
    }

    pub async fn profile(&self, user: &str) -> AppResult<Profile> {
        let account = self
            .ledger
            .balance(user)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Account {}", user)))?;
        let log = self.ledger.wager_log().await?;

        Ok(Profile {
            history: stats::history(&log, user),
            account,
        })
    }

    pub async fn list_accounts(&self) -> AppResult<Vec<BalanceEntry>> {
        let accounts = self.ledger.balances().await?;
        info!("📋 Listed {} accounts", accounts.len());
        Ok(accounts)
    }
}
