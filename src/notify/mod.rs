// Best-effort notifications. Delivery never touches the ledger.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::error::{AppError, AppResult};
use crate::ledger::models::{Sport, WagerId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Notice {
    /// Winnings credited to one bettor for one contest in a settlement pass
    Credited {
        bettor: String,
        amount_credited: u64,
        contest_id: String,
    },
    WagerPlaced {
        bettor: String,
        wager_id: WagerId,
        sport: Sport,
        contest_id: String,
        match_id: String,
        selection: String,
        stake: u64,
    },
    AccountCreated {
        user: String,
        points: u64,
        discord: Option<String>,
    },
}

impl Notice {
    pub fn recipient(&self) -> &str {
        match self {
            Notice::Credited { bettor, .. } | Notice::WagerPlaced { bettor, .. } => bettor,
            Notice::AccountCreated { user, .. } => user,
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &'static str;

    async fn notify(&self, notice: &Notice) -> AppResult<()>;
}

/// Deliver notices on a background task. Failures are logged and dropped.
pub fn dispatch(notifier: Arc<dyn Notifier>, notices: Vec<Notice>) -> Option<JoinHandle<()>> {
    if notices.is_empty() {
        return None;
    }

    Some(tokio::spawn(async move {
        for notice in notices {
            if let Err(e) = notifier.notify(&notice).await {
                warn!(
                    "⚠️ {} notifier failed for {}: {}",
                    notifier.name(),
                    notice.recipient(),
                    e
                );
            }
        }
    }))
}

/// Writes notices to the log
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn notify(&self, notice: &Notice) -> AppResult<()> {
        match notice {
            Notice::Credited {
                bettor,
                amount_credited,
                contest_id,
            } => info!("📣 {} won {} pts on {}", bettor, amount_credited, contest_id),
            Notice::WagerPlaced {
                bettor,
                stake,
                selection,
                contest_id,
                ..
            } => info!("📣 {} staked {} on {} ({})", bettor, stake, selection, contest_id),
            Notice::AccountCreated { user, points, .. } => {
                info!("📣 Welcome {}: {} pts", user, points)
            }
        }
        Ok(())
    }
}

/// Forwards notices into an mpsc channel
pub struct ChannelNotifier {
    sender: mpsc::UnboundedSender<Notice>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notice>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl Notifier for ChannelNotifier {
    fn name(&self) -> &'static str {
        "channel"
    }

    async fn notify(&self, notice: &Notice) -> AppResult<()> {
        self.sender
            .send(notice.clone())
            .map_err(|_| AppError::ExternalError("notice receiver dropped".to_string()))
    }
}

/// POSTs each notice as JSON to a webhook (e.g. a Discord relay)
pub struct WebhookNotifier {
    url: String,
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(url: String) -> Self {
        Self {
            url,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn notify(&self, notice: &Notice) -> AppResult<()> {
        let response = self.client.post(&self.url).json(notice).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalError(format!(
                "Webhook returned {}: {}",
                status, error_text
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BrokenNotifier;

    #[async_trait]
    impl Notifier for BrokenNotifier {
        fn name(&self) -> &'static str {
            "broken"
        }

        async fn notify(&self, _notice: &Notice) -> AppResult<()> {
            Err(AppError::ExternalError("down".into()))
        }
    }

    fn credited(bettor: &str) -> Notice {
        Notice::Credited {
            bettor: bettor.into(),
            amount_credited: 228,
            contest_id: "UFC 300".into(),
        }
    }

    #[tokio::test]
    async fn test_channel_notifier_delivers_in_order() {
        let (notifier, mut rx) = ChannelNotifier::new();
        let handle = dispatch(Arc::new(notifier), vec![credited("ana"), credited("bo")]).unwrap();
        handle.await.unwrap();

        assert_eq!(rx.recv().await.unwrap().recipient(), "ana");
        assert_eq!(rx.recv().await.unwrap().recipient(), "bo");
    }

    #[tokio::test]
    async fn test_failures_are_swallowed() {
        let handle = dispatch(Arc::new(BrokenNotifier), vec![credited("ana")]).unwrap();
        assert!(handle.await.is_ok());
    }

    #[tokio::test]
    async fn test_nothing_to_dispatch() {
        assert!(dispatch(Arc::new(LogNotifier), Vec::new()).is_none());
    }

    #[test]
    fn test_notice_wire_shape() {
        let value = serde_json::to_value(credited("ana")).unwrap();
        assert_eq!(value["event"], "credited");
        assert_eq!(value["amount_credited"], 228);
    }
}
