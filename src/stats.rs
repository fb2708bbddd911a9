// Read-only statistics over the wager log

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::ledger::models::{SettlementState, Sport, Wager, WagerId, WagerLog};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreakEntry {
    pub user: String,
    pub longest_streak: u32,
}

/// Longest run of consecutive won wagers per user, leader first.
///
/// Wagers are taken in placement order. Pending wagers neither extend nor
/// break a run. Users who never won are left out.
pub fn longest_streaks(log: &WagerLog, sport: Sport) -> Vec<StreakEntry> {
    let mut entries: Vec<StreakEntry> = log
        .bets
        .iter()
        .filter_map(|(user, wagers)| {
            let mut ordered: Vec<&Wager> = wagers.iter().filter(|w| w.sport == sport).collect();
            ordered.sort_by_key(|w| w.placed_at);

            let mut current = 0u32;
            let mut longest = 0u32;
            for wager in ordered.into_iter().filter(|w| w.resolved) {
                if wager.won == Some(true) {
                    current += 1;
                    longest = longest.max(current);
                } else {
                    current = 0;
                }
            }

            (longest > 0).then(|| StreakEntry {
                user: user.clone(),
                longest_streak: longest,
            })
        })
        .collect();

    entries.sort_by(|a, b| {
        b.longest_streak
            .cmp(&a.longest_streak)
            .then_with(|| a.user.cmp(&b.user))
    });
    entries
}

/// One line of a user's wager history
#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    pub wager_id: WagerId,
    pub sport: Sport,
    pub contest_id: String,
    pub match_id: String,
    pub selection: String,
    pub stake: u64,
    pub state: SettlementState,
    pub won: Option<bool>,
    /// +reward when won, -stake when lost, 0 while pending
    pub net: i64,
    pub placed_at: DateTime<Utc>,
}

impl From<&Wager> for HistoryEntry {
    fn from(w: &Wager) -> Self {
        Self {
            wager_id: w.id,
            sport: w.sport,
            contest_id: w.contest_id.clone(),
            match_id: w.match_id.clone(),
            selection: w.selection.clone(),
            stake: w.stake,
            state: w.state(),
            won: w.won,
            net: w.net_result(),
            placed_at: w.placed_at,
        }
    }
}

/// A user's wagers, newest first
pub fn history(log: &WagerLog, user: &str) -> Vec<HistoryEntry> {
    let mut entries: Vec<HistoryEntry> = log.for_user(user).iter().map(HistoryEntry::from).collect();
    entries.sort_by(|a, b| b.placed_at.cmp(&a.placed_at));
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::fixtures::wager;
    use chrono::Duration;

    fn settled(user: &str, minutes: i64, won: Option<bool>) -> Wager {
        let mut w = wager(user, "UFC 300", "A vs B", "A");
        w.placed_at = Utc::now() - Duration::minutes(100 - minutes);
        if let Some(won) = won {
            w.resolved = true;
            w.won = Some(won);
            w.reward = Some(if won { 190 } else { 0 });
            w.credited = won;
        }
        w
    }

    #[test]
    fn test_longest_streak_by_placement_order() {
        let mut log = WagerLog::default();
        // Appended out of order on purpose
        for (minute, won) in [(3, Some(true)), (1, Some(true)), (2, Some(false)), (4, None), (5, Some(true))] {
            log.append(settled("ana", minute, won));
        }
        for minute in 1..=3 {
            log.append(settled("bo", minute, Some(true)));
        }
        log.append(settled("cy", 1, Some(false)));

        let streaks = longest_streaks(&log, Sport::Ufc);
        assert_eq!(
            streaks,
            vec![
                StreakEntry { user: "bo".into(), longest_streak: 3 },
                // 1 won, 2 lost, 3 won, 4 pending, 5 won
                StreakEntry { user: "ana".into(), longest_streak: 2 },
            ]
        );
    }

    #[test]
    fn test_streaks_are_per_sport() {
        let mut log = WagerLog::default();
        log.append(settled("ana", 1, Some(true)));
        assert!(longest_streaks(&log, Sport::Csgo).is_empty());
    }

    #[test]
    fn test_history_newest_first_with_signed_results() {
        let mut log = WagerLog::default();
        log.append(settled("ana", 1, Some(true)));
        log.append(settled("ana", 2, Some(false)));
        log.append(settled("ana", 3, None));

        let history = history(&log, "ana");
        let nets: Vec<i64> = history.iter().map(|h| h.net).collect();
        assert_eq!(nets, vec![0, -100, 190]);
        assert_eq!(history[0].state, SettlementState::Unresolved);
        assert!(super::history(&log, "nobody").is_empty());
    }
}
