use crate::types::enums::RoundStatus;
use serde::{Deserialize, Serialize};

/// Snapshot of an account at join time, embedded in the round aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub account_id: String,
    pub name: String,
    pub joined_at: i64,
    pub entry_fee_paid: i64,
    pub eliminated: bool,
    pub eliminated_at: Option<i64>,
    pub elimination_position: Option<u32>,
}

/// One spin-wheel round from creation to terminal state. The whole aggregate
/// lives in a single store row guarded by `version` (optimistic concurrency).
#[derive(Debug, Clone)]
pub struct Round {
    pub id: String,
    pub admin_id: String,
    pub status: RoundStatus,
    pub entry_fee: i64,
    pub min_participants: u32,
    pub max_participants: u32,
    pub winner_pct: u32,
    pub admin_pct: u32,
    pub app_pct: u32,
    pub winner_pool: i64,
    pub admin_pool: i64,
    pub app_pool: i64,
    pub participants: Vec<Participant>,
    /// Shuffled participant ids fixed at start; consumed one per tick.
    pub elimination_order: Vec<String>,
    pub elimination_index: u32,
    pub auto_start_at: i64,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
    pub winner_id: Option<String>,
    pub elimination_interval_ms: u64,
    pub auto_start_delay_ms: u64,
    pub version: i64,
    pub created_at: i64,
}

impl Round {
    pub fn is_full(&self) -> bool {
        self.participants.len() as u32 >= self.max_participants
    }

    pub fn participant(&self, account_id: &str) -> Option<&Participant> {
        self.participants.iter().find(|p| p.account_id == account_id)
    }

    pub fn participant_mut(&mut self, account_id: &str) -> Option<&mut Participant> {
        self.participants
            .iter_mut()
            .find(|p| p.account_id == account_id)
    }

    /// Count of participants still standing.
    pub fn remaining(&self) -> usize {
        self.participants.iter().filter(|p| !p.eliminated).count()
    }

    /// The single non-eliminated participant, if the round is down to one.
    pub fn survivor(&self) -> Option<&Participant> {
        let mut standing = self.participants.iter().filter(|p| !p.eliminated);
        let first = standing.next()?;
        if standing.next().is_some() {
            return None;
        }
        Some(first)
    }

    pub fn order_exhausted(&self) -> bool {
        self.elimination_index as usize >= self.elimination_order.len()
    }

    /// Apply one entry fee to the pools with the integer-exact split.
    pub fn add_pools(&mut self, fee: i64) {
        let (w, a, p) = split_fee(fee, self.winner_pct, self.admin_pct, self.app_pct);
        self.winner_pool += w;
        self.admin_pool += a;
        self.app_pool += p;
    }

    pub fn summary(&self) -> RoundSummary {
        RoundSummary {
            id: self.id.clone(),
            admin_id: self.admin_id.clone(),
            status: self.status,
            entry_fee: self.entry_fee,
            min_participants: self.min_participants,
            max_participants: self.max_participants,
            winner_pool: self.winner_pool,
            admin_pool: self.admin_pool,
            app_pool: self.app_pool,
            participant_count: self.participants.len() as u32,
            auto_start_at: self.auto_start_at,
            started_at: self.started_at,
            winner_id: self.winner_id.clone(),
        }
    }
}

/// Split one fee into (winner, admin, app) shares. Floor division per pool;
/// the remainder folds into the winner share so the parts always sum to the
/// fee exactly. No floating coins.
pub fn split_fee(fee: i64, winner_pct: u32, admin_pct: u32, app_pct: u32) -> (i64, i64, i64) {
    let mut winner = fee * winner_pct as i64 / 100;
    let admin = fee * admin_pct as i64 / 100;
    let app = fee * app_pct as i64 / 100;
    winner += fee - (winner + admin + app);
    (winner, admin, app)
}

/// Compact round view carried on broadcast events.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundSummary {
    pub id: String,
    pub admin_id: String,
    pub status: RoundStatus,
    pub entry_fee: i64,
    pub min_participants: u32,
    pub max_participants: u32,
    pub winner_pool: i64,
    pub admin_pool: i64,
    pub app_pool: i64,
    pub participant_count: u32,
    pub auto_start_at: i64,
    pub started_at: Option<i64>,
    pub winner_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_is_exact_for_even_fee() {
        let (w, a, p) = split_fee(100, 70, 20, 10);
        assert_eq!((w, a, p), (70, 20, 10));
    }

    #[test]
    fn split_folds_remainder_into_winner() {
        // 99 -> floor shares 69/19/9, remainder 2 goes to the winner pool
        let (w, a, p) = split_fee(99, 70, 20, 10);
        assert_eq!((w, a, p), (71, 19, 9));
        assert_eq!(w + a + p, 99);
    }

    #[test]
    fn split_sums_to_fee_across_range() {
        for fee in 1..=500 {
            let (w, a, p) = split_fee(fee, 70, 20, 10);
            assert_eq!(w + a + p, fee, "fee {}", fee);
            assert!(w >= 0 && a >= 0 && p >= 0);
        }
    }

    fn participant(id: &str, eliminated: bool) -> Participant {
        Participant {
            account_id: id.to_string(),
            name: id.to_string(),
            joined_at: 0,
            entry_fee_paid: 100,
            eliminated,
            eliminated_at: None,
            elimination_position: None,
        }
    }

    #[test]
    fn survivor_requires_exactly_one_standing() {
        let mut round = Round {
            id: "r".into(),
            admin_id: "a".into(),
            status: RoundStatus::InProgress,
            entry_fee: 100,
            min_participants: 3,
            max_participants: 5,
            winner_pct: 70,
            admin_pct: 20,
            app_pct: 10,
            winner_pool: 0,
            admin_pool: 0,
            app_pool: 0,
            participants: vec![participant("u1", true), participant("u2", false)],
            elimination_order: vec!["u1".into(), "u2".into()],
            elimination_index: 1,
            auto_start_at: 0,
            started_at: Some(0),
            completed_at: None,
            winner_id: None,
            elimination_interval_ms: 3000,
            auto_start_delay_ms: 60000,
            version: 1,
            created_at: 0,
        };
        assert_eq!(round.survivor().unwrap().account_id, "u2");
        assert_eq!(round.remaining(), 1);

        round.participants[0].eliminated = false;
        assert!(round.survivor().is_none());
        assert_eq!(round.remaining(), 2);
    }
}
