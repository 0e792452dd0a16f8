//! The round state machine. Every operation is one store transaction; events
//! go out strictly after commit, while the writer lock is still held, so
//! subscribers observe them in commit order.

use crate::error::{EngineError, Result};
use crate::ledger;
use crate::storage::{sqlite, Store};
use crate::types::{
    new_id, now_ms, AbortReason, Account, EventPublisher, Participant, Role, Round, RoundEvent,
    RoundStatus, TransactionRecord, TxKind,
};
use rand::seq::SliceRandom;
use rand::thread_rng;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

/// Engine parameters fixed at startup. Each created round snapshots the
/// values it needs, so a restart with new config never rewrites live rounds.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub initial_balance: i64,
    pub min_participants: u32,
    pub auto_start_delay_ms: u64,
    pub elimination_interval_ms: u64,
    pub winner_pct: u32,
    pub admin_pct: u32,
    pub app_pct: u32,
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.winner_pct + self.admin_pct + self.app_pct != 100 {
            return Err(EngineError::validation(
                "winner_pct + admin_pct + app_pct must equal 100",
            ));
        }
        if self.min_participants < 3 || self.min_participants > 1000 {
            return Err(EngineError::validation(
                "min_participants must be between 3 and 1000",
            ));
        }
        if self.initial_balance < 0 {
            return Err(EngineError::validation("initial_balance must not be negative"));
        }
        if self.elimination_interval_ms == 0 || self.auto_start_delay_ms == 0 {
            return Err(EngineError::validation(
                "elimination_interval_ms and auto_start_delay_ms must be positive",
            ));
        }
        Ok(())
    }
}

pub struct RoundService {
    store: Arc<Store>,
    publisher: Arc<dyn EventPublisher>,
    cfg: EngineConfig,
}

impl RoundService {
    pub fn new(store: Arc<Store>, publisher: Arc<dyn EventPublisher>, cfg: EngineConfig) -> Self {
        Self {
            store,
            publisher,
            cfg,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.cfg
    }

    // ---- accounts ----

    /// Create an account funded with the configured initial balance. The
    /// grant is the ledger baseline and leaves no transaction record.
    pub fn register_account(
        &self,
        name: &str,
        email: &str,
        password_hash: &str,
        role: Role,
    ) -> Result<Account> {
        if name.trim().is_empty() {
            return Err(EngineError::validation("name must not be empty"));
        }
        if !email.contains('@') {
            return Err(EngineError::validation("email is malformed"));
        }
        let mut conn = self.store.lock();
        let tx = conn.transaction()?;
        if sqlite::find_account_by_email(&tx, email)?.is_some() {
            return Err(EngineError::conflict(format!(
                "email {} is already registered",
                email
            )));
        }
        let account = Account {
            id: new_id(),
            name: name.to_string(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            role,
            balance: self.cfg.initial_balance,
            active: true,
            last_login: None,
            created_at: now_ms(),
        };
        sqlite::insert_account(&tx, &account)?;
        tx.commit()?;
        info!(account_id = %account.id, role = role.as_str(), "account registered");
        Ok(account)
    }

    pub fn set_account_active(&self, account_id: &str, active: bool) -> Result<()> {
        let conn = self.store.lock();
        sqlite::set_account_active(&conn, account_id, active)
    }

    // ---- state machine ----

    pub fn create_round(
        &self,
        admin_id: &str,
        entry_fee: i64,
        max_participants: u32,
    ) -> Result<Round> {
        if entry_fee < 1 {
            return Err(EngineError::validation("entry_fee must be at least 1"));
        }
        if !(3..=1000).contains(&max_participants) {
            return Err(EngineError::validation(
                "max_participants must be between 3 and 1000",
            ));
        }
        if max_participants < self.cfg.min_participants {
            return Err(EngineError::validation(
                "max_participants must not be below min_participants",
            ));
        }
        let now = now_ms();
        let mut conn = self.store.lock();
        let tx = conn.transaction()?;
        let admin = sqlite::get_account(&tx, admin_id)?;
        if !admin.is_admin() {
            return Err(EngineError::authorization("only admins can create rounds"));
        }
        if sqlite::active_round(&tx)?.is_some() {
            return Err(EngineError::conflict("another round is already active"));
        }
        let round = Round {
            id: new_id(),
            admin_id: admin_id.to_string(),
            status: RoundStatus::Waiting,
            entry_fee,
            min_participants: self.cfg.min_participants,
            max_participants,
            winner_pct: self.cfg.winner_pct,
            admin_pct: self.cfg.admin_pct,
            app_pct: self.cfg.app_pct,
            winner_pool: 0,
            admin_pool: 0,
            app_pool: 0,
            participants: Vec::new(),
            elimination_order: Vec::new(),
            elimination_index: 0,
            auto_start_at: now + self.cfg.auto_start_delay_ms as i64,
            started_at: None,
            completed_at: None,
            winner_id: None,
            elimination_interval_ms: self.cfg.elimination_interval_ms,
            auto_start_delay_ms: self.cfg.auto_start_delay_ms,
            version: 1,
            created_at: now,
        };
        sqlite::insert_round(&tx, &round)?;
        tx.commit()?;
        info!(round_id = %round.id, entry_fee, max_participants, "round created");
        self.publisher.publish(&RoundEvent::Created {
            round: round.summary(),
        });
        Ok(round)
    }

    /// Join a waiting round: debit the fee, snapshot the participant and
    /// grow the pools, all in one commit. The capacity check runs under the
    /// writer lock, so concurrent joins past `max_participants` lose here.
    pub fn join(&self, round_id: &str, account_id: &str) -> Result<Round> {
        let now = now_ms();
        let mut conn = self.store.lock();
        let tx = conn.transaction()?;
        let mut round = sqlite::get_round(&tx, round_id)?;
        if round.status != RoundStatus::Waiting {
            return Err(EngineError::conflict("round is not open for joining"));
        }
        if round.admin_id == account_id {
            return Err(EngineError::authorization(
                "the round admin cannot join their own round",
            ));
        }
        if round.participant(account_id).is_some() {
            return Err(EngineError::conflict("account already joined this round"));
        }
        if round.is_full() {
            return Err(EngineError::conflict("round is full"));
        }
        let account = sqlite::get_account(&tx, account_id)?;
        let fee = round.entry_fee;
        ledger::debit(&tx, account_id, fee, TxKind::EntryFee, &round.id, json!({}))?;
        let participant = Participant {
            account_id: account_id.to_string(),
            name: account.name.clone(),
            joined_at: now,
            entry_fee_paid: fee,
            eliminated: false,
            eliminated_at: None,
            elimination_position: None,
        };
        round.participants.push(participant.clone());
        round.add_pools(fee);
        sqlite::update_round(&tx, &mut round)?;
        tx.commit()?;
        info!(round_id = %round.id, account_id = %account_id, "participant joined");
        self.publisher.publish(&RoundEvent::Joined {
            round: round.summary(),
            participant,
        });
        Ok(round)
    }

    /// Fix the elimination order and begin the round. `requested_by` is the
    /// manual path and must be the round's admin; the scheduler passes None.
    pub fn start(&self, round_id: &str, requested_by: Option<&str>) -> Result<Round> {
        let now = now_ms();
        let mut conn = self.store.lock();
        let tx = conn.transaction()?;
        let mut round = sqlite::get_round(&tx, round_id)?;
        if let Some(caller) = requested_by {
            if caller != round.admin_id {
                return Err(EngineError::authorization(
                    "only the round admin can start it manually",
                ));
            }
        }
        if round.status != RoundStatus::Waiting {
            return Err(EngineError::invalid_state("round is not waiting"));
        }
        if (round.participants.len() as u32) < round.min_participants {
            return Err(EngineError::not_enough_participants(format!(
                "{} joined, {} required",
                round.participants.len(),
                round.min_participants
            )));
        }
        let mut order: Vec<String> = round
            .participants
            .iter()
            .map(|p| p.account_id.clone())
            .collect();
        order.shuffle(&mut thread_rng());
        round.elimination_order = order;
        round.elimination_index = 0;
        round.started_at = Some(now);
        round.status = RoundStatus::InProgress;
        sqlite::update_round(&tx, &mut round)?;
        tx.commit()?;
        info!(
            round_id = %round.id,
            participants = round.participants.len(),
            "round started"
        );
        self.publisher.publish(&RoundEvent::Started {
            round: round.summary(),
            elimination_order: round.elimination_order.clone(),
        });
        Ok(round)
    }

    /// Draw the next victim from the fixed order. The draw stops one step
    /// before the last name: the moment a single participant remains, the
    /// payout runs in the same transaction and the round completes.
    pub fn eliminate_next(&self, round_id: &str) -> Result<Round> {
        let now = now_ms();
        let mut conn = self.store.lock();
        let tx = conn.transaction()?;
        let mut round = sqlite::get_round(&tx, round_id)?;
        if round.status != RoundStatus::InProgress {
            return Err(EngineError::invalid_state("round is not in progress"));
        }
        if round.order_exhausted() {
            return Err(EngineError::invalid_state("elimination order is exhausted"));
        }
        if round.remaining() <= 1 {
            return Err(EngineError::invalid_state(
                "round is already down to its survivor",
            ));
        }
        let victim_id = round.elimination_order[round.elimination_index as usize].clone();
        let position = round.elimination_index + 1;
        let victim = round
            .participant_mut(&victim_id)
            .ok_or_else(|| EngineError::internal("elimination order names a non-participant"))?;
        victim.eliminated = true;
        victim.eliminated_at = Some(now);
        victim.elimination_position = Some(position);
        round.elimination_index += 1;

        let remaining = round.remaining() as u32;
        let mut events = vec![RoundEvent::Elimination {
            round_id: round.id.clone(),
            victim_id: victim_id.clone(),
            position,
            remaining,
        }];
        if remaining == 1 {
            events.extend(self.complete_in_tx(&tx, &mut round, now)?);
        } else {
            sqlite::update_round(&tx, &mut round)?;
        }
        tx.commit()?;
        info!(
            round_id = %round.id,
            victim_id = %victim_id,
            position,
            remaining,
            "participant eliminated"
        );
        for event in &events {
            self.publisher.publish(event);
        }
        Ok(round)
    }

    /// Pay out a round that is down to one survivor. Normally reached from
    /// `eliminate_next`; also the scheduler's repair path for a round found
    /// stranded in progress after a crash.
    pub fn complete(&self, round_id: &str) -> Result<Round> {
        let now = now_ms();
        let mut conn = self.store.lock();
        let tx = conn.transaction()?;
        let mut round = sqlite::get_round(&tx, round_id)?;
        if round.status != RoundStatus::InProgress {
            return Err(EngineError::invalid_state("round is not in progress"));
        }
        let events = self.complete_in_tx(&tx, &mut round, now)?;
        tx.commit()?;
        for event in &events {
            self.publisher.publish(event);
        }
        Ok(round)
    }

    fn complete_in_tx(
        &self,
        tx: &rusqlite::Transaction,
        round: &mut Round,
        now: i64,
    ) -> Result<Vec<RoundEvent>> {
        let winner_id = round
            .survivor()
            .ok_or_else(|| {
                EngineError::invalid_state("round does not have exactly one survivor")
            })?
            .account_id
            .clone();
        ledger::credit(
            tx,
            &winner_id,
            round.winner_pool,
            TxKind::PrizeWin,
            &round.id,
            json!({}),
        )?;
        ledger::credit(
            tx,
            &round.admin_id,
            round.admin_pool,
            TxKind::AdminCommission,
            &round.id,
            json!({}),
        )?;
        ledger::record_system_fee(tx, &round.id, round.app_pool, json!({}))?;
        round.status = RoundStatus::Completed;
        round.completed_at = Some(now);
        round.winner_id = Some(winner_id.clone());
        sqlite::update_round(tx, round)?;
        info!(
            round_id = %round.id,
            winner_id = %winner_id,
            prize = round.winner_pool,
            "round completed"
        );
        Ok(vec![
            RoundEvent::Completed {
                round_id: round.id.clone(),
                winner_id: winner_id.clone(),
                winner_pool: round.winner_pool,
                admin_pool: round.admin_pool,
                app_pool: round.app_pool,
            },
            RoundEvent::UserWon {
                round_id: round.id.clone(),
                account_id: winner_id,
                prize: round.winner_pool,
            },
        ])
    }

    /// Abort a waiting round and refund every entry fee. Eliminations are
    /// binding, so an in-progress round cannot be aborted; a second abort
    /// finds the round terminal and fails the same way.
    pub fn abort(
        &self,
        round_id: &str,
        reason: AbortReason,
        requested_by: Option<&str>,
    ) -> Result<Round> {
        let now = now_ms();
        let mut conn = self.store.lock();
        let tx = conn.transaction()?;
        let mut round = sqlite::get_round(&tx, round_id)?;
        if let Some(caller) = requested_by {
            if caller != round.admin_id {
                return Err(EngineError::authorization(
                    "only the round admin can abort it",
                ));
            }
        }
        if round.status != RoundStatus::Waiting {
            return Err(EngineError::invalid_state(
                "only waiting rounds can be aborted",
            ));
        }
        let mut refunded = 0i64;
        for participant in round.participants.clone() {
            ledger::credit(
                &tx,
                &participant.account_id,
                participant.entry_fee_paid,
                TxKind::Refund,
                &round.id,
                json!({ "reason": reason.as_str() }),
            )?;
            refunded += participant.entry_fee_paid;
        }
        round.winner_pool = 0;
        round.admin_pool = 0;
        round.app_pool = 0;
        round.status = RoundStatus::Aborted;
        round.completed_at = Some(now);
        sqlite::update_round(&tx, &mut round)?;
        tx.commit()?;
        info!(
            round_id = %round.id,
            reason = reason.as_str(),
            refunded,
            "round aborted"
        );
        self.publisher.publish(&RoundEvent::Aborted {
            round_id: round.id.clone(),
            reason,
            refunded,
        });
        Ok(round)
    }

    // ---- read queries ----

    pub fn get_round(&self, round_id: &str) -> Result<Round> {
        let conn = self.store.lock();
        sqlite::get_round(&conn, round_id)
    }

    pub fn active_round(&self) -> Result<Option<Round>> {
        let conn = self.store.lock();
        sqlite::active_round(&conn)
    }

    pub fn list_history(
        &self,
        status: Option<RoundStatus>,
        page: u32,
        limit: u32,
    ) -> Result<Vec<Round>> {
        let conn = self.store.lock();
        sqlite::round_history(&conn, status, page, limit)
    }

    pub fn list_my_rounds(&self, account_id: &str, page: u32, limit: u32) -> Result<Vec<Round>> {
        let conn = self.store.lock();
        sqlite::rounds_for_account(&conn, account_id, page, limit)
    }

    pub fn get_balance(&self, account_id: &str) -> Result<i64> {
        let conn = self.store.lock();
        Ok(sqlite::get_account(&conn, account_id)?.balance)
    }

    pub fn list_transactions(
        &self,
        account_id: &str,
        kind: Option<TxKind>,
        page: u32,
        limit: u32,
    ) -> Result<Vec<TransactionRecord>> {
        let conn = self.store.lock();
        sqlite::transactions_for_account(&conn, account_id, kind, page, limit)
    }

    /// Dry-run of every `join` precondition, first failure wins.
    pub fn can_join(&self, round_id: &str, account_id: &str) -> Result<()> {
        let conn = self.store.lock();
        let round = sqlite::get_round(&conn, round_id)?;
        if round.status != RoundStatus::Waiting {
            return Err(EngineError::conflict("round is not open for joining"));
        }
        if round.admin_id == account_id {
            return Err(EngineError::authorization(
                "the round admin cannot join their own round",
            ));
        }
        if round.participant(account_id).is_some() {
            return Err(EngineError::conflict("account already joined this round"));
        }
        if round.is_full() {
            return Err(EngineError::conflict("round is full"));
        }
        let account = sqlite::get_account(&conn, account_id)?;
        if !account.active {
            return Err(EngineError::invalid_state(format!(
                "account {} is inactive",
                account_id
            )));
        }
        if account.balance < round.entry_fee {
            return Err(EngineError::insufficient_funds(format!(
                "balance {} cannot cover {}",
                account.balance, round.entry_fee
            )));
        }
        Ok(())
    }

    // scheduler sweep queries

    pub fn waiting_rounds(&self) -> Result<Vec<Round>> {
        let conn = self.store.lock();
        sqlite::waiting_rounds(&conn)
    }

    pub fn waiting_due(&self, now: i64) -> Result<Vec<Round>> {
        let conn = self.store.lock();
        sqlite::waiting_due(&conn, now)
    }

    pub fn in_progress_rounds(&self) -> Result<Vec<Round>> {
        let conn = self.store.lock();
        sqlite::in_progress_rounds(&conn)
    }
}
