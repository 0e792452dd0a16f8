use crate::error::{EngineError, Result};
use crate::types::{
    Account, Participant, Role, Round, RoundStatus, TransactionRecord, TxKind,
};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::fs::create_dir_all;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::schema::create_tables;

/// Authoritative document store. One writer connection behind a mutex: every
/// engine operation runs a single SQLite transaction under the lock, so
/// commit order on a round is total within the process. The `version` column
/// on rounds guards read-modify-write cycles on top of that.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    pub fn open(path: &str) -> Result<Self> {
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                create_dir_all(parent)
                    .map_err(|e| EngineError::internal(format!("create data dir: {}", e)))?;
            }
        }
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        let _ = conn.pragma_update(None, "journal_mode", "WAL");
        let _ = conn.pragma_update(None, "synchronous", "NORMAL");
        let _ = conn.pragma_update(None, "busy_timeout", 5000);
        create_tables(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn bad_column(idx: usize, detail: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, detail.into())
}

// ---- accounts ----

const ACCOUNT_COLS: &str = "id, name, email, password_hash, role, balance, active, last_login, created_at";

fn row_to_account(row: &Row) -> rusqlite::Result<Account> {
    let role_s: String = row.get(4)?;
    let role = Role::parse(&role_s)
        .ok_or_else(|| bad_column(4, format!("unknown role '{}'", role_s)))?;
    Ok(Account {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        role,
        balance: row.get(5)?,
        active: row.get::<_, i64>(6)? != 0,
        last_login: row.get(7)?,
        created_at: row.get(8)?,
    })
}

pub fn insert_account(conn: &Connection, account: &Account) -> Result<()> {
    conn.execute(
        "INSERT INTO accounts (id, name, email, password_hash, role, balance, active, last_login, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            account.id,
            account.name,
            account.email,
            account.password_hash,
            account.role.as_str(),
            account.balance,
            account.active as i64,
            account.last_login,
            account.created_at,
        ],
    )?;
    Ok(())
}

pub fn get_account(conn: &Connection, id: &str) -> Result<Account> {
    let sql = format!("SELECT {} FROM accounts WHERE id = ?1", ACCOUNT_COLS);
    conn.query_row(&sql, params![id], row_to_account)
        .optional()?
        .ok_or_else(|| EngineError::not_found(format!("account {} not found", id)))
}

pub fn find_account_by_email(conn: &Connection, email: &str) -> Result<Option<Account>> {
    let sql = format!("SELECT {} FROM accounts WHERE email = ?1", ACCOUNT_COLS);
    Ok(conn
        .query_row(&sql, params![email], row_to_account)
        .optional()?)
}

pub fn set_account_active(conn: &Connection, id: &str, active: bool) -> Result<()> {
    let changed = conn.execute(
        "UPDATE accounts SET active = ?1 WHERE id = ?2",
        params![active as i64, id],
    )?;
    if changed == 0 {
        return Err(EngineError::not_found(format!("account {} not found", id)));
    }
    Ok(())
}

pub fn touch_last_login(conn: &Connection, id: &str, at: i64) -> Result<()> {
    conn.execute(
        "UPDATE accounts SET last_login = ?1 WHERE id = ?2",
        params![at, id],
    )?;
    Ok(())
}

// ---- rounds ----

const ROUND_COLS: &str = "id, admin_id, status, entry_fee, min_participants, max_participants, \
    winner_pct, admin_pct, app_pct, winner_pool, admin_pool, app_pool, participants, \
    elimination_order, elimination_index, auto_start_at, started_at, completed_at, winner_id, \
    elimination_interval_ms, auto_start_delay_ms, version, created_at";

fn row_to_round(row: &Row) -> rusqlite::Result<Round> {
    let status_s: String = row.get(2)?;
    let status = RoundStatus::parse(&status_s)
        .ok_or_else(|| bad_column(2, format!("unknown round status '{}'", status_s)))?;
    let participants_json: String = row.get(12)?;
    let participants: Vec<Participant> =
        serde_json::from_str(&participants_json).map_err(|e| bad_column(12, e.to_string()))?;
    let order_json: String = row.get(13)?;
    let elimination_order: Vec<String> =
        serde_json::from_str(&order_json).map_err(|e| bad_column(13, e.to_string()))?;
    Ok(Round {
        id: row.get(0)?,
        admin_id: row.get(1)?,
        status,
        entry_fee: row.get(3)?,
        min_participants: row.get::<_, i64>(4)? as u32,
        max_participants: row.get::<_, i64>(5)? as u32,
        winner_pct: row.get::<_, i64>(6)? as u32,
        admin_pct: row.get::<_, i64>(7)? as u32,
        app_pct: row.get::<_, i64>(8)? as u32,
        winner_pool: row.get(9)?,
        admin_pool: row.get(10)?,
        app_pool: row.get(11)?,
        participants,
        elimination_order,
        elimination_index: row.get::<_, i64>(14)? as u32,
        auto_start_at: row.get(15)?,
        started_at: row.get(16)?,
        completed_at: row.get(17)?,
        winner_id: row.get(18)?,
        elimination_interval_ms: row.get::<_, i64>(19)? as u64,
        auto_start_delay_ms: row.get::<_, i64>(20)? as u64,
        version: row.get(21)?,
        created_at: row.get(22)?,
    })
}

pub fn insert_round(conn: &Connection, round: &Round) -> Result<()> {
    conn.execute(
        "INSERT INTO rounds (id, admin_id, status, entry_fee, min_participants, max_participants, \
         winner_pct, admin_pct, app_pct, winner_pool, admin_pool, app_pool, participants, \
         elimination_order, elimination_index, auto_start_at, started_at, completed_at, winner_id, \
         elimination_interval_ms, auto_start_delay_ms, version, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23)",
        params![
            round.id,
            round.admin_id,
            round.status.as_str(),
            round.entry_fee,
            round.min_participants as i64,
            round.max_participants as i64,
            round.winner_pct as i64,
            round.admin_pct as i64,
            round.app_pct as i64,
            round.winner_pool,
            round.admin_pool,
            round.app_pool,
            serde_json::to_string(&round.participants)?,
            serde_json::to_string(&round.elimination_order)?,
            round.elimination_index as i64,
            round.auto_start_at,
            round.started_at,
            round.completed_at,
            round.winner_id,
            round.elimination_interval_ms as i64,
            round.auto_start_delay_ms as i64,
            round.version,
            round.created_at,
        ],
    )?;
    Ok(())
}

pub fn get_round(conn: &Connection, id: &str) -> Result<Round> {
    let sql = format!("SELECT {} FROM rounds WHERE id = ?1", ROUND_COLS);
    conn.query_row(&sql, params![id], row_to_round)
        .optional()?
        .ok_or_else(|| EngineError::not_found(format!("round {} not found", id)))
}

/// Optimistic write: the UPDATE only lands if the stored version still equals
/// the one this aggregate was read at. On success the in-memory version is
/// bumped to match the row.
pub fn update_round(conn: &Connection, round: &mut Round) -> Result<()> {
    let changed = conn.execute(
        "UPDATE rounds SET status = ?1, winner_pool = ?2, admin_pool = ?3, app_pool = ?4, \
         participants = ?5, elimination_order = ?6, elimination_index = ?7, started_at = ?8, \
         completed_at = ?9, winner_id = ?10, version = version + 1 \
         WHERE id = ?11 AND version = ?12",
        params![
            round.status.as_str(),
            round.winner_pool,
            round.admin_pool,
            round.app_pool,
            serde_json::to_string(&round.participants)?,
            serde_json::to_string(&round.elimination_order)?,
            round.elimination_index as i64,
            round.started_at,
            round.completed_at,
            round.winner_id,
            round.id,
            round.version,
        ],
    )?;
    if changed == 0 {
        return Err(EngineError::conflict(format!(
            "round {} was modified concurrently",
            round.id
        )));
    }
    round.version += 1;
    Ok(())
}

pub fn active_round(conn: &Connection) -> Result<Option<Round>> {
    let sql = format!(
        "SELECT {} FROM rounds WHERE status IN ('waiting', 'in_progress') LIMIT 1",
        ROUND_COLS
    );
    Ok(conn.query_row(&sql, [], row_to_round).optional()?)
}

pub fn waiting_rounds(conn: &Connection) -> Result<Vec<Round>> {
    rounds_where(conn, "status = 'waiting'", &[])
}

pub fn waiting_due(conn: &Connection, now: i64) -> Result<Vec<Round>> {
    rounds_where(
        conn,
        "status = 'waiting' AND auto_start_at <= ?1",
        &[&now as &dyn rusqlite::ToSql],
    )
}

pub fn in_progress_rounds(conn: &Connection) -> Result<Vec<Round>> {
    rounds_where(conn, "status = 'in_progress'", &[])
}

fn rounds_where(
    conn: &Connection,
    clause: &str,
    args: &[&dyn rusqlite::ToSql],
) -> Result<Vec<Round>> {
    let sql = format!(
        "SELECT {} FROM rounds WHERE {} ORDER BY created_at",
        ROUND_COLS, clause
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(args, row_to_round)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

pub fn round_history(
    conn: &Connection,
    status: Option<RoundStatus>,
    page: u32,
    limit: u32,
) -> Result<Vec<Round>> {
    let offset = page.saturating_sub(1) as i64 * limit as i64;
    let mut out = Vec::new();
    match status {
        Some(status) => {
            let sql = format!(
                "SELECT {} FROM rounds WHERE status = ?1 \
                 ORDER BY created_at DESC, rowid DESC LIMIT ?2 OFFSET ?3",
                ROUND_COLS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(
                params![status.as_str(), limit as i64, offset],
                row_to_round,
            )?;
            for row in rows {
                out.push(row?);
            }
        }
        None => {
            let sql = format!(
                "SELECT {} FROM rounds ORDER BY created_at DESC, rowid DESC LIMIT ?1 OFFSET ?2",
                ROUND_COLS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![limit as i64, offset], row_to_round)?;
            for row in rows {
                out.push(row?);
            }
        }
    }
    Ok(out)
}

/// Rounds where the given account appears in the embedded participant list.
pub fn rounds_for_account(
    conn: &Connection,
    account_id: &str,
    page: u32,
    limit: u32,
) -> Result<Vec<Round>> {
    let offset = page.saturating_sub(1) as i64 * limit as i64;
    let sql = format!(
        "SELECT {} FROM rounds WHERE EXISTS (\
            SELECT 1 FROM json_each(rounds.participants) \
            WHERE json_extract(json_each.value, '$.accountId') = ?1) \
         ORDER BY created_at DESC, rowid DESC LIMIT ?2 OFFSET ?3",
        ROUND_COLS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![account_id, limit as i64, offset], row_to_round)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

// ---- transactions ----

const TX_COLS: &str =
    "id, account_id, round_id, kind, amount, balance_before, balance_after, metadata, created_at";

fn row_to_transaction(row: &Row) -> rusqlite::Result<TransactionRecord> {
    let kind_s: String = row.get(3)?;
    let kind = TxKind::parse(&kind_s)
        .ok_or_else(|| bad_column(3, format!("unknown transaction kind '{}'", kind_s)))?;
    let metadata_json: String = row.get(7)?;
    let metadata =
        serde_json::from_str(&metadata_json).map_err(|e| bad_column(7, e.to_string()))?;
    Ok(TransactionRecord {
        id: row.get(0)?,
        account_id: row.get(1)?,
        round_id: row.get(2)?,
        kind,
        amount: row.get(4)?,
        balance_before: row.get(5)?,
        balance_after: row.get(6)?,
        metadata,
        created_at: row.get(8)?,
    })
}

pub fn insert_transaction(conn: &Connection, record: &mut TransactionRecord) -> Result<()> {
    conn.execute(
        "INSERT INTO transactions (account_id, round_id, kind, amount, balance_before, \
         balance_after, metadata, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            record.account_id,
            record.round_id,
            record.kind.as_str(),
            record.amount,
            record.balance_before,
            record.balance_after,
            serde_json::to_string(&record.metadata)?,
            record.created_at,
        ],
    )?;
    record.id = conn.last_insert_rowid();
    Ok(())
}

pub fn transactions_for_account(
    conn: &Connection,
    account_id: &str,
    kind: Option<TxKind>,
    page: u32,
    limit: u32,
) -> Result<Vec<TransactionRecord>> {
    let offset = page.saturating_sub(1) as i64 * limit as i64;
    let mut out = Vec::new();
    match kind {
        Some(kind) => {
            let sql = format!(
                "SELECT {} FROM transactions WHERE account_id = ?1 AND kind = ?2 \
                 ORDER BY created_at DESC, id DESC LIMIT ?3 OFFSET ?4",
                TX_COLS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(
                params![account_id, kind.as_str(), limit as i64, offset],
                row_to_transaction,
            )?;
            for row in rows {
                out.push(row?);
            }
        }
        None => {
            let sql = format!(
                "SELECT {} FROM transactions WHERE account_id = ?1 \
                 ORDER BY created_at DESC, id DESC LIMIT ?2 OFFSET ?3",
                TX_COLS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(
                params![account_id, limit as i64, offset],
                row_to_transaction,
            )?;
            for row in rows {
                out.push(row?);
            }
        }
    }
    Ok(out)
}

pub fn transactions_for_round(conn: &Connection, round_id: &str) -> Result<Vec<TransactionRecord>> {
    let sql = format!(
        "SELECT {} FROM transactions WHERE round_id = ?1 ORDER BY id",
        TX_COLS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![round_id], row_to_transaction)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::types::{new_id, now_ms};

    fn account(email: &str, role: Role) -> Account {
        Account {
            id: new_id(),
            name: email.split('@').next().unwrap().to_string(),
            email: email.to_string(),
            password_hash: "hash".to_string(),
            role,
            balance: 1000,
            active: true,
            last_login: None,
            created_at: now_ms(),
        }
    }

    fn round(admin_id: &str, status: RoundStatus) -> Round {
        Round {
            id: new_id(),
            admin_id: admin_id.to_string(),
            status,
            entry_fee: 100,
            min_participants: 3,
            max_participants: 5,
            winner_pct: 70,
            admin_pct: 20,
            app_pct: 10,
            winner_pool: 0,
            admin_pool: 0,
            app_pool: 0,
            participants: Vec::new(),
            elimination_order: Vec::new(),
            elimination_index: 0,
            auto_start_at: now_ms() + 60_000,
            started_at: None,
            completed_at: None,
            winner_id: None,
            elimination_interval_ms: 3000,
            auto_start_delay_ms: 60_000,
            version: 1,
            created_at: now_ms(),
        }
    }

    #[test]
    fn account_insert_and_fetch() {
        let store = Store::open_in_memory().unwrap();
        let conn = store.lock();
        let acc = account("ada@example.com", Role::Admin);
        insert_account(&conn, &acc).unwrap();
        let got = get_account(&conn, &acc.id).unwrap();
        assert_eq!(got.email, "ada@example.com");
        assert!(got.is_admin());
        assert!(get_account(&conn, "missing").is_err());

        touch_last_login(&conn, &acc.id, 1234).unwrap();
        assert_eq!(get_account(&conn, &acc.id).unwrap().last_login, Some(1234));
        set_account_active(&conn, &acc.id, false).unwrap();
        assert!(!get_account(&conn, &acc.id).unwrap().active);
    }

    #[test]
    fn duplicate_email_is_conflict() {
        let store = Store::open_in_memory().unwrap();
        let conn = store.lock();
        insert_account(&conn, &account("dup@example.com", Role::User)).unwrap();
        let err = insert_account(&conn, &account("dup@example.com", Role::User)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[test]
    fn stale_version_write_conflicts() {
        let store = Store::open_in_memory().unwrap();
        let conn = store.lock();
        let mut r = round("admin", RoundStatus::Waiting);
        insert_round(&conn, &r).unwrap();

        let mut stale = get_round(&conn, &r.id).unwrap();
        update_round(&conn, &mut r).unwrap();
        assert_eq!(r.version, 2);

        stale.winner_pool = 999;
        let err = update_round(&conn, &mut stale).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[test]
    fn second_active_round_violates_singleton_index() {
        let store = Store::open_in_memory().unwrap();
        let conn = store.lock();
        insert_round(&conn, &round("admin", RoundStatus::Waiting)).unwrap();
        let err = insert_round(&conn, &round("admin", RoundStatus::InProgress)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        // terminal rounds do not occupy the active slot
        insert_round(&conn, &round("admin", RoundStatus::Completed)).unwrap();
        insert_round(&conn, &round("admin", RoundStatus::Aborted)).unwrap();
    }

    #[test]
    fn waiting_due_filters_by_deadline() {
        let store = Store::open_in_memory().unwrap();
        let conn = store.lock();
        let mut r = round("admin", RoundStatus::Waiting);
        r.auto_start_at = 1000;
        insert_round(&conn, &r).unwrap();

        assert!(waiting_due(&conn, 500).unwrap().is_empty());
        assert_eq!(waiting_due(&conn, 1000).unwrap().len(), 1);
        assert_eq!(waiting_rounds(&conn).unwrap().len(), 1);
    }

    #[test]
    fn participant_membership_query_matches_embedded_json() {
        let store = Store::open_in_memory().unwrap();
        let conn = store.lock();
        let mut r = round("admin", RoundStatus::Waiting);
        r.participants.push(Participant {
            account_id: "u1".to_string(),
            name: "u1".to_string(),
            joined_at: now_ms(),
            entry_fee_paid: 100,
            eliminated: false,
            eliminated_at: None,
            elimination_position: None,
        });
        insert_round(&conn, &r).unwrap();

        assert_eq!(rounds_for_account(&conn, "u1", 1, 10).unwrap().len(), 1);
        assert!(rounds_for_account(&conn, "u2", 1, 10).unwrap().is_empty());
    }

    #[test]
    fn transactions_are_appended_with_rowid() {
        let store = Store::open_in_memory().unwrap();
        let conn = store.lock();
        let mut rec = TransactionRecord {
            id: 0,
            account_id: Some("u1".to_string()),
            round_id: "r1".to_string(),
            kind: TxKind::EntryFee,
            amount: -100,
            balance_before: Some(1000),
            balance_after: Some(900),
            metadata: serde_json::json!({}),
            created_at: now_ms(),
        };
        insert_transaction(&conn, &mut rec).unwrap();
        assert!(rec.id > 0);

        let listed = transactions_for_account(&conn, "u1", None, 1, 10).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].amount, -100);
        assert_eq!(
            transactions_for_account(&conn, "u1", Some(TxKind::Refund), 1, 10)
                .unwrap()
                .len(),
            0
        );
        assert_eq!(transactions_for_round(&conn, "r1").unwrap().len(), 1);
    }
}
