//! Atomic balance mutations with an append-only trace. Every coin that moves
//! leaves a record carrying the authoritative before/after balances, so any
//! account state can be reconstructed from the log alone.
//!
//! All three operations run inside the caller's open transaction and never
//! partially succeed: either the balance update and the record both commit,
//! or neither does.

use crate::error::{EngineError, Result};
use crate::storage::sqlite;
use crate::types::{now_ms, TransactionRecord, TxKind};
use rusqlite::{params, Connection};

/// Take `amount` coins from an account. Fails with `INSUFFICIENT_FUNDS` when
/// the balance cannot cover it and `INVALID_STATE` when the account has been
/// deactivated; the balance invariant `>= 0` holds at every commit.
pub fn debit(
    conn: &Connection,
    account_id: &str,
    amount: i64,
    kind: TxKind,
    round_id: &str,
    metadata: serde_json::Value,
) -> Result<TransactionRecord> {
    if amount <= 0 {
        return Err(EngineError::validation("debit amount must be positive"));
    }
    let account = sqlite::get_account(conn, account_id)?;
    if !account.active {
        return Err(EngineError::invalid_state(format!(
            "account {} is inactive",
            account_id
        )));
    }
    if account.balance < amount {
        return Err(EngineError::insufficient_funds(format!(
            "balance {} cannot cover {}",
            account.balance, amount
        )));
    }
    let after = account.balance - amount;
    conn.execute(
        "UPDATE accounts SET balance = ?1 WHERE id = ?2",
        params![after, account_id],
    )?;
    let mut record = TransactionRecord {
        id: 0,
        account_id: Some(account_id.to_string()),
        round_id: round_id.to_string(),
        kind,
        amount: -amount,
        balance_before: Some(account.balance),
        balance_after: Some(after),
        metadata,
        created_at: now_ms(),
    };
    sqlite::insert_transaction(conn, &mut record)?;
    Ok(record)
}

/// Give `amount` coins to an account. Unconditional: credits land even on
/// inactive accounts (refunds must always reach their owner).
pub fn credit(
    conn: &Connection,
    account_id: &str,
    amount: i64,
    kind: TxKind,
    round_id: &str,
    metadata: serde_json::Value,
) -> Result<TransactionRecord> {
    if amount < 0 {
        return Err(EngineError::validation("credit amount must not be negative"));
    }
    let account = sqlite::get_account(conn, account_id)?;
    let after = account.balance + amount;
    conn.execute(
        "UPDATE accounts SET balance = ?1 WHERE id = ?2",
        params![after, account_id],
    )?;
    let mut record = TransactionRecord {
        id: 0,
        account_id: Some(account_id.to_string()),
        round_id: round_id.to_string(),
        kind,
        amount,
        balance_before: Some(account.balance),
        balance_after: Some(after),
        metadata,
        created_at: now_ms(),
    };
    sqlite::insert_transaction(conn, &mut record)?;
    Ok(record)
}

/// Book house earnings for a round. Tied to no account balance.
pub fn record_system_fee(
    conn: &Connection,
    round_id: &str,
    amount: i64,
    metadata: serde_json::Value,
) -> Result<TransactionRecord> {
    if amount < 0 {
        return Err(EngineError::validation("fee amount must not be negative"));
    }
    let mut record = TransactionRecord {
        id: 0,
        account_id: None,
        round_id: round_id.to_string(),
        kind: TxKind::AppFee,
        amount,
        balance_before: None,
        balance_after: None,
        metadata,
        created_at: now_ms(),
    };
    sqlite::insert_transaction(conn, &mut record)?;
    Ok(record)
}
