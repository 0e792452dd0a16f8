use rusqlite::{Connection, Result};

pub fn create_tables(conn: &Connection) -> Result<()> {
    conn.execute(
        r#"
        CREATE TABLE IF NOT EXISTS accounts (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            email TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            role TEXT NOT NULL,                       -- user|admin
            balance INTEGER NOT NULL,
            active INTEGER NOT NULL DEFAULT 1,
            last_login INTEGER,
            created_at INTEGER NOT NULL
        )
        "#,
        [],
    )?;

    // One row per round aggregate; participants and elimination_order are
    // embedded JSON so the whole aggregate commits under one version tag.
    conn.execute(
        r#"
        CREATE TABLE IF NOT EXISTS rounds (
            id TEXT PRIMARY KEY,
            admin_id TEXT NOT NULL,
            status TEXT NOT NULL,                     -- waiting|in_progress|completed|aborted
            entry_fee INTEGER NOT NULL,
            min_participants INTEGER NOT NULL,
            max_participants INTEGER NOT NULL,
            winner_pct INTEGER NOT NULL,
            admin_pct INTEGER NOT NULL,
            app_pct INTEGER NOT NULL,
            winner_pool INTEGER NOT NULL DEFAULT 0,
            admin_pool INTEGER NOT NULL DEFAULT 0,
            app_pool INTEGER NOT NULL DEFAULT 0,
            participants TEXT NOT NULL DEFAULT '[]',
            elimination_order TEXT NOT NULL DEFAULT '[]',
            elimination_index INTEGER NOT NULL DEFAULT 0,
            auto_start_at INTEGER NOT NULL,
            started_at INTEGER,
            completed_at INTEGER,
            winner_id TEXT,
            elimination_interval_ms INTEGER NOT NULL,
            auto_start_delay_ms INTEGER NOT NULL,
            version INTEGER NOT NULL DEFAULT 1,
            created_at INTEGER NOT NULL
        )
        "#,
        [],
    )?;

    // Append-only; rows are never updated or deleted.
    conn.execute(
        r#"
        CREATE TABLE IF NOT EXISTS transactions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            account_id TEXT,                          -- NULL for app_fee rows
            round_id TEXT NOT NULL,
            kind TEXT NOT NULL,                       -- entry_fee|refund|prize_win|admin_commission|app_fee
            amount INTEGER NOT NULL,
            balance_before INTEGER,
            balance_after INTEGER,
            metadata TEXT NOT NULL DEFAULT '{}',
            created_at INTEGER NOT NULL
        )
        "#,
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_rounds_status_created ON rounds(status, created_at DESC)",
        [],
    )?;
    // Singleton active round: at most one row may sit in waiting/in_progress.
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_rounds_active ON rounds((1)) \
         WHERE status IN ('waiting', 'in_progress')",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_tx_account_created ON transactions(account_id, created_at DESC)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_tx_round_kind ON transactions(round_id, kind)",
        [],
    )?;

    Ok(())
}
