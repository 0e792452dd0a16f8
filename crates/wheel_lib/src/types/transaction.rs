use crate::types::enums::TxKind;
use serde::{Deserialize, Serialize};

/// Append-only ledger record. `amount` is signed: debits are negative,
/// credits positive. `account_id` is None for `AppFee` rows, which book
/// house earnings against no balance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: i64,
    pub account_id: Option<String>,
    pub round_id: String,
    pub kind: TxKind,
    pub amount: i64,
    pub balance_before: Option<i64>,
    pub balance_after: Option<i64>,
    pub metadata: serde_json::Value,
    pub created_at: i64,
}
