use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Role::User),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundStatus {
    Waiting,
    InProgress,
    Completed,
    Aborted,
}

impl RoundStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoundStatus::Waiting => "waiting",
            RoundStatus::InProgress => "in_progress",
            RoundStatus::Completed => "completed",
            RoundStatus::Aborted => "aborted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "waiting" => Some(RoundStatus::Waiting),
            "in_progress" => Some(RoundStatus::InProgress),
            "completed" => Some(RoundStatus::Completed),
            "aborted" => Some(RoundStatus::Aborted),
            _ => None,
        }
    }

    /// Waiting and InProgress rounds hold the singleton active slot.
    pub fn is_active(&self) -> bool {
        matches!(self, RoundStatus::Waiting | RoundStatus::InProgress)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RoundStatus::Completed | RoundStatus::Aborted)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxKind {
    EntryFee,
    Refund,
    PrizeWin,
    AdminCommission,
    AppFee,
}

impl TxKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxKind::EntryFee => "entry_fee",
            TxKind::Refund => "refund",
            TxKind::PrizeWin => "prize_win",
            TxKind::AdminCommission => "admin_commission",
            TxKind::AppFee => "app_fee",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "entry_fee" => Some(TxKind::EntryFee),
            "refund" => Some(TxKind::Refund),
            "prize_win" => Some(TxKind::PrizeWin),
            "admin_commission" => Some(TxKind::AdminCommission),
            "app_fee" => Some(TxKind::AppFee),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbortReason {
    InsufficientParticipants,
    AdminCancelled,
}

impl AbortReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            AbortReason::InsufficientParticipants => "insufficient_participants",
            AbortReason::AdminCancelled => "admin_cancelled",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_text() {
        for status in [
            RoundStatus::Waiting,
            RoundStatus::InProgress,
            RoundStatus::Completed,
            RoundStatus::Aborted,
        ] {
            assert_eq!(RoundStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(RoundStatus::parse("running"), None);
    }

    #[test]
    fn tx_kind_round_trips_through_text() {
        for kind in [
            TxKind::EntryFee,
            TxKind::Refund,
            TxKind::PrizeWin,
            TxKind::AdminCommission,
            TxKind::AppFee,
        ] {
            assert_eq!(TxKind::parse(kind.as_str()), Some(kind));
        }
    }

    #[test]
    fn active_statuses() {
        assert!(RoundStatus::Waiting.is_active());
        assert!(RoundStatus::InProgress.is_active());
        assert!(!RoundStatus::Completed.is_active());
        assert!(RoundStatus::Aborted.is_terminal());
    }
}
