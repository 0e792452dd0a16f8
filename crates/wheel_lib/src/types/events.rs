use crate::types::enums::AbortReason;
use crate::types::round::{Participant, RoundSummary};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// The real-time event contract. Names and payload shapes are bit-stable:
/// subscribers parse these exact tags and fields. Delivery is best-effort;
/// subscribers reconcile by re-reading the authoritative round.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum RoundEvent {
    #[serde(rename = "round.created")]
    Created { round: RoundSummary },

    #[serde(rename = "round.joined")]
    Joined {
        round: RoundSummary,
        participant: Participant,
    },

    #[serde(rename = "round.countdown")]
    #[serde(rename_all = "camelCase")]
    Countdown {
        round_id: String,
        seconds_remaining: u64,
    },

    #[serde(rename = "round.started")]
    #[serde(rename_all = "camelCase")]
    Started {
        round: RoundSummary,
        elimination_order: Vec<String>,
    },

    #[serde(rename = "round.elimination")]
    #[serde(rename_all = "camelCase")]
    Elimination {
        round_id: String,
        victim_id: String,
        position: u32,
        remaining: u32,
    },

    #[serde(rename = "round.completed")]
    #[serde(rename_all = "camelCase")]
    Completed {
        round_id: String,
        winner_id: String,
        winner_pool: i64,
        admin_pool: i64,
        app_pool: i64,
    },

    #[serde(rename = "round.aborted")]
    #[serde(rename_all = "camelCase")]
    Aborted {
        round_id: String,
        reason: AbortReason,
        refunded: i64,
    },

    /// Private to the winner; routed to the account channel, never a room.
    #[serde(rename = "user.won")]
    #[serde(rename_all = "camelCase")]
    UserWon {
        round_id: String,
        #[serde(skip)]
        account_id: String,
        prize: i64,
    },
}

impl RoundEvent {
    pub fn name(&self) -> &'static str {
        match self {
            RoundEvent::Created { .. } => "round.created",
            RoundEvent::Joined { .. } => "round.joined",
            RoundEvent::Countdown { .. } => "round.countdown",
            RoundEvent::Started { .. } => "round.started",
            RoundEvent::Elimination { .. } => "round.elimination",
            RoundEvent::Completed { .. } => "round.completed",
            RoundEvent::Aborted { .. } => "round.aborted",
            RoundEvent::UserWon { .. } => "user.won",
        }
    }

    pub fn round_id(&self) -> &str {
        match self {
            RoundEvent::Created { round } => &round.id,
            RoundEvent::Joined { round, .. } => &round.id,
            RoundEvent::Countdown { round_id, .. } => round_id,
            RoundEvent::Started { round, .. } => &round.id,
            RoundEvent::Elimination { round_id, .. } => round_id,
            RoundEvent::Completed { round_id, .. } => round_id,
            RoundEvent::Aborted { round_id, .. } => round_id,
            RoundEvent::UserWon { round_id, .. } => round_id,
        }
    }
}

/// Sink for committed state changes. The round service publishes here
/// strictly after commit; the scheduler and the fanout both implement this,
/// and `main` wires them together. No process-wide holders.
pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: &RoundEvent);
}

/// Fans one publish out to several sinks in order.
pub struct Multiplex {
    sinks: Vec<Arc<dyn EventPublisher>>,
}

impl Multiplex {
    pub fn new(sinks: Vec<Arc<dyn EventPublisher>>) -> Self {
        Self { sinks }
    }
}

impl EventPublisher for Multiplex {
    fn publish(&self, event: &RoundEvent) {
        for sink in &self.sinks {
            sink.publish(event);
        }
    }
}

/// Publisher that drops everything; for tests and tools that only read.
pub struct NoopPublisher;

impl EventPublisher for NoopPublisher {
    fn publish(&self, _event: &RoundEvent) {}
}
