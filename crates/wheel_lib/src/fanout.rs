//! Translates committed state changes into subscriber notifications. One
//! broadcast room per round, a lobby channel for discovery, and a private
//! channel per account for winner notices. Delivery is best-effort: a lagging
//! subscriber drops messages and reconciles by re-reading the round.

use crate::types::{EventPublisher, RoundEvent};
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::broadcast;

pub struct EventFanout {
    capacity: usize,
    lobby: broadcast::Sender<RoundEvent>,
    rooms: Mutex<HashMap<String, broadcast::Sender<RoundEvent>>>,
    accounts: Mutex<HashMap<String, broadcast::Sender<RoundEvent>>>,
}

impl EventFanout {
    pub fn new(capacity: usize) -> Self {
        let (lobby, _) = broadcast::channel(capacity.max(1));
        Self {
            capacity: capacity.max(1),
            lobby,
            rooms: Mutex::new(HashMap::new()),
            accounts: Mutex::new(HashMap::new()),
        }
    }

    /// Lobby subscribers see `round.created` without knowing any round id.
    pub fn subscribe_lobby(&self) -> broadcast::Receiver<RoundEvent> {
        self.lobby.subscribe()
    }

    /// Enter the room for one round. The room is created on first entry.
    pub fn join_room(&self, round_id: &str) -> broadcast::Receiver<RoundEvent> {
        self.room_sender(round_id).subscribe()
    }

    /// Private channel; carries only events addressed to this account.
    pub fn subscribe_account(&self, account_id: &str) -> broadcast::Receiver<RoundEvent> {
        let mut accounts = self.accounts.lock().unwrap();
        accounts
            .entry(account_id.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    fn room_sender(&self, round_id: &str) -> broadcast::Sender<RoundEvent> {
        let mut rooms = self.rooms.lock().unwrap();
        rooms
            .entry(round_id.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }

    fn retire_room(&self, round_id: &str) {
        self.rooms.lock().unwrap().remove(round_id);
    }
}

impl EventPublisher for EventFanout {
    fn publish(&self, event: &RoundEvent) {
        match event {
            RoundEvent::UserWon { account_id, .. } => {
                if let Some(tx) = self.accounts.lock().unwrap().get(account_id) {
                    let _ = tx.send(event.clone());
                }
            }
            RoundEvent::Created { .. } => {
                let _ = self.lobby.send(event.clone());
                let _ = self.room_sender(event.round_id()).send(event.clone());
            }
            RoundEvent::Completed { .. } | RoundEvent::Aborted { .. } => {
                let _ = self.room_sender(event.round_id()).send(event.clone());
                // terminal event was the room's last message; existing
                // receivers keep their buffer, the map entry can go
                self.retire_room(event.round_id());
            }
            _ => {
                let _ = self.room_sender(event.round_id()).send(event.clone());
            }
        }
    }
}
