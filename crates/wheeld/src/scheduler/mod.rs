//! Drives every time-based transition: auto-start deadlines with their
//! countdowns, per-round elimination ticks, and recovery after a restart.
//! Single writer: one watcher or ticker per round, tracked in memory, with
//! the periodic sweep re-establishing anything lost to a crash.

pub mod auto_start;
pub mod elimination;

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use wheel_lib::service::RoundService;
use wheel_lib::types::{EventPublisher, Round, RoundEvent, RoundStatus};

#[derive(Debug)]
pub enum SchedulerNote {
    RoundCreated { round_id: String },
    RoundStarted { round_id: String },
}

/// The scheduler's ear on the commit stream. Wired into the service's
/// publisher chain so new rounds get their timers without waiting for the
/// next sweep.
#[derive(Clone)]
pub struct SchedulerHandle {
    tx: mpsc::UnboundedSender<SchedulerNote>,
}

impl SchedulerHandle {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<SchedulerNote>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventPublisher for SchedulerHandle {
    fn publish(&self, event: &RoundEvent) {
        let note = match event {
            RoundEvent::Created { round } => Some(SchedulerNote::RoundCreated {
                round_id: round.id.clone(),
            }),
            RoundEvent::Started { round, .. } => Some(SchedulerNote::RoundStarted {
                round_id: round.id.clone(),
            }),
            _ => None,
        };
        if let Some(note) = note {
            let _ = self.tx.send(note);
        }
    }
}

pub struct Scheduler {
    service: Arc<RoundService>,
    publisher: Arc<dyn EventPublisher>,
    sweep_period: Duration,
    watchers: Arc<Mutex<HashSet<String>>>,
    tickers: Arc<Mutex<HashSet<String>>>,
    // keeps the note channel open even if every other sender is dropped
    _handle: SchedulerHandle,
}

impl Scheduler {
    pub fn new(
        service: Arc<RoundService>,
        publisher: Arc<dyn EventPublisher>,
        handle: SchedulerHandle,
        sweep_period: Duration,
    ) -> Self {
        Self {
            service,
            publisher,
            sweep_period,
            watchers: Arc::new(Mutex::new(HashSet::new())),
            tickers: Arc::new(Mutex::new(HashSet::new())),
            _handle: handle,
        }
    }

    /// Run forever. The first sweep fires immediately, which is the whole
    /// recovery story: waiting rounds get their watchers back and in-progress
    /// rounds their elimination tickers, no matter how the process died.
    pub async fn run(self, mut notes: mpsc::UnboundedReceiver<SchedulerNote>) {
        let mut sweep = interval_at(Instant::now(), self.sweep_period);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(period_secs = self.sweep_period.as_secs(), "scheduler running");
        loop {
            tokio::select! {
                _ = sweep.tick() => {
                    if let Err(err) = self.sweep() {
                        warn!(error = %err, "scheduler sweep failed");
                    }
                }
                Some(note) = notes.recv() => self.handle_note(note),
            }
        }
    }

    fn sweep(&self) -> wheel_lib::Result<()> {
        for round in self.service.waiting_rounds()? {
            self.watch_auto_start(&round);
        }
        for round in self.service.in_progress_rounds()? {
            if round.remaining() <= 1 || round.order_exhausted() {
                // stranded between its last elimination and the payout
                match self.service.complete(&round.id) {
                    Ok(_) => info!(round_id = %round.id, "repaired stranded round"),
                    Err(err) => {
                        warn!(round_id = %round.id, error = %err, "stranded round repair failed")
                    }
                }
                continue;
            }
            self.attach_elimination(&round);
        }
        Ok(())
    }

    fn handle_note(&self, note: SchedulerNote) {
        match note {
            SchedulerNote::RoundCreated { round_id } => match self.service.get_round(&round_id) {
                Ok(round) if round.status == RoundStatus::Waiting => self.watch_auto_start(&round),
                Ok(_) => {}
                Err(err) => warn!(round_id = %round_id, error = %err, "created note without round"),
            },
            SchedulerNote::RoundStarted { round_id } => match self.service.get_round(&round_id) {
                Ok(round) if round.status == RoundStatus::InProgress => {
                    self.attach_elimination(&round)
                }
                Ok(_) => {}
                Err(err) => warn!(round_id = %round_id, error = %err, "started note without round"),
            },
        }
    }

    fn watch_auto_start(&self, round: &Round) {
        {
            let mut watchers = self.watchers.lock().unwrap();
            if !watchers.insert(round.id.clone()) {
                return;
            }
        }
        debug!(round_id = %round.id, auto_start_at = round.auto_start_at, "attaching auto-start watcher");
        tokio::spawn(auto_start::watch(
            self.service.clone(),
            self.publisher.clone(),
            self.watchers.clone(),
            round.id.clone(),
        ));
    }

    fn attach_elimination(&self, round: &Round) {
        {
            let mut tickers = self.tickers.lock().unwrap();
            if !tickers.insert(round.id.clone()) {
                return;
            }
        }
        debug!(
            round_id = %round.id,
            interval_ms = round.elimination_interval_ms,
            resume_at = round.elimination_index,
            "attaching elimination ticker"
        );
        tokio::spawn(elimination::tick(
            self.service.clone(),
            self.tickers.clone(),
            round.id.clone(),
            round.elimination_interval_ms,
        ));
    }
}
