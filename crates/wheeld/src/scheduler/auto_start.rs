use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};
use wheel_lib::service::RoundService;
use wheel_lib::types::{now_ms, AbortReason, EventPublisher, Round, RoundEvent, RoundStatus};

const COUNTDOWN_WINDOW_MS: i64 = 10_000;

/// Watch one waiting round up to its auto-start deadline: emit the countdown
/// at 1 s resolution over the final 10 s, then start the round or abort it
/// for lack of participants. A round discovered past its deadline is acted on
/// immediately; one that left Waiting (manual start, admin abort) just drops
/// the watcher.
pub(crate) async fn watch(
    service: Arc<RoundService>,
    publisher: Arc<dyn EventPublisher>,
    registry: Arc<Mutex<HashSet<String>>>,
    round_id: String,
) {
    loop {
        let round = match service.get_round(&round_id) {
            Ok(round) => round,
            Err(err) => {
                warn!(round_id = %round_id, error = %err, "auto-start watcher lost its round");
                break;
            }
        };
        if round.status != RoundStatus::Waiting {
            debug!(round_id = %round_id, status = round.status.as_str(), "round left waiting");
            break;
        }
        let remaining_ms = round.auto_start_at - now_ms();
        if remaining_ms <= 0 {
            fire(&service, &round);
            break;
        }
        if remaining_ms > COUNTDOWN_WINDOW_MS {
            sleep(Duration::from_millis((remaining_ms - COUNTDOWN_WINDOW_MS) as u64)).await;
            continue;
        }
        let seconds_remaining = ((remaining_ms + 999) / 1000) as u64;
        publisher.publish(&RoundEvent::Countdown {
            round_id: round_id.clone(),
            seconds_remaining,
        });
        sleep(Duration::from_millis(remaining_ms.min(1000) as u64)).await;
    }
    registry.lock().unwrap().remove(&round_id);
}

fn fire(service: &RoundService, round: &Round) {
    if (round.participants.len() as u32) >= round.min_participants {
        if let Err(err) = service.start(&round.id, None) {
            warn!(round_id = %round.id, error = %err, "auto-start failed");
        }
    } else if let Err(err) = service.abort(
        &round.id,
        AbortReason::InsufficientParticipants,
        None,
    ) {
        warn!(round_id = %round.id, error = %err, "auto-abort failed");
    }
}
