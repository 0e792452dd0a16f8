use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, warn};
use wheel_lib::service::RoundService;
use wheel_lib::types::RoundStatus;
use wheel_lib::ErrorKind;

/// Repeating draw for one in-progress round. The first tick lands one full
/// interval after attach, so a round resumed after a restart never eliminates
/// early. Ends when the round completes or leaves InProgress; transient
/// faults are logged and retried on the next tick.
pub(crate) async fn tick(
    service: Arc<RoundService>,
    registry: Arc<Mutex<HashSet<String>>>,
    round_id: String,
    interval_ms: u64,
) {
    let period = Duration::from_millis(interval_ms.max(1));
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        match service.eliminate_next(&round_id) {
            Ok(round) => {
                if round.status != RoundStatus::InProgress {
                    break;
                }
            }
            Err(err) if err.kind() == ErrorKind::InvalidState => {
                // completed elsewhere or otherwise done with us
                debug!(round_id = %round_id, reason = %err, "elimination ticker stopping");
                break;
            }
            Err(err) => {
                warn!(round_id = %round_id, error = %err, "elimination tick failed");
            }
        }
    }
    registry.lock().unwrap().remove(&round_id);
}
