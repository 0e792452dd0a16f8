use crate::config::RuntimeConfig;
use crate::scheduler::{Scheduler, SchedulerHandle, SchedulerNote};
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::info;
use wheel_lib::fanout::EventFanout;
use wheel_lib::service::RoundService;
use wheel_lib::storage::Store;
use wheel_lib::types::{EventPublisher, Multiplex};

pub mod config;
pub mod logging;
pub mod scheduler;

/// Everything the daemon owns, wired together once at startup. Commit events
/// flow from the service into the fanout (for subscribers) and the scheduler
/// handle (for timer bookkeeping); the scheduler drives the service back
/// through its public operations only.
pub struct App {
    service: Arc<RoundService>,
    fanout: Arc<EventFanout>,
    scheduler: Scheduler,
    notes: mpsc::UnboundedReceiver<SchedulerNote>,
}

impl App {
    pub fn init_from(cfg: RuntimeConfig) -> Result<Self> {
        let store = Arc::new(Store::open(&cfg.db_path)?);
        let fanout = Arc::new(EventFanout::new(cfg.event_buffer));
        let (handle, notes) = SchedulerHandle::channel();

        let fan_sink: Arc<dyn EventPublisher> = fanout.clone();
        let sched_sink: Arc<dyn EventPublisher> = Arc::new(handle.clone());
        let publisher: Arc<dyn EventPublisher> = Arc::new(Multiplex::new(vec![fan_sink, sched_sink]));
        let service = Arc::new(RoundService::new(store, publisher, cfg.engine_config()));

        let countdown_sink: Arc<dyn EventPublisher> = fanout.clone();
        let scheduler = Scheduler::new(
            service.clone(),
            countdown_sink,
            handle,
            Duration::from_secs(cfg.sweep_period_secs),
        );

        Ok(Self {
            service,
            fanout,
            scheduler,
            notes,
        })
    }

    pub fn service(&self) -> Arc<RoundService> {
        self.service.clone()
    }

    pub fn fanout(&self) -> Arc<EventFanout> {
        self.fanout.clone()
    }

    /// Run until interrupted. Exit code 0 on a clean shutdown; startup
    /// failures never reach here.
    pub async fn run(self) -> Result<()> {
        let App {
            scheduler, notes, ..
        } = self;
        let driver = tokio::spawn(scheduler.run(notes));
        tokio::signal::ctrl_c().await?;
        info!("shutdown signal received");
        driver.abort();
        Ok(())
    }
}
