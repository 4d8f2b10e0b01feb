use std::time::Duration;

use chrono::Utc;

use crate::lifecycle::LifecycleManager;

use super::relay::OutboxRelay;

/// Events the relay picks up per tick.
const RELAY_BATCH: usize = 100;

/// Periodic sweep, outbox drain and upcoming reminders.
pub fn spawn_scheduler(manager: LifecycleManager, relay: OutboxRelay, every: Duration) {
    actix_web::rt::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            log::debug!("Running proposal scheduler");
            let now = Utc::now();

            if let Err(e) = manager.sweep_expired(now).await {
                log::error!("Scheduler: sweep failed: {}", e);
            }
            if let Err(e) = relay.drain(now, RELAY_BATCH).await {
                log::error!("Scheduler: outbox drain failed: {}", e);
            }
            if let Err(e) = relay.dispatcher().notify_upcoming(now).await {
                log::error!("Scheduler: upcoming reminders failed: {}", e);
            }
        }
    });
}
