use super::startup::interruptible;
use super::Supervisor;
use crate::error::SupervisorError;
use crate::service::{ServiceSet, StopSignal};
use crate::state::{ComponentId, StatePatch, Status};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

impl Supervisor {
    /// Run [`Supervisor::tick`] on the configured interval until `token` is cancelled
    pub(super) fn spawn_recovery_loop(&self, token: CancellationToken) {
        let inner = Arc::downgrade(&self.inner);
        let period = self.inner.config.timing.tick_interval();

        let handle = tokio::spawn(async move {
            info!("Recovery loop started ({:?} interval)", period);
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                let Some(inner) = inner.upgrade() else {
                    break;
                };
                let supervisor = Supervisor { inner };
                if interruptible(&token, supervisor.tick()).await.is_err() {
                    break;
                }
            }
            debug!("Recovery loop stopped");
        });

        if let Some(previous) = self.inner.recovery.lock().replace(handle) {
            previous.abort();
        }
    }

    /// One pass of health checks and recovery.
    ///
    /// The ledger node is handled first; peer discovery is evaluated once per
    /// tick afterwards. Restarts are scheduled, not awaited.
    pub async fn tick(&self) {
        let services = self.services();

        match self.status(ComponentId::Iri) {
            Status::Running => match services.iri.health().await {
                Ok(Some(info)) => self.update_state(ComponentId::Iri, StatePatch::info(info)),
                Ok(None) => {}
                Err(e) => {
                    self.append_message(ComponentId::Iri, "Failed getting IRI API update...");
                    self.update_state(ComponentId::Iri, StatePatch::error(e.to_string()));
                }
            },
            Status::Error => match self.inner.iri_guard.try_claim() {
                Some(generation) => {
                    self.append_message(
                        ComponentId::Iri,
                        "IRI seems down, trying to restart in 2 seconds...",
                    );
                    if let Err(e) = services.iri.stop(StopSignal::Kill).await {
                        warn!("Failed to kill IRI before restart: {}", e);
                    }
                    self.check_nelson(&services).await;
                    self.schedule_iri_restart(generation);
                    return;
                }
                None => debug!("IRI restart already pending"),
            },
            _ => {}
        }

        self.check_nelson(&services).await;
    }

    async fn check_nelson(&self, services: &ServiceSet) {
        match self.status(ComponentId::Nelson) {
            Status::Running => match services.nelson.health().await {
                Ok(Some(info)) => self.update_state(ComponentId::Nelson, StatePatch::info(info)),
                Ok(None) => {}
                Err(e) => self.record_failure(ComponentId::Nelson, e),
            },
            Status::Error => match self.inner.nelson_guard.try_claim() {
                Some(generation) => {
                    self.append_message(
                        ComponentId::Nelson,
                        "Service seems down, trying to restart...",
                    );
                    self.schedule_nelson_restart(generation);
                }
                None => debug!("Nelson restart already pending"),
            },
            _ => {}
        }
    }

    fn schedule_iri_restart(&self, generation: u64) {
        let supervisor = self.clone();
        let token = self.current_run();
        let delay = self.inner.config.timing.iri_restart_delay();

        tokio::spawn(async move {
            supervisor.restart_iri(generation, delay, &token).await;
            supervisor.inner.iri_guard.finish(generation);
        });
    }

    async fn restart_iri(&self, generation: u64, delay: Duration, token: &CancellationToken) {
        if interruptible(token, sleep(delay)).await.is_err()
            || !self.inner.iri_guard.is_current(generation)
        {
            debug!("Dropping stale IRI restart");
            return;
        }

        info!("Restarting IRI");
        let iri = self.services().iri.clone();
        if let Err(e) = self.start_iri(&iri, token).await {
            if !matches!(e, SupervisorError::Interrupted) {
                warn!("IRI restart failed: {}", e);
            }
        }
    }

    fn schedule_nelson_restart(&self, generation: u64) {
        let supervisor = self.clone();
        let token = self.current_run();
        let delay = self.inner.config.timing.nelson_restart_delay();

        tokio::spawn(async move {
            supervisor.restart_nelson(generation, delay, &token).await;
            supervisor.inner.nelson_guard.finish(generation);
        });
    }

    async fn restart_nelson(&self, generation: u64, delay: Duration, token: &CancellationToken) {
        if interruptible(token, sleep(delay)).await.is_err()
            || !self.inner.nelson_guard.is_current(generation)
        {
            debug!("Dropping stale Nelson restart");
            return;
        }

        info!("Restarting Nelson");
        let nelson = self.services().nelson.clone();
        match interruptible(token, nelson.stop(StopSignal::Graceful)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Failed to stop Nelson before restart: {}", e),
            Err(_) => return,
        }
        if let Err(e) = self.start_nelson(&nelson, token).await {
            if !matches!(e, SupervisorError::Interrupted) {
                warn!("Nelson restart failed: {}", e);
            }
        }
    }
}
