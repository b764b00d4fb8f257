use super::Supervisor;
use crate::error::{Result, SupervisorError};
use crate::installer::Installer;
use crate::probe::Readiness;
use crate::service::ManagedService;
use crate::state::{ComponentId, StatePatch, Status};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Await `future` unless the run is cancelled first
pub(super) async fn interruptible<F: Future>(
    token: &CancellationToken,
    future: F,
) -> Result<F::Output> {
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(SupervisorError::Interrupted),
        output = future => Ok(output),
    }
}

fn sync_wait_message(delay: Duration) -> String {
    let secs = delay.as_secs();
    if secs % 60 == 0 {
        format!("waiting {} minutes for Node to sync", secs / 60)
    } else {
        format!("waiting {} seconds for Node to sync", secs)
    }
}

impl Supervisor {
    /// Check the host, install what is missing and bring every service up in order.
    ///
    /// Only a failed readiness check, a failed install or a concurrent
    /// [`Supervisor::stop`] make this return an error. Individual service
    /// failures are recorded on the component and startup moves on.
    pub async fn start(&self) -> Result<()> {
        let token = self.begin_run();
        let span = info_span!("startup", run = %Uuid::new_v4());
        self.run_startup(token).instrument(span).await
    }

    async fn run_startup(&self, token: CancellationToken) -> Result<()> {
        info!("Starting supervised services");
        self.check_system(&token).await?;

        if let Err(e) = self.install_components(&token).await {
            if !matches!(e, SupervisorError::Interrupted) {
                self.append_message(ComponentId::Iri, "Installation failed");
                self.append_message(ComponentId::Database, "Installation failed");
            }
            return Err(e);
        }

        let services = self.services();
        self.start_iri(&services.iri, &token).await?;
        self.start_nelson(&services.nelson, &token).await?;
        self.start_transaction_stream(&services.transaction_stream, &token)
            .await?;
        self.start_service(&services.chatangle_backend, &token)
            .await?;
        self.start_service(&services.chatangle, &token).await?;

        self.append_message(
            ComponentId::System,
            self.inner.config.ports.open_ports_message(),
        );
        self.spawn_recovery_loop(token);
        info!("All services started");
        Ok(())
    }

    async fn check_system(&self, token: &CancellationToken) -> Result<()> {
        self.update_state(ComponentId::System, StatePatch::status(Status::Checking));

        let probe = &self.inner.probe;
        let database_installed = self.inner.database_installer.is_installed();
        let has_enough_space =
            interruptible(token, probe.has_enough_space(database_installed)).await?;
        let has_required_runtime = interruptible(token, probe.has_required_runtime()).await?;
        let readiness = Readiness {
            has_enough_space,
            has_required_runtime,
            is_supported_platform: probe.is_supported_platform(),
            has_enough_memory: probe.has_enough_memory(),
        };
        let info = serde_json::to_value(readiness).unwrap_or_default();

        match readiness.failure_message(&probe.runtime_name()) {
            None => {
                info!("System check passed");
                self.update_state(
                    ComponentId::System,
                    StatePatch::status(Status::Ready).with_info(info),
                );
                Ok(())
            }
            Some(reason) => {
                error!("System check failed: {}", reason);
                self.append_message(ComponentId::System, reason.clone());
                self.update_state(
                    ComponentId::System,
                    StatePatch::error(reason.clone()).with_info(info),
                );
                Err(SupervisorError::SystemUnready { reason })
            }
        }
    }

    async fn install_components(&self, token: &CancellationToken) -> Result<()> {
        self.install(ComponentId::Iri, &self.inner.iri_installer, token)
            .await?;
        self.install(ComponentId::Database, &self.inner.database_installer, token)
            .await
    }

    async fn install(
        &self,
        component: ComponentId,
        installer: &Arc<dyn Installer>,
        token: &CancellationToken,
    ) -> Result<()> {
        self.update_state(component, StatePatch::status(Status::Checking));
        if installer.is_installed() {
            debug!("{} already installed", component);
            self.update_state(component, StatePatch::status(Status::Ready));
            return Ok(());
        }

        info!("Installing {}", component);
        let on_progress =
            |progress: u8| self.update_state(component, StatePatch::downloading(progress));

        let outcome = match interruptible(token, installer.install(&on_progress)).await {
            Ok(outcome) => outcome,
            Err(interrupted) => {
                self.abandon_install(component, installer).await;
                return Err(interrupted);
            }
        };

        match outcome {
            Ok(()) => {
                info!("{} installed", component);
                self.update_state(component, StatePatch::status(Status::Ready));
                Ok(())
            }
            Err(e) => {
                error!("Installation of {} failed: {}", component, e);
                self.update_state(component, StatePatch::error(e.to_string()));
                if let Err(cleanup) = installer.uninstall().await {
                    warn!("Failed to roll back {} install: {}", component, cleanup);
                }
                Err(match e {
                    SupervisorError::Install { .. } => e,
                    other => SupervisorError::install(component, other.to_string()),
                })
            }
        }
    }

    /// Clean up after an install cut short by a stop
    async fn abandon_install(&self, component: ComponentId, installer: &Arc<dyn Installer>) {
        // A newer run already owns the installers
        if !self.current_run().is_cancelled() {
            return;
        }

        info!("Install of {} interrupted, rolling back", component);
        self.update_state(component, StatePatch::status(Status::Stopped));
        if let Err(e) = installer.uninstall().await {
            warn!("Failed to roll back {} install: {}", component, e);
        }
    }

    /// Start the ledger node and wait until it answers node info queries
    pub(super) async fn start_iri(
        &self,
        iri: &Arc<dyn ManagedService>,
        token: &CancellationToken,
    ) -> Result<()> {
        self.update_state(ComponentId::Iri, StatePatch::status(Status::Starting));
        if let Err(e) = interruptible(token, iri.start()).await? {
            self.record_failure(ComponentId::Iri, e);
            return Ok(());
        }

        let poll = self.inner.config.timing.node_poll_interval();
        let mut attempts: u32 = 0;
        let info = loop {
            interruptible(token, sleep(poll)).await?;
            if self.status(ComponentId::Iri) == Status::Error {
                warn!("IRI failed while waiting for node info");
                return Ok(());
            }

            attempts += 1;
            match interruptible(token, iri.health()).await? {
                Ok(info) => break info,
                Err(e) => debug!("Node info not available yet (attempt {}): {}", attempts, e),
            }
        };

        info!("IRI answered node info after {} attempt(s)", attempts);
        self.append_message(ComponentId::Iri, "started");
        self.update_state(ComponentId::Iri, StatePatch::running(info));
        Ok(())
    }

    /// Start peer discovery and take one health snapshot
    pub(super) async fn start_nelson(
        &self,
        nelson: &Arc<dyn ManagedService>,
        token: &CancellationToken,
    ) -> Result<()> {
        self.update_state(ComponentId::Nelson, StatePatch::status(Status::Starting));
        if let Err(e) = interruptible(token, nelson.start()).await? {
            self.record_failure(ComponentId::Nelson, e);
            return Ok(());
        }

        let info = match interruptible(token, nelson.health()).await? {
            Ok(info) => info,
            Err(e) => {
                warn!("Nelson health query failed: {}", e);
                None
            }
        };
        self.update_state(ComponentId::Nelson, StatePatch::running(info));
        Ok(())
    }

    async fn start_transaction_stream(
        &self,
        stream: &Arc<dyn ManagedService>,
        token: &CancellationToken,
    ) -> Result<()> {
        let component = stream.component();
        self.update_state(component, StatePatch::status(Status::Starting));

        // Old transactions flood the stream until the node has synced
        let delay = self.inner.config.timing.stream_start_delay();
        self.append_message(component, sync_wait_message(delay));
        interruptible(token, sleep(delay)).await?;

        self.launch(stream, token).await
    }

    async fn start_service(
        &self,
        service: &Arc<dyn ManagedService>,
        token: &CancellationToken,
    ) -> Result<()> {
        self.update_state(service.component(), StatePatch::status(Status::Starting));
        self.launch(service, token).await
    }

    async fn launch(&self, service: &Arc<dyn ManagedService>, token: &CancellationToken) -> Result<()> {
        let component = service.component();
        match interruptible(token, service.start()).await? {
            Ok(()) => {
                info!("{} started", component);
                self.update_state(component, StatePatch::running(None));
            }
            Err(e) => self.record_failure(component, e),
        }
        Ok(())
    }
}
