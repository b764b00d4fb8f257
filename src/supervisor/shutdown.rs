use super::Supervisor;
use crate::service::{ManagedService, StopSignal};
use crate::state::{StatePatch, Status};
use std::sync::Arc;
use tracing::{error, info};

impl Supervisor {
    /// Stop every supervised service.
    ///
    /// The recovery loop and any scheduled restarts are cancelled first. The
    /// ledger node is killed outright, the rest are asked to exit. Failures
    /// are logged on the component and never interrupt the sequence.
    pub async fn stop(&self) {
        info!("Stopping supervised services");

        self.current_run().cancel();
        self.inner.iri_guard.invalidate();
        self.inner.nelson_guard.invalidate();
        if let Some(handle) = self.inner.recovery.lock().take() {
            handle.abort();
        }

        let services = self.services();
        self.stop_service(&services.iri, StopSignal::Kill).await;
        for service in [
            &services.nelson,
            &services.transaction_stream,
            &services.chatangle_backend,
            &services.chatangle,
        ] {
            self.stop_service(service, StopSignal::Graceful).await;
        }

        info!("All services stopped");
    }

    async fn stop_service(&self, service: &Arc<dyn ManagedService>, signal: StopSignal) {
        let component = service.component();
        info!("Stopping {} ({:?})", component, signal);
        if let Err(e) = service.stop(signal).await {
            error!("Error stopping {}: {}", component, e);
            self.append_message(component, format!("ERROR: {}", e));
        }
        self.update_state(component, StatePatch::status(Status::Stopped));
    }
}
