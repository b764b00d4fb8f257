use crate::error::Result;
use crate::events::EventBus;
use crate::settings::NodeSettings;
use crate::state::{ComponentId, HealthInfo};
use async_trait::async_trait;
use std::sync::Arc;

/// How a stop request should be delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopSignal {
    /// Ask the service to exit, force it after a grace period
    Graceful,
    /// Kill immediately, without waiting for a graceful exit
    Kill,
}

/// Uniform lifecycle contract for a supervised service.
///
/// `start` and `stop` report failure through their `Result`; the supervisor
/// records it on the component instead of aborting the sequence it is
/// running. Failures that happen between calls go through the adapter's
/// [`crate::events::ServiceEvents`] handle.
#[async_trait]
pub trait ManagedService: Send + Sync {
    fn component(&self) -> ComponentId;

    async fn start(&self) -> Result<()>;

    async fn stop(&self, signal: StopSignal) -> Result<()>;

    fn is_running(&self) -> bool;

    /// Best-effort status snapshot; `Ok(None)` when the service has nothing to report
    async fn health(&self) -> Result<Option<HealthInfo>> {
        Ok(None)
    }
}

/// One adapter per supervised service, replaced as a unit on reconfiguration
#[derive(Clone)]
pub struct ServiceSet {
    pub iri: Arc<dyn ManagedService>,
    pub nelson: Arc<dyn ManagedService>,
    pub transaction_stream: Arc<dyn ManagedService>,
    pub chatangle_backend: Arc<dyn ManagedService>,
    pub chatangle: Arc<dyn ManagedService>,
}

impl ServiceSet {
    pub fn get(&self, component: ComponentId) -> Option<&Arc<dyn ManagedService>> {
        match component {
            ComponentId::Iri => Some(&self.iri),
            ComponentId::Nelson => Some(&self.nelson),
            ComponentId::TransactionStream => Some(&self.transaction_stream),
            ComponentId::ChatangleBackend => Some(&self.chatangle_backend),
            ComponentId::Chatangle => Some(&self.chatangle),
            ComponentId::System | ComponentId::Database => None,
        }
    }
}

/// Builds a fresh [`ServiceSet`] against the given settings
pub trait ServiceFactory: Send + Sync {
    fn build(&self, settings: &NodeSettings, events: &EventBus) -> Result<ServiceSet>;
}
