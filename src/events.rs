use crate::state::ComponentId;
use tokio::sync::mpsc;
use tracing::{debug, error};

/// Events a managed service reports back to the supervisor
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceEvent {
    /// A line of service output worth keeping in the component log
    Message { component: ComponentId, text: String },
    /// The service failed outside of a start/stop call (e.g. the process died)
    Failed {
        component: ComponentId,
        error: String,
    },
}

impl ServiceEvent {
    pub fn component(&self) -> ComponentId {
        match self {
            ServiceEvent::Message { component, .. } => *component,
            ServiceEvent::Failed { component, .. } => *component,
        }
    }

    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            ServiceEvent::Message { component, text } => format!("{}: {}", component, text),
            ServiceEvent::Failed { component, error } => {
                format!("{} failed: {}", component, error)
            }
        }
    }
}

/// Per-service handle for publishing [`ServiceEvent`]s
#[derive(Debug, Clone)]
pub struct ServiceEvents {
    component: ComponentId,
    sender: mpsc::UnboundedSender<ServiceEvent>,
}

impl ServiceEvents {
    pub fn component(&self) -> ComponentId {
        self.component
    }

    pub fn message(&self, text: impl Into<String>) {
        self.send(ServiceEvent::Message {
            component: self.component,
            text: text.into(),
        });
    }

    pub fn failed(&self, error: impl Into<String>) {
        let error = error.into();
        error!("Service {} failed: {}", self.component, error);
        self.send(ServiceEvent::Failed {
            component: self.component,
            error,
        });
    }

    fn send(&self, event: ServiceEvent) {
        if self.sender.send(event).is_err() {
            debug!("Event channel closed, dropping {} event", self.component);
        }
    }
}

/// Shared event bus all service adapters publish into
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: mpsc::UnboundedSender<ServiceEvent>,
}

impl EventBus {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ServiceEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    /// Publisher scoped to one component
    pub fn for_component(&self, component: ComponentId) -> ServiceEvents {
        ServiceEvents {
            component,
            sender: self.sender.clone(),
        }
    }
}
