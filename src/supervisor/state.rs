use super::Supervisor;
use crate::state::{ComponentId, ComponentState, StateMap, StatePatch, Status};
use std::fmt::Display;
use tracing::warn;

impl Supervisor {
    /// Merge a partial record into a component's state
    pub(crate) fn update_state(&self, component: ComponentId, patch: StatePatch) {
        self.inner.store.update(component, patch);
    }

    /// Append a line to a component's message log
    pub(crate) fn append_message(&self, component: ComponentId, text: impl Into<String>) {
        self.inner.store.append(component, text);
    }

    /// Record a start/stop/health failure on the component
    pub(super) fn record_failure(&self, component: ComponentId, error: impl Display) {
        warn!("{} failed: {}", component, error);
        let message = error.to_string();
        self.append_message(component, format!("ERROR: {}", message));
        self.update_state(component, StatePatch::error(message));
    }

    pub(super) fn status(&self, component: ComponentId) -> Status {
        self.inner.store.get(component).status
    }

    /// Snapshot of every component's state
    pub fn get_state(&self) -> StateMap {
        self.inner.store.snapshot()
    }

    pub fn component_state(&self, component: ComponentId) -> ComponentState {
        self.inner.store.get(component)
    }

    /// Retained log lines for a component, oldest first
    pub fn messages(&self, component: ComponentId) -> Vec<String> {
        self.inner.store.messages(component)
    }
}
