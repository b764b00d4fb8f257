use super::log::MessageLog;
use super::types::{ComponentId, ComponentState, StateMap, StatePatch};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Called with the full state map after every state mutation
pub type StateObserver = Arc<dyn Fn(&StateMap) + Send + Sync>;

/// Called with `(component, text, full_log)` after every log append
pub type MessageObserver = Arc<dyn Fn(ComponentId, &str, &[String]) + Send + Sync>;

struct Inner {
    states: StateMap,
    logs: BTreeMap<ComponentId, MessageLog>,
}

/// Single owner of the component state map and message logs.
///
/// All mutation goes through [`StateStore::update`] and [`StateStore::append`];
/// observers run after the lock is released, against a snapshot.
pub struct StateStore {
    inner: Mutex<Inner>,
    on_state_change: Option<StateObserver>,
    on_message: Option<MessageObserver>,
}

impl StateStore {
    pub fn new(max_messages: usize) -> Self {
        let states = ComponentId::ALL
            .iter()
            .map(|id| (*id, ComponentState::default()))
            .collect();
        let logs = ComponentId::ALL
            .iter()
            .map(|id| (*id, MessageLog::new(max_messages)))
            .collect();

        Self {
            inner: Mutex::new(Inner { states, logs }),
            on_state_change: None,
            on_message: None,
        }
    }

    pub fn with_observers(
        mut self,
        on_state_change: Option<StateObserver>,
        on_message: Option<MessageObserver>,
    ) -> Self {
        self.on_state_change = on_state_change;
        self.on_message = on_message;
        self
    }

    /// Merge `patch` into the component's state and notify the state observer
    pub fn update(&self, component: ComponentId, patch: StatePatch) {
        let snapshot = {
            let mut inner = self.inner.lock();
            let state = inner.states.entry(component).or_default();
            state.apply(patch);
            debug!(
                component = %component,
                status = ?state.status,
                "Component state updated"
            );
            self.on_state_change.as_ref().map(|_| inner.states.clone())
        };

        if let (Some(observer), Some(snapshot)) = (&self.on_state_change, snapshot) {
            observer(&snapshot);
        }
    }

    /// Append a line to the component's log and notify the message observer
    pub fn append(&self, component: ComponentId, text: impl Into<String>) {
        let text = text.into();
        let lines = {
            let mut inner = self.inner.lock();
            let log = inner.logs.entry(component).or_default();
            log.push(text.clone());
            self.on_message.as_ref().map(|_| log.lines())
        };

        if let (Some(observer), Some(lines)) = (&self.on_message, lines) {
            observer(component, &text, &lines);
        }
    }

    pub fn snapshot(&self) -> StateMap {
        self.inner.lock().states.clone()
    }

    pub fn get(&self, component: ComponentId) -> ComponentState {
        self.inner
            .lock()
            .states
            .get(&component)
            .cloned()
            .unwrap_or_default()
    }

    pub fn messages(&self, component: ComponentId) -> Vec<String> {
        self.inner
            .lock()
            .logs
            .get(&component)
            .map(MessageLog::lines)
            .unwrap_or_default()
    }
}
