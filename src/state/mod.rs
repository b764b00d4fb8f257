mod log;
mod store;
mod types;

#[cfg(test)]
mod tests;

pub use log::{MessageLog, DEFAULT_MAX_MESSAGES};
pub use store::{MessageObserver, StateObserver, StateStore};
pub use types::{ComponentId, ComponentState, HealthInfo, StateMap, StatePatch, Status};
