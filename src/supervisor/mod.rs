mod guard;
mod orchestrator;
mod reconfigure;
mod recovery;
mod runtime;
mod shutdown;
mod startup;
mod state;
mod types;

#[cfg(test)]
mod mocks;

pub use orchestrator::{Supervisor, SupervisorBuilder};
pub use types::ShutdownReason;
