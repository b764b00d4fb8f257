mod contract;
mod factory;
mod health;
mod process;

#[cfg(test)]
mod tests;

pub use contract::{ManagedService, ServiceFactory, ServiceSet, StopSignal};
pub use factory::{render_template, ProcessServiceFactory};
pub use health::HealthProbe;
pub use process::{CommandSpec, ProcessService};
