pub mod config;
pub mod error;
pub mod events;
pub mod installer;
pub mod probe;
pub mod service;
pub mod settings;
pub mod state;
pub mod supervisor;

pub use config::SupervisorConfig;
pub use error::{Result, SupervisorError};
pub use events::{EventBus, ServiceEvent, ServiceEvents};
pub use installer::{ArtifactInstaller, Installer};
pub use probe::{HostProbe, Readiness, SystemProbe};
pub use service::{ManagedService, ProcessServiceFactory, ServiceFactory, ServiceSet, StopSignal};
pub use settings::{NodeSettings, SettingsStore, TomlSettingsStore};
pub use state::{ComponentId, ComponentState, StateMap, StatePatch, Status};
pub use supervisor::{ShutdownReason, Supervisor, SupervisorBuilder};
