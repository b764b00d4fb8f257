use super::guard::RestartGuard;
use crate::config::SupervisorConfig;
use crate::error::{Result, SupervisorError};
use crate::events::{EventBus, ServiceEvent};
use crate::installer::Installer;
use crate::probe::SystemProbe;
use crate::service::{ServiceFactory, ServiceSet};
use crate::settings::{NodeSettings, SettingsStore};
use crate::state::{MessageObserver, StateObserver, StatePatch, StateStore, Status};
use parking_lot::{Mutex, RwLock};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub(super) struct Inner {
    pub(super) config: SupervisorConfig,
    pub(super) store: StateStore,
    pub(super) settings: Arc<dyn SettingsStore>,
    pub(super) probe: Arc<dyn SystemProbe>,
    pub(super) iri_installer: Arc<dyn Installer>,
    pub(super) database_installer: Arc<dyn Installer>,
    pub(super) factory: Arc<dyn ServiceFactory>,
    pub(super) bus: EventBus,
    pub(super) services: RwLock<Arc<ServiceSet>>,
    pub(super) run_token: Mutex<CancellationToken>,
    pub(super) recovery: Mutex<Option<JoinHandle<()>>>,
    pub(super) iri_guard: RestartGuard,
    pub(super) nelson_guard: RestartGuard,
}

/// Supervisor for the node and its companion services.
///
/// Cheap to clone; every clone drives the same state.
#[derive(Clone)]
pub struct Supervisor {
    pub(super) inner: Arc<Inner>,
}

impl Supervisor {
    pub fn builder(config: SupervisorConfig) -> SupervisorBuilder {
        SupervisorBuilder::new(config)
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.inner.config
    }

    /// Current service adapters
    pub(super) fn services(&self) -> Arc<ServiceSet> {
        self.inner.services.read().clone()
    }

    /// Replace every adapter with a fresh set built against `settings`
    pub(super) fn rebuild_services(&self, settings: &NodeSettings) -> Result<()> {
        let services = self.inner.factory.build(settings, &self.inner.bus)?;
        *self.inner.services.write() = Arc::new(services);
        info!("Service adapters rebuilt for node '{}'", settings.name);
        Ok(())
    }

    /// Start a new run, cancelling whatever the previous one left behind
    pub(super) fn begin_run(&self) -> CancellationToken {
        let token = CancellationToken::new();
        let previous = std::mem::replace(&mut *self.inner.run_token.lock(), token.clone());
        previous.cancel();
        self.inner.iri_guard.invalidate();
        self.inner.nelson_guard.invalidate();
        token
    }

    pub(super) fn current_run(&self) -> CancellationToken {
        self.inner.run_token.lock().clone()
    }
}

/// Builder wiring a [`Supervisor`] to its collaborators
pub struct SupervisorBuilder {
    config: SupervisorConfig,
    settings: Option<Arc<dyn SettingsStore>>,
    probe: Option<Arc<dyn SystemProbe>>,
    iri_installer: Option<Arc<dyn Installer>>,
    database_installer: Option<Arc<dyn Installer>>,
    factory: Option<Arc<dyn ServiceFactory>>,
    on_state_change: Option<StateObserver>,
    on_message: Option<MessageObserver>,
}

impl SupervisorBuilder {
    pub fn new(config: SupervisorConfig) -> Self {
        Self {
            config,
            settings: None,
            probe: None,
            iri_installer: None,
            database_installer: None,
            factory: None,
            on_state_change: None,
            on_message: None,
        }
    }

    pub fn settings_store(mut self, settings: Arc<dyn SettingsStore>) -> Self {
        self.settings = Some(settings);
        self
    }

    pub fn system_probe(mut self, probe: Arc<dyn SystemProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn iri_installer(mut self, installer: Arc<dyn Installer>) -> Self {
        self.iri_installer = Some(installer);
        self
    }

    pub fn database_installer(mut self, installer: Arc<dyn Installer>) -> Self {
        self.database_installer = Some(installer);
        self
    }

    pub fn service_factory(mut self, factory: Arc<dyn ServiceFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Observer called with the full state map after every change
    pub fn on_state_change(mut self, observer: StateObserver) -> Self {
        self.on_state_change = Some(observer);
        self
    }

    /// Observer called after every component log append
    pub fn on_message(mut self, observer: MessageObserver) -> Self {
        self.on_message = Some(observer);
        self
    }

    /// Build the supervisor. Must be called from within a Tokio runtime.
    pub fn build(self) -> Result<Supervisor> {
        let settings = self
            .settings
            .ok_or_else(|| SupervisorError::system("Settings store is required"))?;
        let probe = self
            .probe
            .ok_or_else(|| SupervisorError::system("System probe is required"))?;
        let iri_installer = self
            .iri_installer
            .ok_or_else(|| SupervisorError::system("IRI installer is required"))?;
        let database_installer = self
            .database_installer
            .ok_or_else(|| SupervisorError::system("Database installer is required"))?;
        let factory = self
            .factory
            .ok_or_else(|| SupervisorError::system("Service factory is required"))?;

        std::fs::create_dir_all(&self.config.storage_directory)?;

        let (bus, receiver) = EventBus::new();
        let services = factory.build(&settings.read(), &bus)?;
        let store = StateStore::new(self.config.max_messages_per_component)
            .with_observers(self.on_state_change, self.on_message);

        let inner = Arc::new(Inner {
            config: self.config,
            store,
            settings,
            probe,
            iri_installer,
            database_installer,
            factory,
            bus,
            services: RwLock::new(Arc::new(services)),
            run_token: Mutex::new(CancellationToken::new()),
            recovery: Mutex::new(None),
            iri_guard: RestartGuard::default(),
            nelson_guard: RestartGuard::default(),
        });

        tokio::spawn(pump_events(Arc::downgrade(&inner), receiver));
        info!(
            "Supervisor created with storage directory {:?}",
            inner.config.storage_directory
        );

        Ok(Supervisor { inner })
    }
}

/// Route adapter events into the state store until the supervisor is dropped
async fn pump_events(inner: Weak<Inner>, mut receiver: mpsc::UnboundedReceiver<ServiceEvent>) {
    while let Some(event) = receiver.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        match event {
            ServiceEvent::Message { component, text } => inner.store.append(component, text),
            ServiceEvent::Failed { component, error } => {
                inner.store.append(component, format!("ERROR: {}", error));
                if inner.store.get(component).status == Status::Stopped {
                    debug!("Ignoring failure of stopped {}", component);
                    continue;
                }
                inner.store.update(component, StatePatch::error(error));
            }
        }
    }
    debug!("Service event pump finished");
}
