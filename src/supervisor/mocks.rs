use crate::error::{Result, SupervisorError};
use crate::events::{EventBus, ServiceEvents};
use crate::installer::{Installer, ProgressFn};
use crate::probe::SystemProbe;
use crate::service::{ManagedService, ServiceFactory, ServiceSet, StopSignal};
use crate::settings::{NodeSettings, SettingsStore};
use crate::state::{ComponentId, HealthInfo};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::time::Instant;

/// Scriptable service adapter that records every call
pub struct MockService {
    component: ComponentId,
    running: AtomicBool,
    fail_start: AtomicBool,
    fail_stop: AtomicBool,
    starts: Mutex<Vec<Instant>>,
    stops: Mutex<Vec<(StopSignal, Instant)>>,
    health_calls: AtomicUsize,
    health_results: Mutex<VecDeque<std::result::Result<Option<HealthInfo>, String>>>,
    events: Mutex<Option<ServiceEvents>>,
}

impl MockService {
    pub fn new(component: ComponentId) -> Self {
        Self {
            component,
            running: AtomicBool::new(false),
            fail_start: AtomicBool::new(false),
            fail_stop: AtomicBool::new(false),
            starts: Mutex::new(Vec::new()),
            stops: Mutex::new(Vec::new()),
            health_calls: AtomicUsize::new(0),
            health_results: Mutex::new(VecDeque::new()),
            events: Mutex::new(None),
        }
    }

    pub fn start_count(&self) -> usize {
        self.starts.lock().len()
    }

    pub fn start_times(&self) -> Vec<Instant> {
        self.starts.lock().clone()
    }

    pub fn stop_signals(&self) -> Vec<StopSignal> {
        self.stops.lock().iter().map(|(signal, _)| *signal).collect()
    }

    pub fn stop_times(&self) -> Vec<Instant> {
        self.stops.lock().iter().map(|(_, at)| *at).collect()
    }

    pub fn health_calls(&self) -> usize {
        self.health_calls.load(Ordering::SeqCst)
    }

    /// Queue a result for the next `health()` call; healthy once the queue is empty
    pub fn push_health(&self, result: std::result::Result<Option<HealthInfo>, String>) {
        self.health_results.lock().push_back(result);
    }

    pub fn set_fail_start(&self, fail: bool) {
        self.fail_start.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_stop(&self, fail: bool) {
        self.fail_stop.store(fail, Ordering::SeqCst);
    }

    /// Report a failure the way a crashed process would
    pub fn crash(&self, error: &str) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(events) = self.events.lock().as_ref() {
            events.failed(error);
        }
    }

    fn attach(&self, bus: &EventBus) {
        *self.events.lock() = Some(bus.for_component(self.component));
    }
}

#[async_trait]
impl ManagedService for MockService {
    fn component(&self) -> ComponentId {
        self.component
    }

    async fn start(&self) -> Result<()> {
        self.starts.lock().push(Instant::now());
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(SupervisorError::service(self.component, "refused to start"));
        }
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self, signal: StopSignal) -> Result<()> {
        self.stops.lock().push((signal, Instant::now()));
        if self.fail_stop.load(Ordering::SeqCst) {
            return Err(SupervisorError::service(self.component, "refused to stop"));
        }
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    async fn health(&self) -> Result<Option<HealthInfo>> {
        self.health_calls.fetch_add(1, Ordering::SeqCst);
        match self.health_results.lock().pop_front() {
            Some(Ok(info)) => Ok(info),
            Some(Err(message)) => Err(SupervisorError::health(self.component, message)),
            None => Ok(Some(json!({ "component": self.component.as_str() }))),
        }
    }
}

/// Hands out the same five mocks on every build
pub struct MockFactory {
    pub iri: Arc<MockService>,
    pub nelson: Arc<MockService>,
    pub transaction_stream: Arc<MockService>,
    pub chatangle_backend: Arc<MockService>,
    pub chatangle: Arc<MockService>,
    builds: Mutex<Vec<NodeSettings>>,
}

impl MockFactory {
    pub fn new() -> Self {
        Self {
            iri: Arc::new(MockService::new(ComponentId::Iri)),
            nelson: Arc::new(MockService::new(ComponentId::Nelson)),
            transaction_stream: Arc::new(MockService::new(ComponentId::TransactionStream)),
            chatangle_backend: Arc::new(MockService::new(ComponentId::ChatangleBackend)),
            chatangle: Arc::new(MockService::new(ComponentId::Chatangle)),
            builds: Mutex::new(Vec::new()),
        }
    }

    pub fn all(&self) -> [&Arc<MockService>; 5] {
        [
            &self.iri,
            &self.nelson,
            &self.transaction_stream,
            &self.chatangle_backend,
            &self.chatangle,
        ]
    }

    pub fn build_count(&self) -> usize {
        self.builds.lock().len()
    }

    pub fn last_settings(&self) -> Option<NodeSettings> {
        self.builds.lock().last().cloned()
    }
}

impl ServiceFactory for MockFactory {
    fn build(&self, settings: &NodeSettings, events: &EventBus) -> Result<ServiceSet> {
        self.builds.lock().push(settings.clone());
        for service in self.all() {
            service.attach(events);
        }
        Ok(ServiceSet {
            iri: self.iri.clone(),
            nelson: self.nelson.clone(),
            transaction_stream: self.transaction_stream.clone(),
            chatangle_backend: self.chatangle_backend.clone(),
            chatangle: self.chatangle.clone(),
        })
    }
}

/// Installer with a scripted outcome
pub struct MockInstaller {
    installed: AtomicBool,
    fail: bool,
    hold: Option<Arc<Notify>>,
    installs: AtomicUsize,
    uninstalls: AtomicUsize,
}

impl MockInstaller {
    pub fn installed() -> Self {
        Self::with(true, false)
    }

    pub fn missing() -> Self {
        Self::with(false, false)
    }

    pub fn failing() -> Self {
        Self::with(false, true)
    }

    /// Missing installer that parks at 50% until `gate` is notified
    pub fn gated(gate: Arc<Notify>) -> Self {
        Self {
            hold: Some(gate),
            ..Self::missing()
        }
    }

    fn with(installed: bool, fail: bool) -> Self {
        Self {
            installed: AtomicBool::new(installed),
            fail,
            hold: None,
            installs: AtomicUsize::new(0),
            uninstalls: AtomicUsize::new(0),
        }
    }

    pub fn install_count(&self) -> usize {
        self.installs.load(Ordering::SeqCst)
    }

    pub fn uninstall_count(&self) -> usize {
        self.uninstalls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Installer for MockInstaller {
    fn is_installed(&self) -> bool {
        self.installed.load(Ordering::SeqCst)
    }

    async fn install(&self, on_progress: ProgressFn<'_>) -> Result<()> {
        self.installs.fetch_add(1, Ordering::SeqCst);
        on_progress(0);
        if self.fail {
            return Err(SupervisorError::install(ComponentId::Iri, "download corrupted"));
        }
        on_progress(50);
        if let Some(gate) = &self.hold {
            gate.notified().await;
        }
        on_progress(100);
        self.installed.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn uninstall(&self) -> Result<()> {
        self.uninstalls.fetch_add(1, Ordering::SeqCst);
        self.installed.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// Probe with fixed answers
pub struct MockProbe {
    pub space: bool,
    pub runtime: bool,
    pub platform: bool,
    pub memory: bool,
    space_queries: Mutex<Vec<bool>>,
}

impl MockProbe {
    pub fn ready() -> Self {
        Self::new(true, true, true, true)
    }

    pub fn new(space: bool, runtime: bool, platform: bool, memory: bool) -> Self {
        Self {
            space,
            runtime,
            platform,
            memory,
            space_queries: Mutex::new(Vec::new()),
        }
    }

    /// `database_installed` arguments seen by `has_enough_space`
    pub fn space_queries(&self) -> Vec<bool> {
        self.space_queries.lock().clone()
    }
}

#[async_trait]
impl SystemProbe for MockProbe {
    async fn has_enough_space(&self, database_installed: bool) -> bool {
        self.space_queries.lock().push(database_installed);
        self.space
    }

    async fn has_required_runtime(&self) -> bool {
        self.runtime
    }

    fn is_supported_platform(&self) -> bool {
        self.platform
    }

    fn has_enough_memory(&self) -> bool {
        self.memory
    }

    fn runtime_name(&self) -> String {
        "java".to_string()
    }
}

/// In-memory settings store
#[derive(Default)]
pub struct MockSettingsStore {
    current: Mutex<NodeSettings>,
    saves: Mutex<Vec<NodeSettings>>,
}

impl MockSettingsStore {
    pub fn saves(&self) -> Vec<NodeSettings> {
        self.saves.lock().clone()
    }
}

impl SettingsStore for MockSettingsStore {
    fn read(&self) -> NodeSettings {
        self.current.lock().clone()
    }

    fn save(&self, settings: &NodeSettings) -> Result<()> {
        *self.current.lock() = settings.clone();
        self.saves.lock().push(settings.clone());
        Ok(())
    }
}
